//! Leaf-wise regression tree builder
//!
//! Features are bucketed into at most `max_bin` histogram bins once per
//! training run. Each tree then grows best-first: the leaf whose best split
//! has the highest gain is split next, until `num_leaves` is reached or no
//! leaf has a valid split.

use keelson_ai_core::frame::FeatureFrame;
use keelson_ai_core::gbdt::{Node, Tree};

use crate::deterministic::SplitTieBreaker;

/// Growth limits for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub num_leaves: usize,
    pub max_depth: Option<usize>,
    pub min_data_in_leaf: usize,
    pub min_sum_hessian_in_leaf: f64,
    pub lambda_l2: f64,
    pub min_gain_to_split: f64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            num_leaves: 31,
            max_depth: None,
            min_data_in_leaf: 20,
            min_sum_hessian_in_leaf: 1e-3,
            lambda_l2: 0.0,
            min_gain_to_split: 0.0,
        }
    }
}

/// Bin boundaries for every feature plus each training row's bin indices
#[derive(Clone, Debug)]
pub struct BinnedFeatures {
    /// Per feature: ascending upper bounds; bin `b` holds values
    /// `<= thresholds[b]`, the last bin everything above
    thresholds: Vec<Vec<f64>>,
    /// Per feature, per row
    bins: Vec<Vec<u16>>,
    n_rows: usize,
}

impl BinnedFeatures {
    /// Bucket every column of `frame` into at most `max_bin` bins
    pub fn fit(frame: &FeatureFrame, max_bin: usize) -> Self {
        let max_bin = max_bin.clamp(2, u16::MAX as usize);
        let mut thresholds = Vec::with_capacity(frame.n_cols());
        let mut bins = Vec::with_capacity(frame.n_cols());

        for column in frame.columns() {
            let cuts = bin_thresholds(&column.values, max_bin);
            let row_bins = column
                .values
                .iter()
                .map(|&v| cuts.partition_point(|&t| t < v) as u16)
                .collect();
            thresholds.push(cuts);
            bins.push(row_bins);
        }

        Self {
            thresholds,
            bins,
            n_rows: frame.n_rows(),
        }
    }

    pub fn n_features(&self) -> usize {
        self.thresholds.len()
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of bins used by `feature`
    pub fn n_bins(&self, feature: usize) -> usize {
        self.thresholds[feature].len() + 1
    }

    pub fn threshold(&self, feature: usize, bin: usize) -> f64 {
        self.thresholds[feature][bin]
    }

    fn bin(&self, feature: usize, row: usize) -> usize {
        self.bins[feature][row] as usize
    }
}

/// Cut points between distinct values, thinned to quantiles when there
/// are more distinct values than bins
fn bin_thresholds(values: &[f64], max_bin: usize) -> Vec<f64> {
    let mut distinct: Vec<f64> = values.to_vec();
    distinct.sort_by(|a, b| a.total_cmp(b));
    distinct.dedup();

    if distinct.len() <= 1 {
        return Vec::new();
    }

    let midpoints: Vec<f64> = distinct.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    if midpoints.len() < max_bin {
        return midpoints;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mut cuts: Vec<f64> = (1..max_bin)
        .map(|k| {
            let idx = k * sorted.len() / max_bin;
            let lo = sorted[idx.saturating_sub(1)];
            let hi = sorted[idx.min(sorted.len() - 1)];
            (lo + hi) / 2.0
        })
        .collect();
    cuts.dedup();
    cuts
}

/// Split candidate with gain and tie-breaker
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    bin: usize,
    gain: f64,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn beats(&self, other: &SplitCandidate) -> bool {
        self.gain > other.gain || (self.gain == other.gain && self.tie_breaker < other.tie_breaker)
    }
}

/// A leaf still eligible for splitting
struct OpenLeaf {
    node_idx: usize,
    rows: Vec<usize>,
    depth: usize,
    split: Option<SplitCandidate>,
}

/// Builds one tree from per-row gradients and hessians
pub struct CartBuilder<'a> {
    binned: &'a BinnedFeatures,
    gradients: &'a [f64],
    hessians: &'a [f64],
    config: &'a TreeConfig,
}

impl<'a> CartBuilder<'a> {
    pub fn new(
        binned: &'a BinnedFeatures,
        gradients: &'a [f64],
        hessians: &'a [f64],
        config: &'a TreeConfig,
    ) -> Self {
        debug_assert_eq!(binned.n_rows(), gradients.len());
        debug_assert_eq!(binned.n_rows(), hessians.len());
        Self {
            binned,
            gradients,
            hessians,
            config,
        }
    }

    /// Grow a tree over `rows`, splitting only on `features`
    ///
    /// Leaf outputs are the Newton step `-G / (H + lambda_l2)`; `weight`
    /// becomes the tree's shrinkage.
    pub fn build(&self, rows: &[usize], features: &[usize], weight: f64) -> Tree {
        let mut nodes = vec![Node::leaf(0, 0.0)];
        let mut open = vec![self.open_leaf(0, rows.to_vec(), 0, features)];
        let mut n_leaves = 1;

        while n_leaves < self.config.num_leaves {
            // Best gain first; equal gains fall back to the split tie-breaker
            let pick = open
                .iter()
                .enumerate()
                .filter_map(|(i, leaf)| leaf.split.as_ref().map(|s| (i, s)))
                .fold(None::<(usize, &SplitCandidate)>, |best, (i, s)| match best {
                    Some((_, b)) if !s.beats(b) => best,
                    _ => Some((i, s)),
                })
                .map(|(i, _)| i);

            let Some(i) = pick else {
                break;
            };
            let leaf = open.swap_remove(i);
            let Some(split) = leaf.split else {
                break;
            };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
                .rows
                .iter()
                .partition(|&&r| self.binned.bin(split.feature_idx, r) <= split.bin);

            let left_idx = nodes.len();
            let right_idx = left_idx + 1;
            nodes.push(Node::leaf(left_idx as i32, 0.0));
            nodes.push(Node::leaf(right_idx as i32, 0.0));
            nodes[leaf.node_idx] = Node::internal(
                leaf.node_idx as i32,
                split.feature_idx as i32,
                self.binned.threshold(split.feature_idx, split.bin),
                left_idx as i32,
                right_idx as i32,
            );

            open.push(self.open_leaf(left_idx, left_rows, leaf.depth + 1, features));
            open.push(self.open_leaf(right_idx, right_rows, leaf.depth + 1, features));
            n_leaves += 1;
        }

        for leaf in open {
            let value = self.leaf_value(&leaf.rows);
            nodes[leaf.node_idx] = Node::leaf(leaf.node_idx as i32, value);
        }

        Tree::new(nodes, weight)
    }

    fn open_leaf(
        &self,
        node_idx: usize,
        rows: Vec<usize>,
        depth: usize,
        features: &[usize],
    ) -> OpenLeaf {
        let depth_ok = self.config.max_depth.map_or(true, |d| depth < d);
        let split = if depth_ok && rows.len() >= 2 * self.config.min_data_in_leaf.max(1) {
            self.find_best_split(&rows, features, node_idx)
        } else {
            None
        };
        OpenLeaf {
            node_idx,
            rows,
            depth,
            split,
        }
    }

    /// Histogram scan over every allowed feature
    fn find_best_split(
        &self,
        rows: &[usize],
        features: &[usize],
        node_id: usize,
    ) -> Option<SplitCandidate> {
        let (g_total, h_total) = self.sum_gradients_hessians(rows);
        let parent_score = self.score(g_total, h_total);
        let min_count = self.config.min_data_in_leaf.max(1);
        let mut best: Option<SplitCandidate> = None;

        for &feature_idx in features {
            let n_bins = self.binned.n_bins(feature_idx);
            if n_bins < 2 {
                continue;
            }

            let mut hist_g = vec![0.0; n_bins];
            let mut hist_h = vec![0.0; n_bins];
            let mut hist_n = vec![0usize; n_bins];
            for &r in rows {
                let b = self.binned.bin(feature_idx, r);
                hist_g[b] += self.gradients[r];
                hist_h[b] += self.hessians[r];
                hist_n[b] += 1;
            }

            let (mut g_left, mut h_left, mut n_left) = (0.0, 0.0, 0usize);
            for bin in 0..n_bins - 1 {
                g_left += hist_g[bin];
                h_left += hist_h[bin];
                n_left += hist_n[bin];

                let n_right = rows.len() - n_left;
                if n_left < min_count || n_right < min_count {
                    continue;
                }
                let h_right = h_total - h_left;
                if h_left < self.config.min_sum_hessian_in_leaf
                    || h_right < self.config.min_sum_hessian_in_leaf
                {
                    continue;
                }

                let gain = self.score(g_left, h_left) + self.score(g_total - g_left, h_right)
                    - parent_score;
                if !(gain > self.config.min_gain_to_split) {
                    continue;
                }

                let candidate = SplitCandidate {
                    feature_idx,
                    bin,
                    gain,
                    tie_breaker: SplitTieBreaker::new(feature_idx, bin, node_id),
                };
                if best.as_ref().map_or(true, |b| candidate.beats(b)) {
                    best = Some(candidate);
                }
            }
        }

        best
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.config.lambda_l2)
    }

    /// Sum gradients and hessians for a set of samples
    fn sum_gradients_hessians(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter().fold((0.0, 0.0), |(g, h), &r| {
            (g + self.gradients[r], h + self.hessians[r])
        })
    }

    /// Newton step `-G / (H + lambda)`, 0 for an empty or flat leaf
    fn leaf_value(&self, rows: &[usize]) -> f64 {
        let (g, h) = self.sum_gradients_hessians(rows);
        let denom = h + self.config.lambda_l2;
        if rows.is_empty() || denom <= 0.0 {
            return 0.0;
        }
        -g / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keelson_ai_core::frame::Column;

    fn frame(values: Vec<f64>) -> FeatureFrame {
        FeatureFrame::from_columns(vec![Column::float("x", values)]).unwrap()
    }

    #[test]
    fn test_bins_respect_threshold_rule() {
        let f = frame(vec![1.0, 2.0, 2.0, 5.0]);
        let binned = BinnedFeatures::fit(&f, 64);
        assert_eq!(binned.n_bins(0), 3);
        assert_eq!(binned.threshold(0, 0), 1.5);
        assert_eq!(binned.threshold(0, 1), 3.5);
        // A value lands in bin b exactly when it is <= threshold(b)
        assert_eq!(binned.bin(0, 0), 0);
        assert_eq!(binned.bin(0, 1), 1);
        assert_eq!(binned.bin(0, 3), 2);
    }

    #[test]
    fn test_many_values_are_thinned() {
        let f = frame((0..1000).map(|i| i as f64).collect());
        let binned = BinnedFeatures::fit(&f, 16);
        assert!(binned.n_bins(0) <= 16);
        assert!(binned.n_bins(0) > 2);
    }

    #[test]
    fn test_constant_feature_has_one_bin() {
        let binned = BinnedFeatures::fit(&frame(vec![3.0; 5]), 64);
        assert_eq!(binned.n_bins(0), 1);
    }

    #[test]
    fn test_simple_split() {
        let f = frame(vec![1.0, 2.0, 3.0, 4.0]);
        let binned = BinnedFeatures::fit(&f, 64);
        let gradients = vec![-1.0, -1.0, 1.0, 1.0];
        let hessians = vec![1.0; 4];
        let config = TreeConfig {
            num_leaves: 4,
            min_data_in_leaf: 1,
            ..TreeConfig::default()
        };

        let tree = CartBuilder::new(&binned, &gradients, &hessians, &config)
            .build(&[0, 1, 2, 3], &[0], 1.0);

        assert!(tree.validate(1).is_ok());
        assert_eq!(tree.nodes[0].threshold, 2.5);
        assert_eq!(tree.evaluate(&[1.0]), 1.0);
        assert_eq!(tree.evaluate(&[4.0]), -1.0);
        // Pure leaves have zero gain, so growth stops at two leaves
        assert_eq!(tree.num_leaves(), 2);
    }

    #[test]
    fn test_num_leaves_and_depth_limits() {
        let values: Vec<f64> = (0..64).map(|i| i as f64).collect();
        let gradients: Vec<f64> = (0..64).map(|i| ((i * 7919) % 13) as f64 - 6.0).collect();
        let hessians = vec![1.0; 64];
        let binned = BinnedFeatures::fit(&frame(values), 64);
        let rows: Vec<usize> = (0..64).collect();

        let config = TreeConfig {
            num_leaves: 5,
            min_data_in_leaf: 2,
            ..TreeConfig::default()
        };
        let tree = CartBuilder::new(&binned, &gradients, &hessians, &config)
            .build(&rows, &[0], 0.1);
        assert!(tree.num_leaves() <= 5);
        assert!(tree.validate(1).is_ok());

        let stump = TreeConfig {
            num_leaves: 31,
            max_depth: Some(1),
            min_data_in_leaf: 2,
            ..TreeConfig::default()
        };
        let tree = CartBuilder::new(&binned, &gradients, &hessians, &stump)
            .build(&rows, &[0], 0.1);
        assert!(tree.num_leaves() <= 2);
    }

    #[test]
    fn test_min_data_in_leaf_blocks_split() {
        let binned = BinnedFeatures::fit(&frame(vec![1.0, 2.0, 3.0]), 64);
        let gradients = vec![-1.0, 1.0, 1.0];
        let hessians = vec![1.0; 3];
        let config = TreeConfig {
            min_data_in_leaf: 2,
            ..TreeConfig::default()
        };

        let tree = CartBuilder::new(&binned, &gradients, &hessians, &config)
            .build(&[0, 1, 2], &[0], 1.0);
        assert_eq!(tree.nodes.len(), 1);
        assert!((tree.evaluate(&[1.0]) - (-1.0 / 3.0)).abs() < 1e-12);
    }
}
