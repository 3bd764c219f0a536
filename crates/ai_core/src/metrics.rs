//! Ranking metrics for binary classifiers

use crate::errors::{AiCoreError, Result};
use std::cmp::Ordering;

/// Area under the ROC curve via the Mann-Whitney rank statistic
///
/// Tied scores share their average rank, so a constant predictor scores
/// exactly 0.5. Labels must be 0.0 or 1.0 and both classes must appear.
pub fn roc_auc(labels: &[f64], scores: &[f64]) -> Result<f64> {
    if labels.len() != scores.len() {
        return Err(AiCoreError::InvalidMetricInput(format!(
            "{} labels but {} scores",
            labels.len(),
            scores.len()
        )));
    }
    if let Some(bad) = labels.iter().find(|&&y| y != 0.0 && y != 1.0) {
        return Err(AiCoreError::InvalidMetricInput(format!(
            "label {bad} is not binary"
        )));
    }
    if scores.iter().any(|s| s.is_nan()) {
        return Err(AiCoreError::InvalidMetricInput(
            "scores contain NaN".to_string(),
        ));
    }

    let n_pos = labels.iter().filter(|&&y| y == 1.0).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(AiCoreError::InvalidMetricInput(
            "AUC needs both classes present".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(Ordering::Equal));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks are 1-based; the tie group spans ranks i+1..=j+1
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if labels[idx] == 1.0 {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok((rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_perfect_and_inverted() {
        let labels = [0.0, 0.0, 1.0, 1.0];
        assert_eq!(roc_auc(&labels, &[0.1, 0.2, 0.8, 0.9]).unwrap(), 1.0);
        assert_eq!(roc_auc(&labels, &[0.9, 0.8, 0.2, 0.1]).unwrap(), 0.0);
    }

    #[test]
    fn test_constant_scores_give_half() {
        let labels = [0.0, 1.0, 0.0, 1.0, 1.0];
        assert_eq!(roc_auc(&labels, &[0.3; 5]).unwrap(), 0.5);
    }

    #[test]
    fn test_partial_ties() {
        // pos scores: 0.5, 0.9; neg scores: 0.5, 0.1
        // pairs: (0.5 vs 0.5)=0.5, (0.5 vs 0.1)=1, (0.9 vs 0.5)=1, (0.9 vs 0.1)=1
        let auc = roc_auc(&[1.0, 1.0, 0.0, 0.0], &[0.5, 0.9, 0.5, 0.1]).unwrap();
        assert!((auc - 3.5 / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(roc_auc(&[0.0, 1.0], &[0.5]).is_err());
        assert!(roc_auc(&[1.0, 1.0], &[0.1, 0.2]).is_err());
        assert!(roc_auc(&[0.0, 2.0], &[0.1, 0.2]).is_err());
        assert!(roc_auc(&[0.0, 1.0], &[f64::NAN, 0.2]).is_err());
    }

    proptest! {
        #[test]
        fn prop_auc_matches_pair_count(
            data in prop::collection::vec((0u8..2, 0u8..10), 2..60)
        ) {
            let labels: Vec<f64> = data.iter().map(|(y, _)| *y as f64).collect();
            let scores: Vec<f64> = data.iter().map(|(_, s)| *s as f64).collect();
            prop_assume!(labels.contains(&0.0) && labels.contains(&1.0));

            let mut wins = 0.0;
            let mut pairs = 0.0;
            for (i, &yi) in labels.iter().enumerate() {
                for (j, &yj) in labels.iter().enumerate() {
                    if yi == 1.0 && yj == 0.0 {
                        pairs += 1.0;
                        if scores[i] > scores[j] {
                            wins += 1.0;
                        } else if scores[i] == scores[j] {
                            wins += 0.5;
                        }
                    }
                }
            }

            let auc = roc_auc(&labels, &scores).unwrap();
            prop_assert!((auc - wins / pairs).abs() < 1e-9);
            prop_assert!((0.0..=1.0).contains(&auc));
        }
    }
}
