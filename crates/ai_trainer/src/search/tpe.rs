//! Tree-structured Parzen Estimator
//!
//! After `n_startup` random trials, observed trials are split at the
//! `gamma` quantile into good and bad. Each parameter is then drawn as the
//! best of 24 candidates under `l(x) / g(x)`: a Gaussian KDE for floats,
//! Laplace-smoothed counts for integers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;

use super::space::{HyperparameterSet, ParamValue, ParameterDomain, SearchSpace};

const N_CANDIDATES: usize = 24;

/// Source of hyperparameter suggestions for the search engine
pub trait Optimizer {
    fn suggest(&mut self, space: &SearchSpace) -> HyperparameterSet;

    /// Report a trial outcome; `None` marks a failed trial
    fn observe(&mut self, params: &HyperparameterSet, score: Option<f64>);
}

impl<O: Optimizer + ?Sized> Optimizer for &mut O {
    fn suggest(&mut self, space: &SearchSpace) -> HyperparameterSet {
        (**self).suggest(space)
    }

    fn observe(&mut self, params: &HyperparameterSet, score: Option<f64>) {
        (**self).observe(params, score)
    }
}

/// Whether higher or lower scores are better
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Maximize,
    Minimize,
}

#[derive(Debug, Clone)]
pub struct TpeOptimizer {
    direction: Direction,
    gamma: f64,
    n_startup: usize,
    kde_bandwidth: f64,
    rng: StdRng,
    observed: Vec<(HyperparameterSet, f64)>,
    n_failed: usize,
}

impl TpeOptimizer {
    pub fn new(seed: u64) -> Self {
        Self {
            direction: Direction::Maximize,
            gamma: 0.25,
            n_startup: 10,
            kde_bandwidth: 1.0,
            rng: StdRng::seed_from_u64(seed),
            observed: Vec::new(),
            n_failed: 0,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Set gamma (quantile for splitting)
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma.clamp(0.01, 0.99);
        self
    }

    /// Set number of startup trials
    pub fn with_startup(mut self, n: usize) -> Self {
        self.n_startup = n.max(1);
        self
    }

    /// Completed observations so far
    pub fn n_observed(&self) -> usize {
        self.observed.len()
    }

    pub fn n_failed(&self) -> usize {
        self.n_failed
    }

    fn tpe_sample(&mut self, space: &SearchSpace) -> HyperparameterSet {
        // Best first
        let mut sorted: Vec<&(HyperparameterSet, f64)> = self.observed.iter().collect();
        let direction = self.direction;
        sorted.sort_by(|a, b| {
            let ord = a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal);
            match direction {
                Direction::Maximize => ord.reverse(),
                Direction::Minimize => ord,
            }
        });

        let n_good = ((sorted.len() as f64) * self.gamma).ceil() as usize;
        let n_good = n_good.max(1).min(sorted.len() - 1);
        let (good, bad) = sorted.split_at(n_good);

        let mut set = HyperparameterSet::new();
        for (name, domain) in space.iter() {
            let value = match *domain {
                ParameterDomain::Float { low, high, log } => {
                    let warp = |v: f64| if log { v.max(f64::MIN_POSITIVE).ln() } else { v };
                    let collect = |trials: &[&(HyperparameterSet, f64)]| -> Vec<f64> {
                        trials
                            .iter()
                            .filter_map(|(p, _)| p.get(name))
                            .map(|v| warp(v.as_f64()))
                            .collect()
                    };
                    let good_values = collect(good);
                    let bad_values = collect(bad);
                    let value = sample_ei_continuous(
                        &good_values,
                        &bad_values,
                        warp(low),
                        warp(high),
                        self.kde_bandwidth,
                        &mut self.rng,
                    );
                    let value = if log { value.exp() } else { value };
                    ParamValue::Float(value.clamp(low, high))
                }
                ParameterDomain::Int { low, high } => {
                    let collect = |trials: &[&(HyperparameterSet, f64)]| -> Vec<i64> {
                        trials
                            .iter()
                            .filter_map(|(p, _)| p.get(name)?.as_i64())
                            .collect()
                    };
                    let good_values = collect(good);
                    let bad_values = collect(bad);
                    ParamValue::Int(sample_ei_discrete(
                        &good_values,
                        &bad_values,
                        low,
                        high,
                        &mut self.rng,
                    ))
                }
            };
            set.insert(name.clone(), value);
        }
        set
    }
}

impl Optimizer for TpeOptimizer {
    fn suggest(&mut self, space: &SearchSpace) -> HyperparameterSet {
        if self.observed.len() < self.n_startup.max(2) {
            space.sample_random(&mut self.rng)
        } else {
            self.tpe_sample(space)
        }
    }

    fn observe(&mut self, params: &HyperparameterSet, score: Option<f64>) {
        match score {
            Some(score) if score.is_finite() => self.observed.push((params.clone(), score)),
            _ => self.n_failed += 1,
        }
    }
}

fn kde_score(x: f64, values: &[f64], bandwidth: f64) -> f64 {
    if values.is_empty() {
        return 1.0;
    }
    values
        .iter()
        .map(|&v| (-(x - v).powi(2) / (2.0 * bandwidth.powi(2))).exp())
        .sum::<f64>()
        / values.len() as f64
}

/// Best of the KDE candidates drawn around good values
fn sample_ei_continuous<R: Rng>(
    good: &[f64],
    bad: &[f64],
    low: f64,
    high: f64,
    kde_bandwidth: f64,
    rng: &mut R,
) -> f64 {
    if good.is_empty() || high <= low {
        return low + rng.gen::<f64>() * (high - low);
    }

    let bandwidth = kde_bandwidth * (high - low) / 10.0;
    let mut best_value = low;
    let mut best_ei = f64::NEG_INFINITY;

    for _ in 0..N_CANDIDATES {
        let idx = ((rng.gen::<f64>() * good.len() as f64).floor() as usize).min(good.len() - 1);
        // Box-Muller
        let u1: f64 = rng.gen::<f64>().max(1e-10);
        let u2: f64 = rng.gen::<f64>();
        let noise = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos() * bandwidth;
        let candidate = (good[idx] + noise).clamp(low, high);

        let ei =
            kde_score(candidate, good, bandwidth) / (kde_score(candidate, bad, bandwidth) + 1e-10);
        if ei > best_ei {
            best_ei = ei;
            best_value = candidate;
        }
    }

    best_value
}

/// Draw proportionally to smoothed `l / g` counts
fn sample_ei_discrete<R: Rng>(good: &[i64], bad: &[i64], low: i64, high: i64, rng: &mut R) -> i64 {
    let range = (high - low + 1).max(1) as usize;
    if good.is_empty() {
        let offset = (rng.gen::<f64>() * range as f64).floor() as i64;
        return (low + offset).min(high);
    }

    let mut good_counts = vec![1.0; range];
    let mut bad_counts = vec![1.0; range];
    let in_range = |v: &&i64| **v >= low && **v <= high;
    for &v in good.iter().filter(in_range) {
        good_counts[(v - low) as usize] += 1.0;
    }
    for &v in bad.iter().filter(in_range) {
        bad_counts[(v - low) as usize] += 1.0;
    }

    let weights: Vec<f64> = good_counts
        .iter()
        .zip(&bad_counts)
        .map(|(l, g)| l / g)
        .collect();
    let total: f64 = weights.iter().sum();

    let r: f64 = rng.gen::<f64>() * total;
    let mut cumsum = 0.0;
    for (i, w) in weights.iter().enumerate() {
        cumsum += w;
        if r < cumsum {
            return low + i as i64;
        }
    }
    high
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> SearchSpace {
        SearchSpace::new()
            .add_float("x", -5.0, 5.0)
            .add_int("k", 0, 9)
    }

    /// Peaks at x = 2, k = 7
    fn objective(set: &HyperparameterSet) -> f64 {
        let x = set.get("x").unwrap().as_f64();
        let k = set.get("k").unwrap().as_f64();
        -(x - 2.0).powi(2) - (k - 7.0).powi(2)
    }

    fn run(seed: u64, n: usize) -> Vec<(HyperparameterSet, f64)> {
        let space = space();
        let mut opt = TpeOptimizer::new(seed);
        (0..n)
            .map(|_| {
                let set = opt.suggest(&space);
                let score = objective(&set);
                opt.observe(&set, Some(score));
                (set, score)
            })
            .collect()
    }

    #[test]
    fn test_suggestions_stay_in_space() {
        let space = SearchSpace::gbdt_default();
        let mut opt = TpeOptimizer::new(3).with_startup(3);
        for i in 0..30 {
            let set = opt.suggest(&space);
            assert!(space.contains(&set), "{set:?}");
            opt.observe(&set, Some(i as f64 % 7.0));
        }
    }

    #[test]
    fn test_same_seed_same_study() {
        assert_eq!(run(11, 25), run(11, 25));
        assert_ne!(run(11, 25), run(12, 25));
    }

    #[test]
    fn test_guided_phase_beats_random_phase() {
        let history = run(5, 60);
        let mean =
            |s: &[(HyperparameterSet, f64)]| s.iter().map(|(_, v)| v).sum::<f64>() / s.len() as f64;
        assert!(mean(&history[40..]) > mean(&history[..10]));
    }

    #[test]
    fn test_failed_trials_are_not_modelled() {
        let mut opt = TpeOptimizer::new(1);
        let set = opt.suggest(&space());
        opt.observe(&set, None);
        opt.observe(&set, Some(f64::NAN));
        assert_eq!(opt.n_observed(), 0);
        assert_eq!(opt.n_failed(), 2);
    }

    #[test]
    fn test_discrete_sampler_prefers_good_values() {
        let mut rng = StdRng::seed_from_u64(0);
        let good = vec![3; 20];
        let bad = vec![1; 20];
        let hits = (0..200)
            .filter(|_| sample_ei_discrete(&good, &bad, 0, 4, &mut rng) == 3)
            .count();
        assert!(hits > 100);
    }
}
