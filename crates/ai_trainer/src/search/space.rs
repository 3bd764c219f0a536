//! Hyperparameter values, domains and search spaces

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A sampled hyperparameter value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
}

impl ParamValue {
    /// Get as float (converts int to float if needed)
    pub fn as_f64(&self) -> f64 {
        match self {
            ParamValue::Float(v) => *v,
            ParamValue::Int(v) => *v as f64,
        }
    }

    /// Get as int; floats must be integral
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            ParamValue::Float(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Range a hyperparameter is drawn from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterDomain {
    /// Continuous range [low, high], optionally log-scaled
    Float { low: f64, high: f64, log: bool },
    /// Integer range [low, high]
    Int { low: i64, high: i64 },
}

impl ParameterDomain {
    /// Sample uniformly (log-uniformly for log domains)
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ParamValue {
        match *self {
            ParameterDomain::Float { low, high, log } => {
                let value = if log {
                    let (lo, hi) = (low.ln(), high.ln());
                    (lo + rng.gen::<f64>() * (hi - lo)).exp()
                } else {
                    low + rng.gen::<f64>() * (high - low)
                };
                ParamValue::Float(value.clamp(low, high))
            }
            ParameterDomain::Int { low, high } => {
                let range = (high - low + 1) as f64;
                let offset = (rng.gen::<f64>() * range).floor() as i64;
                ParamValue::Int((low + offset).min(high))
            }
        }
    }

    pub fn contains(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (ParameterDomain::Float { low, high, .. }, ParamValue::Float(v)) => {
                *v >= *low && *v <= *high
            }
            (ParameterDomain::Int { low, high }, ParamValue::Int(v)) => *v >= *low && *v <= *high,
            _ => false,
        }
    }

    pub fn is_valid(&self) -> bool {
        match *self {
            ParameterDomain::Float { low, high, log } => {
                low.is_finite() && high.is_finite() && low <= high && (!log || low > 0.0)
            }
            ParameterDomain::Int { low, high } => low <= high,
        }
    }
}

/// One concrete assignment of hyperparameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterSet {
    values: BTreeMap<String, ParamValue>,
}

impl HyperparameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.values.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<ParamValue> {
        self.values.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Name/value pairs as strings, ready to log as run params
    pub fn to_string_params(&self) -> Vec<(String, String)> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }
}

/// Ordered set of named parameter domains
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    params: Vec<(String, ParameterDomain)>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, name: impl Into<String>, domain: ParameterDomain) -> Self {
        self.params.push((name.into(), domain));
        self
    }

    pub fn add_float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(name, ParameterDomain::Float { low, high, log: false })
    }

    pub fn add_log_float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(name, ParameterDomain::Float { low, high, log: true })
    }

    pub fn add_int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(name, ParameterDomain::Int { low, high })
    }

    /// The booster search space
    pub fn gbdt_default() -> Self {
        Self::new()
            .add_log_float("learning_rate", 0.01, 0.3)
            .add_int("num_leaves", 20, 150)
            .add_int("max_depth", 3, 10)
            .add_float("feature_fraction", 0.6, 1.0)
            .add_float("bagging_fraction", 0.6, 1.0)
            .add_int("bagging_freq", 1, 5)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, ParameterDomain)> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Draw every parameter independently
    pub fn sample_random<R: Rng>(&self, rng: &mut R) -> HyperparameterSet {
        let mut set = HyperparameterSet::new();
        for (name, domain) in &self.params {
            set.insert(name.clone(), domain.sample(rng));
        }
        set
    }

    pub fn contains(&self, set: &HyperparameterSet) -> bool {
        self.params.iter().all(|(name, domain)| {
            set.get(name)
                .map_or(false, |value| domain.contains(&value))
        })
    }
}
