//! Hyperparameter search
//!
//! A [`SearchEngine`] asks an [`Optimizer`] for parameter sets, fits one
//! model per trial inside a nested tracked run and records every outcome
//! in a [`Study`].

mod engine;
mod space;
mod study;
mod tpe;

pub use engine::{SearchEngine, VAL_AUC};
pub use space::{HyperparameterSet, ParamValue, ParameterDomain, SearchSpace};
pub use study::{Study, TrialResult, TrialState};
pub use tpe::{Direction, Optimizer, TpeOptimizer};
