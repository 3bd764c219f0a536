//! Keelson AI Service
//!
//! Serves the best registered model over HTTP:
//! - `GET /` health check
//! - `POST /predict` aligns a passenger record to the model's expected
//!   columns and returns a 0/1 prediction

pub mod aligner;
pub mod errors;
pub mod server;
pub mod service;
pub mod types;

pub use aligner::{align, align_frame, AlignError, FeatureRecord};
pub use errors::ServiceError;
pub use server::{create_router, serve};
pub use service::{Prediction, PredictionService, DECISION_THRESHOLD};
pub use types::{ErrorResponse, HealthResponse, PassengerInput, PredictionResponse};

/// AI Service version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
