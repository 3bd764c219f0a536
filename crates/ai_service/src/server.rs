//! HTTP front end for the prediction service

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use keelson_ai_core::Predictor;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::aligner::FeatureRecord;
use crate::errors::ServiceError;
use crate::service::PredictionService;
use crate::types::{ErrorResponse, HealthResponse, PassengerInput, PredictionResponse};

pub const HEALTH_MESSAGE: &str = "Titanic ML Inference API is up!";

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = if err.is_client_error() {
            warn!("Rejected prediction request: {}", err);
            StatusCode::BAD_REQUEST
        } else {
            error!("Prediction failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!("Rejected request body: {}", rejection.body_text());
        Self {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let payload = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, payload).into_response()
    }
}

pub fn create_router<M>(service: Arc<PredictionService<M>>) -> Router
where
    M: Predictor + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(handle_health))
        .route("/predict", post(handle_predict::<M>))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve until ctrl-c
pub async fn serve<M>(service: Arc<PredictionService<M>>, addr: SocketAddr) -> Result<()>
where
    M: Predictor + Send + Sync + 'static,
{
    let app = create_router(service);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind listener on {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("prediction server terminated unexpectedly")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn handle_health() -> Json<HealthResponse> {
    info!("Health check called");
    Json(HealthResponse {
        msg: HEALTH_MESSAGE.to_string(),
    })
}

async fn handle_predict<M>(
    State(service): State<Arc<PredictionService<M>>>,
    input: Result<Json<PassengerInput>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError>
where
    M: Predictor + Send + Sync + 'static,
{
    let Json(input) = input?;
    info!("Received input: {:?}", input);
    let record = FeatureRecord::from_serialize(&input).map_err(ServiceError::from)?;
    let prediction = service.predict(&record)?;
    Ok(Json(PredictionResponse {
        prediction: prediction.label,
    }))
}
