//! Handler tests driven through the router with `oneshot`

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use keelson_ai_core::frame::{Column, FeatureFrame};
use keelson_ai_core::gbdt::{BoosterModel, Node, Tree};
use keelson_ai_registry::{ExperimentTracker, RegistryStorage, SchemaSource};
use keelson_ai_service::{
    create_router, ErrorResponse, HealthResponse, PredictionResponse, PredictionService,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower::ServiceExt;

/// First-class passengers survive, everyone else does not
fn model() -> BoosterModel {
    let tree = Tree::new(
        vec![
            Node::internal(0, 0, 1.5, 1, 2),
            Node::leaf(1, 3.0),
            Node::leaf(2, -3.0),
        ],
        1.0,
    );
    BoosterModel::new(vec!["Pclass".into(), "Age".into()], vec![tree], 0.0)
}

fn tracker_with_model(reference: bool) -> ExperimentTracker {
    let tracker =
        ExperimentTracker::new(Arc::new(RegistryStorage::new(None).unwrap()), "titanic").unwrap();
    register_model(&tracker, reference);
    tracker
}

fn register_model(tracker: &ExperimentTracker, reference: bool) {
    let run = tracker.start_run("data_v1.1").unwrap();
    run.log_metric("val_auc", 0.83).unwrap();
    let frame = FeatureFrame::from_columns(vec![
        Column::integer("Pclass", vec![1.0, 3.0]),
        Column::float("Age", vec![38.0, 22.0]),
    ])
    .unwrap();
    run.log_model(&model(), "model", reference.then_some(&frame))
        .unwrap();
    tracker
        .register_model(run.run_id(), "model", "titanic-gbdt")
        .unwrap();
    run.end().unwrap();
}

fn router() -> Router {
    let tracker = tracker_with_model(true);
    let service =
        PredictionService::<BoosterModel>::from_registry(&tracker, "titanic-gbdt").unwrap();
    assert_eq!(service.schema_source(), SchemaSource::Signature);
    create_router(Arc::new(service))
}

fn predict_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json<T: DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = router()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: HealthResponse = read_json(response).await;
    assert_eq!(body.msg, "Titanic ML Inference API is up!");
}

#[tokio::test]
async fn test_predict_partial_input() {
    let app = router();

    let response = app
        .clone()
        .oneshot(predict_request(r#"{"Pclass": 1, "Sex": 1}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: PredictionResponse = read_json(response).await;
    assert_eq!(body.prediction, 1);

    let response = app
        .oneshot(predict_request(r#"{"Pclass": 3, "Age": 22.0, "Fare": null}"#))
        .await
        .unwrap();
    let body: PredictionResponse = read_json(response).await;
    assert_eq!(body.prediction, 0);
}

#[tokio::test]
async fn test_no_matching_columns_is_bad_request() {
    let response = router()
        .oneshot(predict_request(r#"{"FamilySize": 4}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = read_json(response).await;
    assert!(body.error.contains("Pclass"), "{}", body.error);
}

#[tokio::test]
async fn test_fallback_columns_mismatch_is_server_error() {
    // No signature: the fallback columns do not match the model's features
    let tracker = tracker_with_model(false);
    let service =
        PredictionService::<BoosterModel>::from_registry(&tracker, "titanic-gbdt").unwrap();
    assert_eq!(service.schema_source(), SchemaSource::Fallback);
    assert_eq!(service.expected_columns().len(), 8);

    let response = create_router(Arc::new(service))
        .oneshot(predict_request(r#"{"Pclass": 1}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorResponse = read_json(response).await;
    assert!(!body.error.is_empty());
}

#[tokio::test]
async fn test_empty_registry_fails_at_startup() {
    let tracker =
        ExperimentTracker::new(Arc::new(RegistryStorage::new(None).unwrap()), "titanic").unwrap();
    assert!(PredictionService::<BoosterModel>::from_registry(&tracker, "titanic-gbdt").is_err());
}

#[tokio::test]
async fn test_undecodable_body_is_json_bad_request() {
    let app = router();

    for body in [r#"{"Pclass": "first"}"#, r#"{"Pclass": 1"#, "not json"] {
        let response = app.clone().oneshot(predict_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json",
            "{body}"
        );
        let error: ErrorResponse = read_json(response).await;
        assert!(!error.error.is_empty());
    }

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/predict")
                .body(Body::from(r#"{"Pclass": 1}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = read_json(response).await;
    assert!(error.error.contains("Content-Type"), "{}", error.error);
}

#[test]
fn test_open_releases_persistent_registry() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let uri = dir.path().join("mlruns");
    let uri = uri.to_str().unwrap();

    register_model(&ExperimentTracker::open(Some(uri), "titanic")?, true);

    let service = PredictionService::<BoosterModel>::open(Some(uri), "titanic", "titanic-gbdt")?;
    assert_eq!(service.model_version(), 1);

    // A trainer can attach and register while the service is alive
    let tracker = ExperimentTracker::open(Some(uri), "titanic")?;
    register_model(&tracker, true);
    assert_eq!(tracker.search_model_versions("titanic-gbdt")?.len(), 2);
    assert_eq!(service.expected_columns(), ["Pclass", "Age"]);
    Ok(())
}
