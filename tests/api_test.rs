/// HTTP API tests driven through the router with `tower::ServiceExt::oneshot`

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use common::{parse_prometheus_output, trained_service, untrained_service};
use infra_early_warning::{
    api::{build_router, AppState},
    metrics::init_metrics,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn trained_app() -> Router {
    build_router(AppState::new(Arc::new(trained_service())))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoints() {
    let (status, body) = send(trained_app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(trained_app(), get("/health/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_not_ready_before_training() {
    let app = build_router(AppState::new(Arc::new(untrained_service())));
    let (status, body) = send(app, get("/health/ready")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["missing"], json!(["bridge", "water"]));
}

#[tokio::test]
async fn test_predict_bridge() {
    let (status, body) = send(
        trained_app(),
        post_json(
            "/v1/predict/bridge",
            json!({
                "age": 50,
                "traffic": 2000,
                "material": "Concrete",
                "maintenance": "Annual"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["asset"], "bridge");
    let probability = body["probability"].as_f64().unwrap();
    let label = body["label"].as_u64().unwrap();
    assert!((0.0..=1.0).contains(&probability));
    assert_eq!(label == 1, probability >= 0.5);
    assert!(body["risk_level"].is_string());
}

#[tokio::test]
async fn test_predict_water_with_dataset_headers() {
    let (status, body) = send(
        trained_app(),
        post_json(
            "/v1/predict/water",
            json!({
                "Pressure (bar)": 8,
                "Flow Rate (L/s)": 80,
                "Temperature (°C)": 25,
                "Burst Status": 1
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["asset"], "water");
}

#[tokio::test]
async fn test_prediction_error_statuses() {
    let (status, body) = send(
        trained_app(),
        post_json(
            "/v1/predict/bridge",
            json!({"age": 50, "traffic": 2000, "material": "Wood", "maintenance": "Annual"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "UNKNOWN_CATEGORY");

    let (status, body) = send(
        trained_app(),
        post_json(
            "/v1/predict/bridge",
            json!({"age": 50, "material": "Concrete", "maintenance": "Annual"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_FIELD");

    let (status, body) = send(
        trained_app(),
        post_json("/v1/predict/tunnel", json!({"age": 50})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, body) = send(
        trained_app(),
        post_json("/v1/predict/water", json!([1, 2, 3])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let repeated = Request::builder()
        .method("POST")
        .uri("/v1/predict/bridge")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"age":50,"age":99,"traffic":2000,"material":"Concrete","maintenance":"Annual"}"#,
        ))
        .unwrap();
    let (status, body) = send(trained_app(), repeated).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = send(
        trained_app(),
        post_json(
            "/v1/predict/bridge",
            json!({"age": 50, "traffic": 2000, "material": "", "maintenance": "Annual"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_FIELD");
}

#[tokio::test]
async fn test_predict_without_model_is_unavailable() {
    let app = build_router(AppState::new(Arc::new(untrained_service())));
    let (status, body) = send(
        app,
        post_json(
            "/v1/predict/water",
            json!({"pressure": 8, "flow": 80, "temperature": 25, "burst": 1}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "MODEL_UNAVAILABLE");
}

#[tokio::test]
async fn test_model_endpoints() {
    let (status, body) = send(trained_app(), get("/v1/models")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["models"].as_array().unwrap().len(), 2);
    assert_eq!(body["decision_threshold"], 0.5);

    let (status, body) = send(trained_app(), get("/v1/models/bridge")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["feature_schema"]["columns"],
        json!(["age", "traffic", "material", "maintenance"])
    );
    assert_eq!(
        body["encoding_map"]["vocabularies"]["maintenance"]["entries"],
        json!([["No-Maintenance", 0], ["Bi-Annual", 1], ["Annual", 2]])
    );
}

#[tokio::test]
async fn test_retrain_replaces_model() {
    let service = Arc::new(trained_service());
    let before = service.model(infra_early_warning::models::AssetKind::Bridge).unwrap().id();
    let app = build_router(AppState::new(service.clone()));

    let (status, body) = send(
        app,
        Request::builder()
            .method("POST")
            .uri("/v1/models/bridge/retrain")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["asset"], "bridge");
    assert_ne!(body["model_id"], json!(before.to_string()));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    init_metrics().unwrap();
    let service = Arc::new(trained_service());
    let app = build_router(AppState::new(service));

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let metrics = parse_prometheus_output(&text);
    assert!(metrics.contains_key("infra_early_warning_model_generation_total"));
    assert!(metrics.contains_key("infra_early_warning_training_rows"));
}
