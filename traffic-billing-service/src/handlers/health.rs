use axum::{response::IntoResponse, Json};
use serde_json::json;
use service_core::observability::get_metrics;

pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "traffic-billing-service",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}
