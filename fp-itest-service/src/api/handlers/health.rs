use axum::response::IntoResponse;
use axum::Json;
use log::trace;

pub async fn handle_health() -> impl IntoResponse {
    trace!("health check: ok");
    Json(serde_json::json!({
        "status": "healthy",
    }))
}
