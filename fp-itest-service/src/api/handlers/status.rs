use super::super::state::InstanceState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

pub async fn handle_status(State(state): State<Arc<InstanceState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "btc_pk": state.instance.btc_pk().to_hex(),
        "running": state.instance.is_running(),
        "last_voted_height": state.instance.last_voted_height(),
    }))
}
