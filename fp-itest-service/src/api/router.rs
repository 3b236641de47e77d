use super::handlers::health::handle_health;
use super::handlers::keys::{handle_create_key, handle_key_record, handle_sign};
use super::handlers::metrics::{handle_instance_metrics, handle_signer_metrics};
use super::handlers::status::handle_status;
use super::middleware::logging::logging_middleware;
use super::state::{InstanceState, SignerState};
use super::types::{CREATE_KEY_PATH, HEALTH_PATH, KEY_RECORD_PATH, SIGN_PATH};
use crate::metrics::SignerMetrics;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn build_signer_router(state: Arc<SignerState>) -> Router {
    Router::new()
        .route(CREATE_KEY_PATH, post(handle_create_key))
        .route(KEY_RECORD_PATH, post(handle_key_record))
        .route(SIGN_PATH, post(handle_sign))
        .route(HEALTH_PATH, get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(logging_middleware))
        .with_state(state)
}

pub fn build_signer_metrics_router(metrics: Arc<SignerMetrics>) -> Router {
    Router::new().route("/metrics", get(handle_signer_metrics)).with_state(metrics)
}

pub fn build_instance_router(state: Arc<InstanceState>) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(handle_health))
        .route("/status", get(handle_status))
        .layer(axum::middleware::from_fn(logging_middleware))
        .with_state(state)
}

pub fn build_instance_metrics_router(state: Arc<InstanceState>) -> Router {
    Router::new().route("/metrics", get(handle_instance_metrics)).with_state(state)
}
