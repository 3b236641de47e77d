use super::super::state::InstanceState;
use crate::metrics::SignerMetrics;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use fp_itest_core::foundation::ItestError;
use log::debug;
use std::sync::Arc;

fn text_response(encoded: Result<String, ItestError>) -> Response {
    match encoded {
        Ok(body) => {
            let mut response = body.into_response();
            response.headers_mut().insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"));
            response
        }
        Err(err) => {
            debug!("metrics encode failed error={}", err);
            let mut response = format!("metrics_error: {}", err).into_response();
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

pub async fn handle_signer_metrics(State(metrics): State<Arc<SignerMetrics>>) -> Response {
    text_response(metrics.encode())
}

pub async fn handle_instance_metrics(State(state): State<Arc<InstanceState>>) -> Response {
    state.metrics.observe(state.instance.as_ref());
    text_response(state.metrics.encode())
}
