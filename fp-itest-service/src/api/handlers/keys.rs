use super::super::state::SignerState;
use super::super::types::{
    CreateKeyRequest, CreateKeyResponse, ErrorBody, KeyRecordRequest, KeyRecordResponse, SignRequest, SignResponse,
};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fp_itest_core::foundation::util::encoding::parse_hex_32bytes;
use fp_itest_core::foundation::{ErrorCode, ItestError};
use log::{debug, warn};
use std::sync::Arc;

fn error_response(op: &str, err: ItestError) -> Response {
    let status = match err.code() {
        ErrorCode::KeyNotFound => StatusCode::NOT_FOUND,
        ErrorCode::InvalidPassphrase => StatusCode::UNAUTHORIZED,
        ErrorCode::SigningServiceError | ErrorCode::InvalidKey | ErrorCode::SerializationError => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!("signer request failed op={} status={} error={}", op, status.as_u16(), err);
    } else {
        debug!("signer request rejected op={} status={} error={}", op, status.as_u16(), err);
    }
    (status, Json(ErrorBody::from_error(&err))).into_response()
}

fn respond<T: serde::Serialize>(state: &SignerState, op: &str, result: Result<T, ItestError>) -> Response {
    match result {
        Ok(body) => {
            state.metrics.record(op, true);
            Json(body).into_response()
        }
        Err(err) => {
            state.metrics.record(op, false);
            error_response(op, err)
        }
    }
}

pub async fn handle_create_key(State(state): State<Arc<SignerState>>, Json(request): Json<CreateKeyRequest>) -> Response {
    let result = state
        .keyring
        .create_key(&request.name, &request.passphrase, &request.hd_path)
        .map(|public_key| CreateKeyResponse { public_key });
    respond(&state, "create_key", result)
}

pub async fn handle_key_record(State(state): State<Arc<SignerState>>, Json(request): Json<KeyRecordRequest>) -> Response {
    let result = state.keyring.key_record(&request.public_key, &request.passphrase).map(|record| KeyRecordResponse {
        name: record.name,
        public_key: record.public_key,
        secret_key: hex::encode(record.secret_key.secret_bytes()),
    });
    respond(&state, "key_record", result)
}

pub async fn handle_sign(State(state): State<Arc<SignerState>>, Json(request): Json<SignRequest>) -> Response {
    let result = parse_hex_32bytes(&request.digest)
        .map_err(|err| ItestError::SigningServiceError(format!("invalid digest: {err}")))
        .and_then(|digest| state.keyring.sign(&request.public_key, &digest, &request.passphrase))
        .map(|signature| SignResponse { signature: hex::encode(signature) });
    respond(&state, "sign", result)
}
