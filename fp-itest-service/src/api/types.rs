//! JSON bodies of the signing service API, shared by server and client.

use fp_itest_core::foundation::{BtcPublicKey, ItestError, KeyName};
use serde::{Deserialize, Serialize};

pub const CREATE_KEY_PATH: &str = "/v1/keys";
pub const KEY_RECORD_PATH: &str = "/v1/keys/record";
pub const SIGN_PATH: &str = "/v1/sign";
pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateKeyRequest {
    pub name: KeyName,
    pub passphrase: String,
    #[serde(default)]
    pub hd_path: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateKeyResponse {
    pub public_key: BtcPublicKey,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct KeyRecordRequest {
    pub public_key: BtcPublicKey,
    pub passphrase: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct KeyRecordResponse {
    pub name: KeyName,
    pub public_key: BtcPublicKey,
    /// Hex-encoded 32-byte secret key.
    pub secret_key: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SignRequest {
    pub public_key: BtcPublicKey,
    /// Hex-encoded 32-byte digest.
    pub digest: String,
    pub passphrase: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SignResponse {
    /// Hex-encoded 64-byte BIP-340 signature.
    pub signature: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

const KEY_NOT_FOUND: &str = "key_not_found";
const INVALID_PASSPHRASE: &str = "invalid_passphrase";
const INVALID_REQUEST: &str = "invalid_request";
const INTERNAL: &str = "internal";

impl ErrorBody {
    pub fn from_error(err: &ItestError) -> Self {
        let (code, message) = match err {
            ItestError::KeyNotFound(detail) => (KEY_NOT_FOUND, detail.clone()),
            ItestError::InvalidPassphrase(detail) => (INVALID_PASSPHRASE, detail.clone()),
            ItestError::SigningServiceError(detail) | ItestError::InvalidKey(detail) => (INVALID_REQUEST, detail.clone()),
            ItestError::SerializationError { .. } => (INVALID_REQUEST, err.to_string()),
            other => (INTERNAL, other.to_string()),
        };
        Self { code: code.to_string(), message }
    }

    /// Inverse of [`Self::from_error`] on the client side.
    pub fn into_error(self) -> ItestError {
        match self.code.as_str() {
            KEY_NOT_FOUND => ItestError::KeyNotFound(self.message),
            INVALID_PASSPHRASE => ItestError::InvalidPassphrase(self.message),
            _ => ItestError::SigningServiceError(format!("{}: {}", self.code, self.message)),
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.code != INTERNAL
    }
}
