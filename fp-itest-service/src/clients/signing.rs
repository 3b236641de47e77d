//! HTTP client of the signing service.

use crate::api::types::{
    CreateKeyRequest, CreateKeyResponse, ErrorBody, KeyRecordRequest, KeyRecordResponse, SignRequest, SignResponse, CREATE_KEY_PATH,
    HEALTH_PATH, KEY_RECORD_PATH, SIGN_PATH,
};
use async_trait::async_trait;
use fp_itest_core::domain::KeyRecord;
use fp_itest_core::foundation::util::encoding::{decode_hex, parse_hex_32bytes};
use fp_itest_core::foundation::{BtcPublicKey, ItestError, KeyName};
use fp_itest_core::infrastructure::rpc::SigningClient;
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpSigningClient {
    client: Client,
    base_url: String,
}

impl HttpSigningClient {
    /// Builds a client and checks that the service answers its health endpoint.
    pub async fn connect(addr: SocketAddr) -> Result<Self, ItestError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| ItestError::SigningServiceError(format!("http client: {err}")))?;
        let out = Self { client, base_url: format!("http://{addr}") };
        out.health().await?;
        debug!("signing client connected addr={}", addr);
        Ok(out)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<(), ItestError> {
        let url = format!("{}{}", self.base_url, HEALTH_PATH);
        let response = self.client.get(&url).send().await.map_err(|err| ItestError::SigningServiceError(format!("{url}: {err}")))?;
        if !response.status().is_success() {
            return Err(ItestError::SigningServiceError(format!("{url}: status {}", response.status())));
        }
        Ok(())
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(&self, path: &str, body: &Req) -> Result<Resp, ItestError> {
        let url = format!("{}{}", self.base_url, path);
        let response =
            self.client.post(&url).json(body).send().await.map_err(|err| ItestError::SigningServiceError(format!("{url}: {err}")))?;
        let status = response.status();
        if status.is_success() {
            return response.json::<Resp>().await.map_err(|err| ItestError::SerializationError {
                format: "json".to_string(),
                details: format!("{url}: {err}"),
            });
        }
        match response.json::<ErrorBody>().await {
            Ok(body) => Err(body.into_error()),
            Err(_) => Err(ItestError::SigningServiceError(format!("{url}: status {status}"))),
        }
    }
}

#[async_trait]
impl SigningClient for HttpSigningClient {
    async fn create_key(&self, name: &KeyName, passphrase: &str, hd_path: &str) -> Result<BtcPublicKey, ItestError> {
        let request = CreateKeyRequest { name: name.clone(), passphrase: passphrase.to_string(), hd_path: hd_path.to_string() };
        let response: CreateKeyResponse = self.post(CREATE_KEY_PATH, &request).await?;
        Ok(response.public_key)
    }

    async fn key_record(&self, public_key: &BtcPublicKey, passphrase: &str) -> Result<KeyRecord, ItestError> {
        let request = KeyRecordRequest { public_key: *public_key, passphrase: passphrase.to_string() };
        let response: KeyRecordResponse = self.post(KEY_RECORD_PATH, &request).await?;
        let secret = parse_hex_32bytes(&response.secret_key)?;
        let secret_key = secp256k1::SecretKey::from_slice(&secret).map_err(|err| ItestError::InvalidKey(err.to_string()))?;
        Ok(KeyRecord { name: response.name, public_key: response.public_key, secret_key })
    }

    async fn sign(&self, public_key: &BtcPublicKey, digest: &[u8; 32], passphrase: &str) -> Result<Vec<u8>, ItestError> {
        let request = SignRequest { public_key: *public_key, digest: hex::encode(digest), passphrase: passphrase.to_string() };
        let response: SignResponse = self.post(SIGN_PATH, &request).await?;
        decode_hex(&response.signature)
    }
}
