use crate::domain::KeyRecord;
use crate::foundation::{BtcPublicKey, ItestError, KeyName};
use crate::infrastructure::rpc::SigningClient;
use async_trait::async_trait;
use log::{debug, info};
use parking_lot::Mutex;
use secp256k1::{Keypair, Message, Secp256k1};
use std::collections::HashMap;

struct StoredKey {
    name: KeyName,
    keypair: Keypair,
    passphrase_digest: [u8; 32],
}

#[derive(Default)]
struct KeyringState {
    keys: HashMap<BtcPublicKey, StoredKey>,
    names: HashMap<KeyName, BtcPublicKey>,
}

/// In-memory keyring behind the devnet signing service.
///
/// Keys are addressed by their x-only public key; every use requires the passphrase they were
/// created with (only a blake3 digest of it is kept).
#[derive(Default)]
pub struct DevnetKeyring {
    state: Mutex<KeyringState>,
}

fn passphrase_digest(passphrase: &str) -> [u8; 32] {
    *blake3::hash(passphrase.as_bytes()).as_bytes()
}

impl DevnetKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn create_key(&self, name: &KeyName, passphrase: &str, hd_path: &str) -> Result<BtcPublicKey, ItestError> {
        if name.trim().is_empty() {
            return Err(ItestError::SigningServiceError("key name must not be empty".to_string()));
        }
        let mut state = self.state.lock();
        if state.names.contains_key(name) {
            return Err(ItestError::SigningServiceError(format!("key {name} already exists")));
        }
        let keypair = Keypair::new(&Secp256k1::new(), &mut rand::thread_rng());
        let public_key = BtcPublicKey::from(keypair.x_only_public_key().0);
        state.names.insert(name.clone(), public_key);
        state.keys.insert(public_key, StoredKey { name: name.clone(), keypair, passphrase_digest: passphrase_digest(passphrase) });
        info!("signing key created name={} public_key={} hd_path={:?}", name, public_key, hd_path);
        Ok(public_key)
    }

    fn with_key<T>(
        &self,
        public_key: &BtcPublicKey,
        passphrase: &str,
        op: impl FnOnce(&StoredKey) -> Result<T, ItestError>,
    ) -> Result<T, ItestError> {
        let state = self.state.lock();
        let key = state.keys.get(public_key).ok_or_else(|| ItestError::KeyNotFound(public_key.to_hex()))?;
        if key.passphrase_digest != passphrase_digest(passphrase) {
            return Err(ItestError::InvalidPassphrase(key.name.to_string()));
        }
        op(key)
    }

    pub fn key_record(&self, public_key: &BtcPublicKey, passphrase: &str) -> Result<KeyRecord, ItestError> {
        self.with_key(public_key, passphrase, |key| {
            Ok(KeyRecord { name: key.name.clone(), public_key: *public_key, secret_key: key.keypair.secret_key() })
        })
    }

    pub fn sign(&self, public_key: &BtcPublicKey, digest: &[u8; 32], passphrase: &str) -> Result<Vec<u8>, ItestError> {
        self.with_key(public_key, passphrase, |key| {
            let signature = Secp256k1::new().sign_schnorr_no_aux_rand(&Message::from_digest(*digest), &key.keypair);
            let signature: &[u8; 64] = signature.as_ref();
            debug!("digest signed key={} digest={}", key.name, hex::encode(digest));
            Ok(signature.to_vec())
        })
    }
}

#[async_trait]
impl SigningClient for DevnetKeyring {
    async fn create_key(&self, name: &KeyName, passphrase: &str, hd_path: &str) -> Result<BtcPublicKey, ItestError> {
        DevnetKeyring::create_key(self, name, passphrase, hd_path)
    }

    async fn key_record(&self, public_key: &BtcPublicKey, passphrase: &str) -> Result<KeyRecord, ItestError> {
        DevnetKeyring::key_record(self, public_key, passphrase)
    }

    async fn sign(&self, public_key: &BtcPublicKey, digest: &[u8; 32], passphrase: &str) -> Result<Vec<u8>, ItestError> {
        DevnetKeyring::sign(self, public_key, digest, passphrase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::verify_schnorr;

    #[test]
    fn test_create_sign_and_verify() {
        let keyring = DevnetKeyring::new();
        let pk = keyring.create_key(&KeyName::from("eots-key-1"), "testpass", "").expect("create");
        let digest = [9u8; 32];
        let signature = keyring.sign(&pk, &digest, "testpass").expect("sign");
        assert_eq!(signature.len(), 64);
        verify_schnorr(&pk, &digest, &signature).expect("verifies");

        let record = keyring.key_record(&pk, "testpass").expect("record");
        assert_eq!(record.name.as_str(), "eots-key-1");
        let secp = Secp256k1::new();
        assert_eq!(BtcPublicKey::from(record.secret_key.x_only_public_key(&secp).0), pk);
    }

    #[test]
    fn test_wrong_passphrase_rejected() {
        let keyring = DevnetKeyring::new();
        let pk = keyring.create_key(&KeyName::from("k"), "testpass", "").expect("create");
        assert!(matches!(keyring.sign(&pk, &[0u8; 32], "nope"), Err(ItestError::InvalidPassphrase(name)) if name == "k"));
        assert!(matches!(keyring.key_record(&pk, ""), Err(ItestError::InvalidPassphrase(_))));
    }

    #[test]
    fn test_duplicate_and_unknown_keys() {
        let keyring = DevnetKeyring::new();
        keyring.create_key(&KeyName::from("dup"), "a", "").expect("create");
        assert!(matches!(keyring.create_key(&KeyName::from("dup"), "b", ""), Err(ItestError::SigningServiceError(_))));
        assert_eq!(keyring.len(), 1);
        let unknown = BtcPublicKey::new([1u8; 32]);
        assert!(matches!(keyring.key_record(&unknown, "a"), Err(ItestError::KeyNotFound(_))));
    }
}
