use crate::domain::ChainAccount;
use crate::foundation::{ItestError, KeyName};
use crate::infrastructure::devnet::chain::account_address;
use crate::infrastructure::rpc::ChainKeyring;
use crate::storage_err;
use log::info;
use secp256k1::{Keypair, Secp256k1};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Directory below a key dir holding the test-backend keyring files.
pub const KEYRING_DIR: &str = "keyring-test";

#[derive(Debug, Deserialize, Serialize)]
struct KeyFile {
    name: KeyName,
    address: String,
    public_key: String,
    secret_key: String,
    passphrase_digest: String,
    hd_path: String,
}

/// File-backed chain-account keyring: one `<key_dir>/keyring-test/<name>.json` per key.
#[derive(Clone, Copy, Debug, Default)]
pub struct DevnetChainKeyring;

impl ChainKeyring for DevnetChainKeyring {
    fn create_chain_key(&self, key_dir: &Path, key_name: &KeyName, passphrase: &str, hd_path: &str) -> Result<ChainAccount, ItestError> {
        let dir = key_dir.join(KEYRING_DIR);
        std::fs::create_dir_all(&dir).map_err(|err| storage_err!("create keyring dir", err))?;
        let path = dir.join(format!("{key_name}.json"));
        if path.exists() {
            return Err(ItestError::InvalidKey(format!("chain key {key_name} already exists in {}", dir.display())));
        }

        let keypair = Keypair::new(&Secp256k1::new(), &mut rand::thread_rng());
        let public_key = keypair.public_key().serialize();
        let address = account_address(&public_key);
        let file = KeyFile {
            name: key_name.clone(),
            address: address.to_string(),
            public_key: hex::encode(public_key),
            secret_key: hex::encode(keypair.secret_bytes()),
            passphrase_digest: blake3::hash(passphrase.as_bytes()).to_hex().to_string(),
            hd_path: hd_path.to_string(),
        };
        std::fs::write(&path, serde_json::to_vec_pretty(&file)?).map_err(|err| storage_err!("write chain key", err))?;
        info!("chain key created name={} address={}", key_name, address);
        Ok(ChainAccount { key_name: key_name.clone(), address })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_key_written_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let name = KeyName::from("fp-key-00aa11bb");
        let account = DevnetChainKeyring.create_chain_key(dir.path(), &name, "testpass", "").expect("create");
        assert!(account.address.starts_with("bbn1"));
        assert!(dir.path().join(KEYRING_DIR).join("fp-key-00aa11bb.json").exists());
        assert!(DevnetChainKeyring.create_chain_key(dir.path(), &name, "testpass", "").is_err());
    }
}
