use crate::foundation::{ItestError, FP_STATE_FILE_NAME};
use crate::infrastructure::storage::{FpState, FpStateStore};
use crate::storage_err;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// `fp-state.json` inside an instance home directory. Writes go through a temp file and a rename.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn in_home(home_dir: &Path) -> Self {
        Self::new(home_dir.join(FP_STATE_FILE_NAME))
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FpStateStore for JsonFileStore {
    fn load(&self) -> Result<Option<FpState>, ItestError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(storage_err!("read fp state", err)),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn save(&self, state: &FpState) -> Result<(), ItestError> {
        let _guard = self.write_lock.lock();
        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(state)?;
        std::fs::write(&tmp, bytes).map_err(|err| storage_err!("write fp state", err))?;
        std::fs::rename(&tmp, &self.path).map_err(|err| storage_err!("rename fp state", err))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::BtcPublicKey;

    #[test]
    fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(JsonFileStore::in_home(dir.path()).load().expect("load"), None);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = FpState { btc_pk: BtcPublicKey::new([3u8; 32]), registered_at: 4, last_voted_height: 0 };
        let store = JsonFileStore::in_home(dir.path());
        store.save(&state).expect("save");
        store.record_vote(9).expect("vote");
        store.record_vote(7).expect("stale vote");

        let reopened = JsonFileStore::in_home(dir.path());
        let loaded = reopened.load().expect("load").expect("state");
        assert_eq!(loaded.last_voted_height, 9);
        assert_eq!(loaded.registered_at, 4);
        assert!(dir.path().join("fp-state.json").exists());
        assert!(!dir.path().join("fp-state.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("fp-state.json"), b"{not json").expect("write");
        assert!(JsonFileStore::in_home(dir.path()).load().is_err());
    }

    #[test]
    fn test_record_vote_requires_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = JsonFileStore::in_home(dir.path()).record_vote(1).unwrap_err();
        assert!(matches!(err, ItestError::StorageError { .. }));
    }
}
