//! Persistence of a finality provider's local state (what it registered, what it last voted).

mod json;

pub use json::JsonFileStore;

use crate::foundation::{BtcPublicKey, Height, ItestError};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct FpState {
    pub btc_pk: BtcPublicKey,
    /// First height the provider may vote for.
    pub registered_at: Height,
    #[serde(default)]
    pub last_voted_height: Height,
}

pub trait FpStateStore: Send + Sync {
    fn load(&self) -> Result<Option<FpState>, ItestError>;
    fn save(&self, state: &FpState) -> Result<(), ItestError>;

    /// Records a vote; heights never move backwards.
    fn record_vote(&self, height: Height) -> Result<(), ItestError> {
        let Some(mut state) = self.load()? else {
            return Err(ItestError::StorageError { operation: "record_vote".to_string(), details: "no provider state".to_string() });
        };
        if height > state.last_voted_height {
            state.last_voted_height = height;
            self.save(&state)?;
        }
        Ok(())
    }
}
