use crate::foundation::{
    AccountAddress, BlockHash, BtcPublicKey, ChainId, Height, ItestError, KeyName, MAX_COMMISSION_BPS, TEST_MONIKER,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct BlockInfo {
    pub height: Height,
    pub hash: BlockHash,
    pub finalized: bool,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct Description {
    pub moniker: String,
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub security_contact: String,
    #[serde(default)]
    pub details: String,
}

impl Description {
    pub fn new(moniker: impl Into<String>) -> Self {
        Self { moniker: moniker.into(), ..Default::default() }
    }

    pub fn test_default() -> Self {
        Self::new(TEST_MONIKER)
    }
}

/// Commission rate in basis points.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CommissionRate(u32);

impl CommissionRate {
    pub const ZERO: CommissionRate = CommissionRate(0);

    pub fn from_bps(bps: u32) -> Result<Self, ItestError> {
        if bps > MAX_COMMISSION_BPS {
            return Err(ItestError::Message(format!("commission {bps}bps exceeds {MAX_COMMISSION_BPS}bps")));
        }
        Ok(Self(bps))
    }

    pub fn bps(&self) -> u32 {
        self.0
    }
}

/// A finality provider as registered on the consensus chain.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct FinalityProviderRecord {
    pub btc_pk: BtcPublicKey,
    pub address: AccountAddress,
    pub chain_id: ChainId,
    pub description: Description,
    pub commission: CommissionRate,
    /// Chain height at which the registration was included.
    pub registered_at: Height,
}

/// Key material returned by the signing service.
#[derive(Clone)]
pub struct KeyRecord {
    pub name: KeyName,
    pub public_key: BtcPublicKey,
    pub secret_key: secp256k1::SecretKey,
}

impl std::fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRecord").field("name", &self.name).field("public_key", &self.public_key).finish_non_exhaustive()
    }
}

/// Externally reachable endpoints of a running consensus node.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct NodeEndpoints {
    pub rpc_addr: String,
    pub grpc_addr: String,
}

/// A chain account owned by one finality provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChainAccount {
    pub key_name: KeyName,
    pub address: AccountAddress,
}
