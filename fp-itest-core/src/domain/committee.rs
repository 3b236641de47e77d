use crate::foundation::{BtcPublicKey, ItestError};
use secp256k1::{Keypair, Secp256k1, SecretKey};

/// Auxiliary signers that authorize the consensus node's genesis configuration.
pub struct CovenantCommittee {
    pub quorum: usize,
    members: Vec<Keypair>,
}

impl CovenantCommittee {
    pub fn generate(size: usize, quorum: usize) -> Result<Self, ItestError> {
        if size == 0 {
            return Err(ItestError::ConfigError("covenant committee must not be empty".to_string()));
        }
        if quorum == 0 || quorum > size {
            return Err(ItestError::ConfigError(format!("covenant quorum {quorum} out of range 1..={size}")));
        }
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        let members = (0..size).map(|_| Keypair::new(&secp, &mut rng)).collect();
        Ok(Self { quorum, members })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn public_keys(&self) -> Vec<BtcPublicKey> {
        self.members.iter().map(|keypair| BtcPublicKey::from(keypair.x_only_public_key().0)).collect()
    }

    pub fn secret_keys(&self) -> Vec<SecretKey> {
        self.members.iter().map(|keypair| keypair.secret_key()).collect()
    }
}

impl std::fmt::Debug for CovenantCommittee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CovenantCommittee").field("quorum", &self.quorum).field("size", &self.members.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_committee() {
        let committee = CovenantCommittee::generate(3, 2).expect("committee");
        assert_eq!(committee.len(), 3);
        assert_eq!(committee.quorum, 2);
        let pks = committee.public_keys();
        assert_eq!(pks.len(), 3);
        assert_ne!(pks[0], pks[1]);
        assert_eq!(committee.secret_keys().len(), 3);
    }

    #[test]
    fn test_invalid_quorum_rejected() {
        assert!(CovenantCommittee::generate(3, 0).is_err());
        assert!(CovenantCommittee::generate(3, 4).is_err());
        assert!(CovenantCommittee::generate(0, 0).is_err());
    }
}
