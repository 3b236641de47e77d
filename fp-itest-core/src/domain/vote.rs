use crate::foundation::{AccountAddress, BlockHash, BtcPublicKey, ChainId, Height, ItestError, POP_DIGEST_DOMAIN, VOTE_DIGEST_DOMAIN};
use secp256k1::schnorr::Signature;
use secp256k1::{Message, Secp256k1};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct Vote {
    pub height: Height,
    pub voter: BtcPublicKey,
    pub signature: Vec<u8>,
}

/// Digest a finality provider signs to vote for `block_hash` at `height`.
pub fn vote_digest(chain_id: &ChainId, height: Height, block_hash: &BlockHash) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(VOTE_DIGEST_DOMAIN);
    hasher.update(chain_id.as_bytes());
    hasher.update(&height.to_be_bytes());
    hasher.update(block_hash.as_hash());
    *hasher.finalize().as_bytes()
}

/// Proof of possession: the signing key signs the chain account it is registered under.
pub fn pop_digest(chain_id: &ChainId, address: &AccountAddress) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(POP_DIGEST_DOMAIN);
    hasher.update(chain_id.as_bytes());
    hasher.update(address.as_bytes());
    *hasher.finalize().as_bytes()
}

/// BIP-340 verification of `signature` over a 32-byte digest.
pub fn verify_schnorr(public_key: &BtcPublicKey, digest: &[u8; 32], signature: &[u8]) -> Result<(), ItestError> {
    let secp = Secp256k1::verification_only();
    let signature = Signature::from_slice(signature)?;
    secp.verify_schnorr(&signature, &Message::from_digest(*digest), &public_key.to_xonly()?)?;
    Ok(())
}

pub fn verify_vote(vote: &Vote, digest: &[u8; 32]) -> Result<(), ItestError> {
    verify_schnorr(&vote.voter, digest, &vote.signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::Keypair;

    #[test]
    fn test_vote_signature_verifies_only_for_its_digest() {
        let secp = Secp256k1::new();
        let keypair = Keypair::new(&secp, &mut rand::thread_rng());
        let chain_id = ChainId::from("chain-test");
        let digest = vote_digest(&chain_id, 7, &BlockHash::new([7u8; 32]));
        let signature = secp.sign_schnorr_no_aux_rand(&Message::from_digest(digest), &keypair);
        let signature: &[u8; 64] = signature.as_ref();
        let vote = Vote { height: 7, voter: BtcPublicKey::from(keypair.x_only_public_key().0), signature: signature.to_vec() };

        assert!(verify_vote(&vote, &digest).is_ok());
        let other = vote_digest(&chain_id, 8, &BlockHash::new([7u8; 32]));
        assert!(verify_vote(&vote, &other).is_err());
    }

    #[test]
    fn test_pop_digest_binds_chain_and_address() {
        let chain = ChainId::from("chain-test");
        let a = pop_digest(&chain, &AccountAddress::from("bbn1aaaa"));
        let b = pop_digest(&chain, &AccountAddress::from("bbn1bbbb"));
        let c = pop_digest(&ChainId::from("other"), &AccountAddress::from("bbn1aaaa"));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
