//! Chunked bulk transfer over an ACTIVE Link, with optional BZ2 compression
//! and a signed completion proof.

pub mod manager;
pub mod receiver;
pub mod sender;

pub use manager::ResourceManager;
pub use receiver::ResourceReceiver;
pub use sender::ResourceSender;

use crate::hash::Hash;

/// Compression is attempted whenever content exceeds this size and kept
/// only if it actually shrinks the payload.
pub const COMPRESSION_TRY_THRESHOLD: usize = 32;

/// Proof of a completed resource transfer: `content_hash(32) || signature(32)`.
pub const RESOURCE_PROOF_LENGTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    Advertised,
    Transferring,
    AwaitingProof,
    Complete,
    Failed,
}

pub fn content_hash(data: &[u8]) -> Hash {
    Hash::new_from_slice(data)
}

/// A signed Resource completion proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceProof {
    pub content_hash: [u8; 32],
    pub signature: [u8; 32],
}

impl ResourceProof {
    pub fn pack(&self) -> [u8; RESOURCE_PROOF_LENGTH] {
        let mut out = [0u8; RESOURCE_PROOF_LENGTH];
        out[..32].copy_from_slice(&self.content_hash);
        out[32..].copy_from_slice(&self.signature);
        out
    }

    pub fn unpack(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != RESOURCE_PROOF_LENGTH {
            return None;
        }
        let mut content_hash = [0u8; 32];
        let mut signature = [0u8; 32];
        content_hash.copy_from_slice(&bytes[..32]);
        signature.copy_from_slice(&bytes[32..]);
        Some(Self { content_hash, signature })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proof_roundtrips() {
        let proof = ResourceProof { content_hash: [1u8; 32], signature: [2u8; 32] };
        let bytes = proof.pack();
        assert_eq!(ResourceProof::unpack(&bytes), Some(proof));
    }
}
