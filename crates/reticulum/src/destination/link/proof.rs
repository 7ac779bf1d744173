//! Validation of the LINKREQUEST proof packet.

use crate::destination::link::id::LinkId;
use crate::destination::link::payload::LinkProofPayload;
use crate::error::RnsError;
use crate::identity::Identity;

/// Verify a proof packet's signature against the responder's known identity
/// and the link id it claims to prove, returning the responder's X25519
/// public key for shared-secret derivation on success.
pub fn validate_proof_packet(
    link_id: LinkId,
    responder_identity: &Identity,
    proof: &LinkProofPayload,
) -> Result<x25519_dalek::PublicKey, RnsError> {
    let mut signed = Vec::with_capacity(16 + 32);
    signed.extend_from_slice(link_id.as_address_hash().as_slice());
    signed.extend_from_slice(proof.x25519_public.as_bytes());

    responder_identity.verify(&signed, &proof.signature)?;
    Ok(proof.x25519_public)
}

/// Build the signature a responder attaches to its proof packet.
pub fn sign_proof_packet(
    link_id: LinkId,
    responder_identity: &crate::identity::PrivateIdentity,
    responder_x25519_public: &x25519_dalek::PublicKey,
) -> [u8; 64] {
    let mut signed = Vec::with_capacity(16 + 32);
    signed.extend_from_slice(link_id.as_address_hash().as_slice());
    signed.extend_from_slice(responder_x25519_public.as_bytes());
    responder_identity.sign(&signed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::AddressHash;
    use crate::identity::PrivateIdentity;
    use x25519_dalek::{PublicKey, StaticSecret};

    #[test]
    fn sign_then_validate_roundtrips() {
        let responder = PrivateIdentity::new_random();
        let link_id = LinkId::from(AddressHash::digest(b"link"));
        let ephemeral = StaticSecret::random_from_rng(rand_core::OsRng);
        let ephemeral_public = PublicKey::from(&ephemeral);

        let signature = sign_proof_packet(link_id, &responder, &ephemeral_public);
        let proof =
            LinkProofPayload { x25519_public: ephemeral_public, signalling: [0; 3], signature };

        let validated = validate_proof_packet(link_id, responder.public(), &proof).expect("valid");
        assert_eq!(validated.as_bytes(), ephemeral_public.as_bytes());
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let responder = PrivateIdentity::new_random();
        let link_id = LinkId::from(AddressHash::digest(b"link"));
        let ephemeral = StaticSecret::random_from_rng(rand_core::OsRng);
        let ephemeral_public = PublicKey::from(&ephemeral);

        let mut signature = sign_proof_packet(link_id, &responder, &ephemeral_public);
        signature[0] ^= 0xFF;
        let proof =
            LinkProofPayload { x25519_public: ephemeral_public, signalling: [0; 3], signature };

        assert!(validate_proof_packet(link_id, responder.public(), &proof).is_err());
    }
}
