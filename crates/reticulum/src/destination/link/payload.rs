//! Wire payloads exchanged during the Link handshake.

use x25519_dalek::PublicKey as X25519Public;

use crate::error::RnsError;
use crate::identity::{ED25519_PUBLIC_KEY_LENGTH, X25519_PUBLIC_KEY_LENGTH};

/// LINKREQUEST packet payload: the initiator's key-agreement and signing
/// public keys, exactly like an Identity's public bytes.
pub struct LinkRequestPayload {
    pub x25519_public: X25519Public,
    pub ed25519_public: ed25519_dalek::VerifyingKey,
}

impl LinkRequestPayload {
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(X25519_PUBLIC_KEY_LENGTH + ED25519_PUBLIC_KEY_LENGTH);
        out.extend_from_slice(self.x25519_public.as_bytes());
        out.extend_from_slice(self.ed25519_public.as_bytes());
        out
    }

    pub fn unpack(bytes: &[u8]) -> Result<Self, RnsError> {
        if bytes.len() != X25519_PUBLIC_KEY_LENGTH + ED25519_PUBLIC_KEY_LENGTH {
            return Err(RnsError::PacketError);
        }
        let x_bytes: [u8; X25519_PUBLIC_KEY_LENGTH] =
            bytes[..X25519_PUBLIC_KEY_LENGTH].try_into().map_err(|_| RnsError::PacketError)?;
        let ed_bytes: [u8; ED25519_PUBLIC_KEY_LENGTH] = bytes[X25519_PUBLIC_KEY_LENGTH..]
            .try_into()
            .map_err(|_| RnsError::PacketError)?;

        Ok(Self {
            x25519_public: X25519Public::from(x_bytes),
            ed25519_public: ed25519_dalek::VerifyingKey::from_bytes(&ed_bytes)
                .map_err(|_| RnsError::CryptoError)?,
        })
    }
}

/// PROOF packet payload proving a link request: the responder's
/// key-agreement public key, the negotiated signalling bytes, plus a
/// signature over `link_id || x25519_public` from the responder's
/// long-lived identity (the initiator does not yet have a verified
/// symmetric channel to trust an HMAC at this point).
pub struct LinkProofPayload {
    pub x25519_public: X25519Public,
    pub signalling: [u8; 3],
    pub signature: [u8; 64],
}

impl LinkProofPayload {
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(X25519_PUBLIC_KEY_LENGTH + 3 + 64);
        out.extend_from_slice(self.x25519_public.as_bytes());
        out.extend_from_slice(&self.signalling);
        out.extend_from_slice(&self.signature);
        out
    }

    pub fn unpack(bytes: &[u8]) -> Result<Self, RnsError> {
        if bytes.len() != X25519_PUBLIC_KEY_LENGTH + 3 + 64 {
            return Err(RnsError::PacketError);
        }
        let x_bytes: [u8; X25519_PUBLIC_KEY_LENGTH] =
            bytes[..X25519_PUBLIC_KEY_LENGTH].try_into().map_err(|_| RnsError::PacketError)?;
        let signalling: [u8; 3] = bytes[X25519_PUBLIC_KEY_LENGTH..X25519_PUBLIC_KEY_LENGTH + 3]
            .try_into()
            .map_err(|_| RnsError::PacketError)?;
        let signature: [u8; 64] = bytes[X25519_PUBLIC_KEY_LENGTH + 3..]
            .try_into()
            .map_err(|_| RnsError::PacketError)?;

        Ok(Self { x25519_public: X25519Public::from(x_bytes), signalling, signature })
    }
}

/// Encode `mtu` (21 bits) and `mode` (upper 3 bits) into the 3 signalling
/// bytes negotiated at handshake.
pub fn pack_signalling_bytes(mtu: u32, mode: u8) -> [u8; 3] {
    let value = (mtu & 0x1F_FFFF) | (((mode & 0b111) as u32) << 21);
    [(value >> 16) as u8, (value >> 8) as u8, value as u8]
}

pub fn unpack_signalling_bytes(bytes: [u8; 3]) -> (u32, u8) {
    let value = ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32;
    (value & 0x1F_FFFF, ((value >> 21) & 0b111) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signalling_bytes_roundtrip() {
        let (mtu, mode) = unpack_signalling_bytes(pack_signalling_bytes(464, 1));
        assert_eq!(mtu, 464);
        assert_eq!(mode, 1);
    }

    #[test]
    fn link_request_payload_roundtrips() {
        use crate::identity::PrivateIdentity;
        let id = PrivateIdentity::new_random();
        let payload = LinkRequestPayload {
            x25519_public: *id.public().x25519_public(),
            ed25519_public: *id.public().ed25519_public(),
        };
        let bytes = payload.pack();
        let parsed = LinkRequestPayload::unpack(&bytes).expect("unpack");
        assert_eq!(parsed.x25519_public.as_bytes(), id.public().x25519_public().as_bytes());
    }
}
