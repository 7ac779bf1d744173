//! Destination: a named endpoint, (identity, direction, type, app_name,
//! aspects) -> 16-byte hash, plus announce emission/validation.

pub mod link;
pub mod primitives;
pub mod ratchet;

use std::marker::PhantomData;
use std::sync::Mutex;

use rand_core::{OsRng, RngCore};

use crate::error::RnsError;
use crate::hash::AddressHash;
use crate::identity::{HashIdentity, Identity, PrivateIdentity};
use crate::packet::{DestinationType, HeaderType, Packet, PacketContext, PacketType, PropagationType};

pub use primitives::{destination_hash, Direction, Group, In, Link as LinkType, Out, Plain, Single, Type};
pub use ratchet::RatchetState;

const RANDOM_HASH_LEN: usize = 10;

#[derive(Debug, Clone)]
pub struct DestinationName {
    pub app_name: String,
    pub aspects: Vec<String>,
}

impl DestinationName {
    pub fn new(app_name: impl Into<String>, aspects: &[&str]) -> Self {
        Self {
            app_name: app_name.into(),
            aspects: aspects.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A lightweight, type-erased handle to a destination: what Transport and
/// Link actually key their tables by and pass around, instead of an owning
/// reference into a `Destination<I, D, T>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestinationDesc {
    pub address_hash: AddressHash,
    pub destination_type: DestinationType,
}

/// Outcome of handing an inbound packet to a destination's handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationHandleStatus {
    Delivered(Vec<u8>),
    AnnounceAccepted,
    AnnounceStale,
    Ignored,
}

/// A parsed/validated announce payload:
/// `identity_public_keys || name_hash || random_hash || ratchet? || signature || app_data`.
#[derive(Debug, Clone)]
pub struct DestinationAnnounce {
    pub identity: Identity,
    pub name_hash: AddressHash,
    pub random_hash: [u8; RANDOM_HASH_LEN],
    pub ratchet: Option<[u8; ratchet::RATCHET_LENGTH]>,
    pub app_data: Vec<u8>,
}

impl DestinationAnnounce {
    fn signed_material(
        destination_hash: AddressHash,
        identity: &Identity,
        name_hash: AddressHash,
        random_hash: &[u8],
        ratchet: Option<&[u8]>,
        app_data: &[u8],
    ) -> Vec<u8> {
        let mut material = Vec::new();
        material.extend_from_slice(destination_hash.as_slice());
        material.extend_from_slice(&identity.to_public_bytes());
        material.extend_from_slice(name_hash.as_slice());
        material.extend_from_slice(random_hash);
        if let Some(ratchet) = ratchet {
            material.extend_from_slice(ratchet);
        }
        material.extend_from_slice(app_data);
        material
    }

    /// Parse and validate the announce payload against `destination_hash`
    /// (the HEADER destination field the announce packet carried).
    pub fn validate(
        destination_hash: AddressHash,
        payload: &[u8],
        carries_ratchet: bool,
    ) -> Result<Self, RnsError> {
        use crate::identity::PUBLIC_KEY_LENGTH;

        let min_len = PUBLIC_KEY_LENGTH + 16 + RANDOM_HASH_LEN + 64;
        if payload.len() < min_len {
            return Err(RnsError::PacketError);
        }

        let mut offset = 0;
        let identity = Identity::from_public_bytes(&payload[offset..offset + PUBLIC_KEY_LENGTH])?;
        offset += PUBLIC_KEY_LENGTH;

        let name_hash = AddressHash::from_slice(&payload[offset..offset + 16])
            .ok_or(RnsError::PacketError)?;
        offset += 16;

        let random_hash: [u8; RANDOM_HASH_LEN] = payload[offset..offset + RANDOM_HASH_LEN]
            .try_into()
            .map_err(|_| RnsError::PacketError)?;
        offset += RANDOM_HASH_LEN;

        let ratchet = if carries_ratchet {
            if payload.len() < offset + ratchet::RATCHET_LENGTH + 64 {
                return Err(RnsError::PacketError);
            }
            let bytes: [u8; ratchet::RATCHET_LENGTH] = payload
                [offset..offset + ratchet::RATCHET_LENGTH]
                .try_into()
                .map_err(|_| RnsError::PacketError)?;
            offset += ratchet::RATCHET_LENGTH;
            Some(bytes)
        } else {
            None
        };

        if payload.len() < offset + 64 {
            return Err(RnsError::PacketError);
        }
        let signature: [u8; 64] =
            payload[offset..offset + 64].try_into().map_err(|_| RnsError::PacketError)?;
        offset += 64;
        let app_data = payload[offset..].to_vec();

        let signed = Self::signed_material(
            destination_hash,
            &identity,
            name_hash,
            &random_hash,
            ratchet.as_ref().map(|r| r.as_slice()),
            &app_data,
        );
        identity.verify(&signed, &signature)?;

        Ok(Self { identity, name_hash, random_hash, ratchet, app_data })
    }

    pub fn pack(
        destination_hash: AddressHash,
        priv_identity: &PrivateIdentity,
        name_hash: AddressHash,
        ratchet: Option<&[u8]>,
        app_data: &[u8],
    ) -> Vec<u8> {
        let mut random_hash = [0u8; RANDOM_HASH_LEN];
        OsRng.fill_bytes(&mut random_hash);

        let signed = Self::signed_material(
            destination_hash,
            priv_identity.public(),
            name_hash,
            &random_hash,
            ratchet,
            app_data,
        );
        let signature = priv_identity.sign(&signed);

        let mut out = Vec::new();
        out.extend_from_slice(&priv_identity.public().to_public_bytes());
        out.extend_from_slice(name_hash.as_slice());
        out.extend_from_slice(&random_hash);
        if let Some(ratchet) = ratchet {
            out.extend_from_slice(ratchet);
        }
        out.extend_from_slice(&signature);
        out.extend_from_slice(app_data);
        out
    }
}

/// A local destination: `Destination<I, Direction, Type>`. `I` is the
/// identity kind backing it (`PrivateIdentity` for an IN destination that
/// must sign/decrypt, `Identity` for an OUT destination only ever
/// referenced by its public half).
pub struct Destination<I, D, T> {
    pub identity: I,
    pub name: DestinationName,
    hash: AddressHash,
    accepts_links: bool,
    ratchet: Mutex<RatchetState>,
    _marker: PhantomData<(D, T)>,
}

impl<I: HashIdentity, D: Direction, T: Type> Destination<I, D, T> {
    pub fn new(identity: I, name: DestinationName) -> Self {
        let aspects: Vec<&str> = name.aspects.iter().map(String::as_str).collect();
        let hash = destination_hash(&name.app_name, &aspects, Some(identity.address_hash()));
        Self { identity, name, hash, accepts_links: false, ratchet: Mutex::new(RatchetState::new()), _marker: PhantomData }
    }

    pub fn hash(&self) -> AddressHash {
        self.hash
    }

    pub fn name_hash(&self) -> AddressHash {
        AddressHash::digest(self.qualified_name().as_bytes())
    }

    fn qualified_name(&self) -> String {
        let mut qualified = self.name.app_name.clone();
        for aspect in &self.name.aspects {
            qualified.push('.');
            qualified.push_str(aspect);
        }
        qualified
    }

    pub fn desc(&self) -> DestinationDesc {
        DestinationDesc { address_hash: self.hash, destination_type: T::DESTINATION_TYPE }
    }

    pub fn set_accepts_links(&mut self, accepts: bool) {
        self.accepts_links = accepts;
    }

    pub fn accepts_links(&self) -> bool {
        self.accepts_links
    }

    pub fn rotate_ratchet(&self) -> x25519_dalek::PublicKey {
        self.ratchet.lock().expect("ratchet mutex poisoned").rotate()
    }
}

impl<T: Type> Destination<PrivateIdentity, Out, T> {
    /// Emit a signed announce packet for this destination.
    pub fn announce(&self, app_data: &[u8], include_ratchet: bool) -> Result<Packet, RnsError> {
        let ratchet_bytes = if include_ratchet {
            Some(self.rotate_ratchet().to_bytes())
        } else {
            None
        };

        let payload = DestinationAnnounce::pack(
            self.hash,
            &self.identity,
            self.name_hash(),
            ratchet_bytes.as_ref().map(|r| r.as_slice()),
            app_data,
        );

        Packet::new(
            HeaderType::Type1,
            PropagationType::Broadcast,
            T::DESTINATION_TYPE,
            PacketType::Announce,
            0,
            self.hash,
            None,
            PacketContext::None,
            payload,
        )
    }
}

impl<T: Type> Destination<PrivateIdentity, In, T> {
    /// Decrypt and deliver a DATA packet addressed to this destination.
    pub fn handle_packet(&self, packet: &Packet) -> Result<DestinationHandleStatus, RnsError> {
        if packet.destination != self.hash {
            return Ok(DestinationHandleStatus::Ignored);
        }
        match packet.packet_type {
            PacketType::Data => {
                let plaintext = self.identity.decrypt(&packet.data)?;
                Ok(DestinationHandleStatus::Delivered(plaintext))
            }
            _ => Ok(DestinationHandleStatus::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PrivateIdentity;

    #[test]
    fn announce_round_trips_through_validate() {
        let priv_id = PrivateIdentity::new_random();
        let destination: Destination<PrivateIdentity, Out, Single> =
            Destination::new(priv_id, DestinationName::new("lxmf", &["delivery"]));

        let packet = destination.announce(b"app-data", false).expect("announce");
        let announce = DestinationAnnounce::validate(destination.hash(), &packet.data, false)
            .expect("validate");

        assert_eq!(announce.app_data, b"app-data");
        assert_eq!(announce.identity.address_hash(), destination.identity.address_hash());
    }

    #[test]
    fn validate_rejects_tampered_app_data() {
        let priv_id = PrivateIdentity::new_random();
        let destination: Destination<PrivateIdentity, Out, Single> =
            Destination::new(priv_id, DestinationName::new("lxmf", &["delivery"]));

        let mut packet = destination.announce(b"app-data", false).expect("announce");
        let last = packet.data.len() - 1;
        packet.data[last] ^= 0xFF;

        assert!(DestinationAnnounce::validate(destination.hash(), &packet.data, false).is_err());
    }

    #[test]
    fn destination_hash_incorporates_identity() {
        let a = PrivateIdentity::new_random();
        let b = PrivateIdentity::new_random();
        let da: Destination<PrivateIdentity, Out, Single> =
            Destination::new(a, DestinationName::new("lxmf", &["delivery"]));
        let db: Destination<PrivateIdentity, Out, Single> =
            Destination::new(b, DestinationName::new("lxmf", &["delivery"]));
        assert_ne!(da.hash(), db.hash());
    }

    #[test]
    fn handle_packet_decrypts_addressed_data() {
        let priv_id = PrivateIdentity::new_random();
        let in_dest: Destination<PrivateIdentity, In, Single> = Destination::new(
            PrivateIdentity::from_secret_bytes(&priv_id.to_secret_bytes()).unwrap(),
            DestinationName::new("lxmf", &["delivery"]),
        );

        let ciphertext = in_dest.identity.public().encrypt(b"hello").unwrap();
        let packet = Packet::new(
            HeaderType::Type1,
            PropagationType::Broadcast,
            DestinationType::Single,
            PacketType::Data,
            0,
            in_dest.hash(),
            None,
            PacketContext::None,
            ciphertext,
        )
        .unwrap();

        match in_dest.handle_packet(&packet).unwrap() {
            DestinationHandleStatus::Delivered(plaintext) => assert_eq!(plaintext, b"hello"),
            other => panic!("unexpected status: {other:?}"),
        }
    }
}
