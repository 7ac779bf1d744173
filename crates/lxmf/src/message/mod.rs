//! LXMessage: the user-facing unit of LXMF (§4.I). Wire bytes are
//! `dest_hash(16) | src_hash(16) | ed25519_sig(64) | msgpack_payload`, where
//! the payload is a 4- or 5-tuple `[timestamp, title, content, fields,
//! stamp?]`. The message hash — what the signature actually covers — is
//! computed over the payload with any stamp stripped, so attaching or
//! removing a stamp never invalidates a signature made before it existed.

pub mod delivery;

use std::collections::BTreeMap;

use reticulum::hash::{AddressHash, Hash};
use reticulum::identity::{Identity, PrivateIdentity};

use crate::error::LxmfError;

/// Integer-keyed, opaque-valued field map (§4.I: "custom fields are
/// preserved opaquely — integer keys map to arbitrary msgpack values; the
/// router must not alter unknown fields"). `BTreeMap` gives pack() a stable,
/// sorted key order so repacking an unpacked message reproduces the same
/// bytes.
pub type Fields = BTreeMap<u8, rmpv::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Generating,
    Outbound,
    Sending,
    Sent,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMethod {
    Direct,
    Opportunistic,
    Propagated,
    Paper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageMethod {
    Packet,
    Resource,
    Paper,
}

#[derive(Debug, Clone)]
pub struct LXMessage {
    pub destination_hash: AddressHash,
    pub source_hash: AddressHash,
    pub title: Vec<u8>,
    pub content: Vec<u8>,
    pub fields: Fields,
    pub timestamp: f64,
    pub stamp: Option<Vec<u8>>,
    pub signature: Option<[u8; 64]>,
    pub state: State,
    pub desired_method: TransportMethod,
}

impl LXMessage {
    pub fn new(
        destination_hash: AddressHash,
        source_hash: AddressHash,
        title: impl Into<Vec<u8>>,
        content: impl Into<Vec<u8>>,
        fields: Fields,
    ) -> Self {
        Self {
            destination_hash,
            source_hash,
            title: title.into(),
            content: content.into(),
            fields,
            timestamp: reticulum::time::now_epoch_secs_f64(),
            stamp: None,
            signature: None,
            state: State::Generating,
            desired_method: TransportMethod::Opportunistic,
        }
    }

    pub fn with_desired_method(mut self, method: TransportMethod) -> Self {
        self.desired_method = method;
        self
    }

    pub fn with_stamp(mut self, stamp: Vec<u8>) -> Self {
        self.stamp = Some(stamp);
        self
    }

    /// Rough content size the delivery-method decision is made against:
    /// title, content and fields, but not the envelope overhead already
    /// folded into the `*_MAX_CONTENT` constants.
    pub fn content_size(&self) -> usize {
        self.title.len() + self.content.len() + fields_packed_len(&self.fields)
    }

    fn payload_value(&self, include_stamp: bool) -> rmpv::Value {
        let mut elements = vec![
            rmpv::Value::F64(self.timestamp),
            rmpv::Value::Binary(self.title.clone()),
            rmpv::Value::Binary(self.content.clone()),
            rmpv_map(&self.fields),
        ];
        if include_stamp {
            if let Some(stamp) = &self.stamp {
                elements.push(rmpv::Value::Binary(stamp.clone()));
            }
        }
        rmpv::Value::Array(elements)
    }

    fn payload_bytes(&self, include_stamp: bool) -> Result<Vec<u8>, LxmfError> {
        let mut out = Vec::new();
        rmpv::encode::write_value(&mut out, &self.payload_value(include_stamp))
            .map_err(|err| LxmfError::Encode(err.to_string()))?;
        Ok(out)
    }

    /// SHA-256 of the payload with the stamp stripped, invariant under
    /// whether a stamp is currently attached.
    pub fn hash(&self) -> Result<Hash, LxmfError> {
        let payload = self.payload_bytes(false)?;
        Ok(Hash::new_from_slice(&payload))
    }

    fn signed_material(destination_hash: AddressHash, source_hash: AddressHash, hash: Hash) -> Vec<u8> {
        let mut material = Vec::with_capacity(16 + 16 + 32);
        material.extend_from_slice(destination_hash.as_slice());
        material.extend_from_slice(source_hash.as_slice());
        material.extend_from_slice(hash.as_slice());
        material
    }

    /// Sign with `signer` (the source identity) and produce wire bytes.
    /// Re-signs on every call, so packing after attaching a stamp (which
    /// doesn't change `hash()`) reuses the same signature bytes.
    pub fn pack(&mut self, signer: &PrivateIdentity) -> Result<Vec<u8>, LxmfError> {
        let hash = self.hash()?;
        let signature = signer.sign(&Self::signed_material(self.destination_hash, self.source_hash, hash));
        self.signature = Some(signature);

        let payload = self.payload_bytes(true)?;
        let mut out = Vec::with_capacity(16 + 16 + 64 + payload.len());
        out.extend_from_slice(self.destination_hash.as_slice());
        out.extend_from_slice(self.source_hash.as_slice());
        out.extend_from_slice(&signature);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Parse and validate wire bytes against a remembered source Identity
    /// (§4.I: "signature validation requires the source Identity's Ed25519
    /// public key to be remembered").
    pub fn unpack(bytes: &[u8], source_identity: &Identity) -> Result<Self, LxmfError> {
        const HEADER_LEN: usize = 16 + 16 + 64;
        if bytes.len() <= HEADER_LEN {
            return Err(LxmfError::Decode("frame shorter than dest|src|sig header".into()));
        }

        let destination_hash =
            AddressHash::from_slice(&bytes[0..16]).ok_or_else(|| LxmfError::Decode("bad destination hash".into()))?;
        let source_hash =
            AddressHash::from_slice(&bytes[16..32]).ok_or_else(|| LxmfError::Decode("bad source hash".into()))?;
        let signature: [u8; 64] =
            bytes[32..96].try_into().map_err(|_| LxmfError::Decode("bad signature length".into()))?;
        let payload_bytes = &bytes[HEADER_LEN..];
        if payload_bytes.is_empty() {
            return Err(LxmfError::Decode("empty payload".into()));
        }

        let value = rmpv::decode::read_value(&mut &payload_bytes[..])
            .map_err(|err| LxmfError::Decode(err.to_string()))?;
        let rmpv::Value::Array(elements) = value else {
            return Err(LxmfError::Decode("payload is not an array".into()));
        };
        if elements.len() != 4 && elements.len() != 5 {
            return Err(LxmfError::Decode("payload must be a 4- or 5-tuple".into()));
        }

        let timestamp = match &elements[0] {
            rmpv::Value::F64(v) => *v,
            rmpv::Value::F32(v) => f64::from(*v),
            _ => return Err(LxmfError::Decode("timestamp is not a float".into())),
        };
        let title = binary_of(&elements[1])?;
        let content = binary_of(&elements[2])?;
        let fields = fields_of(&elements[3])?;
        let stamp = if elements.len() == 5 { Some(binary_of(&elements[4])?) } else { None };

        let message = Self {
            destination_hash,
            source_hash,
            title,
            content,
            fields,
            timestamp,
            stamp,
            signature: Some(signature),
            state: State::Delivered,
            desired_method: TransportMethod::Opportunistic,
        };

        let hash = message.hash()?;
        let signed = Self::signed_material(destination_hash, source_hash, hash);
        source_identity
            .verify(&signed, &signature)
            .map_err(|_| LxmfError::Verify("source signature does not match".into()))?;

        Ok(message)
    }
}

fn rmpv_map(fields: &Fields) -> rmpv::Value {
    let entries = fields.iter().map(|(k, v)| (rmpv::Value::Integer((*k as i64).into()), v.clone())).collect();
    rmpv::Value::Map(entries)
}

fn fields_packed_len(fields: &Fields) -> usize {
    let mut out = Vec::new();
    let _ = rmpv::encode::write_value(&mut out, &rmpv_map(fields));
    out.len()
}

fn binary_of(value: &rmpv::Value) -> Result<Vec<u8>, LxmfError> {
    match value {
        rmpv::Value::Binary(bytes) => Ok(bytes.clone()),
        rmpv::Value::String(text) => Ok(text.as_bytes().to_vec()),
        _ => Err(LxmfError::Decode("expected a binary field".into())),
    }
}

fn fields_of(value: &rmpv::Value) -> Result<Fields, LxmfError> {
    let rmpv::Value::Map(entries) = value else {
        return Err(LxmfError::Decode("fields is not a map".into()));
    };
    let mut fields = Fields::new();
    for (key, val) in entries {
        let rmpv::Value::Integer(int) = key else {
            return Err(LxmfError::Decode("field key is not an integer".into()));
        };
        let key = int.as_u64().ok_or_else(|| LxmfError::Decode("field key out of range".into()))? as u8;
        fields.insert(key, val.clone());
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reticulum::identity::{HashIdentity, PrivateIdentity};

    fn sample_fields() -> Fields {
        let mut fields = Fields::new();
        fields.insert(crate::constants::FIELD_RENDERER, rmpv::Value::Integer(crate::constants::RENDERER_PLAIN.into()));
        fields
    }

    #[test]
    fn pack_then_unpack_round_trips() {
        let source = PrivateIdentity::new_random();
        let dest_hash = AddressHash::digest(b"destination");

        let mut message =
            LXMessage::new(dest_hash, source.address_hash(), "hi", "there", sample_fields());
        let bytes = message.pack(&source).expect("pack");

        let parsed = LXMessage::unpack(&bytes, source.public()).expect("unpack");
        assert_eq!(parsed.title, b"hi");
        assert_eq!(parsed.content, b"there");
        assert_eq!(parsed.destination_hash, dest_hash);
        assert_eq!(parsed.fields, message.fields);
    }

    #[test]
    fn hash_is_invariant_under_stamp_presence() {
        let source = PrivateIdentity::new_random();
        let dest_hash = AddressHash::digest(b"destination");
        let message = LXMessage::new(dest_hash, source.address_hash(), "hi", "there", sample_fields());

        let without_stamp = message.hash().expect("hash");
        let with_stamp = message.clone().with_stamp(vec![0u8; 32]).hash().expect("hash");
        assert_eq!(without_stamp.as_slice(), with_stamp.as_slice());
    }

    #[test]
    fn unpack_rejects_tampered_signature() {
        let source = PrivateIdentity::new_random();
        let dest_hash = AddressHash::digest(b"destination");
        let mut message = LXMessage::new(dest_hash, source.address_hash(), "hi", "there", sample_fields());
        let mut bytes = message.pack(&source).expect("pack");

        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(LXMessage::unpack(&bytes, source.public()).is_err());
    }

    #[test]
    fn unpack_rejects_short_frames() {
        let source = PrivateIdentity::new_random();
        assert!(LXMessage::unpack(&[0u8; 95], source.public()).is_err());
    }
}
