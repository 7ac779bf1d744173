//! Full and truncated SHA-256 hashes, matching the reference byte-for-byte.

use sha2::{Digest, Sha256};

pub const HASH_SIZE: usize = 32;
pub const ADDRESS_HASH_SIZE: usize = 16;

/// A full 32-byte SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub fn new_from_slice(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut out = [0u8; HASH_SIZE];
        out.copy_from_slice(&digest);
        Self(out)
    }

    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; HASH_SIZE] {
        self.0
    }

    /// First 16 bytes of this digest, the destination/link/packet address form.
    pub fn truncate(&self) -> AddressHash {
        let mut out = [0u8; ADDRESS_HASH_SIZE];
        out.copy_from_slice(&self.0[..ADDRESS_HASH_SIZE]);
        AddressHash(out)
    }
}

impl fmt_impls::DebugHex for Hash {
    fn hex_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A 16-byte truncated hash: the wire identifier for destinations, links and packets.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AddressHash([u8; ADDRESS_HASH_SIZE]);

impl AddressHash {
    pub const fn from_bytes(bytes: [u8; ADDRESS_HASH_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; ADDRESS_HASH_SIZE] {
        self.0
    }

    pub fn from_slice(data: &[u8]) -> Option<Self> {
        if data.len() != ADDRESS_HASH_SIZE {
            return None;
        }
        let mut out = [0u8; ADDRESS_HASH_SIZE];
        out.copy_from_slice(data);
        Some(Self(out))
    }

    /// Truncated hash of arbitrary data, i.e. `sha256(data)[..16]`.
    pub fn digest(data: &[u8]) -> Self {
        Hash::new_from_slice(data).truncate()
    }
}

impl fmt_impls::DebugHex for AddressHash {
    fn hex_bytes(&self) -> &[u8] {
        &self.0
    }
}

mod fmt_impls {
    use std::fmt;

    pub trait DebugHex {
        fn hex_bytes(&self) -> &[u8];
    }

    impl fmt::Debug for super::Hash {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Hash({})", hex::encode(self.as_slice()))
        }
    }

    impl fmt::Debug for super::AddressHash {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "AddressHash({})", hex::encode(self.as_slice()))
        }
    }

    impl fmt::Display for super::AddressHash {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", hex::encode(self.as_slice()))
        }
    }
}
