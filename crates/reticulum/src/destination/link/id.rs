//! Link id derivation: the truncated hash of the LINKREQUEST packet.

use crate::hash::AddressHash;
use crate::packet::Packet;

/// A link's 16-byte id, keying Transport's link table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(AddressHash);

impl LinkId {
    pub fn as_address_hash(&self) -> AddressHash {
        self.0
    }
}

impl From<&Packet> for LinkId {
    fn from(packet: &Packet) -> Self {
        Self(packet.hash())
    }
}

impl From<AddressHash> for LinkId {
    fn from(hash: AddressHash) -> Self {
        Self(hash)
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
