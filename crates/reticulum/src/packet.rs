//! Wire packet framing: flags byte, HEADER_1/HEADER_2, pack/unpack, the
//! hashable region, and MTU enforcement.

use sha2::{Digest, Sha256};

use crate::error::RnsError;
use crate::hash::AddressHash;

pub const MTU: usize = 500;
pub const IFAC_MIN_SIZE: usize = 1;
/// flags(1) + hops(1) + dest_hash(16) + context(1)
pub const HEADER_MINSIZE: usize = 2 + 1 + 16;
/// flags(1) + hops(1) + dest_hash(16) + transport_id(16) + context(1)
pub const HEADER_MAXSIZE: usize = 2 + 1 + 32;
pub const MDU: usize = MTU - HEADER_MAXSIZE - IFAC_MIN_SIZE;

const ADDR_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderType {
    Type1,
    Type2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationType {
    Broadcast,
    Transport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationType {
    Single,
    Group,
    Plain,
    Link,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Data,
    Announce,
    LinkRequest,
    Proof,
}

/// Single-byte packet context, dispatched on by Transport and Link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketContext {
    None,
    Resource,
    ResourceAdvertisement,
    ResourceRequest,
    ResourceHashUpdate,
    ResourceProof,
    ResourceInitiatorCancel,
    ResourceReceiverCancel,
    KeepAlive,
    LinkIdentify,
    LinkClose,
    LinkRequestProof,
    LrRtt,
    LrProof,
    Request,
    Response,
    PathResponse,
    CacheRequest,
    Command,
    CommandStatus,
    Channel,
}

impl PacketContext {
    pub fn to_byte(self) -> u8 {
        match self {
            PacketContext::None => 0x00,
            PacketContext::Resource => 0x01,
            PacketContext::ResourceAdvertisement => 0x02,
            PacketContext::ResourceRequest => 0x03,
            PacketContext::ResourceHashUpdate => 0x04,
            PacketContext::ResourceProof => 0x05,
            PacketContext::ResourceInitiatorCancel => 0x06,
            PacketContext::ResourceReceiverCancel => 0x07,
            PacketContext::KeepAlive => 0xFA,
            PacketContext::LinkIdentify => 0xF8,
            PacketContext::LinkClose => 0xF9,
            PacketContext::LinkRequestProof => 0xFB,
            PacketContext::LrRtt => 0xFC,
            PacketContext::LrProof => 0xFD,
            PacketContext::Request => 0xF1,
            PacketContext::Response => 0xF2,
            PacketContext::PathResponse => 0xF3,
            PacketContext::CacheRequest => 0xFF,
            PacketContext::Command => 0xF4,
            PacketContext::CommandStatus => 0xF5,
            PacketContext::Channel => 0xF6,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => PacketContext::None,
            0x01 => PacketContext::Resource,
            0x02 => PacketContext::ResourceAdvertisement,
            0x03 => PacketContext::ResourceRequest,
            0x04 => PacketContext::ResourceHashUpdate,
            0x05 => PacketContext::ResourceProof,
            0x06 => PacketContext::ResourceInitiatorCancel,
            0x07 => PacketContext::ResourceReceiverCancel,
            0xFA => PacketContext::KeepAlive,
            0xF8 => PacketContext::LinkIdentify,
            0xF9 => PacketContext::LinkClose,
            0xFB => PacketContext::LinkRequestProof,
            0xFC => PacketContext::LrRtt,
            0xFD => PacketContext::LrProof,
            0xF1 => PacketContext::Request,
            0xF2 => PacketContext::Response,
            0xF3 => PacketContext::PathResponse,
            0xFF => PacketContext::CacheRequest,
            0xF4 => PacketContext::Command,
            0xF5 => PacketContext::CommandStatus,
            0xF6 => PacketContext::Channel,
            _ => return None,
        })
    }
}

/// Parsed flags byte, laid out `[7:6]=header_type [5]=context_flag
/// [4]=transport_type [3:2]=dest_type [1:0]=packet_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub header_type: HeaderType,
    pub context_flag: bool,
    pub propagation_type: PropagationType,
    pub destination_type: DestinationType,
    pub packet_type: PacketType,
}

impl Flags {
    pub fn to_byte(self) -> u8 {
        let header_bits: u8 = match self.header_type {
            HeaderType::Type1 => 0b00,
            HeaderType::Type2 => 0b01,
        };
        let context_bit: u8 = if self.context_flag { 1 } else { 0 };
        let propagation_bit: u8 = match self.propagation_type {
            PropagationType::Broadcast => 0,
            PropagationType::Transport => 1,
        };
        let dest_bits: u8 = match self.destination_type {
            DestinationType::Single => 0b00,
            DestinationType::Group => 0b01,
            DestinationType::Plain => 0b10,
            DestinationType::Link => 0b11,
        };
        let packet_bits: u8 = match self.packet_type {
            PacketType::Data => 0b00,
            PacketType::Announce => 0b01,
            PacketType::LinkRequest => 0b10,
            PacketType::Proof => 0b11,
        };

        (header_bits << 6)
            | (context_bit << 5)
            | (propagation_bit << 4)
            | (dest_bits << 2)
            | packet_bits
    }

    /// Byte with the header-type bits (the top nibble's upper two bits)
    /// masked to zero: what the packet hash is computed over.
    pub fn low_nibble_stable(byte: u8) -> u8 {
        byte & 0b0011_1111
    }

    pub fn parse(byte: u8) -> Option<Self> {
        let header_type = match (byte >> 6) & 0b11 {
            0b00 => HeaderType::Type1,
            0b01 => HeaderType::Type2,
            _ => return None,
        };
        let context_flag = (byte >> 5) & 0b1 == 1;
        let propagation_type = match (byte >> 4) & 0b1 {
            0 => PropagationType::Broadcast,
            _ => PropagationType::Transport,
        };
        let destination_type = match (byte >> 2) & 0b11 {
            0b00 => DestinationType::Single,
            0b01 => DestinationType::Group,
            0b10 => DestinationType::Plain,
            0b11 => DestinationType::Link,
            _ => unreachable!(),
        };
        let packet_type = match byte & 0b11 {
            0b00 => PacketType::Data,
            0b01 => PacketType::Announce,
            0b10 => PacketType::LinkRequest,
            0b11 => PacketType::Proof,
            _ => unreachable!(),
        };

        Some(Self { header_type, context_flag, propagation_type, destination_type, packet_type })
    }
}

/// A parsed Reticulum packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header_type: HeaderType,
    pub propagation_type: PropagationType,
    pub destination_type: DestinationType,
    pub packet_type: PacketType,
    pub context_flag: bool,
    pub hops: u8,
    pub destination: AddressHash,
    pub transport_id: Option<AddressHash>,
    pub context: PacketContext,
    pub data: Vec<u8>,
}

impl Packet {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        header_type: HeaderType,
        propagation_type: PropagationType,
        destination_type: DestinationType,
        packet_type: PacketType,
        hops: u8,
        destination: AddressHash,
        transport_id: Option<AddressHash>,
        context: PacketContext,
        data: Vec<u8>,
    ) -> Result<Self, RnsError> {
        match header_type {
            HeaderType::Type1 if transport_id.is_some() => return Err(RnsError::InvalidArgument),
            HeaderType::Type2 if transport_id.is_none() => return Err(RnsError::InvalidArgument),
            _ => {}
        }

        Ok(Self {
            header_type,
            propagation_type,
            destination_type,
            packet_type,
            context_flag: !matches!(context, PacketContext::None),
            hops,
            destination,
            transport_id,
            context,
            data,
        })
    }

    fn flags(&self) -> Flags {
        Flags {
            header_type: self.header_type,
            context_flag: self.context_flag,
            propagation_type: self.propagation_type,
            destination_type: self.destination_type,
            packet_type: self.packet_type,
        }
    }

    /// Pack this packet to wire bytes, enforcing `mtu`. Layout:
    /// `flags | hops | dest_hash | (transport_id if H2) | context | data`.
    pub fn pack(&self, mtu: usize) -> Result<Vec<u8>, RnsError> {
        let fixed_len = match self.header_type {
            HeaderType::Type1 => HEADER_MINSIZE,
            HeaderType::Type2 => HEADER_MAXSIZE,
        };
        let total_len = fixed_len + self.data.len();
        if total_len > mtu {
            return Err(RnsError::PacketError);
        }

        let mut out = Vec::with_capacity(total_len);
        out.push(self.flags().to_byte());
        out.push(self.hops);
        out.extend_from_slice(self.destination.as_slice());
        if let Some(transport_id) = self.transport_id {
            out.extend_from_slice(transport_id.as_slice());
        }
        out.push(self.context.to_byte());
        out.extend_from_slice(&self.data);

        Ok(out)
    }

    /// Parse wire bytes. Returns `None` on any malformed input: this never
    /// performs cryptography, only structural parsing.
    pub fn unpack(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_MINSIZE {
            return None;
        }

        let flags = Flags::parse(bytes[0])?;
        let hops = bytes[1];

        let (transport_id, dest_offset, context_offset) = match flags.header_type {
            HeaderType::Type1 => (None, 2, 2 + ADDR_LEN),
            HeaderType::Type2 => {
                if bytes.len() < HEADER_MAXSIZE {
                    return None;
                }
                let transport_bytes = &bytes[2..2 + ADDR_LEN];
                (
                    Some(AddressHash::from_slice(transport_bytes)?),
                    2 + ADDR_LEN,
                    2 + 2 * ADDR_LEN,
                )
            }
        };

        let destination = AddressHash::from_slice(&bytes[dest_offset..dest_offset + ADDR_LEN])?;
        if bytes.len() <= context_offset {
            return None;
        }
        let context = PacketContext::from_byte(bytes[context_offset])?;
        let data = bytes[context_offset + 1..].to_vec();

        Some(Self {
            header_type: flags.header_type,
            propagation_type: flags.propagation_type,
            destination_type: flags.destination_type,
            packet_type: flags.packet_type,
            context_flag: flags.context_flag,
            hops,
            destination,
            transport_id,
            context,
            data,
        })
    }

    /// The packet hash, computed over `[flags_low_nibble | hops | dest_hash |
    /// context | data]`: `transport_id` and the header-type bits of flags
    /// are excluded, so a packet's hash is stable across HEADER_1/HEADER_2
    /// rewriting as it hops through transport nodes.
    pub fn hash(&self) -> AddressHash {
        let mut hasher = Sha256::new();
        hasher.update([Flags::low_nibble_stable(self.flags().to_byte())]);
        hasher.update([self.hops]);
        hasher.update(self.destination.as_slice());
        hasher.update([self.context.to_byte()]);
        hasher.update(&self.data);
        let digest = hasher.finalize();
        let mut truncated = [0u8; 16];
        truncated.copy_from_slice(&digest[..16]);
        AddressHash::from_bytes(truncated)
    }

    /// Produce a copy rewritten to HEADER_2 with a transport id, the way a
    /// transport node stamps a forwarded packet.
    pub fn with_transport_id(&self, transport_id: AddressHash) -> Self {
        let mut next = self.clone();
        next.header_type = HeaderType::Type2;
        next.transport_id = Some(transport_id);
        next
    }

    pub fn with_hops_incremented(&self) -> Self {
        let mut next = self.clone();
        next.hops = next.hops.saturating_add(1);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> Packet {
        Packet::new(
            HeaderType::Type1,
            PropagationType::Broadcast,
            DestinationType::Single,
            PacketType::Data,
            0,
            AddressHash::digest(b"destination"),
            None,
            PacketContext::None,
            b"payload".to_vec(),
        )
        .expect("valid packet")
    }

    #[test]
    fn pack_then_unpack_roundtrips_except_hops_is_preserved() {
        let packet = sample_packet();
        let bytes = packet.pack(MTU).expect("pack");
        let parsed = Packet::unpack(&bytes).expect("unpack");
        assert_eq!(parsed, packet);
    }

    #[test]
    fn unpack_rejects_short_frames() {
        assert!(Packet::unpack(&[0u8; HEADER_MINSIZE - 1]).is_none());
    }

    #[test]
    fn unpack_rejects_header2_shorter_than_max_size() {
        let mut bytes = vec![0u8; HEADER_MAXSIZE - 1];
        bytes[0] = Flags {
            header_type: HeaderType::Type2,
            context_flag: false,
            propagation_type: PropagationType::Broadcast,
            destination_type: DestinationType::Single,
            packet_type: PacketType::Data,
        }
        .to_byte();
        assert!(Packet::unpack(&bytes).is_none());
    }

    #[test]
    fn hash_is_independent_of_transport_id_and_header_bits() {
        let packet = sample_packet();
        let rewritten = packet.with_transport_id(AddressHash::digest(b"transport-node"));
        assert_eq!(packet.hash(), rewritten.hash());
    }

    #[test]
    fn hash_changes_with_data() {
        let a = sample_packet();
        let mut b = sample_packet();
        b.data = b"different".to_vec();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn pack_fails_when_exceeding_mtu() {
        let mut packet = sample_packet();
        packet.data = vec![0u8; MTU];
        assert_eq!(packet.pack(MTU), Err(RnsError::PacketError));
    }

    #[test]
    fn unpack_rejects_unknown_context_byte() {
        let packet = sample_packet();
        let mut bytes = packet.pack(MTU).expect("pack");
        let context_offset = HEADER_MINSIZE - 1;
        bytes[context_offset] = 0x80; // not a defined PacketContext
        assert!(Packet::unpack(&bytes).is_none());
    }
}
