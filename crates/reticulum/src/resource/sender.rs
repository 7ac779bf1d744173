//! Sender side of a Resource transfer: segment, optionally compress, emit
//! chunk packets over an ACTIVE link.

use bzip2::write::BzEncoder;
use bzip2::Compression;
use std::io::Write;

use crate::destination::link::Link;
use crate::error::RnsError;
use crate::hash::Hash;
use crate::packet::{DestinationType, HeaderType, Packet, PacketContext, PacketType, PropagationType};
use crate::resource::{ResourceStatus, COMPRESSION_TRY_THRESHOLD};

const ADVERTISEMENT_MAGIC: u8 = 0x01;

pub struct ResourceSender {
    hash: Hash,
    segments: Vec<Vec<u8>>,
    compressed: bool,
    original_size: usize,
    next_index: u32,
    acked_through: u32,
    status: ResourceStatus,
}

impl ResourceSender {
    /// Build the segment plan for `content`, compressing with BZ2 when it
    /// is worthwhile and the caller's link has a usable MDU.
    pub fn build(content: &[u8], mdu: usize) -> Result<Self, RnsError> {
        if mdu == 0 {
            return Err(RnsError::InvalidArgument);
        }

        let hash = Hash::new_from_slice(content);

        let (payload, compressed) = if content.len() > COMPRESSION_TRY_THRESHOLD {
            match compress(content) {
                Some(compressed_bytes) if compressed_bytes.len() < content.len() => {
                    (compressed_bytes, true)
                }
                _ => (content.to_vec(), false),
            }
        } else {
            (content.to_vec(), false)
        };

        let segments = payload.chunks(mdu).map(|c| c.to_vec()).collect::<Vec<_>>();

        Ok(Self {
            hash,
            segments,
            compressed,
            original_size: content.len(),
            next_index: 0,
            acked_through: 0,
            status: ResourceStatus::Advertised,
        })
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn status(&self) -> ResourceStatus {
        self.status
    }

    pub fn segment_count(&self) -> u32 {
        self.segments.len() as u32
    }

    /// The advertisement packet, sent once before any chunk.
    pub fn advertisement_packet(&self, link: &Link) -> Result<Packet, RnsError> {
        let mut data = Vec::with_capacity(1 + 32 + 4 + 4 + 1);
        data.push(ADVERTISEMENT_MAGIC);
        data.extend_from_slice(self.hash.as_slice());
        data.extend_from_slice(&(self.original_size as u32).to_be_bytes());
        data.extend_from_slice(&self.segment_count().to_be_bytes());
        data.push(self.compressed as u8);

        let ciphertext = link.encrypt(&data)?;
        Packet::new(
            HeaderType::Type1,
            PropagationType::Broadcast,
            DestinationType::Link,
            PacketType::Data,
            0,
            link.id().as_address_hash(),
            None,
            PacketContext::ResourceAdvertisement,
            ciphertext,
        )
    }

    /// Next unsent chunk packet, or `None` once all segments have shipped
    /// (the sender then waits for the proof).
    pub fn next_packet(&mut self, link: &Link) -> Result<Option<Packet>, RnsError> {
        if self.next_index as usize >= self.segments.len() {
            self.status = ResourceStatus::AwaitingProof;
            return Ok(None);
        }

        let index = self.next_index;
        let segment = self.segments[index as usize].clone();

        let mut plaintext = Vec::with_capacity(32 + 4 + segment.len());
        plaintext.extend_from_slice(self.hash.as_slice());
        plaintext.extend_from_slice(&index.to_be_bytes());
        plaintext.extend_from_slice(&segment);

        let ciphertext = link.encrypt(&plaintext)?;
        let packet = Packet::new(
            HeaderType::Type1,
            PropagationType::Broadcast,
            DestinationType::Link,
            PacketType::Data,
            0,
            link.id().as_address_hash(),
            None,
            PacketContext::Resource,
            ciphertext,
        )?;

        self.next_index += 1;
        self.status = ResourceStatus::Transferring;
        Ok(Some(packet))
    }

    /// The receiver's window has acked through `through_index`; window-based
    /// retransmission can re-send anything beyond this on timeout.
    pub fn note_ack(&mut self, through_index: u32) {
        self.acked_through = self.acked_through.max(through_index);
    }

    pub fn mark_complete(&mut self) {
        self.status = ResourceStatus::Complete;
    }

    pub fn mark_failed(&mut self) {
        self.status = ResourceStatus::Failed;
    }
}

fn compress(data: &[u8]) -> Option<Vec<u8>> {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data).ok()?;
    encoder.finish().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::link::Link;
    use crate::identity::PrivateIdentity;

    fn active_link_pair() -> (Link, Link) {
        let initiator_identity = PrivateIdentity::new_random();
        let responder_identity = PrivateIdentity::new_random();
        let remote_destination = crate::hash::AddressHash::digest(b"destination");

        let (mut initiator_link, request) = Link::initiate(
            remote_destination,
            initiator_identity.public(),
            crate::packet::MTU as u32,
        );
        let (responder_link, proof) =
            Link::validate_request(&request, &responder_identity, crate::packet::MTU as u32)
                .expect("validate");
        initiator_link.handle_proof(&proof, responder_identity.public()).expect("activate");

        (initiator_link, responder_link)
    }

    #[test]
    fn segments_highly_compressible_content() {
        let (sender_link, _receiver_link) = active_link_pair();
        let content = vec![b'a'; 4096];
        let sender = ResourceSender::build(&content, sender_link.mdu()).expect("build");
        assert!(sender.compressed);
        assert!(sender.segment_count() > 0);
    }

    #[test]
    fn emits_one_packet_per_segment_then_none() {
        let (sender_link, _receiver_link) = active_link_pair();
        let content = vec![7u8; sender_link.mdu() * 3];
        let mut sender = ResourceSender::build(&content, sender_link.mdu()).expect("build");

        let mut count = 0;
        while sender.next_packet(&sender_link).expect("packet").is_some() {
            count += 1;
        }
        assert_eq!(count as u32, sender.segment_count());
        assert_eq!(sender.status(), ResourceStatus::AwaitingProof);
    }
}
