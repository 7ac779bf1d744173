//! Receiver side of a Resource transfer: accept an advertisement, collect
//! chunk packets keyed by index, reassemble, and return a signed proof
//! packet routed back through the link's active entry.

use std::io::Read;
use std::time::Instant;

use bzip2::read::BzDecoder;

use crate::destination::link::Link;
use crate::error::RnsError;
use crate::hash::Hash;
use crate::packet::{DestinationType, HeaderType, Packet, PacketContext, PacketType, PropagationType};
use crate::resource::{ResourceProof, ResourceStatus};

const ADVERTISEMENT_MAGIC: u8 = 0x01;

/// A resource transfer's advertisement: the total size and segment layout
/// the sender committed to before shipping any chunk.
#[derive(Debug, Clone, Copy)]
pub struct ResourceAdvertisement {
    pub hash: Hash,
    pub original_size: u32,
    pub segment_count: u32,
    pub compressed: bool,
}

impl ResourceAdvertisement {
    pub fn parse(data: &[u8]) -> Result<Self, RnsError> {
        if data.len() != 1 + 32 + 4 + 4 + 1 || data[0] != ADVERTISEMENT_MAGIC {
            return Err(RnsError::PacketError);
        }
        let hash = Hash::from_bytes(data[1..33].try_into().map_err(|_| RnsError::PacketError)?);
        let original_size = u32::from_be_bytes(data[33..37].try_into().unwrap());
        let segment_count = u32::from_be_bytes(data[37..41].try_into().unwrap());
        let compressed = data[41] != 0;
        Ok(Self { hash, original_size, segment_count, compressed })
    }
}

/// Outcome of handing a chunk to the receiver.
pub enum ChunkOutcome {
    /// Not yet complete; nothing to send back.
    Pending,
    /// Every segment is present, verified, and a proof packet is ready.
    Complete { data: Vec<u8>, proof_packet: Packet },
    Failed,
}

pub struct ResourceReceiver {
    hash: Hash,
    segments: Vec<Option<Vec<u8>>>,
    received: usize,
    compressed: bool,
    status: ResourceStatus,
    started_at: Instant,
}

impl ResourceReceiver {
    pub fn from_advertisement(adv: &ResourceAdvertisement) -> Self {
        Self {
            hash: adv.hash,
            segments: vec![None; adv.segment_count as usize],
            received: 0,
            compressed: adv.compressed,
            status: ResourceStatus::Transferring,
            started_at: Instant::now(),
        }
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn status(&self) -> ResourceStatus {
        self.status
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    pub fn progress(&self) -> (usize, usize) {
        (self.received, self.segments.len())
    }

    /// Decrypt and store one chunk packet's plaintext (`hash(32) || index(4)
    /// || segment`); on the final segment, reassemble, decompress, verify
    /// against the advertised content hash, and sign a completion proof with
    /// the link's HMAC key.
    pub fn handle_chunk(&mut self, packet: &Packet, link: &Link) -> ChunkOutcome {
        let plaintext = match link.decrypt(&packet.data) {
            Ok(p) => p,
            Err(_) => {
                self.status = ResourceStatus::Failed;
                return ChunkOutcome::Failed;
            }
        };
        if plaintext.len() < 36 {
            self.status = ResourceStatus::Failed;
            return ChunkOutcome::Failed;
        }
        let chunk_hash = Hash::from_bytes(plaintext[..32].try_into().unwrap());
        if chunk_hash != self.hash {
            return ChunkOutcome::Pending;
        }
        let index = u32::from_be_bytes(plaintext[32..36].try_into().unwrap()) as usize;
        if index >= self.segments.len() {
            self.status = ResourceStatus::Failed;
            return ChunkOutcome::Failed;
        }
        if self.segments[index].is_none() {
            self.segments[index] = Some(plaintext[36..].to_vec());
            self.received += 1;
        }

        if self.received < self.segments.len() {
            return ChunkOutcome::Pending;
        }

        let mut stream = Vec::new();
        for segment in &self.segments {
            match segment {
                Some(bytes) => stream.extend_from_slice(bytes),
                None => {
                    self.status = ResourceStatus::Failed;
                    return ChunkOutcome::Failed;
                }
            }
        }

        let payload = if self.compressed {
            let mut decoder = BzDecoder::new(stream.as_slice());
            let mut decompressed = Vec::new();
            if decoder.read_to_end(&mut decompressed).is_err() {
                self.status = ResourceStatus::Failed;
                return ChunkOutcome::Failed;
            }
            decompressed
        } else {
            stream
        };

        if Hash::new_from_slice(&payload) != self.hash {
            self.status = ResourceStatus::Failed;
            return ChunkOutcome::Failed;
        }

        let content_hash = self.hash.to_bytes();
        let signature = match link.sign_with_link_key(&content_hash) {
            Ok(mac) => mac,
            Err(_) => {
                self.status = ResourceStatus::Failed;
                return ChunkOutcome::Failed;
            }
        };
        let proof = ResourceProof { content_hash, signature };
        let proof_packet = match Packet::new(
            HeaderType::Type1,
            PropagationType::Broadcast,
            DestinationType::Link,
            PacketType::Proof,
            0,
            link.id().as_address_hash(),
            None,
            PacketContext::ResourceProof,
            proof.pack().to_vec(),
        ) {
            Ok(p) => p,
            Err(_) => {
                self.status = ResourceStatus::Failed;
                return ChunkOutcome::Failed;
            }
        };

        self.status = ResourceStatus::Complete;
        ChunkOutcome::Complete { data: payload, proof_packet }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PrivateIdentity;
    use crate::resource::sender::ResourceSender;

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
    fn full_resource_round_trips_through_receiver() {
        let (sender_link, receiver_link) = active_link_pair();
        let content = vec![b'x'; 4096];
        let mut sender = ResourceSender::build(&content, sender_link.mdu()).expect("build");

        let adv_packet = sender.advertisement_packet(&sender_link).expect("adv packet");
        let adv_ciphertext = receiver_link.decrypt(&adv_packet.data).expect("decrypt adv");
        let adv = ResourceAdvertisement::parse(&adv_ciphertext).expect("parse adv");
        let mut receiver = ResourceReceiver::from_advertisement(&adv);

        let mut outcome_data = None;
        while let Some(packet) = sender.next_packet(&sender_link).expect("chunk") {
            match receiver.handle_chunk(&packet, &receiver_link) {
                ChunkOutcome::Pending => {}
                ChunkOutcome::Complete { data, .. } => outcome_data = Some(data),
                ChunkOutcome::Failed => panic!("resource transfer failed"),
            }
        }

        assert_eq!(outcome_data.expect("completed"), content);
        assert_eq!(receiver.status(), ResourceStatus::Complete);
    }
}
