//! Per-link bookkeeping for in-flight Resource transfers: one outgoing
//! sender and/or incoming receiver per content hash, with a progress
//! callback fired on each accepted chunk (§4.H).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::destination::link::Link;
use crate::hash::Hash;
use crate::packet::{Packet, PacketContext};
use crate::resource::receiver::{ChunkOutcome, ResourceAdvertisement, ResourceReceiver};
use crate::resource::sender::ResourceSender;

/// Retry a stalled inbound transfer (no progress) after this long; bounded
/// reassembly per spec §3's Resource invariant ("in-flight or terminal;
/// reassembly buffers are bounded and time out").
pub const INBOUND_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub enum ResourceEvent {
    /// A chunk was accepted into an in-flight inbound transfer.
    Progress { hash: Hash, received: usize, total: usize },
    /// An inbound transfer completed; `data` is the reassembled content.
    Complete { hash: Hash, data: Vec<u8> },
    /// An inbound transfer failed verification or timed out.
    Failed { hash: Hash },
    /// An outbound transfer's proof was received and validated.
    OutboundComplete { hash: Hash },
}

#[derive(Default)]
pub struct ResourceManager {
    outgoing: HashMap<Hash, ResourceSender>,
    incoming: HashMap<Hash, ResourceReceiver>,
    /// Proof packets a completed inbound transfer produced but that have not
    /// yet been handed to Transport for sending; drained by the caller
    /// after `handle_packet` returns, once no table lock is held.
    pending_outbound: Vec<Packet>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start sending `content` over `link`, returning the advertisement
    /// packet to emit first.
    pub fn start_send(
        &mut self,
        link: &Link,
        content: &[u8],
    ) -> Result<(Hash, Packet), crate::error::RnsError> {
        let sender = ResourceSender::build(content, link.mdu())?;
        let hash = sender.hash();
        let adv_packet = sender.advertisement_packet(link)?;
        self.outgoing.insert(hash, sender);
        Ok((hash, adv_packet))
    }

    /// Drain up to one more chunk packet from each outgoing transfer still
    /// in flight.
    pub fn pump_outgoing(&mut self, link: &Link) -> Vec<Packet> {
        let mut packets = Vec::new();
        for sender in self.outgoing.values_mut() {
            if let Ok(Some(packet)) = sender.next_packet(link) {
                packets.push(packet);
            }
        }
        packets
    }

    pub fn handle_packet(&mut self, packet: &Packet, link: &Link) -> Vec<ResourceEvent> {
        match packet.context {
            PacketContext::ResourceAdvertisement => self.handle_advertisement(packet, link),
            PacketContext::Resource => self.handle_chunk(packet, link),
            PacketContext::ResourceProof => self.handle_proof(packet),
            _ => Vec::new(),
        }
    }

    fn handle_advertisement(&mut self, packet: &Packet, link: &Link) -> Vec<ResourceEvent> {
        let Ok(plaintext) = link.decrypt(&packet.data) else {
            return Vec::new();
        };
        let Ok(adv) = ResourceAdvertisement::parse(&plaintext) else {
            return Vec::new();
        };
        self.incoming.insert(adv.hash, ResourceReceiver::from_advertisement(&adv));
        Vec::new()
    }

    fn handle_chunk(&mut self, packet: &Packet, link: &Link) -> Vec<ResourceEvent> {
        let mut events = Vec::new();
        let mut completed_hash = None;

        for (hash, receiver) in self.incoming.iter_mut() {
            let before = receiver.progress().0;
            match receiver.handle_chunk(packet, link) {
                ChunkOutcome::Pending => {
                    let (received, total) = receiver.progress();
                    if received > before {
                        events.push(ResourceEvent::Progress { hash: *hash, received, total });
                    }
                }
                ChunkOutcome::Complete { data, proof_packet } => {
                    self.pending_outbound.push(proof_packet);
                    events.push(ResourceEvent::Complete { hash: *hash, data });
                    completed_hash = Some(*hash);
                }
                ChunkOutcome::Failed => {
                    events.push(ResourceEvent::Failed { hash: *hash });
                    completed_hash = Some(*hash);
                }
            }
        }

        if let Some(hash) = completed_hash {
            self.incoming.remove(&hash);
        }
        events
    }

    fn handle_proof(&mut self, packet: &Packet) -> Vec<ResourceEvent> {
        let Some(proof) = crate::resource::ResourceProof::unpack(&packet.data) else {
            return Vec::new();
        };
        let hash = Hash::from_bytes(proof.content_hash);
        if let Some(sender) = self.outgoing.get_mut(&hash) {
            sender.mark_complete();
            self.outgoing.remove(&hash);
            return vec![ResourceEvent::OutboundComplete { hash }];
        }
        Vec::new()
    }

    /// Evict stalled inbound transfers, per §3's bounded-reassembly-buffer
    /// invariant.
    pub fn sweep_timeouts(&mut self, _now: Instant) -> Vec<ResourceEvent> {
        let mut timed_out = Vec::new();
        self.incoming.retain(|hash, receiver| {
            if receiver.elapsed() > INBOUND_TIMEOUT {
                timed_out.push(*hash);
                false
            } else {
                true
            }
        });
        timed_out.into_iter().map(|hash| ResourceEvent::Failed { hash }).collect()
    }

    /// Drain proof packets queued by completed inbound transfers, for the
    /// caller to hand to `Transport::outbound` once every table lock taken
    /// during `handle_packet` has been released.
    pub fn take_pending_outbound(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.pending_outbound)
    }

    pub fn incoming_count(&self) -> usize {
        self.incoming.len()
    }

    pub fn outgoing_count(&self) -> usize {
        self.outgoing.len()
    }
}
