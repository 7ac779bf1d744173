//! Announce rebroadcast queue: an accepted announce waits a randomized
//! delay before Transport retransmits it, bounding broadcast storms when
//! many nodes hear the same announce (§4.F "Announce propagation").

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand_core::{OsRng, RngCore};

use crate::iface::InterfaceId;
use crate::packet::Packet;

struct QueuedAnnounce {
    packet: Packet,
    received_on: Option<InterfaceId>,
    send_at: Instant,
}

/// Bounded FIFO of announces pending rebroadcast. Capacity-bounded per
/// `announce_queue_cap`; a full queue drops the oldest entry rather than
/// refusing the newest (favors propagating fresh information).
pub struct AnnounceTable {
    queue: VecDeque<QueuedAnnounce>,
    capacity: usize,
    delay_min: Duration,
    delay_max: Duration,
}

impl AnnounceTable {
    pub fn new(capacity: usize, delay_min: Duration, delay_max: Duration) -> Self {
        Self { queue: VecDeque::new(), capacity, delay_min, delay_max }
    }

    fn random_delay(&self) -> Duration {
        if self.delay_max <= self.delay_min {
            return self.delay_min;
        }
        let span = (self.delay_max - self.delay_min).as_millis().max(1) as u64;
        let jitter = OsRng.next_u64() % span;
        self.delay_min + Duration::from_millis(jitter)
    }

    /// Enqueue `packet` for rebroadcast, scheduled a random delay from now.
    /// `received_on` is the interface to exclude when it finally goes out.
    pub fn enqueue(&mut self, packet: Packet, received_on: Option<InterfaceId>) {
        if self.queue.len() >= self.capacity {
            self.queue.pop_front();
        }
        let send_at = Instant::now() + self.random_delay();
        self.queue.push_back(QueuedAnnounce { packet, received_on, send_at });
    }

    /// Drain every entry whose scheduled time has arrived, in FIFO order.
    pub fn due(&mut self, now: Instant) -> Vec<(Packet, Option<InterfaceId>)> {
        let mut ready = Vec::new();
        while let Some(front) = self.queue.front() {
            if front.send_at > now {
                break;
            }
            let entry = self.queue.pop_front().expect("front just matched");
            ready.push((entry.packet, entry.received_on));
        }
        ready
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::AddressHash;
    use crate::packet::{DestinationType, HeaderType, PacketContext, PacketType, PropagationType};

    fn sample_packet() -> Packet {
        Packet::new(
            HeaderType::Type1,
            PropagationType::Broadcast,
            DestinationType::Single,
            PacketType::Announce,
            0,
            AddressHash::digest(b"dest"),
            None,
            PacketContext::None,
            Vec::new(),
        )
        .expect("valid packet")
    }

    #[test]
    fn due_returns_nothing_before_delay_elapses() {
        let mut table =
            AnnounceTable::new(8, Duration::from_secs(60), Duration::from_secs(120));
        table.enqueue(sample_packet(), None);
        assert!(table.due(Instant::now()).is_empty());
    }

    #[test]
    fn due_returns_entry_once_delay_elapses() {
        let mut table = AnnounceTable::new(8, Duration::from_millis(1), Duration::from_millis(2));
        table.enqueue(sample_packet(), None);
        let later = Instant::now() + Duration::from_secs(1);
        assert_eq!(table.due(later).len(), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn full_queue_drops_oldest() {
        let mut table = AnnounceTable::new(1, Duration::from_secs(60), Duration::from_secs(60));
        table.enqueue(sample_packet(), None);
        table.enqueue(sample_packet(), None);
        assert_eq!(table.len(), 1);
    }
}
