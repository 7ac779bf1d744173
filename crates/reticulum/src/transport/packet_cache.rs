//! The packet hashlist: bounded duplicate suppression for inbound packets
//! (§3 invariant 6, §4.F, §9 open question 2 — approximate LRU via a
//! bounded map with periodic age-based sweep).

use std::collections::BTreeMap;
use std::time::Instant;

use crate::hash::AddressHash;

pub struct PacketCache {
    seen: BTreeMap<AddressHash, Instant>,
    capacity: usize,
}

impl PacketCache {
    pub fn new(capacity: usize) -> Self {
        Self { seen: BTreeMap::new(), capacity }
    }

    /// Record `hash` as seen now. Returns `true` if this is the first time
    /// (caller should process the packet); `false` if it's a duplicate
    /// (caller should drop it, though it may still count toward
    /// announce rate-limiting per §4.F).
    pub fn observe(&mut self, hash: AddressHash) -> bool {
        if self.seen.contains_key(&hash) {
            self.seen.insert(hash, Instant::now());
            return false;
        }

        if self.seen.len() >= self.capacity {
            self.evict_oldest();
        }
        self.seen.insert(hash, Instant::now());
        true
    }

    fn evict_oldest(&mut self) {
        if let Some((&oldest, _)) =
            self.seen.iter().min_by_key(|(_, &instant)| instant)
        {
            self.seen.remove(&oldest);
        }
    }

    /// Periodic age-based sweep: approximate LRU eviction of anything older
    /// than `max_age`, independent of capacity pressure.
    pub fn sweep(&mut self, max_age: std::time::Duration) {
        let now = Instant::now();
        self.seen.retain(|_, &mut seen_at| now.duration_since(seen_at) <= max_age);
    }

    /// Test-only reset (spec §4.F: "`clear_packet_hashlist` exists for
    /// tests only").
    pub fn clear_packet_hashlist(&mut self) {
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_new_second_is_duplicate() {
        let mut cache = PacketCache::new(10);
        let hash = AddressHash::digest(b"packet");
        assert!(cache.observe(hash));
        assert!(!cache.observe(hash));
    }

    #[test]
    fn bounded_by_capacity() {
        let mut cache = PacketCache::new(2);
        cache.observe(AddressHash::digest(b"a"));
        cache.observe(AddressHash::digest(b"b"));
        cache.observe(AddressHash::digest(b"c"));
        assert!(cache.len() <= 2);
    }

    #[test]
    fn clear_packet_hashlist_empties_cache() {
        let mut cache = PacketCache::new(10);
        cache.observe(AddressHash::digest(b"a"));
        cache.clear_packet_hashlist();
        assert!(cache.is_empty());
    }
}
