//! Transport's path table: destination hash -> last-known route (§3 PathEntry,
//! §4.F). Transport exclusively owns this table; readers take a snapshot.

use std::collections::HashMap;
use std::time::Duration;

use crate::hash::AddressHash;
use crate::iface::InterfaceId;

const MAX_RANDOM_BLOBS: usize = 32;

#[derive(Debug, Clone)]
pub struct PathEntry {
    /// Wall-clock seconds the announce that created/refreshed this entry
    /// carried (§9 open question: wall-clock, not monotonic).
    pub timestamp: u64,
    pub received_from: AddressHash,
    pub hops: u8,
    pub expires_at: u64,
    pub random_blobs: Vec<[u8; 10]>,
    pub receiving_interface: InterfaceId,
    pub packet_hash: AddressHash,
}

/// Transport's exclusive-owned map of destination hash -> route.
#[derive(Default)]
pub struct PathTable {
    entries: HashMap<AddressHash, PathEntry>,
    expiry: Duration,
}

impl PathTable {
    pub fn new(expiry: Duration) -> Self {
        Self { entries: HashMap::new(), expiry }
    }

    pub fn get(&self, destination: &AddressHash) -> Option<&PathEntry> {
        self.entries.get(destination)
    }

    pub fn has_path(&self, destination: &AddressHash) -> bool {
        self.entries.contains_key(destination)
    }

    pub fn hops_to(&self, destination: &AddressHash) -> Option<u8> {
        self.entries.get(destination).map(|e| e.hops)
    }

    /// Apply an announce's routing info. Idempotent for identical
    /// `(destination, timestamp)`; a strictly newer timestamp replaces the
    /// existing entry regardless of hop count (spec §8 invariant 5).
    /// Returns `true` if this announce should be treated as new/newer
    /// (i.e. should be rebroadcast and delivered to subscribers).
    pub fn update_from_announce(
        &mut self,
        destination: AddressHash,
        timestamp: u64,
        received_from: AddressHash,
        hops: u8,
        receiving_interface: InterfaceId,
        packet_hash: AddressHash,
        now: u64,
    ) -> bool {
        if let Some(existing) = self.entries.get(&destination) {
            if timestamp <= existing.timestamp {
                return false;
            }
        }

        let mut random_blobs = self
            .entries
            .get(&destination)
            .map(|e| e.random_blobs.clone())
            .unwrap_or_default();
        if random_blobs.len() >= MAX_RANDOM_BLOBS {
            random_blobs.remove(0);
        }
        let mut blob = [0u8; 10];
        blob[..8].copy_from_slice(&packet_hash.as_slice()[..8]);
        random_blobs.push(blob);

        self.entries.insert(
            destination,
            PathEntry {
                timestamp,
                received_from,
                hops,
                expires_at: now + self.expiry.as_secs(),
                random_blobs,
                receiving_interface,
                packet_hash,
            },
        );
        true
    }

    /// Drop entries that have aged out past a week (or the configured
    /// expiry) without a refreshing announce.
    pub fn sweep_expired(&mut self, now: u64) {
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    pub fn remove(&mut self, destination: &AddressHash) {
        self.entries.remove(destination);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface() -> InterfaceId {
        InterfaceId(1)
    }

    #[test]
    fn newer_timestamp_replaces_older_entry() {
        let mut table = PathTable::new(Duration::from_secs(604_800));
        let dest = AddressHash::digest(b"dest");
        let from_a = AddressHash::digest(b"a");
        let from_b = AddressHash::digest(b"b");

        assert!(table.update_from_announce(
            dest,
            100,
            from_a,
            3,
            iface(),
            AddressHash::digest(b"p1"),
            0
        ));
        assert!(!table.update_from_announce(
            dest,
            100,
            from_b,
            1,
            iface(),
            AddressHash::digest(b"p2"),
            0
        ));
        assert_eq!(table.get(&dest).unwrap().received_from, from_a);

        assert!(table.update_from_announce(
            dest,
            200,
            from_b,
            5,
            iface(),
            AddressHash::digest(b"p3"),
            0
        ));
        assert_eq!(table.get(&dest).unwrap().received_from, from_b);
    }

    #[test]
    fn sweep_expired_drops_stale_entries() {
        let mut table = PathTable::new(Duration::from_secs(10));
        let dest = AddressHash::digest(b"dest");
        table.update_from_announce(dest, 1, dest, 0, iface(), AddressHash::digest(b"p"), 0);
        assert!(table.has_path(&dest));
        table.sweep_expired(11);
        assert!(!table.has_path(&dest));
    }
}
