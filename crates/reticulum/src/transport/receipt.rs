//! `PacketReceipt` and the receipts table (§3 "PacketReceipt", §4.F
//! "Receipts table", §4.G "Receipts and timeouts"). A receipt is created
//! when a packet is sent with `create_receipt = true`; PROOF packets
//! arriving from the remote side resolve it to DELIVERED, a periodic scan
//! resolves unanswered ones to FAILED/CULLED.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::hash::AddressHash;
use crate::iface::InterfaceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Sent,
    Delivered,
    Failed,
    Culled,
}

/// Tracks the fate of one outbound packet that asked for delivery
/// confirmation. `proof` holds the raw proof bytes once DELIVERED.
pub struct PacketReceipt {
    pub packet_hash: AddressHash,
    pub status: ReceiptStatus,
    pub sent_at: Instant,
    pub concluded_at: Option<Instant>,
    pub proof: Option<Vec<u8>>,
    pub rtt: Option<Duration>,
    pub timeout: Duration,
    retried: bool,
}

impl PacketReceipt {
    fn new(packet_hash: AddressHash, timeout: Duration) -> Self {
        Self {
            packet_hash,
            status: ReceiptStatus::Sent,
            sent_at: Instant::now(),
            concluded_at: None,
            proof: None,
            rtt: None,
            timeout,
            retried: false,
        }
    }

    pub fn is_concluded(&self) -> bool {
        self.status != ReceiptStatus::Sent
    }

    fn resolve_delivered(&mut self, proof: Vec<u8>, now: Instant) {
        self.status = ReceiptStatus::Delivered;
        self.rtt = Some(now.duration_since(self.sent_at));
        self.proof = Some(proof);
        self.concluded_at = Some(now);
    }

    fn resolve_timed_out(&mut self, now: Instant) {
        self.status = if self.retried { ReceiptStatus::Culled } else { ReceiptStatus::Failed };
        self.concluded_at = Some(now);
    }
}

/// Timeout budget for one hop count, per spec §4.G:
/// `first_hop_timeout + per_hop_timeout * hops`.
pub fn receipt_timeout(first_hop_timeout: Duration, per_hop_timeout: Duration, hops: u8) -> Duration {
    first_hop_timeout + per_hop_timeout * hops as u32
}

/// Transport's exclusive-owned receipts table plus the reverse table used
/// to route an inbound PROOF back to the interface the original packet
/// went out on (the interface a proof should be expected to arrive from).
#[derive(Default)]
pub struct ReceiptTable {
    receipts: HashMap<AddressHash, PacketReceipt>,
    reverse: HashMap<AddressHash, (InterfaceId, Instant)>,
}

impl ReceiptTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, packet_hash: AddressHash, timeout: Duration, sent_via: InterfaceId) {
        self.receipts.insert(packet_hash, PacketReceipt::new(packet_hash, timeout));
        self.reverse.insert(packet_hash, (sent_via, Instant::now()));
    }

    pub fn get(&self, packet_hash: &AddressHash) -> Option<&PacketReceipt> {
        self.receipts.get(packet_hash)
    }

    /// A PROOF packet arrived whose expected key matches `packet_hash`:
    /// resolve the receipt to DELIVERED. Returns `false` if no receipt was
    /// registered for this hash (the proof belongs to something else, e.g.
    /// a link's resource transfer — the resource-proof routing fix).
    pub fn handle_proof(&mut self, packet_hash: &AddressHash, proof: Vec<u8>) -> bool {
        match self.receipts.get_mut(packet_hash) {
            Some(receipt) if receipt.status == ReceiptStatus::Sent => {
                receipt.resolve_delivered(proof, Instant::now());
                true
            }
            _ => false,
        }
    }

    pub fn sent_via(&self, packet_hash: &AddressHash) -> Option<InterfaceId> {
        self.reverse.get(packet_hash).map(|(iface, _)| *iface)
    }

    /// Periodic scan (§4.G): resolve any receipt whose timeout has elapsed
    /// without a proof to FAILED/CULLED. Returns the hashes that just
    /// concluded, so the caller can fire timeout callbacks outside any lock.
    pub fn sweep_timeouts(&mut self, now: Instant) -> Vec<AddressHash> {
        let mut concluded = Vec::new();
        for (hash, receipt) in self.receipts.iter_mut() {
            if receipt.status == ReceiptStatus::Sent && now.duration_since(receipt.sent_at) > receipt.timeout
            {
                receipt.resolve_timed_out(now);
                concluded.push(*hash);
            }
        }
        concluded
    }

    pub fn mark_retried(&mut self, packet_hash: &AddressHash) {
        if let Some(receipt) = self.receipts.get_mut(packet_hash) {
            receipt.retried = true;
        }
    }

    /// Drop concluded receipts and their reverse-table entries older than
    /// `max_age`, bounding table growth under sustained traffic.
    pub fn prune(&mut self, now: Instant, max_age: Duration) {
        self.receipts.retain(|hash, receipt| {
            let keep = match receipt.concluded_at {
                Some(concluded_at) => now.duration_since(concluded_at) <= max_age,
                None => true,
            };
            if !keep {
                self.reverse.remove(hash);
            }
            keep
        });
        self.reverse.retain(|_, (_, sent_at)| now.duration_since(*sent_at) <= max_age);
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface() -> InterfaceId {
        InterfaceId(1)
    }

    #[test]
    fn proof_resolves_receipt_to_delivered() {
        let mut table = ReceiptTable::new();
        let hash = AddressHash::digest(b"packet");
        table.register(hash, Duration::from_secs(5), iface());

        assert!(table.handle_proof(&hash, vec![1, 2, 3]));
        let receipt = table.get(&hash).unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Delivered);
        assert!(receipt.rtt.is_some());
    }

    #[test]
    fn unmatched_proof_is_reported_as_not_found() {
        let mut table = ReceiptTable::new();
        let hash = AddressHash::digest(b"packet");
        assert!(!table.handle_proof(&hash, vec![]));
    }

    #[test]
    fn sweep_timeouts_marks_stale_receipts_failed() {
        let mut table = ReceiptTable::new();
        let hash = AddressHash::digest(b"packet");
        table.register(hash, Duration::from_millis(1), iface());

        let later = Instant::now() + Duration::from_secs(1);
        let concluded = table.sweep_timeouts(later);

        assert_eq!(concluded, vec![hash]);
        assert_eq!(table.get(&hash).unwrap().status, ReceiptStatus::Failed);
    }

    #[test]
    fn retried_receipt_times_out_as_culled() {
        let mut table = ReceiptTable::new();
        let hash = AddressHash::digest(b"packet");
        table.register(hash, Duration::from_millis(1), iface());
        table.mark_retried(&hash);

        let later = Instant::now() + Duration::from_secs(1);
        table.sweep_timeouts(later);
        assert_eq!(table.get(&hash).unwrap().status, ReceiptStatus::Culled);
    }

    #[test]
    fn receipt_timeout_scales_with_hops() {
        let timeout = receipt_timeout(Duration::from_secs(1), Duration::from_millis(600), 3);
        assert_eq!(timeout, Duration::from_millis(2_800));
    }
}
