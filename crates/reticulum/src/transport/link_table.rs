//! Transport's link table: `LinkId` -> `Link`, covering both pending
//! (handshake in flight) and active links (§3 "Active links", §4.F).

use std::collections::HashMap;
use std::time::Instant;

use crate::destination::link::{Link, LinkId, LinkStatus};
use crate::error::RnsError;
use crate::iface::InterfaceId;
use crate::identity::Identity;
use crate::packet::Packet;

struct Entry {
    link: Link,
    interface: InterfaceId,
    /// Set only for initiator-side links awaiting their PROOF: the
    /// responder's identity, needed to validate the proof's signature.
    pending_remote_identity: Option<Identity>,
}

/// Owns every link Transport knows about, keyed by `LinkId`. A single table
/// holds both directions: links this node initiated and links a remote peer
/// requested against a locally registered destination.
#[derive(Default)]
pub struct LinkTable {
    entries: HashMap<LinkId, Entry>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, link: Link, interface: InterfaceId) {
        self.entries.insert(link.id(), Entry { link, interface, pending_remote_identity: None });
    }

    /// Register an initiator-side link still awaiting its PROOF, along with
    /// the responder identity needed to validate that proof.
    pub fn insert_pending(&mut self, link: Link, interface: InterfaceId, remote_identity: Identity) {
        self.entries.insert(
            link.id(),
            Entry { link, interface, pending_remote_identity: Some(remote_identity) },
        );
    }

    /// Validate an inbound PROOF against a pending initiator-side link and
    /// activate it, rebinding its interface to the one the proof arrived on.
    pub fn activate_pending(
        &mut self,
        id: &LinkId,
        proof_packet: &Packet,
        from: InterfaceId,
    ) -> Result<(), RnsError> {
        let entry = self.entries.get_mut(id).ok_or(RnsError::InvalidArgument)?;
        let identity = entry.pending_remote_identity.take().ok_or(RnsError::InvalidArgument)?;
        let result = entry.link.handle_proof(proof_packet, &identity);
        if result.is_ok() {
            entry.interface = from;
        } else {
            entry.pending_remote_identity = Some(identity);
        }
        result
    }

    pub fn get(&self, id: &LinkId) -> Option<&Link> {
        self.entries.get(id).map(|e| &e.link)
    }

    pub fn get_mut(&mut self, id: &LinkId) -> Option<&mut Link> {
        self.entries.get_mut(id).map(|e| &mut e.link)
    }

    pub fn interface_for(&self, id: &LinkId) -> Option<InterfaceId> {
        self.entries.get(id).map(|e| e.interface)
    }

    pub fn remove(&mut self, id: &LinkId) -> Option<Link> {
        self.entries.remove(id).map(|e| e.link)
    }

    pub fn contains(&self, id: &LinkId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.entries.values().filter(|e| e.link.status() == LinkStatus::Active).count()
    }

    /// Run the periodic liveness check (ACTIVE -> STALE) over every link,
    /// used by `transport::jobs`'s link-check task.
    pub fn check_staleness(&mut self, now: Instant) {
        for entry in self.entries.values_mut() {
            entry.link.check_staleness(now);
        }
    }

    /// Links due for a keepalive send right now.
    pub fn due_for_keepalive(&self, now: Instant) -> Vec<LinkId> {
        self.entries
            .iter()
            .filter(|(_, e)| e.link.should_send_keepalive(now))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Drop links that have reached `Closed` and are no longer useful to
    /// keep around (the reference keeps a closed link briefly for late
    /// duplicate proof handling; here the caller decides the grace period).
    pub fn remove_closed(&mut self) -> Vec<LinkId> {
        let closed: Vec<LinkId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.link.status() == LinkStatus::Closed)
            .map(|(id, _)| *id)
            .collect();
        for id in &closed {
            self.entries.remove(id);
        }
        closed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LinkId, &Link)> {
        self.entries.iter().map(|(id, e)| (id, &e.link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::link::TeardownReason;
    use crate::hash::AddressHash;
    use crate::identity::PrivateIdentity;
    use crate::packet::MTU;

    fn iface() -> InterfaceId {
        InterfaceId(1)
    }

    #[test]
    fn insert_then_lookup_roundtrips() {
        let initiator = PrivateIdentity::new_random();
        let remote_destination = AddressHash::digest(b"dest");
        let (link, _request) = Link::initiate(remote_destination, initiator.public(), MTU as u32);
        let id = link.id();

        let mut table = LinkTable::new();
        table.insert(link, iface());

        assert!(table.contains(&id));
        assert_eq!(table.interface_for(&id), Some(iface()));
    }

    #[test]
    fn remove_closed_drops_only_closed_links() {
        let initiator = PrivateIdentity::new_random();
        let responder = PrivateIdentity::new_random();
        let remote_destination = AddressHash::digest(b"dest");
        let (_initiator_link, request) =
            Link::initiate(remote_destination, initiator.public(), MTU as u32);
        let (mut responder_link, _proof) =
            Link::validate_request(&request, &responder, MTU as u32).expect("validate");
        let active_id = responder_link.id();

        let (other_link, other_request) =
            Link::initiate(AddressHash::digest(b"other"), initiator.public(), MTU as u32);
        let (mut closing_link, _proof2) =
            Link::validate_request(&other_request, &responder, MTU as u32).expect("validate");
        let _ = other_link;
        closing_link.teardown(TeardownReason::Timeout);
        let closed_id = closing_link.id();

        let mut table = LinkTable::new();
        table.insert(responder_link, iface());
        table.insert(closing_link, iface());

        let removed = table.remove_closed();
        assert_eq!(removed, vec![closed_id]);
        assert!(table.contains(&active_id));
        assert!(!table.contains(&closed_id));
    }

    #[test]
    fn activate_pending_rebinds_interface_and_activates() {
        let initiator = PrivateIdentity::new_random();
        let responder = PrivateIdentity::new_random();
        let remote_destination = AddressHash::digest(b"dest");

        let (initiator_link, request) =
            Link::initiate(remote_destination, initiator.public(), MTU as u32);
        let id = initiator_link.id();
        let (_responder_link, proof) =
            Link::validate_request(&request, &responder, MTU as u32).expect("validate");

        let mut table = LinkTable::new();
        table.insert_pending(initiator_link, iface(), *responder.public());

        let new_iface = InterfaceId(2);
        table.activate_pending(&id, &proof, new_iface).expect("activate");

        assert_eq!(table.get(&id).unwrap().status(), crate::destination::link::LinkStatus::Active);
        assert_eq!(table.interface_for(&id), Some(new_iface));
    }
}
