//! Per-packet-type inbound dispatch (§4.F's "Inbound algorithm"), split out
//! of `transport::mod` for readability. Every function here is given the
//! already-unpacked `Packet` and the interface it arrived on; duplicate
//! suppression has already run by the time any of these are called.

use crate::destination::link::LinkId;
use crate::destination::{DestinationAnnounce, DestinationHandleStatus};
use crate::iface::InterfaceId;
use crate::identity::HashIdentity;
use crate::packet::{DestinationType, Packet, PacketContext, PacketType, PropagationType};

use super::{Transport, TransportEvent};

/// Entry point called by `Transport::inbound` once a frame has been
/// successfully unpacked.
pub(crate) fn dispatch_inbound(transport: &Transport, packet: Packet, from: InterfaceId) -> Vec<TransportEvent> {
    let hash = packet.hash();
    let is_new = transport.0.packet_cache.lock().expect("packet cache poisoned").observe(hash);
    if !is_new {
        log::trace!("dropping duplicate packet {hash}");
        return Vec::new();
    }

    match packet.packet_type {
        PacketType::Announce => handle_announce(transport, &packet, from),
        PacketType::LinkRequest => handle_link_request(transport, &packet, from),
        PacketType::Data => {
            if packet.destination_type == DestinationType::Link {
                handle_link_data(transport, &packet)
            } else {
                handle_generic_data(transport, &packet, from)
            }
        }
        PacketType::Proof => {
            if packet.destination_type == DestinationType::Link {
                handle_link_proof(transport, &packet, from)
            } else {
                handle_receipt_proof(transport, &packet)
            }
        }
    }
}

fn handle_announce(transport: &Transport, packet: &Packet, from: InterfaceId) -> Vec<TransportEvent> {
    // The reference's announce payload does not carry its own timestamp
    // field; "newer wins" is judged by local reception time instead (§9
    // open question 3 covers the clock source, not the missing wire field).
    let announce = match DestinationAnnounce::validate(packet.destination, &packet.data, packet.context_flag) {
        Ok(a) => a,
        Err(err) => {
            log::warn!("dropping announce for {} with invalid signature: {err}", packet.destination);
            return Vec::new();
        }
    };

    transport.0.identities.lock().expect("identity cache poisoned").remember(announce.identity);

    let now = crate::time::now_epoch_secs_u64();
    let is_new_or_newer = transport.0.path_table.lock().expect("path table poisoned").update_from_announce(
        packet.destination,
        now,
        announce.identity.address_hash(),
        packet.hops,
        from,
        packet.hash(),
        now,
    );

    if !is_new_or_newer {
        return Vec::new();
    }

    log::info!("learned path to {} via interface {:?} ({} hops)", packet.destination, from, packet.hops);

    transport.0.announce_table.lock().expect("announce table poisoned").enqueue(packet.clone(), Some(from));

    if transport.has_local_clients() {
        let forwarded = packet.with_transport_id(transport.0.own_transport_id);
        transport.forward_to_local_clients(&forwarded);
    }

    vec![TransportEvent::AnnounceAccepted {
        destination: packet.destination,
        identity: announce.identity,
        app_data: announce.app_data.clone(),
    }]
}

fn handle_link_request(transport: &Transport, packet: &Packet, from: InterfaceId) -> Vec<TransportEvent> {
    let destination = {
        let destinations = transport.0.destinations.lock().expect("destination table poisoned");
        destinations.get(&packet.destination).cloned()
    };
    let Some(destination) = destination else {
        log::trace!("link request for unknown local destination {}", packet.destination);
        return Vec::new();
    };
    if !destination.accepts_links() {
        log::trace!("destination {} does not accept links", packet.destination);
        return Vec::new();
    }

    match crate::destination::link::Link::validate_request(
        packet,
        destination.private_identity(),
        crate::packet::MTU as u32,
    ) {
        Ok((link, proof_packet)) => {
            let link_id = link.id();
            transport.0.link_table.lock().expect("link table poisoned").insert(link, from);
            transport.send_via(from, &proof_packet);
            log::debug!("link {link_id} established as responder");
            vec![TransportEvent::LinkActivated { link_id }]
        }
        Err(err) => {
            log::warn!("rejecting malformed link request for {}: {err}", packet.destination);
            Vec::new()
        }
    }
}

fn handle_link_data(transport: &Transport, packet: &Packet) -> Vec<TransportEvent> {
    let link_id = LinkId::from(packet.destination);

    {
        let mut link_table = transport.0.link_table.lock().expect("link table poisoned");
        let Some(link) = link_table.get_mut(&link_id) else {
            log::trace!("data packet for unknown link {link_id}");
            return Vec::new();
        };
        // Only a keepalive may revive a STALE link; any other traffic just
        // resets the idle clock and leaves the status (and decrypt gate)
        // where it was.
        if packet.context == PacketContext::KeepAlive {
            link.revive_on_keepalive();
        } else {
            link.touch_last_inbound();
        }
    }

    if matches!(
        packet.context,
        PacketContext::Resource | PacketContext::ResourceAdvertisement | PacketContext::ResourceProof
    ) {
        let (events, to_send) = {
            let link_table = transport.0.link_table.lock().expect("link table poisoned");
            let Some(link) = link_table.get(&link_id) else { return Vec::new() };
            let mut resources = transport.0.resources.lock().expect("resource table poisoned");
            let manager = resources.entry(link_id).or_default();
            let events = manager.handle_packet(packet, link);
            (events, manager.take_pending_outbound())
        };
        for proof_packet in to_send {
            transport.outbound(proof_packet);
        }
        return events.into_iter().map(TransportEvent::Resource).collect();
    }

    if packet.context == PacketContext::KeepAlive {
        log::trace!("keepalive on link {link_id}");
        return Vec::new();
    }

    let link_table = transport.0.link_table.lock().expect("link table poisoned");
    let Some(link) = link_table.get(&link_id) else { return Vec::new() };
    match link.decrypt(&packet.data) {
        Ok(data) => vec![TransportEvent::LinkData { link_id, data }],
        Err(err) => {
            log::warn!("link {link_id} failed to decrypt data packet: {err}");
            Vec::new()
        }
    }
}

fn handle_generic_data(transport: &Transport, packet: &Packet, from: InterfaceId) -> Vec<TransportEvent> {
    let destination = {
        let destinations = transport.0.destinations.lock().expect("destination table poisoned");
        destinations.get(&packet.destination).cloned()
    };

    let Some(destination) = destination else {
        return forward_if_not_local(transport, packet, from);
    };

    match destination.handle_data(packet) {
        Ok(DestinationHandleStatus::Delivered(data)) => {
            vec![TransportEvent::Delivered { destination: packet.destination, data }]
        }
        Ok(_) => Vec::new(),
        Err(err) => {
            log::warn!("failed to deliver data for {}: {err}", packet.destination);
            Vec::new()
        }
    }
}

/// Neither a LINK nor a locally registered destination: either a broadcast
/// PLAIN packet (e.g. a path request) needing the local-client/peer
/// forwarding split, or — if this node acts as a transport — a packet to
/// forward one more hop toward its destination.
fn forward_if_not_local(transport: &Transport, packet: &Packet, from: InterfaceId) -> Vec<TransportEvent> {
    if packet.destination_type == DestinationType::Plain && packet.propagation_type == PropagationType::Broadcast {
        let source_is_local_client = transport
            .0
            .interfaces
            .lock()
            .expect("interface table poisoned")
            .get(from)
            .map(|r| r.is_local_client)
            .unwrap_or(false);

        if source_is_local_client {
            transport.broadcast_except(packet, Some(from));
        } else {
            transport.forward_to_local_clients(packet);
        }
        return Vec::new();
    }

    if !transport.0.config.enable_transport {
        return Vec::new();
    }

    let forwarded = packet.with_hops_incremented().with_transport_id(transport.0.own_transport_id);
    transport.outbound(forwarded);
    Vec::new()
}

fn handle_link_proof(transport: &Transport, packet: &Packet, from: InterfaceId) -> Vec<TransportEvent> {
    let link_id = LinkId::from(packet.destination);

    if packet.context == PacketContext::ResourceProof {
        let (events, to_send) = {
            let link_table = transport.0.link_table.lock().expect("link table poisoned");
            let Some(link) = link_table.get(&link_id) else { return Vec::new() };
            let mut resources = transport.0.resources.lock().expect("resource table poisoned");
            let manager = resources.entry(link_id).or_default();
            let events = manager.handle_packet(packet, link);
            (events, manager.take_pending_outbound())
        };
        for proof_packet in to_send {
            transport.outbound(proof_packet);
        }
        return events.into_iter().map(TransportEvent::Resource).collect();
    }

    // LinkRequestProof: the initiator side activating a pending handshake.
    match transport.0.link_table.lock().expect("link table poisoned").activate_pending(&link_id, packet, from) {
        Ok(()) => {
            log::debug!("link {link_id} activated as initiator");
            vec![TransportEvent::LinkActivated { link_id }]
        }
        Err(_) => {
            log::trace!("proof for unknown or already-active link {link_id}");
            Vec::new()
        }
    }
}

fn handle_receipt_proof(transport: &Transport, packet: &Packet) -> Vec<TransportEvent> {
    let expected_hash = packet.destination;
    let delivered =
        transport.0.receipts.lock().expect("receipts table poisoned").handle_proof(&expected_hash, packet.data.clone());

    if delivered {
        vec![TransportEvent::ReceiptDelivered { packet_hash: expected_hash }]
    } else {
        log::trace!("proof for {expected_hash} matched no outstanding receipt");
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use crate::destination::{Destination, DestinationName, In, Single};
    use crate::hash::AddressHash;
    use crate::iface::{Interface, TxMessage};
    use crate::identity::{HashIdentity, PrivateIdentity};
    use crate::transport::config::TransportConfig;
    use crate::transport::Transport;

    struct FakeInterface {
        online: AtomicBool,
    }

    impl Interface for FakeInterface {
        fn name(&self) -> &str {
            "fake0"
        }
        fn start(&self, _scope: CancellationToken) {
            self.online.store(true, Ordering::Relaxed);
        }
        fn detach(&self) {
            self.online.store(false, Ordering::Relaxed);
        }
        fn process_outgoing(&self, _tx: &TxMessage) {}
        fn online(&self) -> bool {
            self.online.load(Ordering::Relaxed)
        }
        fn bitrate(&self) -> u64 {
            1_000_000
        }
        fn hw_mtu(&self) -> usize {
            500
        }
    }

    fn test_transport() -> Transport {
        Transport::with_config(AddressHash::digest(b"node"), TransportConfig::default())
    }

    #[test]
    fn duplicate_packets_are_suppressed_after_the_first() {
        let transport = test_transport();
        let iface = transport.register_interface(Arc::new(FakeInterface { online: AtomicBool::new(true) }), false);

        let priv_id = PrivateIdentity::new_random();
        let destination: Destination<PrivateIdentity, crate::destination::Out, Single> =
            Destination::new(priv_id, DestinationName::new("lxmf", &["delivery"]));
        let packet = destination.announce(b"app-data", false).expect("announce");
        let bytes = packet.pack(crate::packet::MTU).expect("pack");

        let first = transport.inbound(&bytes, iface);
        assert!(!first.is_empty());

        let second = transport.inbound(&bytes, iface);
        assert!(second.is_empty());
    }

    #[test]
    fn malformed_frames_are_dropped_without_panicking() {
        let transport = test_transport();
        let iface = transport.register_interface(Arc::new(FakeInterface { online: AtomicBool::new(true) }), false);
        assert!(transport.inbound(&[0xFF; 3], iface).is_empty());
    }

    #[test]
    fn announce_learns_a_path_and_remembers_the_identity() {
        let transport = test_transport();
        let iface = transport.register_interface(Arc::new(FakeInterface { online: AtomicBool::new(true) }), false);

        let priv_id = PrivateIdentity::new_random();
        let identity_hash = priv_id.address_hash();
        let destination: Destination<PrivateIdentity, crate::destination::Out, Single> =
            Destination::new(priv_id, DestinationName::new("lxmf", &["delivery"]));
        let packet = destination.announce(b"app-data", false).expect("announce");
        let bytes = packet.pack(crate::packet::MTU).expect("pack");

        assert!(!transport.has_path(&destination.hash()));
        transport.inbound(&bytes, iface);
        assert!(transport.has_path(&destination.hash()));
        assert!(transport.known_identity(&identity_hash).is_some());
    }

    #[test]
    fn data_for_an_unregistered_destination_is_dropped() {
        let transport = test_transport();
        let iface = transport.register_interface(Arc::new(FakeInterface { online: AtomicBool::new(true) }), false);

        let remote = PrivateIdentity::new_random();
        let ciphertext = remote.public().encrypt(b"hello").expect("encrypt");
        let packet = crate::packet::Packet::new(
            crate::packet::HeaderType::Type1,
            crate::packet::PropagationType::Broadcast,
            crate::packet::DestinationType::Single,
            crate::packet::PacketType::Data,
            0,
            remote.address_hash(),
            None,
            crate::packet::PacketContext::None,
            ciphertext,
        )
        .expect("build packet");
        let bytes = packet.pack(crate::packet::MTU).expect("pack");

        assert!(transport.inbound(&bytes, iface).is_empty());
    }

    #[test]
    fn data_for_a_registered_destination_is_delivered() {
        let transport = test_transport();
        let iface = transport.register_interface(Arc::new(FakeInterface { online: AtomicBool::new(true) }), false);

        let priv_id = PrivateIdentity::new_random();
        let in_dest: Destination<PrivateIdentity, In, Single> =
            Destination::new(priv_id, DestinationName::new("lxmf", &["delivery"]));
        let dest_hash = in_dest.hash();
        let public = in_dest.identity.public().clone();
        transport.register_destination(Arc::new(in_dest));

        let ciphertext = public.encrypt(b"hello").expect("encrypt");
        let packet = crate::packet::Packet::new(
            crate::packet::HeaderType::Type1,
            crate::packet::PropagationType::Broadcast,
            crate::packet::DestinationType::Single,
            crate::packet::PacketType::Data,
            0,
            dest_hash,
            None,
            crate::packet::PacketContext::None,
            ciphertext,
        )
        .expect("build packet");
        let bytes = packet.pack(crate::packet::MTU).expect("pack");

        let events = transport.inbound(&bytes, iface);
        match events.as_slice() {
            [super::TransportEvent::Delivered { data, .. }] => assert_eq!(data, b"hello"),
            other => panic!("unexpected events: {other:?}"),
        }
    }
}
