//! LXMRouter (§4.K): owns the outbound queue and the three delivery
//! strategies for a single local LXMF delivery identity. A client-side
//! counterpart only — propagation-node submission and retrieval against a
//! third-party node live in `crate::propagation`, and running a node
//! yourself is out of scope here.

pub mod jobs;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use reticulum::destination::link::LinkId;
use reticulum::destination::{Destination, DestinationName, In, Out, Single};
use reticulum::hash::{AddressHash, Hash};
use reticulum::identity::PrivateIdentity;
use reticulum::transport::{Transport, TransportEvent};

use crate::constants::{
    DELIVERY_RETRY_WAIT, MAX_DELIVERY_ATTEMPTS, MAX_PATHLESS_TRIES, PATH_REQUEST_WAIT,
    WORKBLOCK_EXPAND_ROUNDS,
};
use crate::error::LxmfError;
use crate::message::delivery::decide_delivery;
use crate::message::{LXMessage, MessageMethod, State, TransportMethod};
use crate::stamper;

const LINK_DATA_TAG_MESSAGE: u8 = 0x00;
const LINK_DATA_TAG_PROOF: u8 = 0x01;

/// Both directions of the same Destination (`reticulum` splits `announce`
/// onto `Out` and `handle_packet` onto `In`), built from the same identity
/// so they share a hash. The inbound half is registered with Transport
/// directly via its blanket `LocalDestination` impl, no adapter needed.
struct DeliveryIdentity {
    out: Destination<PrivateIdentity, Out, Single>,
    inbound: Arc<Destination<PrivateIdentity, In, Single>>,
    hash: AddressHash,
}

impl DeliveryIdentity {
    fn new(identity: PrivateIdentity) -> Result<Self, LxmfError> {
        let secret = identity.to_secret_bytes();
        let inbound_identity = PrivateIdentity::from_secret_bytes(&secret)?;
        let out: Destination<PrivateIdentity, Out, Single> =
            Destination::new(identity, DestinationName::new("lxmf", &["delivery"]));
        let mut inbound: Destination<PrivateIdentity, In, Single> =
            Destination::new(inbound_identity, DestinationName::new("lxmf", &["delivery"]));
        inbound.set_accepts_links(true);
        let hash = out.hash();
        Ok(Self { out, inbound: Arc::new(inbound), hash })
    }
}

#[derive(Debug, Clone)]
pub enum RouterEvent {
    StateChanged { message_hash: Hash, from: State, to: State },
    Delivered { message_hash: Hash },
    Failed { message_hash: Hash, reason: FailureReason },
    /// A message addressed to our own delivery destination arrived — the
    /// inbound half of a delivery_callback in the reference design.
    Received { message: LXMessage },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    RetryBudgetExceeded,
    LinkError,
    ContentTooLarge,
}

struct PendingOutbound {
    message: LXMessage,
    attempts: u32,
    next_attempt: Instant,
    link_id: Option<LinkId>,
    /// SHA-256 of the packed wire bytes last sent over a Link as a Packet;
    /// matched against an inbound proof's payload to confirm delivery.
    wire_hash: Option<Hash>,
    /// The Resource transfer's content hash, when representation=Resource.
    resource_hash: Option<Hash>,
    /// An in-flight background stamp search for a Propagated message, if one
    /// has been kicked off.
    stamp_search: Option<StampSearch>,
}

/// A stamp search running on its own OS thread rather than blocking the
/// outbound processor's tick (§5: stamp search is CPU-bound and runs off the
/// async reactor). Dropping a search (a message failing or being delivered
/// before the search completes) flips `cancel`, so an unsatisfiable cost
/// never leaks a thread running forever (§8: "cost 256 unsatisfiable; search
/// must be cancellable").
struct StampSearch {
    cancel: Arc<AtomicBool>,
    result: Arc<Mutex<Option<Option<Vec<u8>>>>>,
}

impl StampSearch {
    fn spawn(material: Vec<u8>, cost: u32, expand_rounds: usize) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let result: Arc<Mutex<Option<Option<Vec<u8>>>>> = Arc::new(Mutex::new(None));
        let cancel_bg = cancel.clone();
        let result_bg = result.clone();
        std::thread::spawn(move || {
            let stamp = stamper::generate_stamp_cancellable(&material, cost, expand_rounds, &cancel_bg);
            *result_bg.lock().expect("stamp result mutex poisoned") = Some(stamp);
        });
        Self { cancel, result }
    }

    /// `None` = still running, `Some(None)` = gave up (cancelled or no
    /// worker found a hit before cancellation), `Some(Some(stamp))` = done.
    fn poll(&self) -> Option<Option<Vec<u8>>> {
        self.result.lock().expect("stamp result mutex poisoned").clone()
    }
}

impl Drop for StampSearch {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

struct RouterInner {
    transport: Transport,
    delivery: DeliveryIdentity,
    pending: Mutex<Vec<PendingOutbound>>,
    /// Stamp cost advertised by propagation nodes we've heard announce,
    /// keyed by the node's delivery destination hash (§4.K `outbound_stamp_costs`).
    stamp_costs: Mutex<HashMap<AddressHash, u32>>,
}

/// Cheap-clone handle, mirroring `reticulum::transport::Transport`'s shape.
#[derive(Clone)]
pub struct Router(Arc<RouterInner>);

impl Router {
    pub fn new(transport: Transport, identity: PrivateIdentity) -> Result<Self, LxmfError> {
        let delivery = DeliveryIdentity::new(identity)?;
        let router = Self(Arc::new(RouterInner {
            transport,
            delivery,
            pending: Mutex::new(Vec::new()),
            stamp_costs: Mutex::new(HashMap::new()),
        }));
        router.register();
        Ok(router)
    }

    fn register(&self) {
        self.0.transport.register_destination(self.0.delivery.inbound.clone());
    }

    pub fn hash(&self) -> AddressHash {
        self.0.delivery.hash
    }

    /// Build a message addressed from this router's own identity, ready for
    /// `handle_outbound`.
    pub fn create_message(
        &self,
        destination_hash: AddressHash,
        title: impl Into<Vec<u8>>,
        content: impl Into<Vec<u8>>,
        fields: crate::message::Fields,
    ) -> LXMessage {
        LXMessage::new(destination_hash, self.hash(), title, content, fields)
    }

    pub fn announce(&self, app_data: &[u8]) -> Result<(), reticulum::error::RnsError> {
        let packet = self.0.delivery.out.announce(app_data, false)?;
        self.0.transport.outbound(packet);
        Ok(())
    }

    /// Outbound entry point (§4.K): mark OUTBOUND, enqueue, return the
    /// message hash callers use to correlate later `RouterEvent`s.
    pub fn handle_outbound(&self, mut message: LXMessage) -> Result<Hash, LxmfError> {
        message.state = State::Outbound;
        let hash = message.hash()?;
        self.0.pending.lock().expect("pending outbound mutex poisoned").push(PendingOutbound {
            message,
            attempts: 0,
            next_attempt: Instant::now(),
            link_id: None,
            wire_hash: None,
            resource_hash: None,
            stamp_search: None,
        });
        Ok(hash)
    }

    /// Drive every pending message one step forward. Meant to be polled
    /// regularly by `router::jobs::spawn` and additionally kicked whenever
    /// `handle_transport_event` sees something a pending message was
    /// waiting on.
    pub fn process_outbound(&self) -> Vec<RouterEvent> {
        let mut events = Vec::new();
        let mut pending = self.0.pending.lock().expect("pending outbound mutex poisoned");
        let now = Instant::now();

        pending.retain_mut(|entry| {
            let method = entry.message.desired_method;
            let outcome = match method {
                TransportMethod::Direct | TransportMethod::Propagated => self.step_direct(entry, now),
                TransportMethod::Opportunistic => self.step_opportunistic(entry, now),
                TransportMethod::Paper => StepOutcome::Failed(FailureReason::ContentTooLarge),
            };

            match outcome {
                StepOutcome::Pending => true,
                StepOutcome::Sent => {
                    // Settles open question #1 (§9): a bare single-packet
                    // opportunistic send with no proof mechanism in play is
                    // terminal at SENT, not promoted to DELIVERED later.
                    events.push(RouterEvent::StateChanged {
                        message_hash: entry.message.hash().unwrap_or(Hash::from_bytes([0; 32])),
                        from: State::Sending,
                        to: State::Sent,
                    });
                    false
                }
                StepOutcome::Failed(reason) => {
                    entry.message.state = State::Failed;
                    events.push(RouterEvent::Failed {
                        message_hash: entry.message.hash().unwrap_or(Hash::from_bytes([0; 32])),
                        reason,
                    });
                    false
                }
            }
        });

        events
    }

    fn step_direct(&self, entry: &mut PendingOutbound, _now: Instant) -> StepOutcome {
        let destination_hash = entry.message.destination_hash;

        let link_id = match entry.link_id {
            Some(id) => id,
            None => {
                if !self.0.transport.has_path(&destination_hash) {
                    self.0.transport.request_path(destination_hash);
                    return StepOutcome::Pending;
                }
                let Some(identity) = self.0.transport.known_identity(&destination_hash) else {
                    self.0.transport.request_path(destination_hash);
                    return StepOutcome::Pending;
                };
                let link_id = self.0.transport.open_link(destination_hash, &identity, 0);
                entry.link_id = Some(link_id);
                return StepOutcome::Pending;
            }
        };

        match self.0.transport.link_status(link_id) {
            Some(reticulum::destination::link::LinkStatus::Active) => {}
            Some(reticulum::destination::link::LinkStatus::Closed) | None => {
                return StepOutcome::Failed(FailureReason::LinkError);
            }
            _ => return StepOutcome::Pending,
        }

        if entry.message.signature.is_some() && (entry.wire_hash.is_some() || entry.resource_hash.is_some()) {
            return StepOutcome::Pending;
        }

        if matches!(entry.message.desired_method, TransportMethod::Propagated) {
            if let Err(reason) = self.ensure_stamp(entry, destination_hash) {
                return reason;
            }
        }

        let Some(mdu) = self.0.transport.link_mdu(link_id) else {
            return StepOutcome::Failed(FailureReason::LinkError);
        };
        let decision = match decide_delivery(entry.message.desired_method, false, entry.message.content_size()) {
            Ok(decision) => decision,
            Err(_) => return StepOutcome::Failed(FailureReason::ContentTooLarge),
        };

        let wire = match entry.message.pack(&self.0.delivery.out.identity) {
            Ok(bytes) => bytes,
            Err(_) => return StepOutcome::Failed(FailureReason::ContentTooLarge),
        };

        match decision.representation {
            MessageMethod::Resource => match self.0.transport.send_resource(link_id, &wire) {
                Ok(hash) => {
                    entry.resource_hash = Some(hash);
                    entry.message.state = State::Sending;
                    StepOutcome::Pending
                }
                Err(_) => StepOutcome::Failed(FailureReason::LinkError),
            },
            MessageMethod::Packet | MessageMethod::Paper => {
                if wire.len() + 1 > mdu {
                    match self.0.transport.send_resource(link_id, &wire) {
                        Ok(hash) => {
                            entry.resource_hash = Some(hash);
                            entry.message.state = State::Sending;
                            StepOutcome::Pending
                        }
                        Err(_) => StepOutcome::Failed(FailureReason::LinkError),
                    }
                } else {
                    let mut tagged = Vec::with_capacity(1 + wire.len());
                    tagged.push(LINK_DATA_TAG_MESSAGE);
                    tagged.extend_from_slice(&wire);
                    entry.wire_hash = Some(Hash::new_from_slice(&wire));
                    entry.message.state = State::Sending;
                    match self.0.transport.link_send(link_id, &tagged) {
                        Ok(()) => StepOutcome::Pending,
                        Err(_) => StepOutcome::Failed(FailureReason::LinkError),
                    }
                }
            }
        }
    }

    /// Kicks a stamp search off on its own thread rather than blocking the
    /// outbound-processor tick, and polls whatever search is already running
    /// for this entry. Returns `Pending` both while a search is still
    /// running and on the tick that started one.
    fn ensure_stamp(&self, entry: &mut PendingOutbound, propagation_node: AddressHash) -> Result<(), StepOutcome> {
        if entry.message.stamp.is_some() {
            return Ok(());
        }
        let cost = *self.0.stamp_costs.lock().expect("stamp cost cache poisoned").get(&propagation_node).unwrap_or(&0);
        if cost == 0 {
            return Ok(());
        }

        if let Some(search) = &entry.stamp_search {
            return match search.poll() {
                None => Err(StepOutcome::Pending),
                Some(Some(stamp)) => {
                    entry.message.stamp = Some(stamp);
                    entry.stamp_search = None;
                    Ok(())
                }
                Some(None) => {
                    entry.stamp_search = None;
                    Err(StepOutcome::Failed(FailureReason::ContentTooLarge))
                }
            };
        }

        let Ok(hash) = entry.message.hash() else {
            return Err(StepOutcome::Failed(FailureReason::ContentTooLarge));
        };
        entry.stamp_search =
            Some(StampSearch::spawn(hash.as_slice().to_vec(), cost, WORKBLOCK_EXPAND_ROUNDS));
        Err(StepOutcome::Pending)
    }

    /// §4.K OPPORTUNISTIC, constants verbatim: `MAX_DELIVERY_ATTEMPTS=5`,
    /// `MAX_PATHLESS_TRIES=1`, `DELIVERY_RETRY_WAIT=10s`, `PATH_REQUEST_WAIT=7s`.
    fn step_opportunistic(&self, entry: &mut PendingOutbound, now: Instant) -> StepOutcome {
        if entry.attempts > MAX_DELIVERY_ATTEMPTS {
            return StepOutcome::Failed(FailureReason::RetryBudgetExceeded);
        }

        let destination_hash = entry.message.destination_hash;
        let has_path = self.0.transport.has_path(&destination_hash);

        if entry.attempts >= MAX_PATHLESS_TRIES && !has_path {
            self.0.transport.request_path(destination_hash);
            entry.next_attempt = now + PATH_REQUEST_WAIT;
            entry.attempts += 1;
            return StepOutcome::Pending;
        }

        if entry.attempts == MAX_PATHLESS_TRIES + 1 && has_path {
            self.0.transport.request_path(destination_hash);
            entry.next_attempt = now + PATH_REQUEST_WAIT;
            return StepOutcome::Pending;
        }

        if now < entry.next_attempt {
            return StepOutcome::Pending;
        }

        let Some(identity) = self.0.transport.known_identity(&destination_hash) else {
            self.0.transport.request_path(destination_hash);
            entry.next_attempt = now + PATH_REQUEST_WAIT;
            entry.attempts += 1;
            return StepOutcome::Pending;
        };

        entry.attempts += 1;
        entry.next_attempt = now + DELIVERY_RETRY_WAIT;

        let wire = match entry.message.pack(&self.0.delivery.out.identity) {
            Ok(bytes) => bytes,
            Err(_) => return StepOutcome::Failed(FailureReason::ContentTooLarge),
        };
        let Ok(ciphertext) = identity.encrypt(&wire) else {
            return StepOutcome::Failed(FailureReason::ContentTooLarge);
        };
        let Ok(packet) = reticulum::packet::Packet::new(
            reticulum::packet::HeaderType::Type1,
            reticulum::packet::PropagationType::Broadcast,
            reticulum::packet::DestinationType::Single,
            reticulum::packet::PacketType::Data,
            0,
            destination_hash,
            None,
            reticulum::packet::PacketContext::None,
            ciphertext,
        ) else {
            return StepOutcome::Failed(FailureReason::ContentTooLarge);
        };

        entry.message.state = State::Sending;
        self.0.transport.outbound(packet);
        // Open question (see design notes): the reference sometimes treats a
        // sent opportunistic packet with no proof request as SENT and
        // sometimes DELIVERED. We settle for SENT here and let an explicit
        // proof (if one arrives) promote it later; nothing currently sends
        // one back for a bare encrypted single packet, so SENT is terminal.
        entry.message.state = State::Sent;
        StepOutcome::Sent
    }

    /// React to whatever Transport observed (§4.K: "the announce handler...
    /// sets that message's next_delivery_attempt = now and kicks the
    /// outbound processor"). A simplification from the reference's
    /// aspect-filtered subscription: since `TransportEvent` doesn't carry
    /// the announced name's aspects, we match on destination hash against
    /// what's actually pending instead of subscribing to `"lxmf.delivery"`
    /// by name.
    pub fn handle_transport_event(&self, event: &TransportEvent) -> Vec<RouterEvent> {
        match event {
            TransportEvent::AnnounceAccepted { destination, app_data, .. } => {
                if let Ok(value) = rmpv::decode::read_value(&mut &app_data[..]) {
                    if let rmpv::Value::Integer(cost) = value {
                        if let Some(cost) = cost.as_u64() {
                            self.0.stamp_costs.lock().expect("stamp cost cache poisoned").insert(*destination, cost as u32);
                        }
                    }
                }

                let now = Instant::now();
                let mut pending = self.0.pending.lock().expect("pending outbound mutex poisoned");
                for entry in pending.iter_mut() {
                    if entry.message.destination_hash == *destination {
                        entry.next_attempt = now;
                    }
                }
                drop(pending);
                self.process_outbound()
            }
            TransportEvent::LinkData { link_id, data } => self.handle_link_data(*link_id, data),
            TransportEvent::LinkClosed { link_id, .. } => self.handle_link_closed(*link_id),
            TransportEvent::Resource(resource_event) => self.handle_resource_event(resource_event),
            TransportEvent::Delivered { destination, data } => self.handle_single_packet_delivery(*destination, data),
            _ => Vec::new(),
        }
    }

    fn handle_link_data(&self, link_id: LinkId, data: &[u8]) -> Vec<RouterEvent> {
        let Some((tag, rest)) = data.split_first() else { return Vec::new() };

        match *tag {
            LINK_DATA_TAG_MESSAGE => {
                let Some(identity) = self
                    .0
                    .transport
                    .link_remote_destination(link_id)
                    .and_then(|remote| self.0.transport.known_identity(&remote))
                else {
                    return Vec::new();
                };
                let Ok(message) = LXMessage::unpack(rest, &identity) else { return Vec::new() };

                let Ok(hash) = message.hash() else { return Vec::new() };
                let mut proof = Vec::with_capacity(1 + hash.as_slice().len());
                proof.push(LINK_DATA_TAG_PROOF);
                proof.extend_from_slice(hash.as_slice());
                let _ = self.0.transport.link_send(link_id, &proof);

                vec![RouterEvent::Received { message }]
            }
            LINK_DATA_TAG_PROOF => {
                if rest.len() != 32 {
                    return Vec::new();
                }
                self.mark_delivered_by_wire_hash(link_id, rest.to_vec())
            }
            _ => Vec::new(),
        }
    }

    fn mark_delivered_by_wire_hash(&self, link_id: LinkId, proof_hash: Vec<u8>) -> Vec<RouterEvent> {
        let mut events = Vec::new();
        let mut pending = self.0.pending.lock().expect("pending outbound mutex poisoned");
        for entry in pending.iter_mut() {
            if entry.link_id != Some(link_id) {
                continue;
            }
            if let Some(wire_hash) = entry.wire_hash {
                if wire_hash.as_slice() == proof_hash.as_slice() {
                    entry.message.state = State::Delivered;
                    if let Ok(hash) = entry.message.hash() {
                        events.push(RouterEvent::Delivered { message_hash: hash });
                    }
                }
            }
        }
        pending.retain(|entry| entry.message.state != State::Delivered);
        events
    }

    fn handle_link_closed(&self, link_id: LinkId) -> Vec<RouterEvent> {
        let mut events = Vec::new();
        let mut pending = self.0.pending.lock().expect("pending outbound mutex poisoned");
        for entry in pending.iter_mut() {
            if entry.link_id == Some(link_id) && entry.message.state != State::Delivered {
                entry.message.state = State::Failed;
                if let Ok(hash) = entry.message.hash() {
                    events.push(RouterEvent::Failed { message_hash: hash, reason: FailureReason::LinkError });
                }
            }
        }
        pending.retain(|entry| entry.message.state != State::Failed);
        events
    }

    fn handle_resource_event(&self, event: &reticulum::resource::manager::ResourceEvent) -> Vec<RouterEvent> {
        use reticulum::resource::manager::ResourceEvent;
        match event {
            ResourceEvent::OutboundComplete { hash } => {
                let mut events = Vec::new();
                let mut pending = self.0.pending.lock().expect("pending outbound mutex poisoned");
                for entry in pending.iter_mut() {
                    if entry.resource_hash == Some(*hash) {
                        entry.message.state = State::Delivered;
                        if let Ok(message_hash) = entry.message.hash() {
                            events.push(RouterEvent::Delivered { message_hash });
                        }
                    }
                }
                pending.retain(|entry| entry.message.state != State::Delivered);
                events
            }
            ResourceEvent::Complete { data, .. } => {
                let Some(source_hash) = data.get(16..32).and_then(AddressHash::from_slice) else {
                    return Vec::new();
                };
                let Some(identity) = self.0.transport.known_identity(&source_hash) else { return Vec::new() };
                match LXMessage::unpack(data, &identity) {
                    Ok(message) => vec![RouterEvent::Received { message }],
                    Err(_) => Vec::new(),
                }
            }
            _ => Vec::new(),
        }
    }

    fn handle_single_packet_delivery(&self, destination: AddressHash, data: &[u8]) -> Vec<RouterEvent> {
        if destination != self.hash() {
            return Vec::new();
        }
        let Some(source_hash) = data.get(16..32).and_then(AddressHash::from_slice) else { return Vec::new() };
        let Some(identity) = self.0.transport.known_identity(&source_hash) else { return Vec::new() };
        match LXMessage::unpack(data, &identity) {
            Ok(message) => vec![RouterEvent::Received { message }],
            Err(_) => Vec::new(),
        }
    }
}

enum StepOutcome {
    Pending,
    Sent,
    Failed(FailureReason),
}

#[cfg(test)]
mod tests {
    use super::*;
    use reticulum::transport::config::TransportConfig;

    fn test_router() -> (Router, Transport) {
        let transport = Transport::with_config(AddressHash::digest(b"node"), TransportConfig::default());
        let router = Router::new(transport.clone(), PrivateIdentity::new_random()).expect("router");
        (router, transport)
    }

    #[test]
    fn handle_outbound_enqueues_and_marks_state() {
        let (router, _transport) = test_router();
        let message = router.create_message(AddressHash::digest(b"dest"), "hi", "there", crate::message::Fields::new());
        let hash = router.handle_outbound(message).expect("enqueue");
        assert_eq!(hash.as_slice().len(), 32);
        assert_eq!(router.0.pending.lock().unwrap().len(), 1);
    }

    #[test]
    fn opportunistic_without_path_requests_one_and_defers() {
        let (router, _transport) = test_router();
        let message = router
            .create_message(AddressHash::digest(b"dest"), "hi", "there", crate::message::Fields::new())
            .with_desired_method(TransportMethod::Opportunistic);
        router.handle_outbound(message).expect("enqueue");

        let events = router.process_outbound();
        assert!(events.is_empty());
        let pending = router.0.pending.lock().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
    }

    #[test]
    fn direct_without_path_requests_one_and_defers() {
        let (router, _transport) = test_router();
        let message = router
            .create_message(AddressHash::digest(b"dest"), "hi", "there", crate::message::Fields::new())
            .with_desired_method(TransportMethod::Direct);
        router.handle_outbound(message).expect("enqueue");

        let events = router.process_outbound();
        assert!(events.is_empty());
        assert!(router.0.pending.lock().unwrap()[0].link_id.is_none());
    }

    #[test]
    fn retry_budget_exceeded_fails_opportunistic_message() {
        let (router, _transport) = test_router();
        let message = router
            .create_message(AddressHash::digest(b"dest"), "hi", "there", crate::message::Fields::new())
            .with_desired_method(TransportMethod::Opportunistic);
        router.handle_outbound(message).expect("enqueue");
        router.0.pending.lock().unwrap()[0].attempts = MAX_DELIVERY_ATTEMPTS + 1;

        let events = router.process_outbound();
        assert!(matches!(events.as_slice(), [RouterEvent::Failed { reason: FailureReason::RetryBudgetExceeded, .. }]));
        assert!(router.0.pending.lock().unwrap().is_empty());
    }

    #[test]
    fn dropping_a_stamp_search_cancels_its_background_thread() {
        // Cost 256 is unsatisfiable in practice; dropping the search must
        // still let the spawned thread observe cancellation and exit rather
        // than spin forever (§8).
        let search = StampSearch::spawn(b"material".to_vec(), 256, 4);
        let cancel = search.cancel.clone();
        drop(search);
        assert!(cancel.load(Ordering::Relaxed));
    }

    #[test]
    fn stamp_search_eventually_reports_a_found_stamp() {
        let search = StampSearch::spawn(b"material".to_vec(), 1, 4);
        let stamp = loop {
            if let Some(result) = search.poll() {
                break result;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        };
        assert!(stamp.is_some());
    }
}
