//! Transport: the routing core (§4.F). `TransportInner` owns every table
//! behind its own mutex so inbound dispatch can run on multiple worker
//! threads while each table's mutations stay serialized; `Transport` is a
//! cheap `Arc`-backed handle cloned into interfaces, jobs, and callers.

pub mod announce_table;
pub mod config;
pub mod jobs;
pub mod link_table;
pub mod path_requests;
pub mod path_table;
pub mod packet_cache;
pub mod receipt;
pub mod wire;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand_core::{OsRng, RngCore};

use crate::destination::link::{Link, LinkId, TeardownReason};
use crate::destination::{Destination, DestinationHandleStatus, In};
use crate::error::RnsError;
use crate::hash::AddressHash;
use crate::iface::{Interface, InterfaceId, InterfaceManager, TxMessage, TxMessageType};
use crate::identity::{Identity, IdentityCache, PrivateIdentity};
use crate::packet::{DestinationType, Packet, PacketType};
use crate::resource::manager::ResourceEvent;

use announce_table::AnnounceTable;
use config::TransportConfig;
use link_table::LinkTable;
use path_requests::PathRequestLimiter;
use path_table::PathTable;
use packet_cache::PacketCache;
use receipt::{receipt_timeout, ReceiptTable};

/// What an inbound packet or periodic sweep produced, for the caller to act
/// on once every table lock involved has already been released (§4.F
/// "callback invocation is dispatched off the lock").
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Delivered { destination: AddressHash, data: Vec<u8> },
    AnnounceAccepted { destination: AddressHash, identity: Identity, app_data: Vec<u8> },
    LinkPending { link_id: LinkId },
    LinkActivated { link_id: LinkId },
    LinkClosed { link_id: LinkId, reason: TeardownReason },
    LinkData { link_id: LinkId, data: Vec<u8> },
    ReceiptDelivered { packet_hash: AddressHash },
    ReceiptConcluded { packet_hash: AddressHash },
    Resource(ResourceEvent),
}

/// A locally registered destination Transport can decrypt DATA packets for
/// and, for destinations that accept links, validate LINKREQUESTs against.
/// Implemented for `Destination<PrivateIdentity, In, T>` for every `T`.
pub trait LocalDestination: Send + Sync {
    fn address_hash(&self) -> AddressHash;
    fn destination_type(&self) -> DestinationType;
    fn accepts_links(&self) -> bool;
    fn private_identity(&self) -> &PrivateIdentity;
    fn handle_data(&self, packet: &Packet) -> Result<DestinationHandleStatus, RnsError>;
}

impl<T> LocalDestination for Destination<PrivateIdentity, In, T>
where
    T: crate::destination::primitives::Type + Send + Sync + 'static,
{
    fn address_hash(&self) -> AddressHash {
        self.hash()
    }

    fn destination_type(&self) -> DestinationType {
        T::DESTINATION_TYPE
    }

    fn accepts_links(&self) -> bool {
        self.accepts_links()
    }

    fn private_identity(&self) -> &PrivateIdentity {
        &self.identity
    }

    fn handle_data(&self, packet: &Packet) -> Result<DestinationHandleStatus, RnsError> {
        self.handle_packet(packet)
    }
}

fn path_request_destination() -> AddressHash {
    AddressHash::digest(b"rns.path.request")
}

pub(crate) struct TransportInner {
    pub(crate) own_transport_id: AddressHash,
    pub(crate) config: TransportConfig,
    pub(crate) interfaces: Mutex<InterfaceManager>,
    pub(crate) path_table: Mutex<PathTable>,
    pub(crate) link_table: Mutex<LinkTable>,
    pub(crate) announce_table: Mutex<AnnounceTable>,
    pub(crate) path_limiter: Mutex<PathRequestLimiter>,
    pub(crate) packet_cache: Mutex<PacketCache>,
    pub(crate) receipts: Mutex<ReceiptTable>,
    pub(crate) identities: Mutex<IdentityCache>,
    pub(crate) destinations: Mutex<std::collections::HashMap<AddressHash, Arc<dyn LocalDestination>>>,
    pub(crate) resources: Mutex<std::collections::HashMap<LinkId, crate::resource::ResourceManager>>,
}

/// Cheap-clone handle to the routing core. Every method takes `&self`; the
/// underlying tables are reached through `Arc<TransportInner>`.
#[derive(Clone)]
pub struct Transport(pub(crate) Arc<TransportInner>);

impl Transport {
    pub fn new(own_transport_id: AddressHash, config: TransportConfig) -> Self {
        let identity_capacity = config.identity_cache_capacity;
        Self(Arc::new(TransportInner {
            own_transport_id,
            config,
            interfaces: Mutex::new(InterfaceManager::new()),
            path_table: Mutex::new(PathTable::new(Duration::from_secs(0))),
            link_table: Mutex::new(LinkTable::new()),
            announce_table: Mutex::new(AnnounceTable::new(0, Duration::ZERO, Duration::ZERO)),
            path_limiter: Mutex::new(PathRequestLimiter::new(Duration::from_secs(0))),
            packet_cache: Mutex::new(PacketCache::new(0)),
            receipts: Mutex::new(ReceiptTable::new()),
            identities: Mutex::new(IdentityCache::new(identity_capacity)),
            destinations: Mutex::new(std::collections::HashMap::new()),
            resources: Mutex::new(std::collections::HashMap::new()),
        }))
    }

    /// Build with the configured timing knobs actually applied, rather than
    /// the zeroed placeholders `new` uses before we know the config fields.
    pub fn with_config(own_transport_id: AddressHash, config: TransportConfig) -> Self {
        let transport = Self::new(own_transport_id, config);
        {
            let cfg = &transport.0.config;
            *transport.0.path_table.lock().expect("path table poisoned") =
                PathTable::new(cfg.path_expiry);
            *transport.0.announce_table.lock().expect("announce table poisoned") = AnnounceTable::new(
                cfg.announce_queue_cap,
                cfg.announce_rebroadcast_delay_min,
                cfg.announce_rebroadcast_delay_max,
            );
            *transport.0.path_limiter.lock().expect("path limiter poisoned") =
                PathRequestLimiter::new(cfg.path_request_rate_limit);
            *transport.0.packet_cache.lock().expect("packet cache poisoned") =
                PacketCache::new(cfg.packet_hashlist_max);
        }
        transport
    }

    pub fn register_interface(&self, interface: Arc<dyn Interface>, is_local_client: bool) -> InterfaceId {
        self.0.interfaces.lock().expect("interface table poisoned").register(interface, is_local_client)
    }

    pub fn deregister_interface(&self, id: InterfaceId) {
        self.0.interfaces.lock().expect("interface table poisoned").deregister(id);
    }

    pub fn register_destination(&self, destination: Arc<dyn LocalDestination>) {
        let hash = destination.address_hash();
        self.0.destinations.lock().expect("destination table poisoned").insert(hash, destination);
    }

    pub fn register_receipt(&self, packet_hash: AddressHash, hops: u8, sent_via: InterfaceId) {
        let timeout = receipt_timeout(self.0.config.first_hop_timeout, self.0.config.per_hop_timeout, hops);
        self.0.receipts.lock().expect("receipts table poisoned").register(packet_hash, timeout, sent_via);
    }

    pub fn has_path(&self, destination: &AddressHash) -> bool {
        self.0.path_table.lock().expect("path table poisoned").has_path(destination)
    }

    pub fn hops_to(&self, destination: &AddressHash) -> Option<u8> {
        self.0.path_table.lock().expect("path table poisoned").hops_to(destination)
    }

    /// Rate-limited path request broadcast. Returns `false` if suppressed by
    /// the per-destination rate limit.
    pub fn request_path(&self, destination: AddressHash) -> bool {
        let allowed =
            self.0.path_limiter.lock().expect("path limiter poisoned").try_request(destination, Instant::now());
        if !allowed {
            return false;
        }

        let packet = match Packet::new(
            crate::packet::HeaderType::Type1,
            crate::packet::PropagationType::Broadcast,
            DestinationType::Plain,
            crate::packet::PacketType::Data,
            0,
            path_request_destination(),
            None,
            crate::packet::PacketContext::CacheRequest,
            destination.as_slice().to_vec(),
        ) {
            Ok(packet) => packet,
            Err(_) => return false,
        };
        self.broadcast(&packet)
    }

    /// Inbound algorithm entry point (§4.F): unpack, suppress duplicates,
    /// dispatch by packet type. Malformed frames are silently dropped.
    pub fn inbound(&self, bytes: &[u8], from: InterfaceId) -> Vec<TransportEvent> {
        let Some(packet) = Packet::unpack(bytes) else {
            log::warn!("dropping malformed inbound frame from {:?}", from);
            return Vec::new();
        };
        wire::dispatch_inbound(self, packet, from)
    }

    /// Outbound selection (§4.F): link destinations go out their link's
    /// interface; known paths go out HEADER_2 via the recorded interface;
    /// everything else broadcasts HEADER_1 on broadcast-capable interfaces.
    /// Initiator side of a Link handshake: builds the LINKREQUEST, remembers
    /// the pending link keyed by its id, and sends the request through
    /// whatever interface/path currently reaches `remote_destination`.
    /// `remote_identity` is the responder's identity (learned from a prior
    /// announce), needed later to validate the PROOF.
    pub fn open_link(&self, remote_destination: AddressHash, remote_identity: &Identity, mtu: u32) -> LinkId {
        let (link, request) = Link::initiate(remote_destination, remote_identity, mtu);
        let link_id = link.id();
        let iface = self
            .0
            .path_table
            .lock()
            .expect("path table poisoned")
            .get(&remote_destination)
            .map(|e| e.receiving_interface)
            .unwrap_or(InterfaceId::UNKNOWN);

        self.0.link_table.lock().expect("link table poisoned").insert_pending(
            link,
            iface,
            *remote_identity,
        );
        self.outbound(request);
        link_id
    }

    /// Start a Resource transfer (§4.H) of `content` over `link_id`, an
    /// ACTIVE link this node owns. Sends the advertisement packet and every
    /// chunk the sender produces immediately (the sender has no
    /// window-based pacing); the receiver's proof routes back through
    /// `wire::handle_link_data`/`handle_link_proof` automatically.
    pub fn send_resource(&self, link_id: LinkId, content: &[u8]) -> Result<crate::hash::Hash, RnsError> {
        let (hash, adv_packet, chunks) = {
            let link_table = self.0.link_table.lock().expect("link table poisoned");
            let link = link_table.get(&link_id).ok_or(RnsError::ConnectionError)?;
            let mut resources = self.0.resources.lock().expect("resource table poisoned");
            let manager = resources.entry(link_id).or_default();
            let (hash, adv_packet) = manager.start_send(link, content)?;
            let chunks = manager.pump_outgoing(link);
            (hash, adv_packet, chunks)
        };
        self.outbound(adv_packet);
        for chunk in chunks {
            self.outbound(chunk);
        }
        Ok(hash)
    }

    /// Send `payload` encrypted over an ACTIVE link. Returns `OutOfMemory`
    /// unchanged from `Link::data_packet` when `payload` exceeds the link's
    /// MDU — callers above (e.g. LXMF's delivery-method decision) are
    /// expected to have already chosen Resource instead in that case.
    pub fn link_send(&self, link_id: LinkId, payload: &[u8]) -> Result<(), RnsError> {
        let packet = {
            let link_table = self.0.link_table.lock().expect("link table poisoned");
            let link = link_table.get(&link_id).ok_or(RnsError::ConnectionError)?;
            link.data_packet(payload)?
        };
        self.outbound(packet);
        Ok(())
    }

    pub fn link_status(&self, link_id: LinkId) -> Option<crate::destination::link::LinkStatus> {
        self.0.link_table.lock().expect("link table poisoned").get(&link_id).map(|l| l.status())
    }

    pub fn link_mdu(&self, link_id: LinkId) -> Option<usize> {
        self.0.link_table.lock().expect("link table poisoned").get(&link_id).map(|l| l.mdu())
    }

    pub fn link_remote_destination(&self, link_id: LinkId) -> Option<AddressHash> {
        self.0.link_table.lock().expect("link table poisoned").get(&link_id).map(|l| l.remote_destination())
    }

    /// Explicit teardown, e.g. an application closing a session it no longer
    /// needs (§8 scenario S6). The link lingers `Closed` until the next
    /// `remove_closed` sweep so a late duplicate proof doesn't resurrect it.
    pub fn close_link(&self, link_id: LinkId, reason: TeardownReason) {
        if let Some(link) = self.0.link_table.lock().expect("link table poisoned").get_mut(&link_id) {
            link.teardown(reason);
        }
    }

    /// An identity Transport has learned of via a past announce, keyed by
    /// its address hash — e.g. the identity a destination hash was derived
    /// from, needed to open a Link or validate a PROOF against it.
    pub fn known_identity(&self, hash: &AddressHash) -> Option<Identity> {
        self.0.identities.lock().expect("identity cache poisoned").get(hash).copied()
    }

    pub fn outbound(&self, packet: Packet) -> bool {
        if packet.destination_type == DestinationType::Link && packet.packet_type != PacketType::LinkRequest {
            let link_id = LinkId::from(packet.destination);
            let iface_id = self.0.link_table.lock().expect("link table poisoned").interface_for(&link_id);
            return match iface_id {
                Some(iface_id) => self.send_via(iface_id, &packet),
                None => false,
            };
        }

        let entry = self.0.path_table.lock().expect("path table poisoned").get(&packet.destination).cloned();
        if let Some(entry) = entry {
            let rewritten = packet.with_transport_id(self.0.own_transport_id);
            return self.send_via(entry.receiving_interface, &rewritten);
        }

        self.broadcast(&packet)
    }

    pub(crate) fn send_via(&self, iface_id: InterfaceId, packet: &Packet) -> bool {
        let interfaces = self.0.interfaces.lock().expect("interface table poisoned");
        let Some(registered) = interfaces.get(iface_id) else { return false };
        let mtu = registered.interface.hw_mtu().max(crate::packet::HEADER_MAXSIZE + 1);
        let Ok(bytes) = packet.pack(mtu) else { return false };
        registered.interface.process_outgoing(&TxMessage { tx_type: TxMessageType::Direct, bytes });
        true
    }

    pub(crate) fn broadcast_except(&self, packet: &Packet, exclude: Option<InterfaceId>) -> bool {
        let interfaces = self.0.interfaces.lock().expect("interface table poisoned");
        let mut sent = false;
        for registered in interfaces.broadcast_capable() {
            if Some(registered.id) == exclude {
                continue;
            }
            let mtu = registered.interface.hw_mtu().max(crate::packet::HEADER_MAXSIZE + 1);
            if let Ok(bytes) = packet.pack(mtu) {
                registered.interface.process_outgoing(&TxMessage { tx_type: TxMessageType::Broadcast, bytes });
                sent = true;
            }
        }
        sent
    }

    pub(crate) fn broadcast(&self, packet: &Packet) -> bool {
        self.broadcast_except(packet, None)
    }

    pub(crate) fn forward_to_local_clients(&self, packet: &Packet) {
        let interfaces = self.0.interfaces.lock().expect("interface table poisoned");
        for registered in interfaces.local_clients() {
            let mtu = registered.interface.hw_mtu().max(crate::packet::HEADER_MAXSIZE + 1);
            if let Ok(bytes) = packet.pack(mtu) {
                registered.interface.process_outgoing(&TxMessage { tx_type: TxMessageType::Direct, bytes });
            }
        }
    }

    pub(crate) fn has_local_clients(&self) -> bool {
        self.0.interfaces.lock().expect("interface table poisoned").has_local_clients()
    }

    /// Drain and retransmit every announce whose randomized rebroadcast
    /// delay has elapsed.
    pub fn process_announce_queue(&self) {
        let due = {
            let mut table = self.0.announce_table.lock().expect("announce table poisoned");
            table.due(Instant::now())
        };
        for (packet, received_on) in due {
            self.broadcast_except(&packet, received_on);
        }
    }

    /// Periodic maintenance the reference calls from its cache-trim task:
    /// sweep expired paths, stale packet-hashlist entries and receipts, and
    /// closed links. Returns events for receipts that just timed out.
    pub fn trim_memory(&self) -> Vec<TransportEvent> {
        let now_secs = crate::time::now_epoch_secs_u64();
        self.0.path_table.lock().expect("path table poisoned").sweep_expired(now_secs);
        self.0
            .packet_cache
            .lock()
            .expect("packet cache poisoned")
            .sweep(self.0.config.packet_hashlist_sweep);
        self.0.path_limiter.lock().expect("path limiter poisoned").sweep(
            Instant::now(),
            self.0.config.path_expiry,
        );
        self.0.link_table.lock().expect("link table poisoned").remove_closed();

        let concluded = self.0.receipts.lock().expect("receipts table poisoned").sweep_timeouts(Instant::now());
        concluded.into_iter().map(|packet_hash| TransportEvent::ReceiptConcluded { packet_hash }).collect()
    }

    pub(crate) fn random_packet_salt(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        OsRng.fill_bytes(&mut out);
        out
    }
}
