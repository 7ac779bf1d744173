//! The abstract `Interface` contract (§4.E/§6): send/receive framed bytes,
//! online/detached state, optional IFAC credentials, and lifecycle scope.
//! No concrete transport (TCP/UDP/BLE/LoRa/I2P) lives here; those are
//! external collaborators per spec §1/§6.

pub mod hdlc;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::hash::AddressHash;

/// Interface-derived authentication credentials (IFAC), computed by the
/// host from a network name/passphrase pair. Opaque to the core beyond
/// "does a packet carry one and does it match."
#[derive(Debug, Clone)]
pub struct IfacCredentials {
    pub network_name: String,
    pub key: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMessageType {
    /// Send to one specific remote (or the remembered receiving interface).
    Direct,
    /// Flood to every interface flagged broadcast-capable, excluding the
    /// interface the packet arrived from (if any).
    Broadcast,
}

/// An outbound frame handed from Transport to an interface for writing.
#[derive(Debug, Clone)]
pub struct TxMessage {
    pub tx_type: TxMessageType,
    pub bytes: Vec<u8>,
}

/// An inbound frame an interface delivers to Transport, tagged with the
/// interface it arrived on.
#[derive(Debug, Clone)]
pub struct RxMessage {
    pub interface: InterfaceId,
    pub bytes: Vec<u8>,
}

/// Handle identifying a registered interface; interchangeable with the
/// 16-byte transport-id form used when Transport stamps a forwarded packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceId(pub(crate) u64);

impl InterfaceId {
    /// Sentinel meaning "no interface known yet" (e.g. a link opened before
    /// any path to its destination has been learned). Never assigned by
    /// `next_interface_id`, which starts counting at 1.
    pub const UNKNOWN: InterfaceId = InterfaceId(0);

    pub fn as_address_hash(&self) -> AddressHash {
        AddressHash::digest(&self.0.to_be_bytes())
    }
}

static NEXT_INTERFACE_ID: AtomicU64 = AtomicU64::new(1);

fn next_interface_id() -> InterfaceId {
    InterfaceId(NEXT_INTERFACE_ID.fetch_add(1, Ordering::Relaxed))
}

/// The contract every concrete transport (TCP/UDP/I2P/BLE/LoRa) implements.
/// `start`/`detach` are lifecycle hooks; `process_outgoing` writes one
/// already-framed message; liveness/MTU/capability are plain properties an
/// interface reports so Transport can make routing decisions without
/// knowing the transport's internals.
pub trait Interface: Send + Sync {
    fn name(&self) -> &str;

    /// Begin the interface's read/accept loop under `scope`. Implementors
    /// are expected to honor `scope`'s cancellation and return within the
    /// shutdown budget (§5: under 1 second of parent cancel).
    fn start(&self, scope: CancellationToken);

    /// Detach/stop without necessarily being a parent-driven cancellation
    /// (e.g. an explicit user-requested interface teardown).
    fn detach(&self);

    fn process_outgoing(&self, tx: &TxMessage);

    fn online(&self) -> bool;
    fn bitrate(&self) -> u64;
    fn hw_mtu(&self) -> usize;
    fn supports_link_mtu_discovery(&self) -> bool {
        false
    }
    fn can_receive(&self) -> bool {
        true
    }
    fn can_send(&self) -> bool {
        true
    }
    fn is_broadcast_capable(&self) -> bool {
        true
    }
    fn ifac(&self) -> Option<&IfacCredentials> {
        None
    }
}

/// Bookkeeping Transport keeps per registered interface: the trait object
/// plus liveness metadata not worth putting on the trait itself.
pub struct RegisteredInterface {
    pub id: InterfaceId,
    pub interface: Arc<dyn Interface>,
    pub is_local_client: bool,
    detached: AtomicBool,
}

impl RegisteredInterface {
    pub fn new(interface: Arc<dyn Interface>, is_local_client: bool) -> Self {
        Self { id: next_interface_id(), interface, is_local_client, detached: AtomicBool::new(false) }
    }

    pub fn detach(&self) {
        self.interface.detach();
        self.detached.store(true, Ordering::Relaxed);
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Relaxed)
    }
}

/// Transport's registry of live interfaces: registration/deregistration and
/// the two broadcast-forwarding rules from §4.F ("forward to all other
/// interfaces" / "forward to all local clients").
#[derive(Default)]
pub struct InterfaceManager {
    interfaces: Vec<Arc<RegisteredInterface>>,
}

impl InterfaceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, interface: Arc<dyn Interface>, is_local_client: bool) -> InterfaceId {
        let registered = Arc::new(RegisteredInterface::new(interface, is_local_client));
        let id = registered.id;
        self.interfaces.push(registered);
        id
    }

    pub fn deregister(&mut self, id: InterfaceId) {
        if let Some(pos) = self.interfaces.iter().position(|i| i.id == id) {
            let removed = self.interfaces.remove(pos);
            removed.detach();
        }
    }

    pub fn get(&self, id: InterfaceId) -> Option<&Arc<RegisteredInterface>> {
        self.interfaces.iter().find(|i| i.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RegisteredInterface>> {
        self.interfaces.iter()
    }

    pub fn broadcast_capable(&self) -> impl Iterator<Item = &Arc<RegisteredInterface>> {
        self.interfaces.iter().filter(|i| i.interface.is_broadcast_capable() && !i.is_detached())
    }

    pub fn local_clients(&self) -> impl Iterator<Item = &Arc<RegisteredInterface>> {
        self.interfaces.iter().filter(|i| i.is_local_client && !i.is_detached())
    }

    pub fn has_local_clients(&self) -> bool {
        self.interfaces.iter().any(|i| i.is_local_client && !i.is_detached())
    }

    /// Remove interfaces that report themselves offline and are not
    /// currently retrying a reconnect (`transport::jobs`'s periodic sweep).
    pub fn cleanup(&mut self) {
        self.interfaces.retain(|i| !i.is_detached());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool as StdAtomicBool;

    struct FakeInterface {
        name: String,
        online: StdAtomicBool,
    }

    impl Interface for FakeInterface {
        fn name(&self) -> &str {
            &self.name
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
            crate::packet::MTU
        }
    }

    #[test]
    fn register_then_deregister_removes_interface() {
        let mut manager = InterfaceManager::new();
        let iface = Arc::new(FakeInterface { name: "test0".into(), online: StdAtomicBool::new(false) });
        let id = manager.register(iface, false);
        assert!(manager.get(id).is_some());
        manager.deregister(id);
        assert!(manager.get(id).is_none());
    }

    #[test]
    fn local_clients_are_filtered_separately() {
        let mut manager = InterfaceManager::new();
        let client = Arc::new(FakeInterface { name: "client".into(), online: StdAtomicBool::new(true) });
        let transport_iface =
            Arc::new(FakeInterface { name: "tcp0".into(), online: StdAtomicBool::new(true) });
        manager.register(client, true);
        manager.register(transport_iface, false);

        assert_eq!(manager.local_clients().count(), 1);
        assert!(manager.has_local_clients());
    }
}
