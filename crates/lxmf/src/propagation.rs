//! Client side of propagation-node submission and retrieval (§4.K, §6): a
//! small request/response exchange over a Link to a third-party propagation
//! node's delivery destination. `Offer` submits one already-packed, already-
//! stamped LXMessage (`for_retrieval=false`); `Sync` asks the node for
//! whatever it is holding for our identity (`for_retrieval=true`). Running a
//! propagation node yourself — storing and forwarding messages for other
//! peers — is the explicit Non-goal this module stops short of.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use reticulum::destination::link::{LinkId, LinkStatus};
use reticulum::hash::AddressHash;
use reticulum::identity::Identity;
use reticulum::transport::{Transport, TransportEvent};

use crate::error::LxmfError;

const REQUEST_OFFER: u8 = 0x00;
const REQUEST_SYNC: u8 = 0x01;
const RESPONSE_ACCEPTED: u8 = 0x00;
const RESPONSE_ENVELOPE: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// `for_retrieval=false`.
    Offer,
    /// `for_retrieval=true`.
    Sync,
}

/// The node's reply to a `Sync` request: a timestamp plus however many
/// packed LXMessage frames it had queued for us.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Envelope(f64, Vec<ByteBuf>);

#[derive(Debug, Clone)]
pub struct PropagationEnvelope {
    pub timestamp: f64,
    pub messages: Vec<Vec<u8>>,
}

pub fn pack_envelope(timestamp: f64, messages: &[Vec<u8>]) -> Result<Vec<u8>, LxmfError> {
    let envelope = Envelope(timestamp, messages.iter().cloned().map(ByteBuf::from).collect());
    rmp_serde::to_vec(&envelope).map_err(|err| LxmfError::Encode(err.to_string()))
}

pub fn unpack_envelope(bytes: &[u8]) -> Result<PropagationEnvelope, LxmfError> {
    let Envelope(timestamp, messages) =
        rmp_serde::from_slice(bytes).map_err(|err| LxmfError::Decode(err.to_string()))?;
    Ok(PropagationEnvelope { timestamp, messages: messages.into_iter().map(ByteBuf::into_vec).collect() })
}

#[derive(Debug, Clone)]
pub enum PropagationEvent {
    /// The node accepted a submitted message (response to `Offer`).
    Accepted { node: AddressHash },
    /// The node returned its queued messages (response to `Sync`).
    Synced { node: AddressHash, messages: Vec<Vec<u8>> },
    /// The link closed (or the response could not be parsed) before either
    /// of the above arrived.
    Failed { node: AddressHash },
}

struct PendingLink {
    node: AddressHash,
    kind: RequestKind,
    payload: Option<Vec<u8>>,
    sent: bool,
}

struct Inner {
    transport: Transport,
    links: Mutex<HashMap<LinkId, PendingLink>>,
}

/// Cheap-clone handle, mirroring `lxmf::router::Router`'s shape.
#[derive(Clone)]
pub struct PropagationClient(Arc<Inner>);

impl PropagationClient {
    pub fn new(transport: Transport) -> Self {
        Self(Arc::new(Inner { transport, links: Mutex::new(HashMap::new()) }))
    }

    /// §6 "Propagation node submission": open a link with `for_retrieval=false`
    /// and queue `message_wire` (already packed, stamp included if the node
    /// demanded one) to go out the instant the link activates.
    pub fn submit(&self, node: AddressHash, node_identity: &Identity, message_wire: Vec<u8>) -> LinkId {
        self.open(node, node_identity, RequestKind::Offer, Some(message_wire))
    }

    /// `for_retrieval=true`: open a link and ask the node whether it is
    /// holding anything for our identity.
    pub fn sync(&self, node: AddressHash, node_identity: &Identity) -> LinkId {
        self.open(node, node_identity, RequestKind::Sync, None)
    }

    fn open(&self, node: AddressHash, node_identity: &Identity, kind: RequestKind, payload: Option<Vec<u8>>) -> LinkId {
        let link_id = self.0.transport.open_link(node, node_identity, 0);
        self.0.links.lock().expect("propagation link table poisoned").insert(
            link_id,
            PendingLink { node, kind, payload, sent: false },
        );
        link_id
    }

    /// Drive every link waiting to send its request one step forward. Meant
    /// to be polled regularly (mirrors `Router::process_outbound`): sends
    /// the queued request the moment a link becomes ACTIVE.
    pub fn poll(&self) {
        let mut links = self.0.links.lock().expect("propagation link table poisoned");
        for (link_id, pending) in links.iter_mut() {
            if pending.sent {
                continue;
            }
            if self.0.transport.link_status(*link_id) != Some(LinkStatus::Active) {
                continue;
            }
            let mut frame = match pending.kind {
                RequestKind::Offer => vec![REQUEST_OFFER],
                RequestKind::Sync => vec![REQUEST_SYNC],
            };
            if let Some(payload) = &pending.payload {
                frame.extend_from_slice(payload);
            }
            if self.0.transport.link_send(*link_id, &frame).is_ok() {
                pending.sent = true;
            }
        }
    }

    /// Fold a `TransportEvent` into propagation-client state, the way
    /// `Router::handle_transport_event` does for delivery links.
    pub fn handle_transport_event(&self, event: &TransportEvent) -> Vec<PropagationEvent> {
        match event {
            TransportEvent::LinkData { link_id, data } => self.handle_link_data(*link_id, data),
            TransportEvent::LinkClosed { link_id, .. } => self.handle_link_closed(*link_id),
            _ => Vec::new(),
        }
    }

    fn handle_link_data(&self, link_id: LinkId, data: &[u8]) -> Vec<PropagationEvent> {
        let Some((tag, rest)) = data.split_first() else { return Vec::new() };
        let mut links = self.0.links.lock().expect("propagation link table poisoned");
        let Some(node) = links.get(&link_id).map(|pending| pending.node) else { return Vec::new() };

        let event = match *tag {
            RESPONSE_ACCEPTED => Some(PropagationEvent::Accepted { node }),
            RESPONSE_ENVELOPE => match unpack_envelope(rest) {
                Ok(envelope) => Some(PropagationEvent::Synced { node, messages: envelope.messages }),
                Err(_) => Some(PropagationEvent::Failed { node }),
            },
            _ => None,
        };

        if event.is_some() {
            links.remove(&link_id);
        }
        event.into_iter().collect()
    }

    fn handle_link_closed(&self, link_id: LinkId) -> Vec<PropagationEvent> {
        let mut links = self.0.links.lock().expect("propagation link table poisoned");
        match links.remove(&link_id) {
            Some(pending) if !pending.sent => vec![PropagationEvent::Failed { node: pending.node }],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reticulum::identity::{HashIdentity, PrivateIdentity};
    use reticulum::transport::config::TransportConfig;

    fn test_transport() -> Transport {
        Transport::with_config(AddressHash::digest(b"node"), TransportConfig::default())
    }

    #[test]
    fn envelope_round_trips() {
        let messages = vec![b"one".to_vec(), b"two".to_vec()];
        let bytes = pack_envelope(1700.0, &messages).expect("pack");
        let envelope = unpack_envelope(&bytes).expect("unpack");
        assert_eq!(envelope.timestamp, 1700.0);
        assert_eq!(envelope.messages, messages);
    }

    #[test]
    fn submit_registers_a_pending_offer_link() {
        let client = PropagationClient::new(test_transport());
        let node_identity = PrivateIdentity::new_random();
        let link_id = client.submit(node_identity.address_hash(), node_identity.public(), b"wire".to_vec());

        let links = client.0.links.lock().unwrap();
        let pending = links.get(&link_id).expect("registered");
        assert_eq!(pending.kind, RequestKind::Offer);
        assert!(!pending.sent);
    }

    #[test]
    fn poll_does_not_send_before_the_link_activates() {
        let client = PropagationClient::new(test_transport());
        let node_identity = PrivateIdentity::new_random();
        let link_id = client.sync(node_identity.address_hash(), node_identity.public());

        client.poll();
        assert!(!client.0.links.lock().unwrap().get(&link_id).unwrap().sent);
    }

    #[test]
    fn response_envelope_resolves_a_sync_request() {
        let client = PropagationClient::new(test_transport());
        let node_identity = PrivateIdentity::new_random();
        let link_id = client.sync(node_identity.address_hash(), node_identity.public());

        let body = pack_envelope(42.0, &[b"hello".to_vec()]).expect("pack");
        let mut frame = vec![RESPONSE_ENVELOPE];
        frame.extend_from_slice(&body);

        let events = client.handle_transport_event(&TransportEvent::LinkData { link_id, data: frame });
        match events.as_slice() {
            [PropagationEvent::Synced { node, messages }] => {
                assert_eq!(*node, node_identity.address_hash());
                assert_eq!(messages, &vec![b"hello".to_vec()]);
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert!(client.0.links.lock().unwrap().is_empty());
    }

    #[test]
    fn response_accepted_resolves_an_offer_request() {
        let client = PropagationClient::new(test_transport());
        let node_identity = PrivateIdentity::new_random();
        let link_id = client.submit(node_identity.address_hash(), node_identity.public(), b"wire".to_vec());

        let events =
            client.handle_transport_event(&TransportEvent::LinkData { link_id, data: vec![RESPONSE_ACCEPTED] });
        assert!(matches!(events.as_slice(), [PropagationEvent::Accepted { .. }]));
    }

    #[test]
    fn link_closed_before_any_response_fails_the_request() {
        let client = PropagationClient::new(test_transport());
        let node_identity = PrivateIdentity::new_random();
        let link_id = client.sync(node_identity.address_hash(), node_identity.public());

        let events = client.handle_transport_event(&TransportEvent::LinkClosed {
            link_id,
            reason: reticulum::destination::link::TeardownReason::Timeout,
        });
        assert!(matches!(events.as_slice(), [PropagationEvent::Failed { .. }]));
    }
}
