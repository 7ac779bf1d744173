//! Link: an ephemeral AES-256-CBC session between a local destination and a
//! remote identity, established by an X25519 handshake over a LINKREQUEST
//! and PROOF packet pair.

pub mod id;
pub mod payload;
pub mod proof;

use std::time::{Duration, Instant};

use x25519_dalek::{PublicKey as X25519Public, StaticSecret as X25519Secret};

pub use id::LinkId;
use payload::{pack_signalling_bytes, unpack_signalling_bytes, LinkProofPayload, LinkRequestPayload};

use crate::crypt::{derive_link_fernet, Fernet};
use crate::error::RnsError;
use crate::hash::AddressHash;
use crate::identity::{Identity, PrivateIdentity};
use crate::packet::{
    DestinationType, HeaderType, Packet, PacketContext, PacketType, PropagationType, MTU,
};

pub const KEEPALIVE_MAX: Duration = Duration::from_secs(360);
pub const KEEPALIVE_MIN: Duration = Duration::from_secs(5);
pub const STALE_GRACE: Duration = Duration::from_secs(5);
pub const STALE_FACTOR: u32 = 2;
pub const ESTABLISHMENT_TIMEOUT_PER_HOP: Duration = Duration::from_secs(6);

const AES_MODE: u8 = 0; // AES-256-CBC, the only mode this implementation negotiates.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Pending,
    Handshake,
    Active,
    Stale,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    Unknown,
    Timeout,
    InitiatorClosed,
    DestinationClosed,
    LinkError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Activated,
    Closed(TeardownReason),
    KeepAlive,
    Data(Vec<u8>),
}

/// A `LinkEvent` tagged with the link it belongs to, the shape broadcast
/// over Transport's link-event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEventEnvelope {
    pub id: LinkId,
    pub event: LinkEvent,
}

/// Ephemeral encrypted session. Only an ACTIVE link may send/receive
/// encrypted payloads; CLOSED is terminal.
pub struct Link {
    id: LinkId,
    role: LinkRole,
    status: LinkStatus,
    remote_destination: AddressHash,
    local_ephemeral_secret: Option<X25519Secret>,
    fernet: Option<Fernet>,
    mtu: u32,
    mode: u8,
    rtt: Option<Duration>,
    last_inbound: Instant,
    keepalive: Duration,
    teardown_reason: Option<TeardownReason>,
}

impl Link {
    /// Initiator side: build a LINKREQUEST packet and the pending Link
    /// waiting on its proof.
    pub fn initiate(
        remote_destination: AddressHash,
        initiator_identity: &Identity,
        mtu: u32,
    ) -> (Self, Packet) {
        let secret = X25519Secret::random_from_rng(rand_core::OsRng);
        let public = X25519Public::from(&secret);

        let payload = LinkRequestPayload {
            x25519_public: public,
            ed25519_public: *initiator_identity.ed25519_public(),
        };

        let packet = Packet::new(
            HeaderType::Type1,
            PropagationType::Broadcast,
            DestinationType::Link,
            PacketType::LinkRequest,
            0,
            remote_destination,
            None,
            PacketContext::None,
            payload.pack(),
        )
        .expect("link request payload always fits");

        let link_id = LinkId::from(&packet);

        let link = Self {
            id: link_id,
            role: LinkRole::Initiator,
            status: LinkStatus::Pending,
            remote_destination,
            local_ephemeral_secret: Some(secret),
            fernet: None,
            mtu,
            mode: AES_MODE,
            rtt: None,
            last_inbound: Instant::now(),
            keepalive: KEEPALIVE_MAX,
            teardown_reason: None,
        };

        (link, packet)
    }

    /// Responder side: validate an inbound LINKREQUEST addressed to a local
    /// destination that accepts links, deriving shared keys immediately and
    /// returning the proof packet to send back.
    pub fn validate_request(
        request: &Packet,
        responder_identity: &PrivateIdentity,
        mtu: u32,
    ) -> Result<(Self, Packet), RnsError> {
        if request.packet_type != PacketType::LinkRequest {
            return Err(RnsError::InvalidArgument);
        }

        let payload = LinkRequestPayload::unpack(&request.data)?;
        let link_id = LinkId::from(request);

        let secret = X25519Secret::random_from_rng(rand_core::OsRng);
        let public = X25519Public::from(&secret);
        let shared = secret.diffie_hellman(&payload.x25519_public);
        let fernet = derive_link_fernet(shared.as_bytes(), link_id.as_address_hash().as_slice())?;

        let signalling = pack_signalling_bytes(mtu & 0x1F_FFFF, AES_MODE);
        let signature = proof::sign_proof_packet(link_id, responder_identity, &public);
        let proof_payload = LinkProofPayload { x25519_public: public, signalling, signature };

        let proof_packet = Packet::new(
            HeaderType::Type1,
            PropagationType::Broadcast,
            DestinationType::Link,
            PacketType::Proof,
            0,
            link_id.as_address_hash(),
            None,
            PacketContext::LinkRequestProof,
            proof_payload.pack(),
        )?;

        let link = Self {
            id: link_id,
            role: LinkRole::Responder,
            status: LinkStatus::Active,
            remote_destination: request.destination,
            local_ephemeral_secret: None,
            fernet: Some(fernet),
            mtu,
            mode: AES_MODE,
            rtt: None,
            last_inbound: Instant::now(),
            keepalive: KEEPALIVE_MAX,
            teardown_reason: None,
        };

        Ok((link, proof_packet))
    }

    /// Initiator side: validate the responder's proof and activate the link.
    pub fn handle_proof(
        &mut self,
        proof_packet: &Packet,
        remote_identity: &Identity,
    ) -> Result<(), RnsError> {
        if self.role != LinkRole::Initiator || self.status != LinkStatus::Pending {
            return Err(RnsError::InvalidArgument);
        }

        let payload = LinkProofPayload::unpack(&proof_packet.data)?;
        let responder_public = proof::validate_proof_packet(self.id, remote_identity, &payload)?;

        let secret = self.local_ephemeral_secret.take().ok_or(RnsError::InvalidArgument)?;
        let shared = secret.diffie_hellman(&responder_public);
        self.fernet =
            Some(derive_link_fernet(shared.as_bytes(), self.id.as_address_hash().as_slice())?);

        let (negotiated_mtu, mode) = unpack_signalling_bytes(payload.signalling);
        if negotiated_mtu != 0 {
            self.mtu = self.mtu.min(negotiated_mtu);
        }
        self.mode = mode;

        self.status = LinkStatus::Active;
        self.last_inbound = Instant::now();
        Ok(())
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    pub fn role(&self) -> LinkRole {
        self.role
    }

    pub fn remote_destination(&self) -> AddressHash {
        self.remote_destination
    }

    pub fn rtt(&self) -> Option<Duration> {
        self.rtt
    }

    pub fn set_rtt(&mut self, rtt: Duration) {
        self.rtt = Some(rtt);
    }

    pub fn teardown_reason(&self) -> Option<TeardownReason> {
        self.teardown_reason
    }

    /// Maximum data unit after CBC/HMAC/IV framing overhead.
    pub fn mdu(&self) -> usize {
        let overhead = crate::packet::HEADER_MINSIZE + crate::crypt::fernet::FERNET_OVERHEAD_SIZE;
        let raw = (self.mtu as usize).saturating_sub(overhead).min(MTU);
        (raw / 16).saturating_mul(16).saturating_sub(1)
    }

    fn fernet(&self) -> Result<&Fernet, RnsError> {
        self.fernet.as_ref().ok_or(RnsError::InvalidArgument)
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, RnsError> {
        if self.status != LinkStatus::Active && self.status != LinkStatus::Stale {
            return Err(RnsError::ConnectionError);
        }
        self.fernet()?.encrypt(plaintext)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, RnsError> {
        if self.status != LinkStatus::Active {
            return Err(RnsError::ConnectionError);
        }
        self.fernet()?.decrypt(ciphertext)
    }

    /// Sign `data` with this link's HMAC key, used to produce a Resource's
    /// `[content_hash|signature]` completion proof.
    pub fn sign_with_link_key(&self, data: &[u8]) -> Result<[u8; 32], RnsError> {
        Ok(self.fernet()?.mac(data))
    }

    /// Build a DATA packet carrying `payload` encrypted for this link.
    /// Returns `OutOfMemory` when the plaintext exceeds the link MDU, the
    /// signal callers use to fall back to a Resource transfer instead.
    pub fn data_packet(&self, payload: &[u8]) -> Result<Packet, RnsError> {
        if self.status != LinkStatus::Active {
            return Err(RnsError::ConnectionError);
        }
        if payload.len() > self.mdu() {
            return Err(RnsError::OutOfMemory);
        }

        let ciphertext = self.encrypt(payload)?;
        Packet::new(
            HeaderType::Type1,
            PropagationType::Broadcast,
            DestinationType::Link,
            PacketType::Data,
            0,
            self.id.as_address_hash(),
            None,
            PacketContext::None,
            ciphertext,
        )
    }

    /// Unencrypted, empty-payload keepalive packet.
    pub fn keepalive_packet(&self) -> Packet {
        Packet::new(
            HeaderType::Type1,
            PropagationType::Broadcast,
            DestinationType::Link,
            PacketType::Data,
            0,
            self.id.as_address_hash(),
            None,
            PacketContext::KeepAlive,
            Vec::new(),
        )
        .expect("keepalive packet always fits")
    }

    /// A packet just arrived on this link: record it, without changing
    /// lifecycle state. Only a keepalive may revive a STALE link (see
    /// `revive_on_keepalive`); any other traffic on a STALE link just
    /// resets the clock and leaves it STALE.
    pub fn touch_last_inbound(&mut self) {
        self.last_inbound = Instant::now();
    }

    /// A keepalive just arrived: record it and revive from STALE if needed.
    pub fn revive_on_keepalive(&mut self) {
        self.touch_last_inbound();
        if self.status == LinkStatus::Stale {
            self.status = LinkStatus::Active;
        }
    }

    /// Periodic liveness check: ACTIVE -> STALE after `stale_time` of
    /// silence (`2 * keepalive`), independent of keepalive interval choice.
    pub fn check_staleness(&mut self, now: Instant) {
        if self.status != LinkStatus::Active {
            return;
        }
        let stale_time = self.keepalive * STALE_FACTOR + STALE_GRACE;
        if now.duration_since(self.last_inbound) > stale_time {
            self.status = LinkStatus::Stale;
        }
    }

    pub fn should_send_keepalive(&self, now: Instant) -> bool {
        matches!(self.status, LinkStatus::Active | LinkStatus::Stale)
            && now.duration_since(self.last_inbound) >= self.keepalive
    }

    pub fn teardown(&mut self, reason: TeardownReason) {
        self.status = LinkStatus::Closed;
        self.teardown_reason = Some(reason);
    }

    /// Establishment timeout scales linearly with hop count.
    pub fn establishment_timeout(hops: u8) -> Duration {
        ESTABLISHMENT_TIMEOUT_PER_HOP * (hops.max(1) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PrivateIdentity;

    #[test]
    fn handshake_activates_both_sides_with_matching_keys() {
        let initiator_identity = PrivateIdentity::new_random();
        let responder_identity = PrivateIdentity::new_random();
        let remote_destination = AddressHash::digest(b"destination");

        let (mut initiator_link, request) =
            Link::initiate(remote_destination, initiator_identity.public(), MTU as u32);
        assert_eq!(initiator_link.status(), LinkStatus::Pending);

        let (responder_link, proof) =
            Link::validate_request(&request, &responder_identity, MTU as u32).expect("validate");
        assert_eq!(responder_link.status(), LinkStatus::Active);
        assert_eq!(responder_link.id(), initiator_link.id());

        initiator_link.handle_proof(&proof, responder_identity.public()).expect("handle proof");
        assert_eq!(initiator_link.status(), LinkStatus::Active);

        let ciphertext = initiator_link.encrypt(b"hello over the link").expect("encrypt");
        let plaintext = responder_link.decrypt(&ciphertext).expect("decrypt");
        assert_eq!(plaintext, b"hello over the link");
    }

    #[test]
    fn stale_link_revives_only_on_keepalive() {
        let initiator_identity = PrivateIdentity::new_random();
        let responder_identity = PrivateIdentity::new_random();
        let remote_destination = AddressHash::digest(b"destination");

        let (_initiator_link, request) =
            Link::initiate(remote_destination, initiator_identity.public(), MTU as u32);
        let (mut responder_link, _proof) =
            Link::validate_request(&request, &responder_identity, MTU as u32).expect("validate");

        responder_link.check_staleness(Instant::now() + Duration::from_secs(3600));
        assert_eq!(responder_link.status(), LinkStatus::Stale);

        // Non-keepalive traffic (e.g. a Data packet) only resets the clock;
        // it must not revive a STALE link, and decrypt must keep failing.
        responder_link.touch_last_inbound();
        assert_eq!(responder_link.status(), LinkStatus::Stale);
        assert!(responder_link.decrypt(&[0u8; 32]).is_err());

        responder_link.revive_on_keepalive();
        assert_eq!(responder_link.status(), LinkStatus::Active);
    }

    #[test]
    fn teardown_is_terminal() {
        let initiator_identity = PrivateIdentity::new_random();
        let responder_identity = PrivateIdentity::new_random();
        let remote_destination = AddressHash::digest(b"destination");

        let (_initiator_link, request) =
            Link::initiate(remote_destination, initiator_identity.public(), MTU as u32);
        let (mut responder_link, _proof) =
            Link::validate_request(&request, &responder_identity, MTU as u32).expect("validate");

        responder_link.teardown(TeardownReason::InitiatorClosed);
        assert_eq!(responder_link.status(), LinkStatus::Closed);
        assert_eq!(responder_link.teardown_reason(), Some(TeardownReason::InitiatorClosed));
        assert!(responder_link.encrypt(b"after close").is_err());
    }

    #[test]
    fn data_packet_signals_resource_fallback_above_mdu() {
        let initiator_identity = PrivateIdentity::new_random();
        let responder_identity = PrivateIdentity::new_random();
        let remote_destination = AddressHash::digest(b"destination");

        let (_initiator_link, request) =
            Link::initiate(remote_destination, initiator_identity.public(), MTU as u32);
        let (responder_link, _proof) =
            Link::validate_request(&request, &responder_identity, MTU as u32).expect("validate");

        let oversized = vec![0u8; responder_link.mdu() + 1];
        assert_eq!(responder_link.data_packet(&oversized), Err(RnsError::OutOfMemory));
    }

    #[test]
    fn establishment_timeout_scales_with_hops() {
        assert_eq!(Link::establishment_timeout(1), ESTABLISHMENT_TIMEOUT_PER_HOP);
        assert_eq!(Link::establishment_timeout(3), ESTABLISHMENT_TIMEOUT_PER_HOP * 3);
    }
}
