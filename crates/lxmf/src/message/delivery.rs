//! Delivery-method resolution (§4.K processor entry point): given a desired
//! `TransportMethod` and a message's content size, decide which transport
//! method actually applies and how the message must be represented on the
//! wire for it.

use crate::constants::{ENCRYPTED_PACKET_MAX_CONTENT, LINK_PACKET_MAX_CONTENT, PAPER_MDU, PLAIN_PACKET_MAX_CONTENT};
use crate::error::LxmfError;
use crate::message::{MessageMethod, TransportMethod};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryDecision {
    pub method: TransportMethod,
    pub representation: MessageMethod,
}

/// `destination_is_plain` distinguishes an unencrypted PLAIN destination
/// (higher content ceiling, no key-exchange overhead) from a single
/// encrypted destination when opportunistic delivery checks whether the
/// message fits in one packet at all.
pub fn decide_delivery(
    desired_method: TransportMethod,
    destination_is_plain: bool,
    content_size: usize,
) -> Result<DeliveryDecision, LxmfError> {
    let mut method = desired_method;

    if matches!(method, TransportMethod::Opportunistic) {
        let limit = if destination_is_plain { PLAIN_PACKET_MAX_CONTENT } else { ENCRYPTED_PACKET_MAX_CONTENT };

        if content_size > limit {
            method = TransportMethod::Direct;
        } else {
            return Ok(DeliveryDecision { method, representation: MessageMethod::Packet });
        }
    }

    match method {
        TransportMethod::Direct | TransportMethod::Propagated => {
            let representation =
                if content_size <= LINK_PACKET_MAX_CONTENT { MessageMethod::Packet } else { MessageMethod::Resource };
            Ok(DeliveryDecision { method, representation })
        }
        TransportMethod::Paper => {
            if content_size <= PAPER_MDU {
                Ok(DeliveryDecision { method, representation: MessageMethod::Paper })
            } else {
                Err(LxmfError::Encode("paper delivery content exceeds paper MDU".into()))
            }
        }
        TransportMethod::Opportunistic => Err(LxmfError::Encode("opportunistic delivery could not be resolved".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_opportunistic_message_stays_a_single_packet() {
        let decision = decide_delivery(TransportMethod::Opportunistic, false, 32).expect("decide");
        assert_eq!(decision.method, TransportMethod::Opportunistic);
        assert_eq!(decision.representation, MessageMethod::Packet);
    }

    #[test]
    fn oversized_opportunistic_message_falls_back_to_direct() {
        let decision =
            decide_delivery(TransportMethod::Opportunistic, false, ENCRYPTED_PACKET_MAX_CONTENT + 1).expect("decide");
        assert_eq!(decision.method, TransportMethod::Direct);
    }

    #[test]
    fn oversized_direct_message_uses_resource() {
        let decision =
            decide_delivery(TransportMethod::Direct, false, LINK_PACKET_MAX_CONTENT + 1).expect("decide");
        assert_eq!(decision.representation, MessageMethod::Resource);
    }

    #[test]
    fn paper_rejects_content_above_its_mdu() {
        assert!(decide_delivery(TransportMethod::Paper, false, PAPER_MDU + 1).is_err());
    }
}
