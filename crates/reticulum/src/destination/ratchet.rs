//! Per-destination ratchet state for forward-secret encryption of single
//! packets (deferred use: we parse, store and can emit ratchet bytes, but
//! do not yet re-key group traffic from them).

use std::collections::VecDeque;

use x25519_dalek::{PublicKey as X25519Public, StaticSecret as X25519Secret};

pub const RATCHET_LENGTH: usize = 32;
const MAX_RETAINED_RATCHETS: usize = 512;

/// A bounded history of ratchet keys a destination has announced, newest
/// last, so an older still-retained ratchet can decrypt a message sent
/// before the latest rotation was observed.
#[derive(Default)]
pub struct RatchetState {
    retained: VecDeque<X25519Secret>,
}

impl RatchetState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rotate(&mut self) -> X25519Public {
        let secret = X25519Secret::random_from_rng(rand_core::OsRng);
        let public = X25519Public::from(&secret);
        self.retained.push_back(secret);
        if self.retained.len() > MAX_RETAINED_RATCHETS {
            self.retained.pop_front();
        }
        public
    }

    pub fn current_public(&self) -> Option<X25519Public> {
        self.retained.back().map(X25519Public::from)
    }

    pub fn retained_secrets(&self) -> impl Iterator<Item = &X25519Secret> {
        self.retained.iter()
    }
}

/// Try each retained ratchet (newest first) as the X25519 secret half of a
/// decrypt, falling back through history the way the reference tolerates a
/// sender that has not yet observed the latest rotation.
pub fn try_decrypt_with_ratchets<F>(state: &RatchetState, mut attempt: F) -> Option<Vec<u8>>
where
    F: FnMut(&X25519Secret) -> Option<Vec<u8>>,
{
    state.retained.iter().rev().find_map(|secret| attempt(secret))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotate_bounds_retained_history() {
        let mut state = RatchetState::new();
        for _ in 0..(MAX_RETAINED_RATCHETS + 10) {
            state.rotate();
        }
        assert_eq!(state.retained.len(), MAX_RETAINED_RATCHETS);
    }

    #[test]
    fn try_decrypt_falls_back_through_history() {
        let mut state = RatchetState::new();
        state.rotate();
        state.rotate();
        let newest = state.retained.back().unwrap().to_bytes();

        let result = try_decrypt_with_ratchets(&state, |secret| {
            if secret.to_bytes() == newest {
                Some(b"decrypted".to_vec())
            } else {
                None
            }
        });
        assert_eq!(result, Some(b"decrypted".to_vec()));
    }
}
