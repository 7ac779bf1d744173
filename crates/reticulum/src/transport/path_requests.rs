//! Path request rate limiting: suppresses repeated `request_path` calls for
//! the same destination within `path_request_rate_limit` (§4.F), mirroring
//! the reference's protection against path-request floods.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::hash::AddressHash;

#[derive(Default)]
pub struct PathRequestLimiter {
    last_request: HashMap<AddressHash, Instant>,
    min_interval: Duration,
}

impl PathRequestLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self { last_request: HashMap::new(), min_interval }
    }

    /// Returns `true` if a path request for `destination` may be sent now,
    /// recording the attempt. Returns `false` (and does not record) if one
    /// was already sent within `min_interval`.
    pub fn try_request(&mut self, destination: AddressHash, now: Instant) -> bool {
        if let Some(&last) = self.last_request.get(&destination) {
            if now.duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_request.insert(destination, now);
        true
    }

    pub fn sweep(&mut self, now: Instant, max_age: Duration) {
        self.last_request.retain(|_, &mut last| now.duration_since(last) <= max_age);
    }

    pub fn len(&self) -> usize {
        self.last_request.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_request.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_request_within_window_is_suppressed() {
        let mut limiter = PathRequestLimiter::new(Duration::from_secs(5));
        let dest = AddressHash::digest(b"dest");
        let start = Instant::now();
        assert!(limiter.try_request(dest, start));
        assert!(!limiter.try_request(dest, start + Duration::from_secs(1)));
    }

    #[test]
    fn request_allowed_again_after_interval_elapses() {
        let mut limiter = PathRequestLimiter::new(Duration::from_secs(5));
        let dest = AddressHash::digest(b"dest");
        let start = Instant::now();
        assert!(limiter.try_request(dest, start));
        assert!(limiter.try_request(dest, start + Duration::from_secs(6)));
    }
}
