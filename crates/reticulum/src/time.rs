//! Wall-clock helpers. Announce timestamps use wall-clock seconds; divergence
//! between peers' clocks of more than a few seconds can cause "newer"
//! comparisons to misbehave (see the open question in the design notes).

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_epoch_secs_u64() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

pub fn now_epoch_secs_i64() -> i64 {
    now_epoch_secs_u64() as i64
}

pub fn now_epoch_millis_u64() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Sub-second wall-clock timestamp, for formats (LXMF) that store message
/// times as a float rather than whole seconds.
pub fn now_epoch_secs_f64() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}
