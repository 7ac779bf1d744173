//! Proof-of-work stamps (§4.J): a workblock expanded from a message id via
//! repeated HKDF, and a cheap local check of whether a candidate stamp
//! clears a target difficulty against that workblock.

use std::sync::atomic::{AtomicBool, Ordering};

use hkdf::Hkdf;
use rand_core::{OsRng, RngCore};
use reticulum::hash::Hash;
use sha2::Sha256;

pub const STAMP_SIZE: usize = 32;

/// Deterministic, byte-exact: `workblock(M, r) = concat_{n=0..r-1}
/// HKDF(ikm=M, salt=SHA256(M||msgpack(n)), info=empty, len=256)`. Pure, and
/// additive in `r` — `workblock(M, 2r)` is `workblock(M, r)` followed by the
/// rounds `r..2r` computed the same way.
pub fn generate_workblock(material: &[u8], expand_rounds: usize) -> Vec<u8> {
    let mut workblock = Vec::with_capacity(expand_rounds * 256);

    for n in 0..expand_rounds {
        let mut salt_data = Vec::with_capacity(material.len() + 8);
        salt_data.extend_from_slice(material);
        salt_data.extend_from_slice(&rmp_serde::to_vec(&n).expect("usize always encodes"));
        let salt_hash = Hash::new_from_slice(&salt_data);

        let hk = Hkdf::<Sha256>::new(Some(salt_hash.as_slice()), material);
        let mut okm = [0u8; 256];
        hk.expand(&[], &mut okm).expect("256 bytes is within HKDF-SHA256's output limit");
        workblock.extend_from_slice(&okm);
    }

    workblock
}

/// Number of leading zero bits of `SHA256(workblock || stamp)`, used both to
/// validate a stamp against a target cost and to score over-qualified ones.
pub fn stamp_value(workblock: &[u8], stamp: &[u8]) -> u32 {
    let hash = Hash::new_from_slice(&[workblock, stamp].concat());
    let mut value = 0u32;

    for byte in hash.as_slice() {
        if *byte == 0 {
            value += 8;
        } else {
            value += byte.leading_zeros();
            break;
        }
    }

    value
}

pub fn validate_stamp(stamp: &[u8], target_cost: u32, workblock: &[u8]) -> bool {
    stamp_value(workblock, stamp) >= target_cost
}

/// Search for a 32-byte stamp meeting `stamp_cost` against `material`'s
/// workblock, sharded across `std::thread::available_parallelism()` workers
/// trying independent random candidates. The first worker to find a hit
/// flips `found`, which every other worker polls between tries. Never
/// returns for an unsatisfiable cost; callers that need to give up (§8: "cost
/// 256 unsatisfiable; search must be cancellable") should use
/// [`generate_stamp_cancellable`] instead.
pub fn generate_stamp(material: &[u8], stamp_cost: u32, expand_rounds: usize) -> Option<Vec<u8>> {
    generate_stamp_cancellable(material, stamp_cost, expand_rounds, &AtomicBool::new(false))
}

/// As [`generate_stamp`], but every worker also polls `cancel` between
/// tries and gives up as soon as it flips true — the cooperative-cancellation
/// path §5 requires for CPU-bound stamp search ("Stamp search is CPU-bound
/// and cooperatively cancellable"). Returns `None` on cancellation exactly as
/// it would if no satisfying candidate had been found yet.
pub fn generate_stamp_cancellable(
    material: &[u8],
    stamp_cost: u32,
    expand_rounds: usize,
    cancel: &AtomicBool,
) -> Option<Vec<u8>> {
    let workblock = generate_workblock(material, expand_rounds);
    let workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let found = AtomicBool::new(false);
    let winner: std::sync::Mutex<Option<Vec<u8>>> = std::sync::Mutex::new(None);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                let mut rng = OsRng;
                let mut candidate = [0u8; STAMP_SIZE];
                while !found.load(Ordering::Relaxed) && !cancel.load(Ordering::Relaxed) {
                    rng.fill_bytes(&mut candidate);
                    if validate_stamp(&candidate, stamp_cost, &workblock) {
                        if !found.swap(true, Ordering::SeqCst) {
                            *winner.lock().expect("stamp winner mutex poisoned") = Some(candidate.to_vec());
                        }
                        return;
                    }
                }
            });
        }
    });

    winner.into_inner().expect("stamp winner mutex poisoned")
}

/// Validate a propagation-node transient's trailing stamp: splits the
/// `[lxm_data|stamp]` blob, derives the transient id from `lxm_data`, and
/// checks the stamp against that id's workblock at `WORKBLOCK_EXPAND_ROUNDS_PN`.
pub fn validate_pn_stamp(transient_data: &[u8], target_cost: u32) -> Option<(Vec<u8>, Vec<u8>, u32, Vec<u8>)> {
    if transient_data.len() <= reticulum::hash::HASH_SIZE {
        return None;
    }

    let (lxm_data, stamp) = transient_data.split_at(transient_data.len() - reticulum::hash::HASH_SIZE);
    let transient_id = Hash::new_from_slice(lxm_data).to_bytes().to_vec();
    let workblock = generate_workblock(&transient_id, crate::constants::WORKBLOCK_EXPAND_ROUNDS_PN);

    if !validate_stamp(stamp, target_cost, &workblock) {
        return None;
    }

    let value = stamp_value(&workblock, stamp);
    Some((transient_id, lxm_data.to_vec(), value, stamp.to_vec()))
}

pub fn validate_peering_key(peering_id: &[u8], peering_key: &[u8], target_cost: u32) -> bool {
    let workblock = generate_workblock(peering_id, crate::constants::WORKBLOCK_EXPAND_ROUNDS_PEERING);
    validate_stamp(peering_key, target_cost, &workblock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workblock_expansion_is_additive() {
        let material = b"message-id";
        let short = generate_workblock(material, 2);
        let long = generate_workblock(material, 4);
        assert_eq!(&long[..short.len()], short.as_slice());
    }

    #[test]
    fn workblock_is_deterministic() {
        let a = generate_workblock(b"same", 3);
        let b = generate_workblock(b"same", 3);
        assert_eq!(a, b);
    }

    #[test]
    fn low_cost_stamp_search_terminates_and_validates() {
        let material = b"low-cost-material";
        let stamp = generate_stamp(material, 1, 4).expect("a cost-1 stamp exists");
        let workblock = generate_workblock(material, 4);
        assert!(validate_stamp(&stamp, 1, &workblock));
    }

    #[test]
    fn higher_cost_is_harder_to_satisfy() {
        let workblock = generate_workblock(b"m", 2);
        let stamp = generate_stamp(b"m", 2, 2).expect("a cost-2 stamp exists");
        let value = stamp_value(&workblock, &stamp);
        assert!(value >= 2);
        assert!(!validate_stamp(&stamp, value + 1, &workblock));
    }

    #[test]
    fn unsatisfiable_cost_returns_none_once_cancelled() {
        let cancel = std::sync::Arc::new(AtomicBool::new(false));
        let cancel_for_search = cancel.clone();
        let handle = std::thread::spawn(move || {
            generate_stamp_cancellable(b"cancel-me", 256, 4, &cancel_for_search)
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        cancel.store(true, Ordering::Relaxed);
        assert_eq!(handle.join().expect("worker thread"), None);
    }

    #[test]
    fn peering_key_validates_against_its_own_workblock() {
        let peering_id = b"peer-identity-hash";
        let key = generate_stamp(peering_id, 1, WORKBLOCK_EXPAND_ROUNDS_TEST).expect("exists");
        assert!(validate_peering_key(peering_id, &key, 1));
    }

    const WORKBLOCK_EXPAND_ROUNDS_TEST: usize = crate::constants::WORKBLOCK_EXPAND_ROUNDS_PEERING;
}
