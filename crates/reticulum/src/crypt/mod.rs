//! Symmetric framing used for Link payloads and Destination-level encryption.

pub mod fernet;

pub use fernet::Fernet;

use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::RnsError;

const LINK_KEY_EXPAND_LEN: usize = 64; // AES-256 key (32) + HMAC-SHA256 key (32)

/// HKDF(shared_secret, salt=link_id, info=b"reticulum-link", len=64) -> (AES key, HMAC key).
pub fn derive_link_fernet(shared_secret: &[u8], link_id_salt: &[u8]) -> Result<Fernet, RnsError> {
    let hk = Hkdf::<Sha256>::new(Some(link_id_salt), shared_secret);
    let mut okm = [0u8; LINK_KEY_EXPAND_LEN];
    hk.expand(b"reticulum-link", &mut okm).map_err(|_| RnsError::CryptoError)?;
    Ok(Fernet::new_from_slices(&okm[32..], &okm[..32]))
}
