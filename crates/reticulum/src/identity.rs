//! Identity: an Ed25519 signing keypair plus an X25519 key-agreement
//! keypair, addressed by a 16-byte truncated hash of the concatenated
//! public keys.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use rand_core::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret as X25519Secret};

use crate::crypt::fernet::Fernet;
use crate::error::RnsError;
use crate::hash::AddressHash;

pub const ED25519_PUBLIC_KEY_LENGTH: usize = 32;
pub const X25519_PUBLIC_KEY_LENGTH: usize = 32;
/// Concatenated length of the X25519 and Ed25519 public keys in an
/// announce/identity payload: `x25519_pub || ed25519_pub`.
pub const PUBLIC_KEY_LENGTH: usize = X25519_PUBLIC_KEY_LENGTH + ED25519_PUBLIC_KEY_LENGTH;

const LINK_KEY_EXPAND_LEN: usize = 64; // AES-256 key (32) + HMAC-SHA256 key (32)

/// Anything that can produce the 16-byte address hash an Identity is known by.
pub trait HashIdentity {
    fn address_hash(&self) -> AddressHash;
}

/// The public half of an Identity: what gets remembered from an announce.
#[derive(Clone, Copy)]
pub struct Identity {
    x25519_public: X25519Public,
    ed25519_public: VerifyingKey,
    hash: AddressHash,
}

impl Identity {
    pub fn new(x25519_public: X25519Public, ed25519_public: VerifyingKey) -> Self {
        let hash = Self::derive_hash(&x25519_public, &ed25519_public);
        Self { x25519_public, ed25519_public, hash }
    }

    pub fn from_public_bytes(bytes: &[u8]) -> Result<Self, RnsError> {
        if bytes.len() != PUBLIC_KEY_LENGTH {
            return Err(RnsError::InvalidArgument);
        }
        let x_bytes: [u8; X25519_PUBLIC_KEY_LENGTH] =
            bytes[..X25519_PUBLIC_KEY_LENGTH].try_into().map_err(|_| RnsError::InvalidArgument)?;
        let ed_bytes: [u8; ED25519_PUBLIC_KEY_LENGTH] = bytes[X25519_PUBLIC_KEY_LENGTH..]
            .try_into()
            .map_err(|_| RnsError::InvalidArgument)?;

        let x25519_public = X25519Public::from(x_bytes);
        let ed25519_public =
            VerifyingKey::from_bytes(&ed_bytes).map_err(|_| RnsError::CryptoError)?;

        Ok(Self::new(x25519_public, ed25519_public))
    }

    pub fn to_public_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        let mut out = [0u8; PUBLIC_KEY_LENGTH];
        out[..X25519_PUBLIC_KEY_LENGTH].copy_from_slice(self.x25519_public.as_bytes());
        out[X25519_PUBLIC_KEY_LENGTH..].copy_from_slice(self.ed25519_public.as_bytes());
        out
    }

    fn derive_hash(x25519_public: &X25519Public, ed25519_public: &VerifyingKey) -> AddressHash {
        let mut material = Vec::with_capacity(PUBLIC_KEY_LENGTH);
        material.extend_from_slice(x25519_public.as_bytes());
        material.extend_from_slice(ed25519_public.as_bytes());
        AddressHash::digest(&material)
    }

    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> Result<(), RnsError> {
        let sig = Signature::from_bytes(signature);
        self.ed25519_public.verify(message, &sig).map_err(|_| RnsError::IncorrectSignature)
    }

    /// Encrypt `plaintext` to this identity's X25519 public key using an
    /// ephemeral key exchange; the ephemeral public key is prefixed so the
    /// receiver can reconstruct the shared secret.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, RnsError> {
        let ephemeral = X25519Secret::random_from_rng(OsRng);
        let ephemeral_public = X25519Public::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&self.x25519_public);

        let fernet = derive_fernet(shared.as_bytes(), None)?;
        let token = fernet.encrypt(plaintext)?;

        let mut out = Vec::with_capacity(X25519_PUBLIC_KEY_LENGTH + token.len());
        out.extend_from_slice(ephemeral_public.as_bytes());
        out.extend_from_slice(&token);
        Ok(out)
    }

    pub fn ed25519_public(&self) -> &VerifyingKey {
        &self.ed25519_public
    }

    pub fn x25519_public(&self) -> &X25519Public {
        &self.x25519_public
    }
}

impl HashIdentity for Identity {
    fn address_hash(&self) -> AddressHash {
        self.hash
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Identity({})", self.hash)
    }
}

/// An Identity with both secret scalars: can sign and decrypt.
pub struct PrivateIdentity {
    x25519_secret: X25519Secret,
    ed25519_secret: SigningKey,
    public: Identity,
}

impl PrivateIdentity {
    pub fn new_random() -> Self {
        let x25519_secret = X25519Secret::random_from_rng(OsRng);
        let ed25519_secret = SigningKey::generate(&mut OsRng);
        Self::from_secrets(x25519_secret, ed25519_secret)
    }

    fn from_secrets(x25519_secret: X25519Secret, ed25519_secret: SigningKey) -> Self {
        let x25519_public = X25519Public::from(&x25519_secret);
        let ed25519_public = ed25519_secret.verifying_key();
        let public = Identity::new(x25519_public, ed25519_public);
        Self { x25519_secret, ed25519_secret, public }
    }

    /// Load from persisted secret key bytes: `x25519_secret(32) || ed25519_secret(32)`.
    /// Persistence itself is the host application's concern; this crate
    /// treats the bytes as opaque key material.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, RnsError> {
        if bytes.len() != 64 {
            return Err(RnsError::InvalidArgument);
        }
        let x_bytes: [u8; 32] = bytes[..32].try_into().map_err(|_| RnsError::InvalidArgument)?;
        let ed_bytes: [u8; 32] = bytes[32..].try_into().map_err(|_| RnsError::InvalidArgument)?;
        let x25519_secret = X25519Secret::from(x_bytes);
        let ed25519_secret = SigningKey::from_bytes(&ed_bytes);
        Ok(Self::from_secrets(x25519_secret, ed25519_secret))
    }

    pub fn to_secret_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.x25519_secret.to_bytes());
        out[32..].copy_from_slice(self.ed25519_secret.as_bytes());
        out
    }

    pub fn public(&self) -> &Identity {
        &self.public
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.ed25519_secret.sign(message).to_bytes()
    }

    /// Reverse of `Identity::encrypt`: strip the ephemeral public key prefix,
    /// derive the shared secret, and decrypt the remaining token.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, RnsError> {
        if ciphertext.len() <= X25519_PUBLIC_KEY_LENGTH {
            return Err(RnsError::InvalidArgument);
        }
        let (ephemeral_bytes, token) = ciphertext.split_at(X25519_PUBLIC_KEY_LENGTH);
        let ephemeral_bytes: [u8; 32] =
            ephemeral_bytes.try_into().map_err(|_| RnsError::InvalidArgument)?;
        let ephemeral_public = X25519Public::from(ephemeral_bytes);
        let shared = self.x25519_secret.diffie_hellman(&ephemeral_public);

        let fernet = derive_fernet(shared.as_bytes(), None)?;
        fernet.decrypt(token)
    }

}

impl HashIdentity for PrivateIdentity {
    fn address_hash(&self) -> AddressHash {
        self.public.address_hash()
    }
}

impl std::fmt::Debug for PrivateIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateIdentity({})", self.public.hash)
    }
}

/// A destination with no identity at all (PLAIN destinations): the address
/// hash is derived purely from the name, with no keypair behind it.
#[derive(Clone, Copy, Debug)]
pub struct EmptyIdentity {
    hash: AddressHash,
}

impl EmptyIdentity {
    pub fn new(hash: AddressHash) -> Self {
        Self { hash }
    }
}

impl HashIdentity for EmptyIdentity {
    fn address_hash(&self) -> AddressHash {
        self.hash
    }
}

/// Bounded map of `AddressHash -> Identity`: the public keys Transport has
/// learned from announces, required before an LXMF signature can be
/// validated (spec §4.I: the source Identity's Ed25519 key must be
/// "remembered" first).
pub struct IdentityCache {
    known: std::collections::HashMap<AddressHash, Identity>,
    capacity: usize,
}

impl IdentityCache {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new(capacity: usize) -> Self {
        Self { known: std::collections::HashMap::new(), capacity }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }

    pub fn remember(&mut self, identity: Identity) {
        if self.known.len() >= self.capacity && !self.known.contains_key(&identity.address_hash()) {
            return;
        }
        self.known.insert(identity.address_hash(), identity);
    }

    pub fn get(&self, hash: &AddressHash) -> Option<&Identity> {
        self.known.get(hash)
    }

    pub fn is_known(&self, hash: &AddressHash) -> bool {
        self.known.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

fn derive_fernet(shared_secret: &[u8], salt: Option<&[u8]>) -> Result<Fernet, RnsError> {
    let hk = Hkdf::<Sha256>::new(salt, shared_secret);
    let mut okm = [0u8; LINK_KEY_EXPAND_LEN];
    hk.expand(&[], &mut okm).map_err(|_| RnsError::CryptoError)?;
    Ok(Fernet::new_from_slices(&okm[32..], &okm[..32]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_roundtrips() {
        let priv_id = PrivateIdentity::new_random();
        let msg = b"packet payload";
        let sig = priv_id.sign(msg);
        assert!(priv_id.public().verify(msg, &sig).is_ok());
    }

    #[test]
    fn tampered_message_fails_verification() {
        let priv_id = PrivateIdentity::new_random();
        let sig = priv_id.sign(b"packet payload");
        assert!(priv_id.public().verify(b"different payload", &sig).is_err());
    }

    #[test]
    fn encrypt_then_decrypt_roundtrips() {
        let priv_id = PrivateIdentity::new_random();
        let ciphertext = priv_id.public().encrypt(b"hello world").expect("encrypt");
        let plaintext = priv_id.decrypt(&ciphertext).expect("decrypt");
        assert_eq!(plaintext, b"hello world");
    }

    #[test]
    fn address_hash_is_deterministic_from_public_keys() {
        let priv_id = PrivateIdentity::new_random();
        let bytes = priv_id.public().to_public_bytes();
        let reloaded = Identity::from_public_bytes(&bytes).expect("reload");
        assert_eq!(priv_id.public().address_hash(), reloaded.address_hash());
    }

    #[test]
    fn secret_bytes_roundtrip() {
        let priv_id = PrivateIdentity::new_random();
        let bytes = priv_id.to_secret_bytes();
        let reloaded = PrivateIdentity::from_secret_bytes(&bytes).expect("reload");
        assert_eq!(priv_id.address_hash(), reloaded.address_hash());
    }

    #[test]
    fn identity_cache_remembers_up_to_capacity() {
        let mut cache = IdentityCache::new(1);
        let a = PrivateIdentity::new_random();
        let b = PrivateIdentity::new_random();

        cache.remember(*a.public());
        assert!(cache.is_known(&a.address_hash()));

        cache.remember(*b.public());
        assert!(!cache.is_known(&b.address_hash()));
        assert_eq!(cache.len(), 1);
    }
}
