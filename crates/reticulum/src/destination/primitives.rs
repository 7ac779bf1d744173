//! Marker types encoding a Destination's direction and addressing mode at
//! the type level, the way the reference keeps "what can this destination
//! do" statically checkable instead of asserted at runtime.

use crate::error::RnsError;
use crate::hash::AddressHash;

pub trait Direction: private::Sealed {}
pub trait Type: private::Sealed {
    const DESTINATION_TYPE: crate::packet::DestinationType;
}

#[derive(Debug, Clone, Copy)]
pub struct In;
#[derive(Debug, Clone, Copy)]
pub struct Out;

impl Direction for In {}
impl Direction for Out {}

#[derive(Debug, Clone, Copy)]
pub struct Single;
#[derive(Debug, Clone, Copy)]
pub struct Group;
#[derive(Debug, Clone, Copy)]
pub struct Plain;
#[derive(Debug, Clone, Copy)]
pub struct Link;

impl Type for Single {
    const DESTINATION_TYPE: crate::packet::DestinationType = crate::packet::DestinationType::Single;
}
impl Type for Group {
    const DESTINATION_TYPE: crate::packet::DestinationType = crate::packet::DestinationType::Group;
}
impl Type for Plain {
    const DESTINATION_TYPE: crate::packet::DestinationType = crate::packet::DestinationType::Plain;
}
impl Type for Link {
    const DESTINATION_TYPE: crate::packet::DestinationType = crate::packet::DestinationType::Link;
}

mod private {
    pub trait Sealed {}
    impl Sealed for super::In {}
    impl Sealed for super::Out {}
    impl Sealed for super::Single {}
    impl Sealed for super::Group {}
    impl Sealed for super::Plain {}
    impl Sealed for super::Link {}
}

/// Symmetric-key group encryption, used by GROUP destinations. Shares the
/// Fernet framing used everywhere else in the stack.
pub fn group_encrypt(
    fernet: &crate::crypt::Fernet,
    plaintext: &[u8],
) -> Result<Vec<u8>, RnsError> {
    fernet.encrypt(plaintext)
}

pub fn group_decrypt(fernet: &crate::crypt::Fernet, ciphertext: &[u8]) -> Result<Vec<u8>, RnsError> {
    fernet.decrypt(ciphertext)
}

/// Destination hash: truncated SHA-256 of `"app_name" + "." + aspects.join(".")`
/// mixed with the identity's public hash, following the reference rule: the
/// name hash is itself truncated-hashed together with the identity hash.
pub fn destination_hash(
    app_name: &str,
    aspects: &[&str],
    identity_hash: Option<AddressHash>,
) -> AddressHash {
    let mut name = String::from(app_name);
    for aspect in aspects {
        name.push('.');
        name.push_str(aspect);
    }
    let name_hash = AddressHash::digest(name.as_bytes());

    let mut material = Vec::with_capacity(32);
    material.extend_from_slice(name_hash.as_slice());
    if let Some(identity_hash) = identity_hash {
        material.extend_from_slice(identity_hash.as_slice());
    } else {
        material.extend_from_slice(&[0u8; 16]);
    }

    AddressHash::digest(&material)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_hash_is_deterministic() {
        let identity_hash = AddressHash::digest(b"identity");
        let a = destination_hash("lxmf", &["delivery"], Some(identity_hash));
        let b = destination_hash("lxmf", &["delivery"], Some(identity_hash));
        assert_eq!(a, b);
    }

    #[test]
    fn destination_hash_differs_by_aspect() {
        let identity_hash = AddressHash::digest(b"identity");
        let a = destination_hash("lxmf", &["delivery"], Some(identity_hash));
        let b = destination_hash("lxmf", &["propagation"], Some(identity_hash));
        assert_ne!(a, b);
    }
}
