//! Error taxonomy for the Reticulum core.
//!
//! Hot paths (inbound dispatch, outbound send) return `Result<_, RnsError>`
//! rather than unwinding; only genuine bugs panic.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RnsError {
    OutOfMemory,
    InvalidArgument,
    IncorrectSignature,
    IncorrectHash,
    CryptoError,
    PacketError,
    ConnectionError,
}

impl fmt::Display for RnsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            RnsError::OutOfMemory => "out of memory",
            RnsError::InvalidArgument => "invalid argument",
            RnsError::IncorrectSignature => "incorrect signature",
            RnsError::IncorrectHash => "incorrect hash",
            RnsError::CryptoError => "cryptographic operation failed",
            RnsError::PacketError => "malformed packet",
            RnsError::ConnectionError => "connection error",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for RnsError {}
