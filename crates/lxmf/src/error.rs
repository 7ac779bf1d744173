//! LXMF's own error type. Reticulum-layer failures (crypto, packet framing,
//! link state) are wrapped rather than reused, since most callers here care
//! about a narrower question: could this message be encoded, decoded, or
//! proved valid.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LxmfError {
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("verify error: {0}")]
    Verify(String),
    #[error("stamp error: {0}")]
    Stamp(String),
    #[error("reticulum error: {0}")]
    Reticulum(#[from] reticulum::RnsError),
}
