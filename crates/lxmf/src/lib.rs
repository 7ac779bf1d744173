//! LXMF: the store-and-forward messaging layer built on top of `reticulum`
//! (components I-K) — message wire format and stamp proof-of-work, and the
//! router's three delivery strategies (Direct, Opportunistic, Propagated).
//! Client-only: submitting to and retrieving from a propagation node is
//! supported, running one is not (spec.md Non-goal).

pub mod constants;
pub mod error;
pub mod message;
pub mod propagation;
pub mod router;
pub mod stamper;

pub use error::LxmfError;
pub use message::{Fields, LXMessage, MessageMethod, State, TransportMethod};
pub use propagation::PropagationClient;
pub use router::{Router, RouterEvent};
