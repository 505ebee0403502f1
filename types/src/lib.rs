//! Shared domain types for the relay workspace.
//!
//! These are the vocabulary types that cross crate boundaries: the opaque
//! referrer string handed over by the attribution service, the handshake
//! response codes with their ordinal wire contract, and the closed set of
//! events relay may forward into the embedded runtime.

mod event;
mod referrer;
mod response;

pub use event::{INSTALL_REFERRER_EVENT, RuntimeEvent};
pub use referrer::{EmptyReferrer, Referrer};
pub use response::ResponseCode;
