use serde::Serialize;

use crate::Referrer;

/// Event name the embedded runtime observes for the install referrer.
pub const INSTALL_REFERRER_EVENT: &str = "InstallReferrer";

/// Events relay may forward into the embedded runtime.
///
/// This is a closed enum - only relay code can construct these variants,
/// so the runtime-facing event surface stays a small, finite set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum RuntimeEvent {
    /// One-time install attribution payload.
    InstallReferrer(Referrer),
}

impl RuntimeEvent {
    #[must_use]
    pub fn install_referrer(referrer: Referrer) -> Self {
        Self::InstallReferrer(referrer)
    }

    /// Event name as seen on the runtime channel.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InstallReferrer(_) => INSTALL_REFERRER_EVENT,
        }
    }

    /// Payload string carried by the event.
    #[must_use]
    pub fn payload(&self) -> &str {
        match self {
            Self::InstallReferrer(referrer) => referrer.as_str(),
        }
    }
}
