//! Embedded runtime handle, event channel, and readiness gate.
//!
//! The embedded application runtime initializes asynchronously, outside
//! this workspace's control. [`ReadinessGate`] models the one-time
//! absent→present transition of the runtime handle; [`RuntimeHandle`] is
//! the emission side of the runtime's event channel. Emission is
//! fire-and-forget: the runtime never acknowledges events.

mod gate;

use tokio::sync::mpsc;

use relay_types::RuntimeEvent;

pub use gate::{GateError, ReadinessGate, ReadyListener};

/// Emission failure. The only observable failure is a closed channel —
/// the runtime dropped its receiving half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("runtime event channel is closed")]
pub struct EmitError;

/// Sending half of the embedded runtime's event channel.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    events: mpsc::UnboundedSender<RuntimeEvent>,
}

impl RuntimeHandle {
    /// Create a handle together with the receiving half the embedded
    /// runtime drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RuntimeEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events }, rx)
    }

    /// Forward an event to the embedded runtime.
    pub fn emit(&self, event: RuntimeEvent) -> Result<(), EmitError> {
        self.events.send(event).map_err(|_| EmitError)
    }
}
