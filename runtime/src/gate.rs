//! One-time runtime readiness gate.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::RuntimeHandle;

/// Rejection of a second absent→present transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("runtime handle already installed")]
pub struct GateError;

#[derive(Debug)]
enum GateState {
    /// Runtime not initialized yet; registered one-shot waiters.
    Waiting(Vec<oneshot::Sender<RuntimeHandle>>),
    /// Runtime initialized; the handle cell is never reassigned.
    Ready(RuntimeHandle),
}

/// Single-assignment cell for the runtime handle, with one-shot waiters.
///
/// The absent→present transition drains and clears all waiters atomically
/// under the gate lock, so a waiter resolves at most once and is
/// unregistered by resolving. Registration is safe from any task or
/// thread; the only synchronization is the gate's own mutex.
#[derive(Debug)]
pub struct ReadinessGate {
    state: Mutex<GateState>,
}

impl ReadinessGate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Waiting(Vec::new())),
        }
    }

    /// Non-blocking poll for the runtime handle.
    #[must_use]
    pub fn current(&self) -> Option<RuntimeHandle> {
        match &*self.lock() {
            GateState::Ready(handle) => Some(handle.clone()),
            GateState::Waiting(_) => None,
        }
    }

    /// Register a one-shot waiter for the absent→present transition.
    ///
    /// Resolves immediately when the runtime is already initialized.
    /// Dropping the listener before the transition is a silent
    /// unregister.
    #[must_use]
    pub fn subscribe(&self) -> ReadyListener {
        let (tx, rx) = oneshot::channel();
        match &mut *self.lock() {
            GateState::Waiting(waiters) => waiters.push(tx),
            GateState::Ready(handle) => {
                // The receiver is held locally, so this send cannot fail.
                let _ = tx.send(handle.clone());
            }
        }
        ReadyListener { rx }
    }

    /// Perform the single absent→present assignment and drain all
    /// waiters. A second install is rejected; the cell is never
    /// reassigned.
    pub fn install(&self, handle: RuntimeHandle) -> Result<(), GateError> {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, GateState::Ready(handle.clone())) {
            GateState::Ready(previous) => {
                *state = GateState::Ready(previous);
                Err(GateError)
            }
            GateState::Waiting(waiters) => {
                drop(state);
                for waiter in waiters {
                    // Dropped listeners already unregistered themselves.
                    let _ = waiter.send(handle.clone());
                }
                Ok(())
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot waiter handed out by [`ReadinessGate::subscribe`].
#[derive(Debug)]
pub struct ReadyListener {
    rx: oneshot::Receiver<RuntimeHandle>,
}

impl ReadyListener {
    /// Wait for the runtime to become ready.
    ///
    /// Returns `None` when the gate is dropped before the transition —
    /// the process is shutting down and the wait is abandoned.
    pub async fn ready(self) -> Option<RuntimeHandle> {
        self.rx.await.ok()
    }
}
