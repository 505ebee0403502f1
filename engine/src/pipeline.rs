//! Delivery pipeline state machine.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use relay_client::{AttributionService, HandshakeOutcome, acquire_referrer};
use relay_runtime::{ReadinessGate, RuntimeHandle};
use relay_store::FlagStore;
use relay_types::{Referrer, ResponseCode, RuntimeEvent};

/// Terminal result of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The runtime was ready; the event was emitted (or the emission
    /// failure logged) and the flag was set.
    Delivered,
    /// The runtime was not ready; a one-shot listener now owns the
    /// referrer and the flag was set.
    Queued,
    /// A prior run in this process already attempted delivery; the
    /// fetched referrer was dropped without emission.
    AlreadyAttempted,
    /// The handshake failed; nothing was emitted.
    Failed(FailureReason),
}

/// Why a run finished without an emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// No connection could be opened.
    Connect,
    /// The service finished the handshake with a non-OK status.
    Refused(ResponseCode),
    /// The service dropped the connection before reporting a status.
    Disconnected,
    /// The referrer fetch failed after an OK handshake. The flag is set
    /// on this path: the attempt consumed this install's one delivery.
    Fetch,
    /// The pipeline panicked; contained at the task boundary.
    Internal,
}

/// One-shot install referrer delivery pipeline.
///
/// `run` may be invoked any number of times within a process; the
/// process-lifetime attempt guard ensures at most one emission. The
/// durable flag is read and logged at start but never short-circuits
/// the connection attempt.
pub struct DeliveryPipeline {
    service: Arc<dyn AttributionService>,
    gate: Arc<ReadinessGate>,
    store: FlagStore,
    attempted: AtomicBool,
}

impl DeliveryPipeline {
    #[must_use]
    pub fn new(
        service: Arc<dyn AttributionService>,
        gate: Arc<ReadinessGate>,
        store: FlagStore,
    ) -> Self {
        Self {
            service,
            gate,
            store,
            attempted: AtomicBool::new(false),
        }
    }

    /// Spawn the pipeline as its own task.
    ///
    /// This is the single background execution context for the
    /// post-connect work (fetch + emit); the caller never blocks. Panics
    /// anywhere inside the run are contained here and reported as
    /// [`FailureReason::Internal`] — nothing reaches the process-level
    /// handler.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<DeliveryOutcome> {
        tokio::spawn(async move {
            match AssertUnwindSafe(self.run()).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!("Install referrer pipeline panicked");
                    DeliveryOutcome::Failed(FailureReason::Internal)
                }
            }
        })
    }

    /// Drive one delivery attempt end to end.
    pub async fn run(&self) -> DeliveryOutcome {
        // Informational only: the durable flag never gates the connection
        // attempt.
        let delivered = self.store.delivered();
        info!(delivered, "Starting install referrer delivery");

        let outcome = match acquire_referrer(self.service.as_ref()).await {
            HandshakeOutcome::Fetched(referrer) => self.deliver(referrer),
            HandshakeOutcome::FetchFailed(_) => {
                // Already logged by the adapter. The flag is still set:
                // the attempt consumed this install's one delivery.
                if self.begin_attempt() {
                    self.store.mark_delivered();
                }
                DeliveryOutcome::Failed(FailureReason::Fetch)
            }
            HandshakeOutcome::Refused(code) => DeliveryOutcome::Failed(FailureReason::Refused(code)),
            HandshakeOutcome::Disconnected => DeliveryOutcome::Failed(FailureReason::Disconnected),
            HandshakeOutcome::ConnectFailed(_) => DeliveryOutcome::Failed(FailureReason::Connect),
        };
        debug!(?outcome, "Install referrer delivery finished");
        outcome
    }

    fn deliver(&self, referrer: Referrer) -> DeliveryOutcome {
        if !self.begin_attempt() {
            debug!("Delivery already attempted in this process; dropping referrer");
            return DeliveryOutcome::AlreadyAttempted;
        }

        match self.gate.current() {
            Some(handle) => {
                emit_install_referrer(&handle, referrer);
                self.store.mark_delivered();
                DeliveryOutcome::Delivered
            }
            None => {
                let listener = self.gate.subscribe();
                info!("Runtime not ready; queueing install referrer");
                // Flag before the listener can fire: the delivery is
                // committed once the listener owns the referrer.
                self.store.mark_delivered();
                tokio::spawn(async move {
                    match listener.ready().await {
                        Some(handle) => emit_install_referrer(&handle, referrer),
                        None => warn!("Runtime never became ready; queued install referrer dropped"),
                    }
                });
                DeliveryOutcome::Queued
            }
        }
    }

    /// Process-lifetime compare-and-set: the single-writer guard for the
    /// flag and the emission channel.
    fn begin_attempt(&self) -> bool {
        self.attempted
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

fn emit_install_referrer(handle: &RuntimeHandle, referrer: Referrer) {
    match handle.emit(RuntimeEvent::install_referrer(referrer)) {
        Ok(()) => info!("Install referrer delivered to runtime"),
        Err(e) => warn!("Install referrer emission failed: {e}"),
    }
}
