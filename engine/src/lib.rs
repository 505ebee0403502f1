//! Delivery orchestration: the install referrer pipeline.
//!
//! Composes the durable flag store, the attribution client adapter, and
//! the runtime readiness gate into the end-to-end flow:
//!
//! ```text
//! Start ──► Connecting ──► { Delivering | Queued | Failed } ──► Done
//! ```
//!
//! - `Start`: read the durable flag (informational only — logged, never
//!   branched on) and begin the handshake.
//! - `Connecting`: handshake in flight; unbounded, no timeout owned here.
//! - `Delivering`: runtime present — emit `InstallReferrer` now.
//! - `Queued`: runtime absent — a one-shot readiness listener owns the
//!   referrer and emits on the absent→present transition.
//! - `Failed`: handshake refused, dropped, or fetch failed; no emission,
//!   no retry.
//!
//! The durable flag is set after `Delivering` or `Queued` is reached, and
//! also after a fetch failure that followed an OK handshake (the attempt
//! consumed this install's one delivery). At-most-one emission per
//! process is enforced by a compare-and-set attempt guard, not by the
//! durable flag.

mod pipeline;
#[cfg(test)]
mod tests;

pub use pipeline::{DeliveryOutcome, DeliveryPipeline, FailureReason};
