//! Attribution service boundary and handshake adapter.
//!
//! The platform install-tracking service is a black box behind
//! [`AttributionService`]: open a connection, await a setup status,
//! optionally fetch the referrer, close. [`acquire_referrer`] drives the
//! whole handshake with exactly-once semantics: one terminal outcome per
//! attempt, one disconnect per opened connection, and no propagated
//! failures — every error is logged and reported as an outcome variant.
//!
//! Retry is deliberately absent: a failed handshake is reported, not
//! rescheduled.

pub mod http;

use futures_util::future::BoxFuture;

use relay_types::{Referrer, ResponseCode};

/// Failure to open a connection to the attribution service.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("attribution service unreachable: {0}")]
    Unreachable(String),
    #[error("attribution service refused the connection (HTTP {0})")]
    Refused(u16),
    #[error("malformed connect response: {0}")]
    Malformed(String),
}

/// Failure to obtain the referrer after a successful handshake.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("referrer request failed: {0}")]
    Transport(String),
    #[error("malformed referrer response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Empty(#[from] relay_types::EmptyReferrer),
}

/// Resolution of the asynchronous connection handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupEvent {
    /// The service reported handshake completion with a status code.
    Finished(ResponseCode),
    /// The service dropped the connection before reporting completion.
    /// A connection lifecycle event, distinct from the status codes: no
    /// completion status was ever delivered.
    Disconnected,
}

/// Live connection to the attribution service.
pub trait ServiceConnection: Send {
    /// Await the service's handshake resolution.
    fn setup(&mut self) -> BoxFuture<'_, SetupEvent>;

    /// Fetch the referrer. Valid only after [`SetupEvent::Finished`] with
    /// [`ResponseCode::Ok`].
    fn fetch_referrer(&mut self) -> BoxFuture<'_, Result<Referrer, FetchError>>;

    /// Close the connection. Best effort.
    fn disconnect(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// Factory boundary for the black-box attribution service.
pub trait AttributionService: Send + Sync {
    /// Open a connection to the service.
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn ServiceConnection>, ConnectError>>;
}

/// Terminal result of one handshake attempt.
///
/// Exactly one outcome is produced per [`acquire_referrer`] call.
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// Setup finished OK and the referrer was fetched.
    Fetched(Referrer),
    /// Setup finished OK but the referrer fetch failed.
    FetchFailed(FetchError),
    /// Setup finished with a non-OK status.
    Refused(ResponseCode),
    /// The service dropped the connection before reporting completion.
    Disconnected,
    /// No connection could be opened.
    ConnectFailed(ConnectError),
}

/// Drive one complete handshake against `service`.
///
/// Guarantees: the outcome is produced exactly once; a connection, once
/// opened, is closed exactly once on every path — including when the
/// referrer fetch itself fails; nothing is retried and nothing
/// propagates to the caller as an error.
pub async fn acquire_referrer(service: &dyn AttributionService) -> HandshakeOutcome {
    let mut conn = match service.connect().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("Failed to open attribution service connection: {e}");
            return HandshakeOutcome::ConnectFailed(e);
        }
    };

    match conn.setup().await {
        SetupEvent::Finished(code) if code.is_ok() => {
            let fetched = conn.fetch_referrer().await;
            conn.disconnect().await;
            match fetched {
                Ok(referrer) => HandshakeOutcome::Fetched(referrer),
                Err(e) => {
                    tracing::error!("Failed to fetch install referrer: {e}");
                    HandshakeOutcome::FetchFailed(e)
                }
            }
        }
        SetupEvent::Finished(code) => {
            conn.disconnect().await;
            tracing::error!(code = %code, "Attribution service refused the handshake");
            HandshakeOutcome::Refused(code)
        }
        SetupEvent::Disconnected => {
            conn.disconnect().await;
            tracing::warn!("Attribution service disconnected before setup finished");
            HandshakeOutcome::Disconnected
        }
    }
}
