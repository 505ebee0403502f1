//! HTTP transport for the attribution service.
//!
//! Session-oriented mapping of the black-box API:
//!
//! | Operation    | Endpoint                          |
//! |--------------|-----------------------------------|
//! | connect      | `POST /v1/sessions`               |
//! | setup        | `GET /v1/sessions/{id}/setup`     |
//! | fetch        | `GET /v1/sessions/{id}/referrer`  |
//! | disconnect   | `DELETE /v1/sessions/{id}`        |
//!
//! The setup response carries the ordinal handshake status code. Any
//! transport failure or malformed body while awaiting the setup result is
//! treated as the disconnected lifecycle signal: the connection went away
//! without reporting a status.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Deserialize;

use relay_types::{Referrer, ResponseCode};

use crate::{AttributionService, ConnectError, FetchError, ServiceConnection, SetupEvent};

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

fn build_client(connect_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap_or_else(|e| {
            tracing::error!("Failed to build HTTP client: {e}. Falling back to defaults.");
            reqwest::Client::new()
        })
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct SetupBody {
    response_code: i32,
}

#[derive(Debug, Deserialize)]
struct ReferrerBody {
    install_referrer: String,
}

/// Attribution service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAttributionService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAttributionService {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_connect_timeout(
            base_url,
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn with_connect_timeout(base_url: impl Into<String>, connect_timeout: Duration) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            client: build_client(connect_timeout),
        }
    }
}

impl AttributionService for HttpAttributionService {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn ServiceConnection>, ConnectError>> {
        Box::pin(async move {
            let url = format!("{}/v1/sessions", self.base_url);
            let response = self
                .client
                .post(&url)
                .send()
                .await
                .map_err(|e| ConnectError::Unreachable(e.to_string()))?;
            if !response.status().is_success() {
                return Err(ConnectError::Refused(response.status().as_u16()));
            }
            let body: SessionBody = response
                .json()
                .await
                .map_err(|e| ConnectError::Malformed(e.to_string()))?;
            tracing::debug!(session = %body.session_id, "Attribution session opened");
            Ok(Box::new(HttpConnection {
                base_url: self.base_url.clone(),
                session_id: body.session_id,
                client: self.client.clone(),
            }) as Box<dyn ServiceConnection>)
        })
    }
}

struct HttpConnection {
    base_url: String,
    session_id: String,
    client: reqwest::Client,
}

impl HttpConnection {
    fn url(&self, tail: &str) -> String {
        format!("{}/v1/sessions/{}{tail}", self.base_url, self.session_id)
    }
}

impl ServiceConnection for HttpConnection {
    fn setup(&mut self) -> BoxFuture<'_, SetupEvent> {
        Box::pin(async move {
            let response = match self.client.get(self.url("/setup")).send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!("Setup request failed: {e}");
                    return SetupEvent::Disconnected;
                }
            };
            if !response.status().is_success() {
                tracing::debug!(status = %response.status(), "Setup request rejected");
                return SetupEvent::Disconnected;
            }
            let body: SetupBody = match response.json().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!("Malformed setup response: {e}");
                    return SetupEvent::Disconnected;
                }
            };
            match ResponseCode::from_wire(body.response_code) {
                Some(code) => SetupEvent::Finished(code),
                None => {
                    tracing::warn!(code = body.response_code, "Unknown handshake status code");
                    SetupEvent::Disconnected
                }
            }
        })
    }

    fn fetch_referrer(&mut self) -> BoxFuture<'_, Result<Referrer, FetchError>> {
        Box::pin(async move {
            let response = self
                .client
                .get(self.url("/referrer"))
                .send()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?
                .error_for_status()
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            let body: ReferrerBody = response
                .json()
                .await
                .map_err(|e| FetchError::Malformed(e.to_string()))?;
            Ok(Referrer::new(body.install_referrer)?)
        })
    }

    fn disconnect(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            // Best effort; the session also expires server-side.
            if let Err(e) = self.client.delete(self.url("")).send().await {
                tracing::debug!("Session close failed: {e}");
            }
        })
    }
}
