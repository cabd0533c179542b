//! HTTP request/response transport.
//!
//! Used by devices exposing a REST-ish command endpoint (media recorders,
//! presentation gateways).  HTTP has no long-lived link, so `connect()`
//! validates the endpoint URL and marks the client ready; each `send()`
//! POSTs the payload and the response body comes back through the normal
//! `MessageReceived` stream, on the calling task.
//!
//! A request that fails at the transport level (refused, timeout, DNS)
//! downgrades the state to `Error`.  An HTTP error status is a device-level
//! answer, not a link failure: it is returned to the caller and the state
//! stays `Connected`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use avlink_core::{ConnectionState, Payload, SubscriptionId, TransportError};

use super::{LinkCore, MessageObserver, StateObserver, TransportClient};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client transport for one device endpoint URL.
pub struct HttpTransport {
    core: Arc<LinkCore>,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport posting to `endpoint` (e.g.
    /// `http://10.0.40.60/api/command`).
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            core: Arc::new(LinkCore::new(endpoint)),
            client,
        }
    }
}

#[async_trait]
impl TransportClient for HttpTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.core.set_state(ConnectionState::Connecting);
        match reqwest::Url::parse(self.core.target()) {
            Ok(_) => {
                self.core.set_state(ConnectionState::Connected);
                info!(endpoint = %self.core.target(), "http transport ready");
                Ok(())
            }
            Err(e) => {
                self.core.set_state(ConnectionState::Error);
                Err(TransportError::InvalidEndpoint(format!(
                    "{}: {e}",
                    self.core.target()
                )))
            }
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.core.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    async fn send(&self, payload: Payload) -> Result<(), TransportError> {
        if !self.core.state().is_connected() {
            return Err(TransportError::NotConnected);
        }

        let request = match &payload {
            Payload::Text(text) => self
                .client
                .post(self.core.target())
                .header(reqwest::header::CONTENT_TYPE, "text/plain")
                .body(text.clone()),
            Payload::Binary(bytes) => self
                .client
                .post(self.core.target())
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(bytes.clone()),
        };

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                self.core.set_state(ConnectionState::Error);
                warn!(endpoint = %self.core.target(), "http request failed: {e}");
                return Err(TransportError::Session(e.to_string()));
            }
        };

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Session(format!("reading response body: {e}")))?;

        if !status.is_success() {
            debug!(endpoint = %self.core.target(), %status, "http error status");
            return Err(TransportError::Session(format!(
                "device answered {status}"
            )));
        }

        if !body.is_empty() {
            self.core.emit_message(&Payload::from_inbound(&body));
        }
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.core.state()
    }

    fn on_state_change(&self, observer: StateObserver) -> SubscriptionId {
        self.core.subscribe_state(observer)
    }

    fn on_message(&self, observer: MessageObserver) -> SubscriptionId {
        self.core.subscribe_message(observer)
    }

    fn unsubscribe_state(&self, id: SubscriptionId) -> bool {
        self.core.unsubscribe_state(id)
    }

    fn unsubscribe_message(&self, id: SubscriptionId) -> bool {
        self.core.unsubscribe_message(id)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
