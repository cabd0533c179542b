//! Post-connect handshake sequencing.
//!
//! Several devices require a scripted exchange right after the link comes
//! up before they accept normal commands: log in to a CLI, disable echo,
//! switch a protocol mode.  A [`HandshakeSequence`] is that script — an
//! ordered list of steps, each a payload to send plus a pause for the
//! device to chew on it.  Steps run strictly in order and the sequence
//! aborts on the first send failure; a device that rejected step one is
//! not going to make sense of step three.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use avlink_core::{ConnectionState, Payload, SubscriptionId, TransportError};

use crate::transport::TransportClient;

/// One step of a handshake: send `command`, then wait `post_delay` before
/// the next step.
#[derive(Debug, Clone)]
pub struct HandshakeStep {
    pub command: Payload,
    pub post_delay: Duration,
}

impl HandshakeStep {
    pub fn new(command: impl Into<Payload>, post_delay: Duration) -> Self {
        Self {
            command: command.into(),
            post_delay,
        }
    }

    /// A step with no settling pause after it.
    pub fn immediate(command: impl Into<Payload>) -> Self {
        Self::new(command, Duration::ZERO)
    }
}

/// An ordered post-connect script for one device.
#[derive(Debug, Clone, Default)]
pub struct HandshakeSequence {
    steps: Vec<HandshakeStep>,
}

impl HandshakeSequence {
    pub fn new(steps: Vec<HandshakeStep>) -> Self {
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Runs the script over `transport`, step by step.
    ///
    /// # Errors
    ///
    /// Returns the first step's send error; later steps are skipped.
    pub async fn run(&self, transport: &dyn TransportClient) -> Result<(), TransportError> {
        for (index, step) in self.steps.iter().enumerate() {
            if let Err(e) = transport.send(step.command.clone()).await {
                warn!(step = index, "handshake aborted: {e}");
                return Err(e);
            }
            debug!(step = index, "handshake step sent");
            if !step.post_delay.is_zero() {
                tokio::time::sleep(step.post_delay).await;
            }
        }
        Ok(())
    }

    /// Attaches the sequence to `transport` so it runs automatically on
    /// every transition into `Connected`.
    ///
    /// Returns the subscription id; pass it to
    /// [`TransportClient::unsubscribe_state`] to detach.  An empty
    /// sequence still subscribes, which keeps detach handling uniform for
    /// callers that build sequences from config.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime; the handle is captured so
    /// the run can be spawned from whichever thread reports the state
    /// change.
    pub fn attach(self, transport: Arc<dyn TransportClient>) -> SubscriptionId {
        let runtime = Handle::current();
        let sequence = Arc::new(self);
        let observer_transport = Arc::clone(&transport);

        transport.on_state_change(Box::new(move |state| {
            if *state != ConnectionState::Connected {
                return;
            }
            let sequence = Arc::clone(&sequence);
            let transport = Arc::clone(&observer_transport);
            runtime.spawn(async move {
                match sequence.run(transport.as_ref()).await {
                    Ok(()) => info!(steps = sequence.len(), "handshake complete"),
                    Err(_) => {} // already logged per step
                }
            });
        }))
    }
}

impl FromIterator<HandshakeStep> for HandshakeSequence {
    fn from_iter<I: IntoIterator<Item = HandshakeStep>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
