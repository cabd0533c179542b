//! Connect-on-demand, queued-send, and idle-disconnect.
//!
//! Some devices must not hold a link open between infrequent commands — a
//! slow-waking screen-driver board is the canonical case.  The
//! [`OnDemandSender`] wraps any [`TransportClient`] with the pattern those
//! adapters share:
//!
//! 1. [`send_or_queue`](OnDemandSender::send_or_queue): if connected, send
//!    immediately; otherwise store the payload as the *single* pending
//!    command (a newer command overwrites an unsent older one — never a
//!    growing queue) and start connecting.
//! 2. When the transport reports `Connected`, wait a short settle delay
//!    (the device needs a grace period before accepting input), then flush
//!    the pending command.
//! 3. After any send, mint a fresh recency token and arm a delayed
//!    disconnect that fires only if its token is still the newest — i.e.
//!    no later command superseded it.
//!
//! # Race safety
//!
//! Minting a token and arming its timer, and a timer's token check plus the
//! disconnect it guards, both run under one async mutex (the *gate*).  An
//! idle timer can therefore never disconnect a link that a newer command
//! is actively using; a stale timer firing late just observes a newer
//! token and no-ops — by supersession, not by timer cancellation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use avlink_core::{ConnectionState, Payload, RecencyCounter, SubscriptionId, TransportError};

use crate::transport::TransportClient;

/// Timing knobs for an [`OnDemandSender`], configured per device.
#[derive(Debug, Clone)]
pub struct OnDemandConfig {
    /// Grace period between `Connected` and the flush of a queued command.
    pub settle_delay: Duration,
    /// Idle window after the last send before the link is closed.
    pub idle_timeout: Duration,
}

impl Default for OnDemandConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(300),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Lazily-connecting sender with a single-slot outbound queue and
/// recency-guarded idle disconnect.
pub struct OnDemandSender {
    transport: Arc<dyn TransportClient>,
    config: OnDemandConfig,
    pending: Arc<Mutex<Option<Payload>>>,
    recency: Arc<RecencyCounter>,
    gate: Arc<tokio::sync::Mutex<()>>,
    runtime: Handle,
    state_sub: SubscriptionId,
}

impl OnDemandSender {
    /// Wraps `transport` with the connect-on-demand pattern.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime; the handle is captured so
    /// the flush task can be spawned from the transport's state-change
    /// observer regardless of which thread delivers it.
    pub fn new(transport: Arc<dyn TransportClient>, config: OnDemandConfig) -> Self {
        let runtime = Handle::current();
        let pending = Arc::new(Mutex::new(None));
        let recency = Arc::new(RecencyCounter::new());
        let gate = Arc::new(tokio::sync::Mutex::new(()));

        let state_sub = {
            let transport = Arc::clone(&transport);
            let pending = Arc::clone(&pending);
            let recency = Arc::clone(&recency);
            let gate = Arc::clone(&gate);
            let runtime_for_observer = runtime.clone();
            let settle_delay = config.settle_delay;
            let idle_timeout = config.idle_timeout;

            transport.clone().on_state_change(Box::new(move |state| {
                if *state != ConnectionState::Connected {
                    return;
                }
                let transport = Arc::clone(&transport);
                let pending = Arc::clone(&pending);
                let recency = Arc::clone(&recency);
                let gate = Arc::clone(&gate);
                let runtime = runtime_for_observer.clone();
                runtime.clone().spawn(async move {
                    flush_after_settle(
                        transport,
                        pending,
                        recency,
                        gate,
                        runtime,
                        settle_delay,
                        idle_timeout,
                    )
                    .await;
                });
            }))
        };

        Self {
            transport,
            config,
            pending,
            recency,
            gate,
            runtime,
            state_sub,
        }
    }

    /// Sends `payload` now if the link is up; otherwise queues it
    /// (last-write-wins) and starts connecting.
    ///
    /// # Errors
    ///
    /// An immediate send propagates the transport's send error.  A connect
    /// attempt propagates the connect error — the queued payload is kept
    /// for the next attempt either way.
    pub async fn send_or_queue(&self, payload: Payload) -> Result<(), TransportError> {
        let _permit = self.gate.lock().await;

        let state = self.transport.connection_state();
        if state.is_connected() {
            self.transport.send(payload).await?;
            arm_idle_disconnect(
                &self.recency,
                &self.transport,
                &self.gate,
                &self.runtime,
                self.config.idle_timeout,
            );
            return Ok(());
        }

        {
            let mut slot = self.pending.lock().expect("pending lock poisoned");
            if slot.is_some() {
                debug!("overwriting unsent pending command");
            }
            *slot = Some(payload);
        }
        if state == ConnectionState::Connecting {
            // A dial is already in flight; the flush will pick this up.
            return Ok(());
        }
        self.transport.connect().await
    }

    /// `true` while an unsent command is queued.
    pub fn has_pending(&self) -> bool {
        self.pending.lock().expect("pending lock poisoned").is_some()
    }

    /// The wrapped transport.
    pub fn transport(&self) -> &Arc<dyn TransportClient> {
        &self.transport
    }
}

impl Drop for OnDemandSender {
    fn drop(&mut self) {
        // Scoped release of the observer registration.
        self.transport.unsubscribe_state(self.state_sub);
    }
}

/// Runs once per transition into `Connected`: settle, flush, arm.
async fn flush_after_settle(
    transport: Arc<dyn TransportClient>,
    pending: Arc<Mutex<Option<Payload>>>,
    recency: Arc<RecencyCounter>,
    gate: Arc<tokio::sync::Mutex<()>>,
    runtime: Handle,
    settle_delay: Duration,
    idle_timeout: Duration,
) {
    tokio::time::sleep(settle_delay).await;

    let _permit = gate.lock().await;
    let payload = pending.lock().expect("pending lock poisoned").take();
    let Some(payload) = payload else {
        return;
    };

    if let Err(e) = transport.send(payload.clone()).await {
        warn!("flush of queued command failed: {e}");
        // Requeue unless a newer command already took the slot.
        let mut slot = pending.lock().expect("pending lock poisoned");
        if slot.is_none() {
            *slot = Some(payload);
        }
        return;
    }
    debug!("flushed queued command after connect");
    arm_idle_disconnect(&recency, &transport, &gate, &runtime, idle_timeout);
}

/// Mints a fresh recency token and arms its disconnect timer.
///
/// Caller must hold the gate, which is what makes mint+arm atomic with
/// respect to a concurrently firing earlier timer.
fn arm_idle_disconnect(
    recency: &Arc<RecencyCounter>,
    transport: &Arc<dyn TransportClient>,
    gate: &Arc<tokio::sync::Mutex<()>>,
    runtime: &Handle,
    idle_timeout: Duration,
) {
    let token = recency.mint();
    let recency = Arc::clone(recency);
    let transport = Arc::clone(transport);
    let gate = Arc::clone(gate);

    runtime.spawn(async move {
        tokio::time::sleep(idle_timeout).await;
        let _permit = gate.lock().await;
        if recency.is_current(token) {
            debug!("idle window elapsed with no newer activity; disconnecting");
            if let Err(e) = transport.disconnect().await {
                warn!("idle disconnect failed: {e}");
            }
        } else {
            // Superseded by a newer send; the stale timer is a no-op.
            debug!(token, "stale idle timer fired after supersession");
        }
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────
