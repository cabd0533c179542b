//! Keep-alive status polling.
//!
//! Most devices in the fleet only report state when asked, so each adapter
//! runs a periodic status query over its transport.  The poll is also the
//! liveness probe: a device that stops answering shows up as a send error
//! or a state transition on the transport, both of which the adapter
//! already observes.
//!
//! A poll tick on a disconnected transport is a silent no-op.  Polling
//! must never *cause* connections — that is the on-demand sender's call to
//! make — and a `NotConnected` error every few seconds would just be log
//! noise.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use avlink_core::Payload;

use crate::task::ScheduledTask;
use crate::transport::TransportClient;

/// Builds the periodic status poller for one device.
///
/// The returned task is idle until [`restart`](ScheduledTask::restart) is
/// called, which adapters do once their transport is wired up; `stop()` or
/// dropping the task ends polling.  Each tick sends `command` if the
/// transport is currently connected.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime, as
/// [`ScheduledTask::new`] does.
pub fn status_poller(
    name: impl Into<String>,
    transport: Arc<dyn TransportClient>,
    command: Payload,
    interval: Duration,
) -> ScheduledTask {
    ScheduledTask::new(name, interval, false, move || {
        let transport = Arc::clone(&transport);
        let command = command.clone();
        async move { poll_once(transport.as_ref(), command).await }
    })
}

/// One poll tick: send the status query, or skip it while disconnected.
async fn poll_once(
    transport: &dyn TransportClient,
    command: Payload,
) -> Result<(), crate::task::ActionError> {
    if !transport.connection_state().is_connected() {
        trace!("skipping status poll while disconnected");
        return Ok(());
    }
    transport.send(command).await?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
