//! Secure-shell session transport.
//!
//! Used by devices administered over an SSH CLI: wireless-presentation
//! gateways, recorder appliances.  libssh2 is a blocking API and a session
//! must not be driven from two threads at once, so each connection gets one
//! dedicated I/O thread that owns the session and its shell channel.  The
//! thread drains an outbound command queue and polls the channel for
//! inbound data; the rest of the library talks to it through the normal
//! [`TransportClient`] surface.
//!
//! `send()` therefore reports `NotConnected` synchronously but hands the
//! actual write to the I/O thread; a write failure surfaces through
//! `ConnectionStateChanged(Error)` rather than the `send` return value.

use std::io::{Read, Write};
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ssh2::{Channel, Session};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use avlink_core::{ConnectionState, Payload, SubscriptionId, TransportError};

use super::{LinkCore, MessageObserver, StateObserver, TransportClient};

/// How long the I/O thread sleeps when the channel is idle.
const IDLE_POLL: Duration = Duration::from_millis(20);

/// Session settings for an [`SshTransport`].
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl SshConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
        }
    }
}

/// SSH-2 shell-session transport for one device.
pub struct SshTransport {
    core: Arc<LinkCore>,
    config: SshConfig,
    outbound: Mutex<Option<Sender<Payload>>>,
}

impl SshTransport {
    /// Creates a transport for the given session settings.  No connection
    /// is made until [`connect`](TransportClient::connect).
    pub fn new(config: SshConfig) -> Self {
        let target = format!("{}:{}", config.host, config.port);
        Self {
            core: Arc::new(LinkCore::new(target)),
            config,
            outbound: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TransportClient for SshTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut guard = self.outbound.lock().await;
        if guard.is_some() && self.core.state().is_connected() {
            return Ok(());
        }

        self.core.set_state(ConnectionState::Connecting);

        let core = Arc::clone(&self.core);
        let config = self.config.clone();
        let epoch = self.core.next_epoch();

        // The libssh2 handshake is blocking; run it off the async runtime.
        let result = tokio::task::spawn_blocking(move || open_session(core, config, epoch))
            .await
            .map_err(|e| TransportError::Session(format!("ssh connect task failed: {e}")))?;

        match result {
            Ok(tx) => {
                *guard = Some(tx);
                self.core.set_state(ConnectionState::Connected);
                info!(target = %self.core.target(), "ssh session established");
                Ok(())
            }
            Err(e) => {
                self.core.set_state(ConnectionState::Error);
                Err(e)
            }
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut guard = self.outbound.lock().await;
        self.core.next_epoch();
        guard.take(); // dropping the sender tells the I/O thread to exit
        self.core.set_state(ConnectionState::Disconnected);
        info!(target = %self.core.target(), "ssh session closed");
        Ok(())
    }

    async fn send(&self, payload: Payload) -> Result<(), TransportError> {
        let guard = self.outbound.lock().await;
        let tx = guard.as_ref().ok_or(TransportError::NotConnected)?;
        if !self.core.state().is_connected() {
            return Err(TransportError::NotConnected);
        }

        tx.send(payload)
            .map_err(|_| TransportError::Session("ssh I/O thread terminated".to_owned()))
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

/// Performs the blocking TCP + SSH handshake, then hands the session to a
/// dedicated I/O thread.  Returns the outbound command sender.
fn open_session(
    core: Arc<LinkCore>,
    config: SshConfig,
    epoch: u64,
) -> Result<Sender<Payload>, TransportError> {
    let stream = std::net::TcpStream::connect((config.host.as_str(), config.port)).map_err(
        |source| TransportError::ConnectFailed {
            target: core.target().to_owned(),
            source,
        },
    )?;

    let mut session =
        Session::new().map_err(|e| TransportError::Session(format!("session init: {e}")))?;
    session.set_tcp_stream(stream);
    session
        .handshake()
        .map_err(|e| TransportError::Session(format!("ssh handshake: {e}")))?;
    session
        .userauth_password(&config.username, &config.password)
        .map_err(|e| TransportError::Session(format!("ssh auth: {e}")))?;

    let mut channel = session
        .channel_session()
        .map_err(|e| TransportError::Session(format!("channel open: {e}")))?;
    channel
        .request_pty("vt100", None, None)
        .map_err(|e| TransportError::Session(format!("pty request: {e}")))?;
    channel
        .shell()
        .map_err(|e| TransportError::Session(format!("shell request: {e}")))?;

    let (tx, rx) = std::sync::mpsc::channel::<Payload>();

    std::thread::Builder::new()
        .name(format!("avlink-ssh-{}", core.target()))
        .spawn(move || io_loop(core, session, channel, rx, epoch))
        .map_err(|e| TransportError::Session(format!("failed to spawn ssh thread: {e}")))?;

    Ok(tx)
}

/// The I/O loop owned by the dedicated SSH thread.
///
/// Alternates between draining queued outbound payloads and polling the
/// channel for inbound data, with the session in non-blocking mode.  All
/// state reports are epoch-guarded so a thread outliving its connection
/// exits silently.
fn io_loop(
    core: Arc<LinkCore>,
    session: Session,
    mut channel: Channel,
    rx: Receiver<Payload>,
    epoch: u64,
) {
    session.set_blocking(false);
    let mut buf = [0u8; 4096];

    'outer: loop {
        // Outbound first: queued commands should not wait on the read poll.
        loop {
            match rx.try_recv() {
                Ok(payload) => {
                    if let Err(e) = write_fully(&mut channel, payload.as_bytes()) {
                        if core.set_state_if_epoch(epoch, ConnectionState::Error) {
                            warn!(target = %core.target(), "ssh write error: {e}");
                        }
                        break 'outer;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // Owner called disconnect() or dropped the transport.
                    debug!(target = %core.target(), "ssh command channel closed");
                    break 'outer;
                }
            }
        }

        match channel.read(&mut buf) {
            Ok(0) => {
                if channel.eof() {
                    core.set_state_if_epoch(epoch, ConnectionState::Disconnected);
                    break;
                }
                std::thread::sleep(IDLE_POLL);
            }
            Ok(n) => {
                let payload = Payload::from_inbound(&buf[..n]);
                if !core.emit_message_if_epoch(epoch, &payload) {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(IDLE_POLL);
            }
            Err(e) => {
                if core.set_state_if_epoch(epoch, ConnectionState::Error) {
                    warn!(target = %core.target(), "ssh read error: {e}");
                }
                break;
            }
        }
    }

    let _ = channel.close();
    debug!(target = %core.target(), "ssh io thread exited");
}

/// Writes all of `bytes`, retrying short non-blocking writes.
fn write_fully(channel: &mut Channel, bytes: &[u8]) -> std::io::Result<()> {
    let mut written = 0;
    while written < bytes.len() {
        match channel.write(&bytes[written..]) {
            Ok(n) => written += n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
