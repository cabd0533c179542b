//! Stream-socket transport.
//!
//! Used by devices with TCP command ports: Extron switchers via their
//! control interface, camera gateways, IP-attached serial bridges.  The
//! write half lives behind an async mutex; a spawned reader task delivers
//! each nonempty read chunk as one inbound message.  The transport owns no
//! framing — adapters that need line or length framing layer it on top.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use avlink_core::{ConnectionState, Payload, SubscriptionId, TransportError};

use super::{LinkCore, MessageObserver, StateObserver, TransportClient};

/// TCP client transport for one device endpoint (`host:port`).
pub struct TcpTransport {
    core: Arc<LinkCore>,
    // Also serves as the connect/disconnect/send serialization lock.
    write_half: Mutex<Option<OwnedWriteHalf>>,
}

impl TcpTransport {
    /// Creates a transport for `target` (`"host:port"`).  No I/O happens
    /// until [`connect`](TransportClient::connect).
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            core: Arc::new(LinkCore::new(target)),
            write_half: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TransportClient for TcpTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut guard = self.write_half.lock().await;
        if guard.is_some() && self.core.state().is_connected() {
            debug!(target = %self.core.target(), "connect: already connected");
            return Ok(());
        }

        self.core.set_state(ConnectionState::Connecting);
        match TcpStream::connect(self.core.target()).await {
            Ok(stream) => {
                let epoch = self.core.next_epoch();
                let (read_half, write_half) = stream.into_split();
                *guard = Some(write_half);

                let core = Arc::clone(&self.core);
                tokio::spawn(read_loop(core, read_half, epoch));

                self.core.set_state(ConnectionState::Connected);
                info!(target = %self.core.target(), "tcp transport connected");
                Ok(())
            }
            Err(source) => {
                self.core.set_state(ConnectionState::Error);
                Err(TransportError::ConnectFailed {
                    target: self.core.target().to_owned(),
                    source,
                })
            }
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut guard = self.write_half.lock().await;
        // Detach the reader before closing so it cannot report our own
        // shutdown as a peer close.
        self.core.next_epoch();
        if let Some(mut write_half) = guard.take() {
            let _ = write_half.shutdown().await;
        }
        self.core.set_state(ConnectionState::Disconnected);
        info!(target = %self.core.target(), "tcp transport disconnected");
        Ok(())
    }

    async fn send(&self, payload: Payload) -> Result<(), TransportError> {
        let mut guard = self.write_half.lock().await;
        let write_half = guard.as_mut().ok_or(TransportError::NotConnected)?;
        if !self.core.state().is_connected() {
            return Err(TransportError::NotConnected);
        }

        match write_half.write_all(payload.as_bytes()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // The link is unusable; drop the write half and surface Error.
                *guard = None;
                self.core.next_epoch();
                self.core.set_state(ConnectionState::Error);
                Err(TransportError::Io(e))
            }
        }
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

/// Reader task for one connection epoch.
///
/// EOF is a clean peer close (`Disconnected`); a read error is `Error`.
/// Both checks are epoch-guarded so a reader outliving its connection
/// silently exits instead of clobbering newer state.
async fn read_loop(core: Arc<LinkCore>, mut reader: OwnedReadHalf, epoch: u64) {
    let mut buf = vec![0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!(target = %core.target(), "peer closed tcp connection");
                core.set_state_if_epoch(epoch, ConnectionState::Disconnected);
                break;
            }
            Ok(n) => {
                let payload = Payload::from_inbound(&buf[..n]);
                if !core.emit_message_if_epoch(epoch, &payload) {
                    break; // superseded
                }
            }
            Err(e) => {
                if core.set_state_if_epoch(epoch, ConnectionState::Error) {
                    warn!(target = %core.target(), "tcp read error: {e}");
                }
                break;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
