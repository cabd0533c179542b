//! Datagram-socket transport.
//!
//! Used by devices controlled with connectionless command packets (PJLink
//! beacons, some lighting gateways).  The socket is bound to an ephemeral
//! local port and `connect`ed to the peer, so `send` needs no address and
//! inbound traffic is already filtered to the device.  One datagram in, one
//! message out.
//!
//! UDP has no peer-close signal, so the only transitions out of `Connected`
//! are a local `disconnect()` or a socket error.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use avlink_core::{ConnectionState, Payload, SubscriptionId, TransportError};

use super::{LinkCore, MessageObserver, StateObserver, TransportClient};

/// UDP client transport for one device endpoint (`host:port`).
pub struct UdpTransport {
    core: Arc<LinkCore>,
    socket: Mutex<Option<Arc<UdpSocket>>>,
}

impl UdpTransport {
    /// Creates a transport for `target` (`"host:port"`).  No I/O happens
    /// until [`connect`](TransportClient::connect).
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            core: Arc::new(LinkCore::new(target)),
            socket: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TransportClient for UdpTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut guard = self.socket.lock().await;
        if guard.is_some() && self.core.state().is_connected() {
            return Ok(());
        }

        self.core.set_state(ConnectionState::Connecting);

        let bind_and_connect = async {
            let socket = UdpSocket::bind("0.0.0.0:0").await?;
            socket.connect(self.core.target()).await?;
            Ok::<UdpSocket, std::io::Error>(socket)
        };

        match bind_and_connect.await {
            Ok(socket) => {
                let socket = Arc::new(socket);
                let epoch = self.core.next_epoch();
                *guard = Some(Arc::clone(&socket));

                let core = Arc::clone(&self.core);
                tokio::spawn(recv_loop(core, socket, epoch));

                self.core.set_state(ConnectionState::Connected);
                info!(target = %self.core.target(), "udp transport connected");
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
        let mut guard = self.socket.lock().await;
        self.core.next_epoch();
        guard.take(); // dropping the last Arc closes the socket
        self.core.set_state(ConnectionState::Disconnected);
        info!(target = %self.core.target(), "udp transport disconnected");
        Ok(())
    }

    async fn send(&self, payload: Payload) -> Result<(), TransportError> {
        let guard = self.socket.lock().await;
        let socket = guard.as_ref().ok_or(TransportError::NotConnected)?;
        if !self.core.state().is_connected() {
            return Err(TransportError::NotConnected);
        }

        match socket.send(payload.as_bytes()).await {
            Ok(_) => Ok(()),
            Err(e) => {
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

/// Receive task for one connection epoch.  One datagram = one message.
async fn recv_loop(core: Arc<LinkCore>, socket: Arc<UdpSocket>, epoch: u64) {
    let mut buf = vec![0u8; 4096];
    loop {
        match socket.recv(&mut buf).await {
            Ok(n) => {
                let payload = Payload::from_inbound(&buf[..n]);
                if !core.emit_message_if_epoch(epoch, &payload) {
                    debug!(target = %core.target(), "udp reader superseded; exiting");
                    break;
                }
            }
            Err(e) => {
                if core.set_state_if_epoch(epoch, ConnectionState::Error) {
                    warn!(target = %core.target(), "udp recv error: {e}");
                }
                break;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_send_before_connect_fails_with_not_connected() {
        let transport = UdpTransport::new("127.0.0.1:9999");
        let result = transport.send(Payload::from("%1POWR ?\r")).await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn test_connect_succeeds_without_listening_peer() {
        // UDP connect only fixes the peer address; no handshake happens.
        let transport = UdpTransport::new("127.0.0.1:9999");
        tokio_test::assert_ok!(transport.connect().await);
        assert_eq!(transport.connection_state(), ConnectionState::Connected);
        transport.disconnect().await.expect("disconnect");
    }

    #[tokio::test]
    async fn test_disconnect_transitions_to_disconnected() {
        let transport = UdpTransport::new("127.0.0.1:9999");
        transport.connect().await.expect("udp connect");
        transport.disconnect().await.expect("disconnect");
        assert_eq!(
            transport.connection_state(),
            ConnectionState::Disconnected
        );

        // And send is refused again after disconnect.
        let result = transport.send(Payload::from("x")).await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }
}
