//! Serial-port transport.
//!
//! Used by RS-232/RS-485 devices driven directly from the control
//! processor's ports: VISCA cameras, projector control, relay boards.
//! Ports open 8-N-1 with no flow control, which is what the device fleet
//! expects; only the baud rate varies per device.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{info, warn};

use avlink_core::{ConnectionState, Payload, SubscriptionId, TransportError};

use super::{LinkCore, MessageObserver, StateObserver, TransportClient};

/// Port settings for a [`SerialTransport`].
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// OS device path (`/dev/ttyUSB0`, `COM3`).
    pub device_path: String,
    /// Line speed in baud.
    pub baud_rate: u32,
}

impl SerialConfig {
    pub fn new(device_path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            device_path: device_path.into(),
            baud_rate,
        }
    }
}

/// Serial-port client transport for one device.
pub struct SerialTransport {
    core: Arc<LinkCore>,
    baud_rate: u32,
    write_half: Mutex<Option<WriteHalf<SerialStream>>>,
}

impl SerialTransport {
    /// Creates a transport for the given port.  The port is not opened
    /// until [`connect`](TransportClient::connect).
    pub fn new(config: SerialConfig) -> Self {
        Self {
            core: Arc::new(LinkCore::new(config.device_path)),
            baud_rate: config.baud_rate,
            write_half: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TransportClient for SerialTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut guard = self.write_half.lock().await;
        if guard.is_some() && self.core.state().is_connected() {
            return Ok(());
        }

        self.core.set_state(ConnectionState::Connecting);

        let builder = tokio_serial::new(self.core.target(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None);

        match builder.open_native_async() {
            Ok(stream) => {
                let epoch = self.core.next_epoch();
                let (read_half, write_half) = tokio::io::split(stream);
                *guard = Some(write_half);

                let core = Arc::clone(&self.core);
                tokio::spawn(read_loop(core, read_half, epoch));

                self.core.set_state(ConnectionState::Connected);
                info!(port = %self.core.target(), baud = self.baud_rate, "serial port opened");
                Ok(())
            }
            Err(e) => {
                self.core.set_state(ConnectionState::Error);
                Err(TransportError::ConnectFailed {
                    target: self.core.target().to_owned(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, e),
                })
            }
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut guard = self.write_half.lock().await;
        self.core.next_epoch();
        guard.take(); // dropping the halves closes the port
        self.core.set_state(ConnectionState::Disconnected);
        info!(port = %self.core.target(), "serial port closed");
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

/// Reader task for one open-port epoch; mirrors the TCP reader shape.
async fn read_loop(core: Arc<LinkCore>, mut reader: ReadHalf<SerialStream>, epoch: u64) {
    let mut buf = vec![0u8; 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                // Port detached (USB adapter unplugged).
                core.set_state_if_epoch(epoch, ConnectionState::Disconnected);
                break;
            }
            Ok(n) => {
                let payload = Payload::from_inbound(&buf[..n]);
                if !core.emit_message_if_epoch(epoch, &payload) {
                    break;
                }
            }
            Err(e) => {
                if core.set_state_if_epoch(epoch, ConnectionState::Error) {
                    warn!(port = %core.target(), "serial read error: {e}");
                }
                break;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
