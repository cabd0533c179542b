//! Loopback integration tests for the socket transports.
//!
//! These tests run a real peer on 127.0.0.1 and exercise `TcpTransport`
//! and `UdpTransport` end to end: connect, bidirectional traffic, observer
//! ordering, and the clean-close transition.  They use OS-assigned ports so
//! parallel test runs never collide.
//!
//! Real sockets mean real (wall-clock) time; waits here are generous rather
//! than exact, and the exact-timing contracts are covered by the
//! virtual-time suites instead.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;

use anyhow::Result;

use avlink::transport::tcp::TcpTransport;
use avlink::transport::udp::UdpTransport;
use avlink::transport::TransportClient;
use avlink::{ConnectionState, Payload};

/// Routes library logs into the test harness; safe to call repeatedly.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Waits until `predicate` holds or the deadline passes.
async fn wait_for(mut predicate: impl FnMut() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ── TCP ───────────────────────────────────────────────────────────────────────

/// Full TCP session: connect, device sends three lines, all three arrive in
/// order; client sends a command and the device receives it.
#[tokio::test]
async fn test_tcp_session_delivers_both_directions_in_order() -> Result<()> {
    // Arrange – a device stub that speaks first, then echoes what it reads
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (received_tx, mut received_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        for line in ["banner\n", "status ok\n", "ready\n"] {
            stream.write_all(line.as_bytes()).await.expect("peer write");
            // Separate writes into separate reads on a quiet loopback.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let mut buf = [0u8; 256];
        let n = stream.read(&mut buf).await.expect("peer read");
        received_tx.send(buf[..n].to_vec()).ok();
    });

    let transport = TcpTransport::new(addr.to_string());
    let messages = Arc::new(Mutex::new(Vec::new()));
    let m = Arc::clone(&messages);
    transport.on_message(Box::new(move |p| m.lock().unwrap().push(p.clone())));

    // Act
    transport.connect().await?;
    assert_eq!(transport.connection_state(), ConnectionState::Connected);

    wait_for(|| messages.lock().unwrap().len() >= 3).await;
    transport.send(Payload::from("PWR?\r")).await?;

    // Assert – inbound arrived in order
    let seen = messages.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            Payload::from("banner\n"),
            Payload::from("status ok\n"),
            Payload::from("ready\n"),
        ]
    );
    // ...and the outbound command reached the peer intact.
    let received = received_rx.recv().await.expect("peer received");
    assert_eq!(received, b"PWR?\r");

    transport.disconnect().await?;
    Ok(())
}

/// Two message observers see each inbound message once, in registration
/// order.
#[tokio::test]
async fn test_tcp_message_observers_fire_in_registration_order() -> Result<()> {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        stream.write_all(b"event\n").await.expect("peer write");
        // Hold the connection open so no Disconnected races the assertion.
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let transport = TcpTransport::new(addr.to_string());
    let order = Arc::new(Mutex::new(Vec::new()));
    let o1 = Arc::clone(&order);
    transport.on_message(Box::new(move |_| o1.lock().unwrap().push("first")));
    let o2 = Arc::clone(&order);
    transport.on_message(Box::new(move |_| o2.lock().unwrap().push("second")));

    // Act
    transport.connect().await?;
    wait_for(|| order.lock().unwrap().len() >= 2).await;

    // Assert
    assert_eq!(order.lock().unwrap().as_slice(), ["first", "second"]);
    transport.disconnect().await?;
    Ok(())
}

/// When the peer closes the socket, the transport transitions to
/// `Disconnected` (a clean close, not an error) and observers hear it.
#[tokio::test]
async fn test_tcp_peer_close_transitions_to_disconnected() -> Result<()> {
    // Arrange – the peer accepts and immediately hangs up
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        drop(stream);
    });

    let transport = TcpTransport::new(addr.to_string());
    let states = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&states);
    transport.on_state_change(Box::new(move |state| s.lock().unwrap().push(*state)));

    // Act
    transport.connect().await?;
    wait_for(|| transport.connection_state() == ConnectionState::Disconnected).await;

    // Assert
    assert_eq!(transport.connection_state(), ConnectionState::Disconnected);
    assert_eq!(
        states.lock().unwrap().as_slice(),
        [
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
        ]
    );
    Ok(())
}

/// Sending after the peer hung up fails rather than silently buffering.
#[tokio::test]
async fn test_tcp_send_after_peer_close_fails() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        drop(stream);
    });

    let transport = TcpTransport::new(addr.to_string());
    transport.connect().await?;
    wait_for(|| transport.connection_state() == ConnectionState::Disconnected).await;

    let result = transport.send(Payload::from("too late")).await;
    assert!(result.is_err());
    Ok(())
}

// ── UDP ───────────────────────────────────────────────────────────────────────

/// UDP round trip against an echo peer: one datagram out, one message
/// event in, carrying the same bytes.
#[tokio::test]
async fn test_udp_round_trip_against_echo_peer() -> Result<()> {
    // Arrange – an echo stub
    init_tracing();
    let peer = UdpSocket::bind("127.0.0.1:0").await?;
    let peer_addr = peer.local_addr()?;
    tokio::spawn(async move {
        let mut buf = [0u8; 1024];
        let (n, from) = peer.recv_from(&mut buf).await.expect("peer recv");
        peer.send_to(&buf[..n], from).await.expect("peer echo");
    });

    let transport = UdpTransport::new(peer_addr.to_string());
    let messages = Arc::new(Mutex::new(Vec::new()));
    let m = Arc::clone(&messages);
    transport.on_message(Box::new(move |p| m.lock().unwrap().push(p.clone())));

    // Act
    transport.connect().await?;
    transport.send(Payload::from("%1POWR ?\r")).await?;
    wait_for(|| !messages.lock().unwrap().is_empty()).await;

    // Assert – one datagram in, byte-identical
    assert_eq!(
        messages.lock().unwrap().as_slice(),
        [Payload::from("%1POWR ?\r")]
    );
    transport.disconnect().await?;
    Ok(())
}

/// Datagram boundaries are preserved: two sends from the peer arrive as
/// two message events, never coalesced.
#[tokio::test]
async fn test_udp_preserves_datagram_boundaries() -> Result<()> {
    // Arrange – a peer that answers one inbound datagram with two replies
    let peer = UdpSocket::bind("127.0.0.1:0").await?;
    let peer_addr = peer.local_addr()?;
    tokio::spawn(async move {
        let mut buf = [0u8; 1024];
        let (_, from) = peer.recv_from(&mut buf).await.expect("peer recv");
        peer.send_to(b"part-one", from).await.expect("reply 1");
        peer.send_to(b"part-two", from).await.expect("reply 2");
    });

    let transport = UdpTransport::new(peer_addr.to_string());
    let messages = Arc::new(Mutex::new(Vec::new()));
    let m = Arc::clone(&messages);
    transport.on_message(Box::new(move |p| m.lock().unwrap().push(p.clone())));

    // Act
    transport.connect().await?;
    transport.send(Payload::from("poke")).await?;
    wait_for(|| messages.lock().unwrap().len() >= 2).await;

    // Assert
    assert_eq!(
        messages.lock().unwrap().as_slice(),
        [Payload::from("part-one"), Payload::from("part-two")]
    );
    transport.disconnect().await?;
    Ok(())
}
