//! `ClientSession` against a plain `std::net::TcpListener` standing in for
//! the server, so each test controls the remote side byte by byte.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lanchat_client::{ClientOptions, ClientPhase, ClientSession};
use lanchat_core::notify::mock::RecordingSink;
use lanchat_core::{SessionError, SessionEvent, SessionStatus, StatusEvent};

const WAIT: Duration = Duration::from_secs(5);

fn fake_server() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    (listener, addr)
}

fn client() -> (ClientSession, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    (ClientSession::new(ClientOptions::default(), sink.clone()), sink)
}

fn is_connected(event: &SessionEvent) -> bool {
    matches!(event, SessionEvent::Status(StatusEvent::Connected { slot: None, .. }))
}

/// Connects `client` to `listener` and returns the server side of the socket.
fn connect(client: &ClientSession, sink: &RecordingSink, listener: &TcpListener) -> TcpStream {
    let addr = listener.local_addr().expect("local addr");
    client.connect("127.0.0.1", addr.port()).expect("connect scheduled");
    let (peer, _) = listener.accept().expect("accept");
    peer.set_read_timeout(Some(WAIT)).expect("timeout");
    assert!(sink.wait_for(WAIT, is_connected), "no Connected notification");
    peer
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn test_connect_reports_success_once_and_activates() {
    // Arrange
    let (listener, addr) = fake_server();
    let (client, sink) = client();

    // Act
    let _peer = connect(&client, &sink, &listener);
    std::thread::sleep(Duration::from_millis(100));

    // Assert
    assert_eq!(sink.count(is_connected), 1);
    assert_eq!(sink.status_texts(), vec![format!("Connected to {addr}!")]);
    assert_eq!(client.status(), SessionStatus::Active);
    assert_eq!(client.phase(), ClientPhase::Connected);
    client.finish();
}

#[test]
fn test_refused_connect_reports_failure_and_leaves_status_unset() {
    // Arrange: grab a free port, then release it so nothing listens there
    let (listener, addr) = fake_server();
    drop(listener);
    let (client, sink) = client();

    // Act
    tokio_test::assert_ok!(client.connect("127.0.0.1", addr.port()));

    // Assert
    assert!(sink.wait_for(WAIT, |e| matches!(
        e,
        SessionEvent::Status(StatusEvent::Failed(SessionError::Connect { .. }))
    )));
    assert!(wait_until(WAIT, || client.phase() == ClientPhase::Unconnected));
    assert_eq!(client.status(), SessionStatus::NotStarted);
    assert_eq!(sink.count(is_connected), 0);
    client.finish();
}

#[test]
fn test_received_bytes_are_delivered_in_order() {
    // Arrange
    let (listener, _addr) = fake_server();
    let (client, sink) = client();
    let mut peer = connect(&client, &sink, &listener);

    // Act
    peer.write_all(b"first ").unwrap();
    peer.write_all(b"second").unwrap();

    // Assert
    assert!(wait_until(WAIT, || sink.received_bytes() == b"first second"));
    assert!(sink.messages().iter().all(|m| m.from.is_none()));
    client.finish();
}

#[test]
fn test_sent_bytes_reach_the_server_in_call_order() {
    // Arrange
    let (listener, _addr) = fake_server();
    let (client, sink) = client();
    let mut peer = connect(&client, &sink, &listener);

    // Act
    for chunk in [&b"one,"[..], &b"two,"[..], &b"three"[..]] {
        client.send(chunk).expect("send");
    }

    // Assert
    let mut received = vec![0u8; b"one,two,three".len()];
    peer.read_exact(&mut received).expect("read");
    assert_eq!(received, b"one,two,three");
    client.finish();
}

#[test]
fn test_server_hang_up_closes_session_and_allows_reconnect() {
    // Arrange
    let (listener, _addr) = fake_server();
    let (client, sink) = client();
    let peer = connect(&client, &sink, &listener);

    // Act
    drop(peer);

    // Assert
    assert!(sink.wait_for(WAIT, |e| matches!(
        e,
        SessionEvent::Status(StatusEvent::PeerDisconnected { slot: None })
    )));
    assert_eq!(client.phase(), ClientPhase::Closed);
    assert_eq!(client.status(), SessionStatus::Stopped);
    assert!(matches!(client.send(b"late"), Err(SessionError::NotConnected)));

    // Act: a new connect from Closed
    tokio_test::assert_ok!(client.connect("127.0.0.1", listener.local_addr().unwrap().port()));
    let (_peer, _) = listener.accept().expect("accept");

    // Assert
    assert!(sink.wait_for_count(WAIT, 2, is_connected));
    assert_eq!(client.phase(), ClientPhase::Connected);
    assert_eq!(client.status(), SessionStatus::Active);
    client.finish();
}

#[test]
fn test_close_connection_shuts_socket_and_stops_session() {
    // Arrange
    let (listener, _addr) = fake_server();
    let (client, sink) = client();
    let mut peer = connect(&client, &sink, &listener);

    // Act
    client.close_connection();

    // Assert
    let mut buf = [0u8; 8];
    assert_eq!(peer.read(&mut buf).expect("read"), 0, "server must see EOF");
    assert_eq!(client.status(), SessionStatus::Stopped);
    assert_eq!(client.phase(), ClientPhase::Closed);
    assert!(sink.wait_for(WAIT, |e| matches!(e, SessionEvent::Status(StatusEvent::Closed))));
    client.finish();
}

#[test]
fn test_close_racing_connect_never_leaves_session_active() {
    // Arrange: the listener never accepts, the kernel completes handshakes
    let (_listener, addr) = fake_server();
    let (client, _sink) = client();

    for round in 0..50 {
        // Act
        client.connect("127.0.0.1", addr.port()).expect("connect scheduled");
        std::thread::sleep(Duration::from_micros(round * 20));
        client.close_connection();

        // Assert
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(client.phase(), ClientPhase::Closed, "round {round}");
        assert_ne!(client.status(), SessionStatus::Active, "round {round}");
    }

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(client.phase(), ClientPhase::Closed);
    assert_ne!(client.status(), SessionStatus::Active);
    assert!(matches!(client.send(b"late"), Err(SessionError::NotConnected)));
    client.finish();
}

#[test]
fn test_finish_twice_is_quiet() {
    // Arrange
    let (listener, _addr) = fake_server();
    let (client, sink) = client();
    let _peer = connect(&client, &sink, &listener);

    // Act
    client.finish();
    let after_first = sink.count(|_| true);
    client.finish();

    // Assert
    assert_eq!(sink.count(|_| true), after_first);
    assert_eq!(
        sink.count(|e| matches!(e, SessionEvent::Status(StatusEvent::Closed))),
        1
    );
    assert_eq!(
        sink.count(|e| matches!(e, SessionEvent::Status(StatusEvent::Failed(_)))),
        0
    );
}
