//! Datagram-mode tests: learned peers and explicit addressing.

use std::net::{Shutdown, UdpSocket};
use std::thread;
use std::time::Duration;

use sockline::{Connection, SockError, Timeout};

#[test]
fn listen_learns_peer_and_buffers_first_datagram() {
    // Reserve a port, free it, and immediately rebind as the listening
    // endpoint (the bind sets SO_REUSEADDR).
    let probe = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    let client_addr = client.local_addr().unwrap();
    let sender = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        client.send_to(b"hello", addr).unwrap();
        let mut back = [0u8; 16];
        let (n, from) = client.recv_from(&mut back).unwrap();
        (back[..n].to_vec(), from)
    });

    let mut nc = Connection::listen_udp(addr).unwrap();
    assert_eq!(nc.peer_addr(), Some(client_addr));
    // The datagram that taught us the peer was captured, not lost.
    assert_eq!(nc.buffered(), b"hello");
    assert_eq!(nc.recv(5, Timeout::Forever).unwrap(), b"hello");

    // Replies go to the learned address through the explicit-target path.
    nc.send(b"back").unwrap();
    let (back, from) = sender.join().unwrap();
    assert_eq!(back, b"back");
    assert_eq!(from, addr);
}

#[test]
fn connected_datagram_round_trip() {
    let server = UdpSocket::bind("127.0.0.1:0").unwrap();
    let server_addr = server.local_addr().unwrap();
    let echo = thread::spawn(move || {
        let mut buf = [0u8; 16];
        let (n, from) = server.recv_from(&mut buf).unwrap();
        server.send_to(&buf[..n], from).unwrap();
    });

    let mut nc = Connection::connect_udp(server_addr).unwrap();
    nc.send(b"marco").unwrap();
    assert_eq!(
        nc.recv(16, Duration::from_secs(2)).unwrap(),
        b"marco"
    );
    assert!(!nc.timed_out());
    echo.join().unwrap();
}

#[test]
fn shutdown_is_unsupported_on_datagram_sockets() {
    let target = UdpSocket::bind("127.0.0.1:0").unwrap();
    let nc = Connection::connect_udp(target.local_addr().unwrap()).unwrap();
    match nc.shutdown(Shutdown::Both) {
        Err(SockError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::Unsupported),
        other => panic!("expected Unsupported, got {other:?}"),
    }
}
