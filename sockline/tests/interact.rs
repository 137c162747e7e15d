#![cfg(unix)]
//! Interactive-bridge tests driven through pipes.

use std::fs::File;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::os::unix::io::FromRawFd;
use std::thread;

use sockline::{Connection, Timeout};

/// (read end, write end) of a fresh pipe.
fn pipe() -> (File, File) {
    let mut fds = [0i32; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) }
}

/// Residual bytes reach the output before any socket traffic; each direction
/// keeps its own byte order; peer close ends the session cleanly.
#[test]
fn bridge_flushes_residual_and_preserves_per_source_order() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let peer = thread::spawn(move || {
        let (mut s, _) = listener.accept().unwrap();
        s.write_all(b"early|late").unwrap();
        // Wait for the bridged input before answering.
        let mut got = [0u8; 6];
        s.read_exact(&mut got).unwrap();
        assert_eq!(&got, b"typed\n");
        s.write_all(b"reply").unwrap();
        // Dropping the stream terminates the bridge.
    });

    let mut nc = Connection::connect(addr).unwrap();
    assert_eq!(nc.recv_until(b"|", Timeout::Forever).unwrap(), b"early|");

    let (input, mut feed) = pipe();
    feed.write_all(b"typed\n").unwrap();
    drop(feed);

    let mut output = Vec::new();
    nc.interact_with(input, &mut output).unwrap();
    peer.join().unwrap();

    assert_eq!(output, b"latereply");
}

#[test]
fn bridge_ends_when_peer_closes_immediately() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let peer = thread::spawn(move || {
        let (s, _) = listener.accept().unwrap();
        drop(s);
    });

    let mut nc = Connection::connect(addr).unwrap();
    peer.join().unwrap();

    let (input, _feed) = pipe();
    let mut output = Vec::new();
    nc.interact_with(input, &mut output).unwrap();
    assert!(output.is_empty());
}

/// The bridge suppresses echo while it runs and puts the old verbosity back.
#[test]
fn bridge_restores_verbosity() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let peer = thread::spawn(move || {
        let (s, _) = listener.accept().unwrap();
        drop(s);
    });

    let mut nc = Connection::builder()
        .remote(addr)
        .verbose(true)
        .echo_to(Box::new(std::io::sink()))
        .build()
        .unwrap();
    peer.join().unwrap();

    let (input, _feed) = pipe();
    nc.interact_with(input, &mut Vec::new()).unwrap();
    assert!(nc.echo_mut().verbose());
}
