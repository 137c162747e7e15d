//! Grab whatever a server says first, hex-dumped.
//!
//! Run with: cargo run --example banner_grab -- 127.0.0.1:22

use std::time::Duration;

use sockline::{Connection, Timeout};

fn main() -> sockline::Result<()> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:22".to_string());

    let mut nc = Connection::builder()
        .remote(addr.as_str())
        .verbose(true)
        .build()?;
    nc.echo_mut().hex = true;

    let banner = nc.recv_all(Timeout::After(Duration::from_secs(3)))?;
    if nc.timed_out() {
        println!("({} bytes before the timeout)", banner.len());
    } else {
        println!("({} bytes, server closed)", banner.len());
    }
    Ok(())
}
