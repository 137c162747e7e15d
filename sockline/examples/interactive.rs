//! Terminal session against a remote endpoint, netcat style.
//!
//! Run with: cargo run --example interactive -- 127.0.0.1:4000

#[cfg(unix)]
fn main() -> sockline::Result<()> {
    use sockline::Connection;

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:4000".to_string());

    let mut nc = Connection::builder()
        .remote(addr.as_str())
        .verbose(true)
        .build()?;
    nc.interact()?;
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("the interactive bridge is unix-only");
}
