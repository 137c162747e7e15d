//! The connection: residual buffer, deadline-bounded receives, write-all send.
//!
//! All receive primitives share one discipline: reset the timed-out latch, pick
//! the effective timeout, loop over bounded raw reads with the socket timeout set
//! to whatever remains of the deadline, and restore the connection's persistent
//! timeout before anything propagates. Bytes drawn from the socket but not yet
//! consumed by the caller sit in the residual buffer and are served, in order,
//! before the socket is touched again.

use std::io::{self, Write};
use std::mem;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
#[cfg(unix)]
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use crate::deadline::{Countdown, Remaining, Timeout};
use crate::echo::Echo;
use crate::error::{Result, SockError};
use crate::sock::{self, Sock};
use crate::{trace_debug, trace_warn};

/// Bounded raw-read chunk size.
pub const RECV_CHUNK: usize = 4096;

/// Bound on the first datagram a listening endpoint accepts while learning its
/// peer.
const FIRST_DGRAM: usize = 1024;

/// A buffered, deadline-aware wrapper around one TCP or UDP connection.
///
/// Timeouts are outcomes, not errors: when a deadline expires the operation
/// returns whatever it accumulated and latches [`Connection::timed_out`].
pub struct Connection {
    pub(crate) sock: Sock,
    pub(crate) peer: Option<SocketAddr>,
    /// True when the peer was fixed at construction; selects the send path.
    pub(crate) implicit_peer: bool,
    /// Bytes drawn from the socket but not yet consumed by the caller.
    pub(crate) buf: Vec<u8>,
    /// Persistent timeout, restored on the socket after every operation.
    pub(crate) timeout: Option<Duration>,
    pub(crate) timed_out: bool,
    pub(crate) echo: Echo,
    pub(crate) log_send: Option<Box<dyn Write + Send>>,
    pub(crate) log_recv: Option<Box<dyn Write + Send>>,
}

/// Optioned construction. Exactly one source must be supplied; precedence when
/// several are given is wrapped handle, then remote, then listen.
#[derive(Default)]
pub struct Builder {
    remote: Option<SocketAddr>,
    listen: Option<SocketAddr>,
    stream: Option<TcpStream>,
    dgram: Option<UdpSocket>,
    udp: bool,
    timeout: Option<Duration>,
    verbose: bool,
    echo_sink: Option<Box<dyn Write + Send>>,
    log_send: Option<Box<dyn Write + Send>>,
    log_recv: Option<Box<dyn Write + Send>>,
    resolve_err: Option<io::Error>,
}

impl Builder {
    /// Connect to a remote address.
    pub fn remote(mut self, addr: impl ToSocketAddrs) -> Self {
        match sock::resolve(addr) {
            Ok(a) => self.remote = Some(a),
            Err(e) => self.resolve_err = Some(e),
        }
        self
    }

    /// Bind locally and wait for one peer: a single accepted client in stream
    /// mode, the first datagram's source in datagram mode.
    pub fn listen(mut self, addr: impl ToSocketAddrs) -> Self {
        match sock::resolve(addr) {
            Ok(a) => self.listen = Some(a),
            Err(e) => self.resolve_err = Some(e),
        }
        self
    }

    /// Wrap an already-connected stream.
    pub fn stream(mut self, stream: TcpStream) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Wrap an existing datagram socket.
    pub fn dgram(mut self, dgram: UdpSocket) -> Self {
        self.dgram = Some(dgram);
        self
    }

    /// Datagram mode for the `remote`/`listen` sources.
    pub fn udp(mut self, udp: bool) -> Self {
        self.udp = udp;
        self
    }

    /// Persistent timeout applied to every operation that does not override it.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Echo traffic and operation banners.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Redirect echo output away from stdout.
    pub fn echo_to(mut self, sink: Box<dyn Write + Send>) -> Self {
        self.echo_sink = Some(sink);
        self
    }

    /// Mirror every sent byte range into `sink`, independent of verbosity.
    pub fn log_send(mut self, sink: Box<dyn Write + Send>) -> Self {
        self.log_send = Some(sink);
        self
    }

    /// Mirror every received byte range into `sink`, independent of verbosity.
    pub fn log_recv(mut self, sink: Box<dyn Write + Send>) -> Self {
        self.log_recv = Some(sink);
        self
    }

    pub fn build(self) -> Result<Connection> {
        if let Some(e) = self.resolve_err {
            return Err(e.into());
        }

        let mut echo = Echo::new(self.verbose);
        if let Some(sink) = self.echo_sink {
            echo.set_sink(sink);
        }

        let mut buf = Vec::new();
        let (sock, peer, implicit_peer) = if let Some(s) = self.stream {
            let peer = s.peer_addr().ok();
            (Sock::Stream(s), peer, true)
        } else if let Some(s) = self.dgram {
            let peer = s.peer_addr().ok();
            (Sock::Dgram(s), peer, true)
        } else if let Some(addr) = self.remote {
            if self.udp {
                (Sock::Dgram(sock::connect_dgram(addr)?), Some(addr), true)
            } else {
                (Sock::Stream(TcpStream::connect(addr)?), Some(addr), true)
            }
        } else if let Some(addr) = self.listen {
            if self.udp {
                let s = sock::bind_dgram(addr)?;
                let mut first = [0u8; FIRST_DGRAM];
                let (len, peer) = s.recv_from(&mut first)?;
                // The payload that taught us the peer is never lost.
                buf.extend_from_slice(&first[..len]);
                echo.header(format_args!("Connection from {peer} accepted"));
                (Sock::Dgram(s), Some(peer), false)
            } else {
                let (s, peer) = sock::listen_stream(addr)?;
                echo.header(format_args!("Connection from {peer} accepted"));
                (Sock::Stream(s), Some(peer), true)
            }
        } else {
            return Err(SockError::Setup);
        };

        sock.set_read_timeout(self.timeout)?;
        trace_debug!(
            "endpoint ready: peer={:?} implicit_peer={}",
            peer,
            implicit_peer
        );

        Ok(Connection {
            sock,
            peer,
            implicit_peer,
            buf,
            timeout: self.timeout,
            timed_out: false,
            echo,
            log_send: self.log_send,
            log_recv: self.log_recv,
        })
    }
}

impl Connection {
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Connect a stream to `addr`.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        Self::builder().remote(addr).build()
    }

    /// Connect a datagram socket to `addr`.
    pub fn connect_udp(addr: impl ToSocketAddrs) -> Result<Self> {
        Self::builder().udp(true).remote(addr).build()
    }

    /// Bind to `addr` and accept exactly one stream client.
    pub fn listen(addr: impl ToSocketAddrs) -> Result<Self> {
        Self::builder().listen(addr).build()
    }

    /// Bind to `addr` and learn the peer from the first datagram. The first
    /// payload is buffered, and subsequent sends target the learned address.
    pub fn listen_udp(addr: impl ToSocketAddrs) -> Result<Self> {
        Self::builder().udp(true).listen(addr).build()
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        Self::builder().stream(stream).build()
    }

    /// Wrap an existing datagram socket.
    pub fn from_dgram(dgram: UdpSocket) -> Result<Self> {
        Self::builder().dgram(dgram).build()
    }

    /// The peer this connection talks to, when known.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer.or_else(|| self.sock.peer_addr().ok())
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.sock.local_addr()?)
    }

    /// True when the most recent receive stopped because its deadline expired.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Bytes already drawn from the socket but not yet consumed.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Set the persistent timeout used by `Timeout::Default` operations.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.timeout = timeout;
        self.sock.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Echo configuration; flags can be tweaked at any point.
    pub fn echo_mut(&mut self) -> &mut Echo {
        &mut self.echo
    }

    /// Shut down one or both directions. Datagram sockets do not support this
    /// and report `ErrorKind::Unsupported`.
    pub fn shutdown(&self, how: Shutdown) -> Result<()> {
        Ok(self.sock.shutdown(how)?)
    }

    /// Consume the connection and close the socket.
    pub fn close(self) {}

    /// Receive at most `max` bytes.
    ///
    /// Buffered bytes are served first without a syscall; when they satisfy
    /// `max` the socket is not touched. Otherwise one bounded raw read fetches
    /// the remainder. A peer close only raises [`SockError::Dropped`] when the
    /// effective timeout is unbounded and nothing at all was received.
    pub fn recv(&mut self, max: usize, timeout: impl Into<Timeout>) -> Result<Vec<u8>> {
        self.timed_out = false;
        let limit = self.effective(timeout.into());
        match limit {
            Some(t) => self.echo.header(format_args!(
                "======== Receiving {max}B or until timeout ({t:?}) ========"
            )),
            None => self
                .echo
                .header(format_args!("======== Receiving {max}B ========")),
        }

        if self.buf.len() >= max {
            let ret = self.take_buffered(max);
            self.note_recv(&ret);
            return Ok(ret);
        }

        let mut ret = self.take_buffered(self.buf.len());
        let want = max - ret.len();
        let countdown = Countdown::start(limit);
        let outcome = (|| -> Result<()> {
            match countdown.remaining() {
                Remaining::Expired => {
                    self.timed_out = true;
                    return Ok(());
                }
                Remaining::Left(left) => self.sock.set_read_timeout(Some(left))?,
                Remaining::Unbounded => self.sock.set_read_timeout(None)?,
            }
            let mut chunk = vec![0u8; want];
            match self.sock.recv(&mut chunk) {
                Ok(len) => {
                    chunk.truncate(len);
                    ret.extend_from_slice(&chunk);
                    Ok(())
                }
                Err(e) if sock::is_timeout(&e) => {
                    self.timed_out = true;
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        })();
        self.restore_timeout();
        outcome?;

        if limit.is_none() && ret.is_empty() {
            return Err(SockError::Dropped);
        }
        self.note_recv(&ret);
        Ok(ret)
    }

    /// Receive until `delim` occurs as a contiguous subslice, however it falls
    /// across raw reads.
    ///
    /// Returns everything up to and including the first occurrence; trailing
    /// bytes stay buffered for the next call. On deadline expiry nothing is
    /// consumed and the result is empty. A peer close before the delimiter is
    /// found raises [`SockError::Dropped`].
    pub fn recv_until(&mut self, delim: &[u8], timeout: impl Into<Timeout>) -> Result<Vec<u8>> {
        self.timed_out = false;
        let limit = self.effective(timeout.into());
        match limit {
            Some(t) => self.echo.header(format_args!(
                "======== Receiving until b\"{}\" or timeout ({t:?}) ========",
                delim.escape_ascii()
            )),
            None => self.echo.header(format_args!(
                "======== Receiving until b\"{}\" ========",
                delim.escape_ascii()
            )),
        }

        let countdown = Countdown::start(limit);
        let outcome = (|| -> Result<()> {
            while find(&self.buf, delim).is_none() {
                match countdown.remaining() {
                    Remaining::Expired => {
                        self.timed_out = true;
                        break;
                    }
                    Remaining::Left(left) => self.sock.set_read_timeout(Some(left))?,
                    Remaining::Unbounded => self.sock.set_read_timeout(None)?,
                }
                let mut chunk = [0u8; RECV_CHUNK];
                match self.sock.recv(&mut chunk) {
                    Ok(0) => return Err(SockError::Dropped),
                    Ok(len) => self.buf.extend_from_slice(&chunk[..len]),
                    Err(e) if sock::is_timeout(&e) => {
                        self.timed_out = true;
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(())
        })();
        self.restore_timeout();
        outcome?;

        let ret = if self.timed_out {
            Vec::new()
        } else {
            match find(&self.buf, delim) {
                Some(at) => self.take_buffered(at + delim.len()),
                None => Vec::new(),
            }
        };
        self.note_recv(&ret);
        Ok(ret)
    }

    /// Receive exactly `n` bytes, leaving any surplus buffered.
    ///
    /// On deadline expiry the result is short, possibly empty, with the
    /// timed-out latch set. A peer close before `n` bytes arrive (and before
    /// any timeout) raises [`SockError::ClosedEarly`] naming the deficit.
    pub fn recv_exactly(&mut self, n: usize, timeout: impl Into<Timeout>) -> Result<Vec<u8>> {
        self.timed_out = false;
        let limit = self.effective(timeout.into());
        match limit {
            Some(t) => self.echo.header(format_args!(
                "======== Receiving until exactly {n}B or timeout ({t:?}) ========"
            )),
            None => self.echo.header(format_args!(
                "======== Receiving until exactly {n}B ========"
            )),
        }

        let countdown = Countdown::start(limit);
        let outcome = (|| -> Result<()> {
            while self.buf.len() < n {
                match countdown.remaining() {
                    Remaining::Expired => {
                        self.timed_out = true;
                        break;
                    }
                    Remaining::Left(left) => self.sock.set_read_timeout(Some(left))?,
                    Remaining::Unbounded => self.sock.set_read_timeout(None)?,
                }
                let want = (n - self.buf.len()).min(RECV_CHUNK);
                let mut chunk = [0u8; RECV_CHUNK];
                match self.sock.recv(&mut chunk[..want]) {
                    Ok(0) => {
                        return Err(SockError::ClosedEarly {
                            wanted: n,
                            got: self.buf.len(),
                        })
                    }
                    Ok(len) => self.buf.extend_from_slice(&chunk[..len]),
                    Err(e) if sock::is_timeout(&e) => {
                        self.timed_out = true;
                        break;
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                        self.echo
                            .header(format_args!("\n======== Connection interrupted! ========"));
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(())
        })();
        self.restore_timeout();
        outcome?;

        let take = n.min(self.buf.len());
        let ret = self.take_buffered(take);
        self.note_recv(&ret);
        Ok(ret)
    }

    /// Receive until the peer closes or the deadline expires, draining the
    /// residual buffer along with everything newly read.
    ///
    /// Peer close, interrupts, and socket errors all end the accumulation
    /// gracefully; partial content is returned rather than raised.
    pub fn recv_all(&mut self, timeout: impl Into<Timeout>) -> Result<Vec<u8>> {
        self.timed_out = false;
        let limit = self.effective(timeout.into());
        match limit {
            Some(t) => self.echo.header(format_args!(
                "======== Receiving until close or timeout ({t:?}) ========"
            )),
            None => self
                .echo
                .header(format_args!("======== Receiving until close ========")),
        }

        let countdown = Countdown::start(limit);
        let outcome = (|| -> Result<()> {
            loop {
                match countdown.remaining() {
                    Remaining::Expired => {
                        self.timed_out = true;
                        break;
                    }
                    Remaining::Left(left) => self.sock.set_read_timeout(Some(left))?,
                    Remaining::Unbounded => self.sock.set_read_timeout(None)?,
                }
                let mut chunk = [0u8; RECV_CHUNK];
                match self.sock.recv(&mut chunk) {
                    Ok(0) => break,
                    Ok(len) => self.buf.extend_from_slice(&chunk[..len]),
                    Err(e) if sock::is_timeout(&e) => {
                        self.timed_out = true;
                        break;
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                        self.echo
                            .header(format_args!("\n======== Connection interrupted! ========"));
                        break;
                    }
                    Err(_e) => {
                        trace_warn!("treating socket error as close: {_e}");
                        self.echo
                            .header(format_args!("\n======== Connection dropped! ========"));
                        break;
                    }
                }
            }
            Ok(())
        })();
        self.restore_timeout();
        outcome?;

        let ret = mem::take(&mut self.buf);
        self.note_recv(&ret);
        Ok(ret)
    }

    /// Send all of `data`.
    ///
    /// Partial writes are re-issued until everything is out. An implicit peer
    /// uses the connection-oriented write; a learned peer is targeted
    /// explicitly.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        self.echo
            .header(format_args!("======== Sending ({}) ========", data.len()));
        self.note_send(data);

        let mut rest = data;
        while !rest.is_empty() {
            let sent = match (self.implicit_peer, self.peer) {
                (false, Some(peer)) => self.sock.send_to(rest, peer)?,
                _ => self.sock.send(rest)?,
            };
            if sent == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "socket accepted no bytes",
                )
                .into());
            }
            rest = &rest[sent..];
        }
        Ok(())
    }

    fn effective(&self, timeout: Timeout) -> Option<Duration> {
        match timeout {
            Timeout::Default => self.timeout,
            Timeout::Forever => None,
            Timeout::After(d) => Some(d),
        }
    }

    /// Guaranteed cleanup on every exit path; a socket that no longer accepts
    /// options will surface its error on the next operation instead.
    fn restore_timeout(&mut self) {
        let _ = self.sock.set_read_timeout(self.timeout);
    }

    /// Pop `n` bytes off the front of the residual buffer.
    fn take_buffered(&mut self, n: usize) -> Vec<u8> {
        let rest = self.buf.split_off(n);
        mem::replace(&mut self.buf, rest)
    }

    pub(crate) fn note_recv(&mut self, data: &[u8]) {
        self.echo.recvd(data);
        if let Some(sink) = &mut self.log_recv {
            let _ = sink.write_all(data);
            let _ = sink.flush();
        }
    }

    pub(crate) fn note_send(&mut self, data: &[u8]) {
        self.echo.sent(data);
        if let Some(sink) = &mut self.log_send {
            let _ = sink.write_all(data);
            let _ = sink.flush();
        }
    }
}

#[cfg(unix)]
impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.sock.as_raw_fd()
    }
}

/// First occurrence of `needle` in `haystack`. The caller always passes the
/// whole residual buffer, so matches spanning raw-read boundaries are found.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
