//! Socket endpoint: one connected handle, stream or datagram, behind a uniform
//! raw surface. Listener setup goes through socket2 so SO_REUSEADDR can be set
//! before bind, which std does not expose.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
#[cfg(unix)]
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

/// The underlying handle.
#[derive(Debug)]
pub(crate) enum Sock {
    Stream(TcpStream),
    Dgram(UdpSocket),
}

impl Sock {
    /// One bounded raw read. Zero means the peer closed (or sent an empty
    /// datagram, which is treated the same way).
    pub(crate) fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Sock::Stream(s) => s.read(buf),
            Sock::Dgram(s) => s.recv(buf),
        }
    }

    /// Connection-oriented write; the kernel may accept fewer bytes than given.
    pub(crate) fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sock::Stream(s) => s.write(buf),
            Sock::Dgram(s) => s.send(buf),
        }
    }

    /// Explicit-target write, used when the peer was learned rather than fixed
    /// at construction.
    pub(crate) fn send_to(&mut self, buf: &[u8], peer: SocketAddr) -> io::Result<usize> {
        match self {
            Sock::Stream(s) => s.write(buf),
            Sock::Dgram(s) => s.send_to(buf, peer),
        }
    }

    pub(crate) fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Sock::Stream(s) => s.set_read_timeout(timeout),
            Sock::Dgram(s) => s.set_read_timeout(timeout),
        }
    }

    pub(crate) fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        match self {
            Sock::Stream(s) => s.shutdown(how),
            Sock::Dgram(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "shutdown on a datagram socket",
            )),
        }
    }

    pub(crate) fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Sock::Stream(s) => s.peer_addr(),
            Sock::Dgram(s) => s.peer_addr(),
        }
    }

    pub(crate) fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Sock::Stream(s) => s.local_addr(),
            Sock::Dgram(s) => s.local_addr(),
        }
    }
}

#[cfg(unix)]
impl AsRawFd for Sock {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Sock::Stream(s) => s.as_raw_fd(),
            Sock::Dgram(s) => s.as_raw_fd(),
        }
    }
}

/// SO_RCVTIMEO fires as WouldBlock on unix and TimedOut on windows.
pub(crate) fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

pub(crate) fn resolve(addr: impl ToSocketAddrs) -> io::Result<SocketAddr> {
    addr.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "address resolved to nothing",
        )
    })
}

/// Bind a reusable listener, accept exactly one client, and drop the listener.
pub(crate) fn listen_stream(addr: SocketAddr) -> io::Result<(TcpStream, SocketAddr)> {
    let listener = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    listener.set_reuse_address(true)?;
    listener.bind(&addr.into())?;
    listener.listen(1)?;
    let (accepted, peer) = listener.accept()?;
    let peer = peer
        .as_socket()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "accepted a non-inet peer"))?;
    Ok((accepted.into(), peer))
}

/// Bind a reusable datagram socket.
pub(crate) fn bind_dgram(addr: SocketAddr) -> io::Result<UdpSocket> {
    let sock = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    sock.set_reuse_address(true)?;
    sock.bind(&addr.into())?;
    Ok(sock.into())
}

/// Datagram socket bound to an ephemeral local port and connected to `peer`.
pub(crate) fn connect_dgram(peer: SocketAddr) -> io::Result<UdpSocket> {
    let local = match peer {
        SocketAddr::V4(_) => SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0),
        SocketAddr::V6(_) => SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0),
    };
    let sock = UdpSocket::bind(local)?;
    sock.connect(peer)?;
    Ok(sock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_kinds() {
        assert!(is_timeout(&io::Error::new(io::ErrorKind::WouldBlock, "t")));
        assert!(is_timeout(&io::Error::new(io::ErrorKind::TimedOut, "t")));
        assert!(!is_timeout(&io::Error::new(io::ErrorKind::BrokenPipe, "t")));
    }

    #[test]
    fn resolve_picks_first_candidate() {
        let addr = resolve("127.0.0.1:80").unwrap();
        assert_eq!(addr.port(), 80);
        assert!(addr.is_ipv4());
    }

    #[test]
    fn dgram_shutdown_is_unsupported() {
        let sock = Sock::Dgram(UdpSocket::bind("127.0.0.1:0").unwrap());
        let err = sock.shutdown(Shutdown::Both).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}
