//! Interactive bridge: one poll(2) loop interleaving the connection with a
//! local input/output pair.
//!
//! Single-threaded and readiness-driven. Neither source can starve the other:
//! the loop blocks until at least one fd is ready and handles every ready fd
//! before blocking again. Byte order within each direction is preserved; the
//! global interleaving follows readiness order.

use std::io::{self, Write};
use std::mem;
use std::net::Shutdown;
use std::os::unix::io::{AsRawFd, RawFd};

use crate::conn::{Connection, RECV_CHUNK};
use crate::deadline::Timeout;
use crate::error::{Result, SockError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bridge {
    Idle,
    Active,
    Terminated,
}

impl Connection {
    /// Bridge the connection to stdin/stdout until the peer closes or the
    /// session is interrupted. Cannot be used with a timeout.
    pub fn interact(&mut self) -> Result<()> {
        self.interact_with(io::stdin(), io::stdout())
    }

    /// [`interact`](Connection::interact) with caller-supplied endpoints.
    ///
    /// `input` is watched and read by fd, so wrappers that buffer in userspace
    /// are deliberately not accepted. Echo is suppressed for the duration and
    /// restored on every exit path; log-sink mirroring stays active. Peer
    /// close, interrupts, and I/O errors all end the session cleanly, reported
    /// through the header channel rather than raised.
    pub fn interact_with<I, O>(&mut self, input: I, mut output: O) -> Result<()>
    where
        I: AsRawFd,
        O: Write,
    {
        self.echo.header(format_args!(
            "======== Beginning interactive session ========"
        ));
        self.timed_out = false;

        let saved = self.echo.set_verbose(false);
        let outcome = self.bridge(input.as_raw_fd(), &mut output);
        self.echo.set_verbose(saved);

        match outcome {
            Ok(()) => Ok(()),
            Err(SockError::Io(e)) if e.kind() == io::ErrorKind::Interrupted => {
                self.echo
                    .header(format_args!("\n======== Connection interrupted! ========"));
                Ok(())
            }
            Err(SockError::Dropped) | Err(SockError::Io(_)) => {
                self.echo
                    .header(format_args!("\n======== Connection dropped! ========"));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn bridge(&mut self, input: RawFd, output: &mut dyn Write) -> Result<()> {
        let mut state = Bridge::Idle;
        let mut watch_input = true;

        loop {
            match state {
                Bridge::Idle => {
                    // Anything already buffered reaches the local output before
                    // the first poll.
                    if !self.buf.is_empty() {
                        let pending = mem::take(&mut self.buf);
                        output.write_all(&pending)?;
                        output.flush()?;
                        self.note_recv(&pending);
                    }
                    state = Bridge::Active;
                }
                Bridge::Active => {
                    let mut fds = [
                        libc::pollfd {
                            fd: self.sock.as_raw_fd(),
                            events: libc::POLLIN,
                            revents: 0,
                        },
                        libc::pollfd {
                            fd: input,
                            events: libc::POLLIN,
                            revents: 0,
                        },
                    ];
                    let nfds = if watch_input { 2 } else { 1 };
                    let ready = unsafe { libc::poll(fds.as_mut_ptr(), nfds as libc::nfds_t, -1) };
                    if ready < 0 {
                        return Err(io::Error::last_os_error().into());
                    }

                    if fds[0].revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
                        let data = self.recv(RECV_CHUNK, Timeout::Forever)?;
                        if data.is_empty() {
                            state = Bridge::Terminated;
                        } else {
                            output.write_all(&data)?;
                            output.flush()?;
                        }
                    }

                    if watch_input && fds[1].revents & (libc::POLLIN | libc::POLLHUP) != 0 {
                        let mut chunk = [0u8; RECV_CHUNK];
                        let got = unsafe {
                            libc::read(input, chunk.as_mut_ptr().cast(), RECV_CHUNK)
                        };
                        if got < 0 {
                            return Err(io::Error::last_os_error().into());
                        } else if got == 0 {
                            // Local input finished; keep draining the
                            // connection until the peer closes.
                            watch_input = false;
                            let _ = self.shutdown(Shutdown::Write);
                        } else {
                            self.send(&chunk[..got as usize])?;
                        }
                    }
                }
                Bridge::Terminated => return Ok(()),
            }
        }
    }
}
