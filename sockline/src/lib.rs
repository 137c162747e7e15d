//! # sockline
//!
//! Netcat as a library: a buffered transport over one TCP or UDP connection
//! with deadline-bounded receives and an interactive terminal bridge.
//!
//! ## Features
//!
//! - **Buffered receives**: `recv`, `recv_until`, `recv_exactly`, `recv_all`
//!   share one residual buffer; bytes are consumed exactly once, in order
//! - **Deadline arithmetic**: per-call timeouts recomputed across raw reads,
//!   with the connection's persistent timeout restored on every exit path
//! - **Timeouts are outcomes, not errors**: expiry latches a flag and returns
//!   whatever arrived
//! - **Interactive bridge**: poll(2)-driven session between the connection and
//!   a local input/output pair
//! - **Injectable echo/log sinks**: per-line or hex-dump echo, byte-exact
//!   traffic mirroring, composable via [`Tee`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use sockline::{Connection, Timeout};
//!
//! let mut nc = Connection::connect("127.0.0.1:4000")?;
//! nc.send(b"ping")?;
//! let line = nc.recv_until(b"\n", Timeout::After(Duration::from_secs(2)))?;
//! if nc.timed_out() {
//!     eprintln!("no newline within two seconds");
//! }
//! ```

// Tracing macros - no-op when feature disabled
#[cfg(feature = "tracing")]
macro_rules! trace_debug { ($($arg:tt)*) => { tracing::debug!($($arg)*) } }
#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug { ($($arg:tt)*) => {} }

#[cfg(feature = "tracing")]
macro_rules! trace_warn { ($($arg:tt)*) => { tracing::warn!($($arg)*) } }
#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn { ($($arg:tt)*) => {} }

pub(crate) use trace_debug;
pub(crate) use trace_warn;

mod conn;
mod deadline;
mod echo;
mod error;
mod sock;

#[cfg(unix)]
mod interact;

pub use conn::{Builder, Connection, RECV_CHUNK};
pub use deadline::Timeout;
pub use echo::{Echo, Tee};
pub use error::{Result, SockError};
