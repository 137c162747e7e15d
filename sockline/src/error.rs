//! Error types for sockline.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SockError>;

#[derive(Error, Debug)]
pub enum SockError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No connection source was supplied to the builder.
    #[error("no connection source: need a socket, a remote address, or a listen address")]
    Setup,

    /// Peer closed while an operation still expected data.
    #[error("connection dropped")]
    Dropped,

    /// Peer closed before an exact-length read completed.
    #[error("connection closed with {got}/{wanted} bytes received")]
    ClosedEarly { wanted: usize, got: usize },
}

impl SockError {
    /// True for both flavors of peer-close-while-expecting-data.
    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Dropped | Self::ClosedEarly { .. })
    }
}
