use std::net::SocketAddr;

/// Errors that can occur in datagram transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Host name lookup failed.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        source: std::io::Error,
    },

    /// Host name lookup returned no usable address.
    #[error("no address found for {host}")]
    NoAddress { host: String },

    /// Sending a datagram failed.
    #[error("failed to send to {addr}: {source}")]
    Send {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// An I/O error occurred on the socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The datagram exceeds what a single UDP packet can carry.
    #[error("datagram too large ({len} bytes, max {max})")]
    DatagramTooLarge { len: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, TransportError>;
