//! UDP datagram transport.
//!
//! Thin wrapper over a tokio UDP socket that remembers its destination, so
//! higher layers only ever say "send this datagram" or "give me the next one".
//! There is no reliability layer: datagrams may be lost, duplicated, or
//! reordered, and nothing here compensates.

pub mod error;
pub mod udp;

pub use error::{Result, TransportError};
pub use udp::{resolve, UdpTransport, MAX_DATAGRAM_SIZE};
