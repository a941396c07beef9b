//! Encrypted video, telemetry and command link for remotely operated rovers.
//!
//! The rover streams H.264 from its camera and JSON telemetry to an operator
//! console over UDP; the operator sends control commands back. Every datagram
//! is AES-CBC encrypted under a key both ends derive from a shared password.
//!
//! # Crate Structure
//!
//! - [`crypto`]: key derivation and the block cipher codec
//! - [`transport`]: UDP sockets
//! - [`frame`]: raw and framed datagram layouts, start-code splitting
//! - [`link`]: encrypted channels, telemetry records, the rover bridge

/// Re-export crypto types.
pub mod crypto {
    pub use roverlink_crypto::*;
}

/// Re-export transport types.
pub mod transport {
    pub use roverlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use roverlink_frame::*;
}

/// Re-export link types.
pub mod link {
    pub use roverlink_link::*;
}
