//! Wire framing for the rover link.
//!
//! Two datagram layouts share one cipher:
//! - **raw**: the ciphertext alone, encrypted under the all-zero IV
//! - **framed**: `base64(iv) "," base64(ciphertext)` with a fresh IV per message
//!
//! The [`nal`] module splits the camera's continuous H.264 byte stream into
//! units at `00 00 00 01` start codes so each unit can ride in one datagram;
//! [`lines`] splits subprocess text output into lines without ever failing.

pub mod codec;
pub mod error;
pub mod lines;
pub mod nal;

pub use codec::{decode_framed, encode_framed, open, seal, WireMode, FRAME_SEPARATOR};
pub use error::{FrameError, Result};
pub use lines::TextLineCodec;
pub use nal::{NalUnitCodec, StreamUnitFramer, START_CODE};
