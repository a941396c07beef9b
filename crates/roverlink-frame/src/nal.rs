//! H.264 Annex B start-code splitting.
//!
//! The camera writes one continuous byte stream. Units are delimited by the
//! 4-byte start code `00 00 00 01`; each emitted unit runs from the start of
//! the buffer up to (not including) the next start code, so every unit after
//! the first begins with its own start code.
//!
//! The search always begins at offset 1, which skips the start code that
//! heads the buffer after the previous split. Output is identical no matter
//! how the stream is chunked by the pipe.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

use crate::error::FrameError;

/// Annex B 4-byte start code.
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

const INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;

/// Splits an accumulating buffer into units at start codes.
///
/// Use with `FramedRead` over the camera's stdout, or through
/// [`StreamUnitFramer`] when chunks arrive by other means.
#[derive(Debug, Clone)]
pub struct NalUnitCodec {
    /// Offset where the next search resumes; earlier offsets are known not
    /// to start a start code.
    scan_from: usize,
    max_buffered: Option<usize>,
    /// Set after a discard: the next unit is only kept if it begins with a
    /// start code.
    resync: bool,
}

impl Default for NalUnitCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl NalUnitCodec {
    /// Create a codec with an unbounded accumulation buffer.
    pub fn new() -> Self {
        Self {
            scan_from: 1,
            max_buffered: None,
            resync: false,
        }
    }

    /// Cap the bytes held while waiting for the next start code.
    ///
    /// When the cap is exceeded the buffered bytes are discarded (except the
    /// last three, which may be the beginning of a start code). Bytes left
    /// over from a discard are never emitted as a unit of their own.
    pub fn with_max_buffered(mut self, max: usize) -> Self {
        self.max_buffered = Some(max.max(START_CODE.len()));
        self
    }

    /// Configured accumulation cap.
    pub fn max_buffered(&self) -> Option<usize> {
        self.max_buffered
    }

    /// Split off the next complete unit, if the buffer holds one.
    pub fn next_unit(&mut self, buf: &mut BytesMut) -> Option<Bytes> {
        while let Some(start) = find_start_code(buf, self.scan_from.max(1)) {
            self.scan_from = 1;
            let unit = buf.split_to(start).freeze();
            if !std::mem::take(&mut self.resync) || unit.starts_with(&START_CODE) {
                return Some(unit);
            }
            debug!(len = unit.len(), "dropping leftover bytes before start code");
        }

        // A start code straddling the end of the buffer begins in the last
        // three bytes; everything before that has been searched.
        self.scan_from = buf.len().saturating_sub(START_CODE.len() - 1).max(1);

        if let Some(max) = self.max_buffered {
            if buf.len() > max {
                let dropped = buf.len() - (START_CODE.len() - 1);
                warn!(
                    dropped,
                    max_buffered = max,
                    "no start code within buffer cap; discarding media bytes"
                );
                buf.advance(dropped);
                self.scan_from = 1;
                self.resync = true;
            }
        }

        None
    }
}

impl Decoder for NalUnitCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        Ok(self.next_unit(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        if let Some(unit) = self.next_unit(src) {
            return Ok(Some(unit));
        }
        // The tail has no terminating start code, so it is never a complete unit.
        if !src.is_empty() {
            debug!(len = src.len(), "discarding unterminated media tail at end of stream");
            src.clear();
        }
        self.scan_from = 1;
        self.resync = false;
        Ok(None)
    }
}

/// Push-style wrapper around [`NalUnitCodec`] that owns its buffer.
#[derive(Debug)]
pub struct StreamUnitFramer {
    codec: NalUnitCodec,
    buf: BytesMut,
}

impl Default for StreamUnitFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamUnitFramer {
    pub fn new() -> Self {
        Self::with_codec(NalUnitCodec::new())
    }

    pub fn with_codec(codec: NalUnitCodec) -> Self {
        Self {
            codec,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Append a chunk and return every unit it completed, in stream order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(chunk);
        let mut units = Vec::new();
        while let Some(unit) = self.codec.next_unit(&mut self.buf) {
            units.push(unit);
        }
        units
    }

    /// Bytes waiting for the next start code.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }
}

fn find_start_code(haystack: &[u8], from: usize) -> Option<usize> {
    if haystack.len() < from + START_CODE.len() {
        return None;
    }
    haystack[from..]
        .windows(START_CODE.len())
        .position(|window| window == START_CODE)
        .map(|pos| pos + from)
}
