use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::warn;

use crate::error::FrameError;

/// Default longest line kept intact before it is cut.
pub const DEFAULT_MAX_LINE: usize = 16 * 1024;

/// Newline-delimited text decoder that never fails.
///
/// Subprocess output is not trusted to be UTF-8 or to end its lines, and one
/// bad line must not end the stream the way `LinesCodec` errors do. Invalid
/// UTF-8 is replaced, a trailing `\r` is stripped, and an over-long line is
/// emitted in `max_length` pieces.
#[derive(Debug, Clone)]
pub struct TextLineCodec {
    /// Bytes already searched for a newline.
    next_index: usize,
    max_length: usize,
}

impl Default for TextLineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE)
    }
}

impl TextLineCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length: max_length.max(1),
        }
    }
}

impl Decoder for TextLineCodec {
    type Item = String;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, FrameError> {
        let search_end = src.len().min(self.max_length + 1);
        let newline = src[self.next_index.min(search_end)..search_end]
            .iter()
            .position(|&b| b == b'\n')
            .map(|pos| pos + self.next_index.min(search_end));

        match newline {
            Some(pos) => {
                let line = src.split_to(pos);
                src.advance(1);
                self.next_index = 0;
                Ok(Some(to_text(&line)))
            }
            None if src.len() > self.max_length => {
                warn!(max_length = self.max_length, "splitting over-long output line");
                let line = src.split_to(self.max_length);
                self.next_index = 0;
                Ok(Some(to_text(&line)))
            }
            None => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, FrameError> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if src.is_empty() {
            return Ok(None);
        }
        let line = src.split();
        Ok(Some(to_text(&line)))
    }
}

fn to_text(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use tokio_util::codec::FramedRead;

    use super::*;

    #[test]
    fn splits_on_newline_and_strips_cr() {
        let mut codec = TextLineCodec::default();
        let mut buf = BytesMut::from(&b"first\r\nsecond\npart"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("first"));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("second"));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"ial\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("partial"));
        assert!(buf.is_empty());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut codec = TextLineCodec::default();
        let mut buf = BytesMut::from(&b"ok \xff\xfe\n"[..]);
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert!(line.starts_with("ok "));
        assert!(line.contains('\u{FFFD}'));
    }

    #[test]
    fn long_line_is_emitted_in_pieces() {
        let mut codec = TextLineCodec::new(4);
        let mut buf = BytesMut::from(&b"abcdefgh\n"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("abcd"));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("efgh"));
        assert!(buf.is_empty());
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[tokio::test]
    async fn unterminated_last_line_is_kept() {
        let reader = std::io::Cursor::new(b"one\ntwo".to_vec());
        let lines: Vec<String> = FramedRead::new(reader, TextLineCodec::default())
            .map(|line| line.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
    }
}
