use roverlink_crypto::CryptoError;

/// Errors that can occur while encoding or decoding datagrams.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A framed datagram has no `,` between the IV and the ciphertext.
    #[error("framed datagram has no separator")]
    MissingSeparator,

    /// A framed datagram is not valid UTF-8 text.
    #[error("framed datagram is not valid UTF-8")]
    NotUtf8,

    /// One half of a framed datagram is not valid base64.
    #[error("invalid base64 in {part}: {source}")]
    Base64 {
        part: &'static str,
        source: base64::DecodeError,
    },

    /// The embedded IV is not 16 bytes long.
    #[error("invalid IV length ({len} bytes, expected 16)")]
    InvalidIvLength { len: usize },

    /// Encryption or decryption failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// An I/O error occurred while reading a media stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
