use std::fmt;
use std::io;

use roverlink_crypto::CryptoError;
use roverlink_frame::FrameError;
use roverlink_link::LinkError;
use roverlink_transport::TransportError;

// sysexits-style codes shared by every subcommand.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable
        | io::ErrorKind::ConnectionRefused => TRANSPORT_ERROR,
        io::ErrorKind::NotFound | io::ErrorKind::BrokenPipe => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn crypto_error(context: &str, err: CryptoError) -> CliError {
    let code = match err {
        CryptoError::ZeroKeyLength
        | CryptoError::ZeroRounds
        | CryptoError::InvalidKeyLength { .. } => USAGE,
        CryptoError::EmptyPlaintext
        | CryptoError::Misaligned { .. }
        | CryptoError::InvalidPadding { .. } => DATA_INVALID,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Send { source, .. }
        | TransportError::Io(source) => io_error(context, source),
        TransportError::DatagramTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Crypto(err) => crypto_error(context, err),
        FrameError::Io(source) => io_error(context, source),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn link_error(context: &str, err: LinkError) -> CliError {
    match err {
        LinkError::Transport(err) => transport_error(context, err),
        LinkError::Frame(err) => frame_error(context, err),
        LinkError::Json(err) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        LinkError::Io(source) => io_error(context, source),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};

    use super::*;

    #[test]
    fn bind_conflict_is_transport_error() {
        let err = TransportError::Bind {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 51234)),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        let cli = link_error("bind failed", LinkError::Transport(err));
        assert_eq!(cli.code, TRANSPORT_ERROR);
        assert!(cli.message.starts_with("bind failed: "));
    }

    #[test]
    fn empty_payload_is_data_invalid() {
        let err = LinkError::Frame(FrameError::Crypto(CryptoError::EmptyPlaintext));
        assert_eq!(link_error("send failed", err).code, DATA_INVALID);
    }

    #[test]
    fn bad_key_settings_are_usage_errors() {
        assert_eq!(crypto_error("kdf", CryptoError::ZeroRounds).code, USAGE);
        assert_eq!(
            crypto_error("kdf", CryptoError::InvalidKeyLength { len: 7 }).code,
            USAGE
        );
    }
}
