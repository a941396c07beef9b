/// Errors that can occur on an encrypted channel or in the bridge.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] roverlink_transport::TransportError),

    /// Encoding, decoding, or cipher error.
    #[error("frame error: {0}")]
    Frame(#[from] roverlink_frame::FrameError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The control process no longer accepts input.
    #[error("control process input closed")]
    ControlClosed,

    /// The control process is not draining its input fast enough.
    #[error("control process input queue full")]
    ControlBusy,

    /// An I/O error occurred on a subprocess stream.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;
