//! Encrypted channels and the telemetry/control bridge.
//!
//! This is the layer the rover and the operator console actually talk to:
//! an [`EncryptedChannel`] per UDP flow, structured [`TelemetryRecord`]s, and
//! the [`Bridge`] that connects the camera and the control process to the
//! network.

pub mod bridge;
pub mod channel;
pub mod control;
pub mod error;
pub mod telemetry;

pub use bridge::{BoxReader, BoxWriter, Bridge, BridgeConfig, BridgeIo, BridgeStats};
pub use channel::{ChannelConfig, EncryptedChannel, InboundListener};
pub use control::{poll_command, ControlInput, DEFAULT_CONTROL_QUEUE, POLL_INTERVAL};
pub use error::{LinkError, Result};
pub use roverlink_frame::WireMode;
pub use telemetry::{CameraMetrics, TelemetryRecord, CAMERA_RAPID, CONTROLS};
