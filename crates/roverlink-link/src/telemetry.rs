//! Telemetry records and the camera diagnostic parser.
//!
//! Every telemetry datagram carries one JSON object of the form
//! `{"k": <kind>, "v": <value>}`. Two kinds exist today:
//!
//! | `k`            | `v`                                                  |
//! |----------------|------------------------------------------------------|
//! | `camera_rapid` | `{"frame", "fps", "ex", "ag", "dg"}` camera metrics  |
//! | `controls`     | one control-process output line (JSON or string)     |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Tag for camera metric records.
pub const CAMERA_RAPID: &str = "camera_rapid";

/// Tag for control-process output records.
pub const CONTROLS: &str = "controls";

/// Per-frame metrics reported by the camera on its diagnostic stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraMetrics {
    pub frame: u64,
    pub fps: f64,
    #[serde(rename = "ex")]
    pub exposure: f64,
    #[serde(rename = "ag")]
    pub analogue_gain: f64,
    #[serde(rename = "dg")]
    pub digital_gain: f64,
}

impl CameraMetrics {
    /// Extract metrics from one diagnostic line.
    ///
    /// Recognizes `#<frame> (<fps> fps) exp <exposure> ag <gain> dg <gain>`
    /// anywhere in the line. Decimals need a `.` (`30.` is accepted, `30` is
    /// not). Returns `None` when the line does not contain the pattern, or
    /// when the frame index does not fit in a `u64` (more than 20 digits).
    pub fn parse_line(line: &str) -> Option<Self> {
        line.match_indices('#')
            .find_map(|(at, _)| Self::parse_at(&line[at + 1..]))
    }

    fn parse_at(rest: &str) -> Option<Self> {
        let mut cur = Cursor::new(rest);
        let frame = cur.integer()?;
        cur.literal(" (")?;
        let fps = cur.decimal()?;
        cur.literal(" fps")?;
        cur.skip_while('s');
        cur.literal(") exp ")?;
        let exposure = cur.decimal()?;
        cur.literal(" ag ")?;
        let analogue_gain = cur.decimal()?;
        cur.literal(" dg ")?;
        let digital_gain = cur.decimal()?;

        Some(Self {
            frame,
            fps,
            exposure,
            analogue_gain,
            digital_gain,
        })
    }
}

/// Minimal left-to-right matcher over ASCII tokens.
struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(rest: &'a str) -> Self {
        Self { rest }
    }

    fn literal(&mut self, lit: &str) -> Option<()> {
        self.rest = self.rest.strip_prefix(lit)?;
        Some(())
    }

    fn skip_while(&mut self, ch: char) {
        self.rest = self.rest.trim_start_matches(ch);
    }

    fn digits(&mut self) -> &'a str {
        let end = self
            .rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(self.rest.len());
        let (digits, rest) = self.rest.split_at(end);
        self.rest = rest;
        digits
    }

    fn integer(&mut self) -> Option<u64> {
        let digits = self.digits();
        if digits.is_empty() {
            return None;
        }
        digits.parse().ok()
    }

    /// `digits '.' digits*`
    fn decimal(&mut self) -> Option<f64> {
        let start = self.rest;
        let whole = self.digits();
        if whole.is_empty() {
            return None;
        }
        self.literal(".")?;
        let frac = self.digits();
        let len = whole.len() + 1 + frac.len();
        start[..len].parse().ok()
    }
}

/// One telemetry datagram payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "k", content = "v", rename_all = "snake_case")]
pub enum TelemetryRecord {
    CameraRapid(CameraMetrics),
    Controls(Value),
}

impl TelemetryRecord {
    /// Wrap a control-process output line.
    ///
    /// A line that is itself JSON is embedded as a value; anything else is
    /// embedded as a string.
    pub fn controls_line(line: &str) -> Self {
        let value = serde_json::from_str(line).unwrap_or_else(|_| Value::String(line.to_owned()));
        TelemetryRecord::Controls(value)
    }

    /// The `k` tag this record serializes with.
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryRecord::CameraRapid(_) => CAMERA_RAPID,
            TelemetryRecord::Controls(_) => CONTROLS,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl From<CameraMetrics> for TelemetryRecord {
    fn from(metrics: CameraMetrics) -> Self {
        TelemetryRecord::CameraRapid(metrics)
    }
}
