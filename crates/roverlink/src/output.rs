use std::io::{self, IsTerminal, Write};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use roverlink_link::{BridgeStats, TelemetryRecord};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct TelemetryOutput<'a> {
    kind: &'a str,
    from: String,
    size: usize,
    value: Value,
    timestamp: String,
}

/// One decoded telemetry datagram, as printed by `listen`.
pub struct Received<'a> {
    pub payload: &'a [u8],
    pub from: SocketAddr,
}

impl Received<'_> {
    /// Kind tag and value. Payloads that are not telemetry records (for
    /// example plain commands) are shown as `text`.
    fn classify(&self) -> (&'static str, Value) {
        match TelemetryRecord::from_json(self.payload) {
            Ok(record) => {
                let kind = record.kind();
                let value = match record {
                    TelemetryRecord::CameraRapid(metrics) => {
                        serde_json::to_value(metrics).unwrap_or(Value::Null)
                    }
                    TelemetryRecord::Controls(value) => value,
                };
                (kind, value)
            }
            Err(_) => (
                "text",
                Value::String(String::from_utf8_lossy(self.payload).into_owned()),
            ),
        }
    }
}

pub fn print_telemetry(
    out: &mut dyn Write,
    received: &Received<'_>,
    format: OutputFormat,
) -> io::Result<()> {
    let (kind, value) = received.classify();
    match format {
        OutputFormat::Json => {
            let record = TelemetryOutput {
                kind,
                from: received.from.to_string(),
                size: received.payload.len(),
                value,
                timestamp: now_unix_seconds(),
            };
            let line = serde_json::to_string(&record).unwrap_or_else(|_| "{}".to_string());
            writeln!(out, "{line}")?;
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "FROM", "SIZE", "VALUE"])
                .add_row(vec![
                    kind.to_string(),
                    received.from.to_string(),
                    received.payload.len().to_string(),
                    value_preview(&value),
                ]);
            writeln!(out, "{table}")?;
        }
        OutputFormat::Pretty => {
            writeln!(out, "{kind} from={} {}", received.from, pretty_fields(&value))?;
        }
        OutputFormat::Raw => {
            out.write_all(received.payload)?;
            out.write_all(b"\n")?;
        }
    }
    out.flush()
}

pub fn print_stats(
    out: &mut dyn Write,
    stats: &BridgeStats,
    format: OutputFormat,
) -> io::Result<()> {
    let rows = [
        ("media_units", stats.media_units),
        ("telemetry_records", stats.telemetry_records),
        ("control_lines", stats.control_lines),
        ("commands", stats.commands),
        ("polls", stats.polls),
        ("send_failures", stats.send_failures),
    ];
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            let line = serde_json::to_string(stats).unwrap_or_else(|_| "{}".to_string());
            writeln!(out, "{line}")?;
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COUNTER", "VALUE"]);
            for (name, value) in rows {
                table.add_row(vec![name.to_string(), value.to_string()]);
            }
            writeln!(out, "{table}")?;
        }
        OutputFormat::Pretty => {
            let fields: Vec<String> = rows.iter().map(|(k, v)| format!("{k}={v}")).collect();
            writeln!(out, "{}", fields.join(" "))?;
        }
    }
    out.flush()
}

fn value_preview(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// `k=v` pairs for objects, the bare value otherwise.
fn pretty_fields(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}={}", value_preview(v)))
            .collect::<Vec<_>>()
            .join(" "),
        other => value_preview(other),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
