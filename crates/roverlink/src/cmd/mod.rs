use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use roverlink_crypto::{derive_key_with_rounds, Key, KDF_ROUNDS};
use tracing::info;

use crate::exit::{crypto_error, io_error, CliResult};
use crate::output::OutputFormat;

pub mod bridge;
pub mod listen;
pub mod send;
pub mod version;

/// Default operator port for the raw video flow.
pub const VIDEO_PORT: u16 = 41234;
/// Default port for the framed telemetry and command flow, on both ends.
pub const TELEMETRY_PORT: u16 = 51234;

pub const DEFAULT_CAMERA_CMD: &str = "rpicam-vid -t 0 --width 1536 --height 864 --framerate 30 \
     --bitrate 500000 --low-latency --inline -o -";
pub const DEFAULT_CONTROL_CMD: &str = "python3 ./rover/controls.py";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the rover side: stream camera and control output, accept commands.
    Bridge(BridgeArgs),
    /// Run the operator side: print telemetry, save video, forward commands.
    Listen(ListenArgs),
    /// Send a single encrypted command.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Bridge(args) => bridge::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// Key settings shared by every subcommand that touches the link.
///
/// Both ends must agree on all four values.
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// Shared link password.
    #[arg(long, env = "ROVERLINK_PASSWORD", hide_env_values = true)]
    pub password: String,
    /// Key derivation salt.
    #[arg(long, env = "ROVERLINK_SALT", hide_env_values = true)]
    pub salt: String,
    /// Derived key length in bytes (selects AES-128/192/256).
    #[arg(long, default_value_t = 32, value_parser = parse_key_len)]
    pub key_len: usize,
    #[arg(long, hide = true, default_value_t = KDF_ROUNDS, env = "ROVERLINK_KDF_ROUNDS")]
    pub kdf_rounds: u32,
}

impl LinkArgs {
    pub fn derive_key(&self) -> CliResult<Arc<Key>> {
        info!(
            key_len = self.key_len,
            rounds = self.kdf_rounds,
            "deriving link key"
        );
        let key = derive_key_with_rounds(
            self.password.as_bytes(),
            self.salt.as_bytes(),
            self.key_len,
            self.kdf_rounds,
        )
        .map_err(|err| crypto_error("key derivation failed", err))?;
        info!(fingerprint = %key.fingerprint_hex(), "link key ready");
        Ok(Arc::new(key))
    }
}

#[derive(Args, Debug)]
pub struct BridgeArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Operator host that receives video and telemetry.
    #[arg(long, env = "ROVERLINK_OPERATOR")]
    pub operator: String,
    /// Operator port for raw video.
    #[arg(long, default_value_t = VIDEO_PORT)]
    pub video_port: u16,
    /// Operator port for telemetry.
    #[arg(long, default_value_t = TELEMETRY_PORT)]
    pub telemetry_port: u16,
    /// Local address for incoming commands. Default: 0.0.0.0:<telemetry-port>.
    #[arg(long, value_name = "ADDR")]
    pub command_bind: Option<SocketAddr>,
    /// Camera command line, run with `sh -c`. H.264 on stdout, diagnostics on stderr.
    #[arg(long, default_value = DEFAULT_CAMERA_CMD, env = "ROVERLINK_CAMERA_CMD")]
    pub camera_cmd: String,
    /// Control process command line, run with `sh -c`.
    #[arg(long, default_value = DEFAULT_CONTROL_CMD, env = "ROVERLINK_CONTROL_CMD")]
    pub control_cmd: String,
    /// Do not start the camera.
    #[arg(long)]
    pub no_camera: bool,
    /// Do not start the control process.
    #[arg(long)]
    pub no_control: bool,
    /// Interval between distance polls (e.g. 100ms, 1s).
    #[arg(long, default_value = "100ms", value_parser = parse_duration)]
    pub poll_interval: Duration,
    /// Discard buffered video after this many bytes without a start code.
    #[arg(long, value_name = "BYTES")]
    pub max_media_buffer: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Rover host to forward stdin lines to as commands.
    #[arg(long)]
    pub rover: Option<String>,
    /// Local address to bind both ports on.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,
    /// Port receiving raw video.
    #[arg(long, default_value_t = VIDEO_PORT)]
    pub video_port: u16,
    /// Port receiving telemetry; also the rover's command port.
    #[arg(long, default_value_t = TELEMETRY_PORT)]
    pub telemetry_port: u16,
    /// Write decrypted video units to PATH (`-` for stdout). Telemetry then
    /// goes to stderr when PATH is `-`.
    #[arg(long, value_name = "PATH")]
    pub video_out: Option<PathBuf>,
    /// Exit after printing N telemetry records.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Destination as HOST:PORT.
    pub target: String,
    /// JSON payload.
    #[arg(long, conflicts_with = "data")]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with = "json", required_unless_present = "json")]
    pub data: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_key_len(input: &str) -> Result<usize, String> {
    match input.parse::<usize>() {
        Ok(len @ (16 | 24 | 32)) => Ok(len),
        Ok(len) => Err(format!("{len} is not an AES key size (16, 24 or 32)")),
        Err(err) => Err(err.to_string()),
    }
}

fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration must not be empty".to_string());
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration value: {input}"))?;
    if value == 0 {
        return Err("duration must be greater than zero".to_string());
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Single-threaded runtime; every subcommand is driven from one task.
pub(crate) fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))
}

/// Split `HOST:PORT`, accepting `[v6]:PORT`.
pub(crate) fn split_host_port(target: &str) -> Option<(&str, u16)> {
    let (host, port) = target.rsplit_once(':')?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return None;
    }
    Some((host, port.parse().ok()?))
}

/// Wait for Ctrl-C. Never resolves if the handler cannot be installed.
pub(crate) async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
