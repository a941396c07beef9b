mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "roverlink", version, about = "Encrypted rover video, telemetry and command link")]
struct Cli {
    /// Output format for printed telemetry and reports.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "text",
        env = "ROVERLINK_LOG_FORMAT",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "ROVERLINK_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const LINK: [&str; 4] = ["--password", "yippie!", "--salt", "salt"];

    #[test]
    fn parses_bridge_with_defaults() {
        let cli = Cli::try_parse_from(
            ["roverlink", "bridge", "--operator", "192.168.1.239"]
                .into_iter()
                .chain(LINK),
        )
        .expect("bridge args should parse");

        match cli.command {
            Command::Bridge(args) => {
                assert_eq!(args.video_port, 41234);
                assert_eq!(args.telemetry_port, 51234);
                assert_eq!(args.poll_interval, Duration::from_millis(100));
                assert_eq!(args.link.key_len, 32);
                assert_eq!(args.link.kdf_rounds, roverlink_crypto::KDF_ROUNDS);
                assert!(args.camera_cmd.starts_with("rpicam-vid"));
            }
            other => panic!("expected bridge, got {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from(
            [
                "roverlink",
                "send",
                "127.0.0.1:51234",
                "--json",
                "{\"x\":1}",
                "--data",
                "hello",
            ]
            .into_iter()
            .chain(LINK),
        )
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn send_requires_a_payload() {
        let err = Cli::try_parse_from(
            ["roverlink", "send", "127.0.0.1:51234"].into_iter().chain(LINK),
        )
        .expect_err("missing payload should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rejects_unsupported_key_length() {
        let err = Cli::try_parse_from(
            ["roverlink", "send", "h:1", "--data", "x", "--key-len", "20"]
                .into_iter()
                .chain(LINK),
        )
        .expect_err("key length 20 should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_listen_with_video_to_stdout() {
        let cli = Cli::try_parse_from(
            [
                "roverlink",
                "--format",
                "json",
                "listen",
                "--video-out",
                "-",
                "--count",
                "3",
            ]
            .into_iter()
            .chain(LINK),
        )
        .expect("listen args should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        assert!(matches!(cli.command, Command::Listen(_)));
    }
}
