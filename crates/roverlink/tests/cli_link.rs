#![cfg(all(unix, feature = "cli"))]

use std::net::UdpSocket;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use roverlink::crypto::derive_key_with_rounds;
use roverlink::frame::{open, WireMode};

const ROUNDS: &str = "10";

fn link_args() -> [&'static str; 6] {
    ["--password", "pw", "--salt", "salt", "--kdf-rounds", ROUNDS]
}

fn roverlink() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_roverlink"));
    cmd.env_remove("ROVERLINK_PASSWORD")
        .env_remove("ROVERLINK_SALT")
        .env_remove("ROVERLINK_OPERATOR")
        .args(["--log-level", "error"]);
    cmd
}

fn free_udp_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0")
        .expect("bind should succeed")
        .local_addr()
        .expect("local addr")
        .port()
}

fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Output {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("command should start");
    let start = Instant::now();
    loop {
        if child.try_wait().expect("try_wait").is_some() {
            return child.wait_with_output().expect("output");
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            panic!("command did not finish within {timeout:?}");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn version_prints_package_version() {
    let output = roverlink().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("roverlink {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn send_is_printed_by_listen() {
    let port = free_udp_port();
    let port_arg = port.to_string();

    let mut listener = roverlink()
        .args(["--format", "json", "listen", "--bind", "127.0.0.1"])
        .args(["--telemetry-port", &port_arg, "--count", "1"])
        .args(link_args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("listen should start");

    // UDP gives no readiness signal; resend until the listener has printed.
    let start = Instant::now();
    let target = format!("127.0.0.1:{port}");
    while listener.try_wait().expect("try_wait").is_none() {
        if start.elapsed() >= Duration::from_secs(10) {
            let _ = listener.kill();
            panic!("listen never received the command");
        }
        let status = roverlink()
            .args(["send", &target, "--json", r#"{"k":"controls","v":"hi"}"#])
            .args(link_args())
            .status()
            .expect("send should run");
        assert!(status.success());
        thread::sleep(Duration::from_millis(100));
    }

    let output = listener.wait_with_output().expect("listen output");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.lines().next().expect("one record line");
    let record: serde_json::Value = serde_json::from_str(first).expect("json record");
    assert_eq!(record["kind"], "controls");
    assert_eq!(record["value"], "hi");
}

#[test]
fn bridge_streams_camera_output_to_operator() {
    let telemetry = UdpSocket::bind("127.0.0.1:0").expect("telemetry socket");
    let video = UdpSocket::bind("127.0.0.1:0").expect("video socket");
    telemetry
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    video
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    let telemetry_port = telemetry.local_addr().unwrap().port().to_string();
    let video_port = video.local_addr().unwrap().port().to_string();

    let camera = r"printf '#7 (30.00 fps) exp 100.0 ag 2.0 dg 1.0\n' >&2; printf '\000\000\000\001abc\000\000\000\001'";

    let mut cmd = roverlink();
    cmd.args(["--format", "json", "bridge", "--operator", "127.0.0.1"])
        .args(["--video-port", &video_port, "--telemetry-port", &telemetry_port])
        .args(["--command-bind", "127.0.0.1:0", "--no-control"])
        .args(["--camera-cmd", camera])
        .args(link_args());
    let output = run_with_timeout(cmd, Duration::from_secs(10));
    assert!(
        output.status.success(),
        "bridge failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stats: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stats should be json");
    assert_eq!(stats["telemetry_records"], 1);
    assert_eq!(stats["media_units"], 1);

    let key = derive_key_with_rounds(b"pw", b"salt", 32, 10).expect("key");
    let mut buf = [0u8; 2048];

    let (n, _) = telemetry.recv_from(&mut buf).expect("telemetry datagram");
    let plain = open(WireMode::Framed, &key, &buf[..n]).expect("framed datagram decodes");
    let record: serde_json::Value = serde_json::from_slice(&plain).expect("json");
    assert_eq!(record["k"], "camera_rapid");
    assert_eq!(record["v"]["frame"], 7);
    assert_eq!(record["v"]["ag"], 2.0);

    let (n, _) = video.recv_from(&mut buf).expect("video datagram");
    let unit = open(WireMode::Raw, &key, &buf[..n]).expect("raw datagram decodes");
    assert_eq!(unit, b"\x00\x00\x00\x01abc");
}

#[test]
fn bridge_with_nothing_to_run_is_usage_error() {
    let output = roverlink()
        .args(["bridge", "--operator", "127.0.0.1", "--no-camera", "--no-control"])
        .args(link_args())
        .output()
        .expect("bridge should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn send_rejects_malformed_target() {
    let output = roverlink()
        .args(["send", "no-port-here", "--data", "stop"])
        .args(link_args())
        .output()
        .expect("send should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn send_empty_payload_is_data_invalid() {
    let output = roverlink()
        .args(["send", "127.0.0.1:9", "--data", ""])
        .args(link_args())
        .output()
        .expect("send should run");
    assert_eq!(output.status.code(), Some(60));
}
