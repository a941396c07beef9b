//! Rover-side bridge between local processes and the encrypted link.
//!
//! ```text
//! camera stdout ──NalUnitCodec──▶ video channel (raw) ──▶ operator:video
//! camera stderr ──parse_line────▶ telemetry channel (framed) ──▶ operator:telemetry
//! control stdout ─controls_line─▶ telemetry channel (framed) ──▶ operator:telemetry
//! operator ──▶ telemetry channel (framed, listening) ──▶ control stdin
//! poll timer ─────────────────────────────────────────▶ control stdin
//! ```
//!
//! Everything runs on one task. Failures on any edge are logged and counted;
//! the loop only stops at end of input or on shutdown.

use std::future::{pending, Future};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use roverlink_crypto::Key;
use roverlink_frame::{NalUnitCodec, TextLineCodec};
use roverlink_transport::MAX_DATAGRAM_SIZE;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, trace, warn};

use crate::channel::{ChannelConfig, EncryptedChannel};
use crate::control::{poll_command, ControlInput, DEFAULT_CONTROL_QUEUE, POLL_INTERVAL};
use crate::error::{LinkError, Result};
use crate::telemetry::{CameraMetrics, TelemetryRecord};

/// How long queued control lines may take to drain after the loop ends.
const CONTROL_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;
pub type BoxWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Tunables for [`Bridge::run`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub poll_interval: Duration,
    /// Line written to the control process on every poll tick.
    pub poll_command: String,
    pub control_queue: usize,
    /// Cap on media bytes held while waiting for a start code.
    pub max_media_buffer: Option<usize>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            poll_command: poll_command(),
            control_queue: DEFAULT_CONTROL_QUEUE,
            max_media_buffer: None,
        }
    }
}

/// Process streams the bridge consumes. Any of them may be absent.
#[derive(Default)]
pub struct BridgeIo {
    /// Camera stdout: Annex B byte stream.
    pub media: Option<BoxReader>,
    /// Camera stderr: diagnostic text.
    pub diagnostics: Option<BoxReader>,
    /// Control process stdout.
    pub control_out: Option<BoxReader>,
    /// Control process stderr.
    pub control_err: Option<BoxReader>,
    /// Control process stdin.
    pub control_in: Option<BoxWriter>,
}

/// Counters reported when the bridge stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub media_units: u64,
    pub telemetry_records: u64,
    pub control_lines: u64,
    pub commands: u64,
    pub polls: u64,
    pub send_failures: u64,
}

pub struct Bridge {
    video: EncryptedChannel,
    telemetry: EncryptedChannel,
    config: BridgeConfig,
}

impl Bridge {
    /// `video` should be a raw channel and `telemetry` a listening framed one.
    pub fn new(video: EncryptedChannel, telemetry: EncryptedChannel, config: BridgeConfig) -> Self {
        Self {
            video,
            telemetry,
            config,
        }
    }

    /// Bind both channels and build the bridge.
    pub async fn open(
        video: ChannelConfig,
        telemetry: ChannelConfig,
        key: Arc<Key>,
        config: BridgeConfig,
    ) -> Result<Self> {
        let video = EncryptedChannel::open(video, key.clone()).await?;
        let telemetry = EncryptedChannel::open(telemetry, key).await?;
        Ok(Self::new(video, telemetry, config))
    }

    pub fn telemetry_addr(&self) -> Result<SocketAddr> {
        self.telemetry.local_addr()
    }

    /// Run until every input stream has ended or `shutdown` resolves.
    pub async fn run<F>(mut self, io: BridgeIo, shutdown: F) -> BridgeStats
    where
        F: Future<Output = ()>,
    {
        let mut stats = BridgeStats::default();
        let commands = Arc::new(AtomicU64::new(0));

        let (control, writer) = match io.control_in {
            Some(stdin) => {
                let (input, handle) = ControlInput::spawn(stdin, self.config.control_queue);
                (Some(input), Some(handle))
            }
            None => (None, None),
        };
        self.telemetry
            .set_listener(command_forwarder(control.clone(), commands.clone()));

        let mut codec = NalUnitCodec::new();
        if let Some(max) = self.config.max_media_buffer {
            codec = codec.with_max_buffered(max);
        }
        let mut media = io.media.map(|r| FramedRead::new(r, codec));
        let mut diagnostics = io.diagnostics.map(lines);
        let mut control_out = io.control_out.map(lines);
        let mut control_err = io.control_err.map(lines);

        let period = self.config.poll_interval.max(Duration::from_millis(1));
        let mut poll = interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        tokio::pin!(shutdown);

        info!(
            video = %self.video.peer_addr(),
            telemetry = %self.telemetry.peer_addr(),
            poll_ms = period.as_millis() as u64,
            "bridge running"
        );

        loop {
            if media.is_none()
                && diagnostics.is_none()
                && control_out.is_none()
                && control_err.is_none()
            {
                debug!("all producer streams ended");
                break;
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("bridge shutting down");
                    break;
                }
                unit = next_item(&mut media) => match unit {
                    Some(Ok(unit)) => match self.video.send_raw(&unit).await {
                        Ok(_) => stats.media_units += 1,
                        Err(err) => {
                            stats.send_failures += 1;
                            debug!(len = unit.len(), error = %err, "media send failed");
                        }
                    },
                    Some(Err(err)) => {
                        warn!(error = %err, "media stream failed");
                        media = None;
                    }
                    None => {
                        info!("media stream ended");
                        media = None;
                    }
                },
                line = next_item(&mut diagnostics) => match line {
                    Some(Ok(line)) => match CameraMetrics::parse_line(&line) {
                        Some(metrics) => {
                            let record = TelemetryRecord::from(metrics);
                            self.send_record(&record, &mut stats).await;
                        }
                        None => trace!(line = %line, "camera diagnostic"),
                    },
                    Some(Err(err)) => {
                        warn!(error = %err, "camera diagnostics failed");
                        diagnostics = None;
                    }
                    None => diagnostics = None,
                },
                line = next_item(&mut control_out) => match line {
                    Some(Ok(line)) if line.trim().is_empty() => {}
                    Some(Ok(line)) => {
                        stats.control_lines += 1;
                        let record = TelemetryRecord::controls_line(&line);
                        self.send_record(&record, &mut stats).await;
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "control output failed");
                        control_out = None;
                    }
                    None => {
                        info!("control process output ended");
                        control_out = None;
                    }
                },
                line = next_item(&mut control_err) => match line {
                    Some(Ok(line)) => warn!(line = %line, "control process stderr"),
                    Some(Err(_)) | None => control_err = None,
                },
                received = self.telemetry.recv_from(&mut buf) => match received {
                    Ok((len, from)) => {
                        // Undecodable datagrams are already logged by the channel.
                        let _ = self.telemetry.on_receive(&buf[..len], from);
                    }
                    Err(err) => debug!(error = %err, "telemetry receive failed"),
                },
                _ = poll.tick(), if control.is_some() => {
                    if let Some(input) = &control {
                        if submit(input, &self.config.poll_command) {
                            stats.polls += 1;
                        }
                    }
                }
            }
        }

        stats.commands = commands.load(Ordering::Relaxed);

        // Every ControlInput clone must go before the writer can finish.
        drop(media);
        drop(diagnostics);
        drop(control_out);
        drop(control_err);
        drop(control);
        drop(self);

        if let Some(handle) = writer {
            if timeout(CONTROL_DRAIN_TIMEOUT, handle).await.is_err() {
                warn!("control input did not drain before shutdown");
            }
        }

        info!(
            media_units = stats.media_units,
            telemetry_records = stats.telemetry_records,
            commands = stats.commands,
            polls = stats.polls,
            send_failures = stats.send_failures,
            "bridge stopped"
        );
        stats
    }

    async fn send_record(&mut self, record: &TelemetryRecord, stats: &mut BridgeStats) {
        let json = match record.to_json() {
            Ok(json) => json,
            Err(err) => {
                warn!(kind = record.kind(), error = %err, "failed to encode telemetry");
                return;
            }
        };
        match self.telemetry.send_framed(json.as_bytes()).await {
            Ok(_) => stats.telemetry_records += 1,
            Err(err) => {
                stats.send_failures += 1;
                debug!(kind = record.kind(), error = %err, "telemetry send failed");
            }
        }
    }
}

fn lines(reader: BoxReader) -> FramedRead<BoxReader, TextLineCodec> {
    FramedRead::new(reader, TextLineCodec::default())
}

async fn next_item<S>(stream: &mut Option<S>) -> Option<S::Item>
where
    S: Stream + Unpin,
{
    match stream {
        Some(stream) => stream.next().await,
        None => pending().await,
    }
}

fn command_forwarder(
    control: Option<ControlInput>,
    counter: Arc<AtomicU64>,
) -> impl FnMut(Vec<u8>, SocketAddr) + Send + Sync + 'static {
    move |payload, from| {
        let command = match String::from_utf8(payload) {
            Ok(command) => command,
            Err(_) => {
                debug!(%from, "dropping non-UTF-8 command");
                return;
            }
        };
        debug!(%from, command = %command, "received command");
        counter.fetch_add(1, Ordering::Relaxed);
        match &control {
            Some(input) => {
                submit(input, &command);
            }
            None => debug!("no control process; dropping command"),
        }
    }
}

/// Queue one line for the control process. Returns whether it was accepted.
fn submit(input: &ControlInput, line: &str) -> bool {
    match input.submit(line) {
        Ok(()) => true,
        Err(LinkError::ControlBusy) => {
            warn!("control process is not reading; dropping line");
            false
        }
        Err(err) => {
            trace!(error = %err, "control line dropped");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::net::Ipv4Addr;

    use roverlink_frame::{WireMode, START_CODE};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    use super::*;

    fn loopback(port: u16) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, port))
    }

    fn key() -> Arc<Key> {
        Arc::new(Key::from_bytes(vec![0x42; 32]))
    }

    async fn listening(mode: WireMode) -> EncryptedChannel {
        EncryptedChannel::open(
            ChannelConfig {
                peer: loopback(9),
                bind: Some(loopback(0)),
                mode,
            },
            key(),
        )
        .await
        .unwrap()
    }

    async fn recv_payload(channel: &EncryptedChannel) -> Vec<u8> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (n, _) = channel.recv_from(&mut buf).await.unwrap();
        channel.decode(&buf[..n]).unwrap()
    }

    /// Operator-side receivers plus a bridge pointed at them.
    async fn rig(config: BridgeConfig) -> (Bridge, EncryptedChannel, EncryptedChannel) {
        let video_rx = listening(WireMode::Raw).await;
        let telemetry_rx = listening(WireMode::Framed).await;
        let bridge = Bridge::open(
            ChannelConfig::raw(video_rx.local_addr().unwrap()),
            ChannelConfig::framed(telemetry_rx.local_addr().unwrap(), loopback(0)),
            key(),
            config,
        )
        .await
        .unwrap();
        (bridge, video_rx, telemetry_rx)
    }

    #[tokio::test]
    async fn forwards_media_units_and_camera_metrics() {
        let (bridge, video_rx, telemetry_rx) = rig(BridgeConfig::default()).await;

        let stream = [
            &START_CODE[..],
            b"\x67sps",
            &START_CODE,
            b"\x68pps",
            &START_CODE,
            b"\x65slice",
            &START_CODE,
            b"unterminated",
        ]
        .concat();
        let diagnostics = "Made H264 encoder\n#12 (29.97 fps) exp 10000.0 ag 1.5 dg 1.0\nnoise\n";

        let io = BridgeIo {
            media: Some(Box::new(Cursor::new(stream))),
            diagnostics: Some(Box::new(Cursor::new(diagnostics.as_bytes().to_vec()))),
            ..Default::default()
        };
        let stats = bridge.run(io, pending()).await;

        assert_eq!(stats.media_units, 3);
        assert_eq!(stats.telemetry_records, 1);
        assert_eq!(stats.polls, 0);

        assert_eq!(
            recv_payload(&video_rx).await,
            [&START_CODE[..], b"\x67sps"].concat()
        );
        assert_eq!(
            recv_payload(&video_rx).await,
            [&START_CODE[..], b"\x68pps"].concat()
        );
        assert_eq!(
            recv_payload(&video_rx).await,
            [&START_CODE[..], b"\x65slice"].concat()
        );

        let record = TelemetryRecord::from_json(&recv_payload(&telemetry_rx).await).unwrap();
        match record {
            TelemetryRecord::CameraRapid(m) => {
                assert_eq!(m.frame, 12);
                assert_eq!(m.fps, 29.97);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[tokio::test]
    async fn relays_commands_control_output_and_polls() {
        let config = BridgeConfig {
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let (bridge, _video_rx, telemetry_rx) = rig(config).await;
        let bridge_addr = bridge.telemetry_addr().unwrap();

        let mut operator_tx = EncryptedChannel::open(
            ChannelConfig {
                peer: bridge_addr,
                bind: None,
                mode: WireMode::Framed,
            },
            key(),
        )
        .await
        .unwrap();

        let (stdin_w, mut stdin_r) = tokio::io::duplex(4096);
        let (mut stdout_w, stdout_r) = tokio::io::duplex(4096);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let io = BridgeIo {
            control_in: Some(Box::new(stdin_w)),
            control_out: Some(Box::new(stdout_r)),
            ..Default::default()
        };

        let driver = async {
            operator_tx.send_framed(b"forward 10").await.unwrap();
            stdout_w
                .write_all(b"{\"distance\": 12.5}\n\nobstacle ahead\n")
                .await
                .unwrap();

            let mut seen = String::new();
            let mut chunk = [0u8; 512];
            while !(seen.contains("forward 10\n") && seen.contains(&poll_command())) {
                let n = stdin_r.read(&mut chunk).await.unwrap();
                assert!(n > 0, "control stdin closed early");
                seen.push_str(std::str::from_utf8(&chunk[..n]).unwrap());
            }

            let first = TelemetryRecord::from_json(&recv_payload(&telemetry_rx).await).unwrap();
            let second = TelemetryRecord::from_json(&recv_payload(&telemetry_rx).await).unwrap();
            stop_tx.send(()).unwrap();
            (seen, vec![first, second])
        };

        let shutdown = async {
            let _ = stop_rx.await;
        };
        let (stats, (seen, records)) = tokio::join!(bridge.run(io, shutdown), driver);

        for line in seen.lines() {
            assert!(
                line == "forward 10" || line == poll_command(),
                "interleaved or unexpected line {line:?}"
            );
        }
        assert_eq!(
            records,
            vec![
                TelemetryRecord::Controls(serde_json::json!({"distance": 12.5})),
                TelemetryRecord::Controls(serde_json::Value::String("obstacle ahead".into())),
            ]
        );
        assert_eq!(stats.commands, 1);
        assert_eq!(stats.control_lines, 2);
        assert!(stats.polls >= 1);
    }

    #[tokio::test]
    async fn dead_control_process_does_not_stop_bridge() {
        let (bridge, _video_rx, telemetry_rx) = rig(BridgeConfig {
            poll_interval: Duration::from_millis(1),
            ..Default::default()
        })
        .await;

        let (stdin_w, stdin_r) = tokio::io::duplex(64);
        drop(stdin_r);
        let (mut diag_w, diag_r) = tokio::io::duplex(256);

        let io = BridgeIo {
            control_in: Some(Box::new(stdin_w)),
            diagnostics: Some(Box::new(diag_r)),
            ..Default::default()
        };

        let driver = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            diag_w
                .write_all(b"#1 (30.00 fps) exp 100.0 ag 1.0 dg 1.0\n")
                .await
                .unwrap();
            drop(diag_w);
        };

        let (stats, ()) = tokio::join!(bridge.run(io, pending()), driver);
        assert_eq!(stats.telemetry_records, 1);

        let record = TelemetryRecord::from_json(&recv_payload(&telemetry_rx).await).unwrap();
        assert_eq!(record.kind(), crate::telemetry::CAMERA_RAPID);
    }

    #[tokio::test]
    async fn undecodable_inbound_datagrams_are_ignored() {
        let (bridge, _video_rx, _telemetry_rx) = rig(BridgeConfig::default()).await;
        let bridge_addr = bridge.telemetry_addr().unwrap();

        let junk = roverlink_transport::UdpTransport::ephemeral(bridge_addr)
            .await
            .unwrap();
        let (stdin_w, mut stdin_r) = tokio::io::duplex(1024);
        let (stdout_w, stdout_r) = tokio::io::duplex(64);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let io = BridgeIo {
            control_in: Some(Box::new(stdin_w)),
            control_out: Some(Box::new(stdout_r)),
            ..Default::default()
        };
        let config_poll = poll_command();

        let driver = async {
            junk.send(b"not a frame").await.unwrap();
            junk.send(b"AAAA,BBBB").await.unwrap();
            // The first poll proves the loop is still alive after the junk.
            let mut seen = String::new();
            let mut chunk = [0u8; 256];
            while !seen.contains(&config_poll) {
                let n = stdin_r.read(&mut chunk).await.unwrap();
                seen.push_str(std::str::from_utf8(&chunk[..n]).unwrap());
            }
            stop_tx.send(()).unwrap();
            drop(stdout_w);
            seen
        };

        let shutdown = async {
            let _ = stop_rx.await;
        };
        let (stats, seen) = tokio::join!(bridge.run(io, shutdown), driver);
        assert_eq!(stats.commands, 0);
        assert!(!seen.contains("not a frame"));
    }

    #[tokio::test]
    async fn non_utf8_command_is_dropped_and_later_commands_flow() {
        let (bridge, _video_rx, _telemetry_rx) = rig(BridgeConfig {
            poll_interval: Duration::from_secs(60),
            ..Default::default()
        })
        .await;
        let bridge_addr = bridge.telemetry_addr().unwrap();

        let mut operator_tx = EncryptedChannel::open(
            ChannelConfig {
                peer: bridge_addr,
                bind: None,
                mode: WireMode::Framed,
            },
            key(),
        )
        .await
        .unwrap();
        let (stdin_w, mut stdin_r) = tokio::io::duplex(1024);
        // Keeps the bridge running until the driver is done.
        let (stdout_w, stdout_r) = tokio::io::duplex(64);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let io = BridgeIo {
            control_in: Some(Box::new(stdin_w)),
            control_out: Some(Box::new(stdout_r)),
            ..Default::default()
        };

        let driver = async {
            operator_tx.send_framed(&[0xff, 0xfe]).await.unwrap();
            operator_tx.send_framed(b"stop").await.unwrap();

            let mut seen = String::new();
            let mut chunk = [0u8; 256];
            while !seen.contains("stop\n") {
                let n = stdin_r.read(&mut chunk).await.unwrap();
                assert!(n > 0, "control stdin closed early");
                seen.push_str(&String::from_utf8_lossy(&chunk[..n]));
            }
            stop_tx.send(()).unwrap();
            drop(stdout_w);
            seen
        };

        let shutdown = async {
            let _ = stop_rx.await;
        };
        let (stats, seen) = tokio::join!(bridge.run(io, shutdown), driver);
        assert_eq!(seen, "stop\n");
        assert_eq!(stats.commands, 1);
    }
}
