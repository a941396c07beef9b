use std::fs::File;
use std::future::pending;
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;

use futures_util::StreamExt;
use roverlink_frame::TextLineCodec;
use roverlink_link::{ChannelConfig, EncryptedChannel, WireMode};
use roverlink_transport::{resolve, MAX_DATAGRAM_SIZE};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::cmd::{ctrl_c, runtime, ListenArgs};
use crate::exit::{io_error, link_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_telemetry, OutputFormat, Received};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let rt = runtime()?;
    let result = rt.block_on(listen(args, format));
    // A blocked stdin read cannot be cancelled and would hold up a normal shutdown.
    rt.shutdown_background();
    result
}

async fn listen(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let key = args.link.derive_key()?;

    let telemetry_bind = SocketAddr::new(args.bind, args.telemetry_port);
    let rover = match &args.rover {
        Some(host) => Some(
            resolve(host, args.telemetry_port)
                .await
                .map_err(|err| transport_error("cannot resolve rover", err))?,
        ),
        None => None,
    };

    // Without a rover the peer is never used: nothing is sent.
    let mut telemetry = EncryptedChannel::open(
        ChannelConfig::framed(rover.unwrap_or(telemetry_bind), telemetry_bind),
        key.clone(),
    )
    .await
    .map_err(|err| link_error("cannot open telemetry port", err))?;

    let video_to_stdout = args.video_out.as_deref() == Some(Path::new("-"));
    let (video, mut video_sink) = match &args.video_out {
        Some(path) => {
            let bind = SocketAddr::new(args.bind, args.video_port);
            let channel = EncryptedChannel::open(
                ChannelConfig {
                    peer: bind,
                    bind: Some(bind),
                    mode: WireMode::Raw,
                },
                key.clone(),
            )
            .await
            .map_err(|err| link_error("cannot open video port", err))?;
            (Some(channel), Some(open_sink(path)?))
        }
        None => (None, None),
    };

    let mut out: Box<dyn Write> = if video_to_stdout {
        Box::new(std::io::stderr())
    } else {
        Box::new(std::io::stdout())
    };

    let mut commands = rover.map(|addr| {
        info!(rover = %addr, "forwarding stdin lines as commands");
        FramedRead::new(tokio::io::stdin(), TextLineCodec::default())
    });

    let mut telemetry_buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut video_buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut printed = 0usize;
    let shutdown = ctrl_c();
    tokio::pin!(shutdown);

    let local = telemetry
        .local_addr()
        .map_err(|err| link_error("cannot read telemetry address", err))?;
    info!(telemetry = %local, video = video.is_some(), "listening");

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            received = telemetry.recv_from(&mut telemetry_buf) => match received {
                Ok((len, from)) => match telemetry.decode(&telemetry_buf[..len]) {
                    Ok(payload) => {
                        let received = Received { payload: &payload, from };
                        print_telemetry(&mut *out, &received, format)
                            .map_err(|err| io_error("failed writing output", err))?;
                        printed = printed.saturating_add(1);
                        if args.count.is_some_and(|count| printed >= count) {
                            break;
                        }
                    }
                    Err(err) => debug!(%from, error = %err, "dropping telemetry datagram"),
                },
                Err(err) => warn!(error = %err, "telemetry receive failed"),
            },
            received = recv_optional(video.as_ref(), &mut video_buf) => match received {
                Ok((len, from)) => match video.as_ref().map(|v| v.decode(&video_buf[..len])) {
                    Some(Ok(unit)) => {
                        if let Some(sink) = video_sink.as_mut() {
                            sink.write_all(&unit)
                                .and_then(|()| sink.flush())
                                .map_err(|err| io_error("failed writing video", err))?;
                        }
                    }
                    Some(Err(err)) => debug!(%from, error = %err, "dropping video datagram"),
                    None => {}
                },
                Err(err) => warn!(error = %err, "video receive failed"),
            },
            line = next_line(&mut commands) => match line {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    if let Err(err) = telemetry.send_framed(line.as_bytes()).await {
                        warn!(error = %err, "command send failed");
                    }
                }
                None => {
                    debug!("stdin closed; no more commands");
                    commands = None;
                }
            },
        }
    }

    Ok(SUCCESS)
}

fn open_sink(path: &Path) -> CliResult<Box<dyn Write>> {
    if path == Path::new("-") {
        return Ok(Box::new(std::io::stdout()));
    }
    let file = File::create(path)
        .map_err(|err| io_error(&format!("cannot create {}", path.display()), err))?;
    Ok(Box::new(file))
}

async fn recv_optional(
    channel: Option<&EncryptedChannel>,
    buf: &mut [u8],
) -> roverlink_link::Result<(usize, SocketAddr)> {
    match channel {
        Some(channel) => channel.recv_from(buf).await,
        None => pending().await,
    }
}

async fn next_line<R>(lines: &mut Option<FramedRead<R, TextLineCodec>>) -> Option<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match lines {
        Some(lines) => match lines.next().await {
            Some(Ok(line)) => Some(line),
            Some(Err(_)) | None => None,
        },
        None => pending().await,
    }
}
