use std::net::{Ipv4Addr, SocketAddr};
use std::process::Stdio;

use roverlink_link::{BoxReader, BoxWriter, Bridge, BridgeConfig, BridgeIo, ChannelConfig};
use roverlink_transport::resolve;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::cmd::{ctrl_c, runtime, BridgeArgs};
use crate::exit::{io_error, link_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_stats, OutputFormat};

pub fn run(args: BridgeArgs, format: OutputFormat) -> CliResult<i32> {
    runtime()?.block_on(run_bridge(args, format))
}

async fn run_bridge(args: BridgeArgs, format: OutputFormat) -> CliResult<i32> {
    if args.no_camera && args.no_control {
        return Err(CliError::new(
            USAGE,
            "nothing to bridge: both --no-camera and --no-control were given",
        ));
    }

    let key = args.link.derive_key()?;

    let video_peer = resolve(&args.operator, args.video_port)
        .await
        .map_err(|err| transport_error("cannot resolve operator", err))?;
    let telemetry_peer = resolve(&args.operator, args.telemetry_port)
        .await
        .map_err(|err| transport_error("cannot resolve operator", err))?;
    let command_bind = args
        .command_bind
        .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.telemetry_port)));

    let config = BridgeConfig {
        poll_interval: args.poll_interval,
        max_media_buffer: args.max_media_buffer,
        ..BridgeConfig::default()
    };
    let bridge = Bridge::open(
        ChannelConfig::raw(video_peer),
        ChannelConfig::framed(telemetry_peer, command_bind),
        key,
        config,
    )
    .await
    .map_err(|err| link_error("bridge setup failed", err))?;

    let mut io = BridgeIo::default();
    let mut children = Vec::new();

    if !args.no_camera {
        let mut camera = spawn_shell("camera", &args.camera_cmd, false)?;
        io.media = camera.stdout.take().map(|s| Box::new(s) as BoxReader);
        io.diagnostics = camera.stderr.take().map(|s| Box::new(s) as BoxReader);
        children.push(("camera", camera));
    }
    if !args.no_control {
        let mut control = spawn_shell("control", &args.control_cmd, true)?;
        io.control_in = control.stdin.take().map(|s| Box::new(s) as BoxWriter);
        io.control_out = control.stdout.take().map(|s| Box::new(s) as BoxReader);
        io.control_err = control.stderr.take().map(|s| Box::new(s) as BoxReader);
        children.push(("control", control));
    }

    let stats = bridge.run(io, ctrl_c()).await;

    for (name, child) in children {
        stop_child(name, child).await;
    }

    print_stats(&mut std::io::stdout(), &stats, format)
        .map_err(|err| io_error("failed writing stats", err))?;
    Ok(SUCCESS)
}

fn spawn_shell(name: &str, command_line: &str, with_stdin: bool) -> CliResult<Child> {
    info!(process = name, command = command_line, "starting process");
    Command::new("sh")
        .arg("-c")
        .arg(command_line)
        .stdin(if with_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| io_error(&format!("failed to start {name} process"), err))
}

async fn stop_child(name: &str, mut child: Child) {
    match child.try_wait() {
        Ok(Some(status)) => {
            info!(process = name, %status, "process exited");
            return;
        }
        Ok(None) => {
            debug!(process = name, "stopping process");
            if let Err(err) = child.start_kill() {
                warn!(process = name, error = %err, "failed to signal process");
            }
        }
        Err(err) => warn!(process = name, error = %err, "cannot query process state"),
    }
    match child.wait().await {
        Ok(status) => info!(process = name, %status, "process stopped"),
        Err(err) => warn!(process = name, error = %err, "failed to reap process"),
    }
}
