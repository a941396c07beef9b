use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{LinkError, Result};

/// Interval between distance polls written to the control process.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lines that may wait for the control process before new ones are dropped.
pub const DEFAULT_CONTROL_QUEUE: usize = 64;

/// The periodic sensor poll, without its trailing newline.
pub fn poll_command() -> String {
    json!({"command": "distance", "payload": {}}).to_string()
}

/// Serialized access to the control process's stdin.
///
/// A single writer task owns the pipe and receives whole lines over a bounded
/// queue, so commands from different sources never interleave mid-line and a
/// control process that stops reading cannot block the caller.
#[derive(Debug, Clone)]
pub struct ControlInput {
    tx: mpsc::Sender<String>,
    closed: Arc<AtomicBool>,
}

impl ControlInput {
    /// Start the writer task on the current runtime.
    ///
    /// The task ends when every `ControlInput` clone is dropped or when a
    /// write fails.
    pub fn spawn<W>(writer: W, capacity: usize) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let closed = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(write_lines(writer, rx, closed.clone()));
        (Self { tx, closed }, handle)
    }

    /// Queue `line` followed by a newline.
    pub fn submit(&self, line: &str) -> Result<()> {
        if self.is_closed() {
            return Err(LinkError::ControlClosed);
        }
        let mut owned = String::with_capacity(line.len() + 1);
        owned.push_str(line);
        owned.push('\n');
        self.tx.try_send(owned).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => LinkError::ControlBusy,
            mpsc::error::TrySendError::Closed(_) => LinkError::ControlClosed,
        })
    }

    /// Whether the control process has stopped accepting input.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }
}

async fn write_lines<W>(mut writer: W, mut rx: mpsc::Receiver<String>, closed: Arc<AtomicBool>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        if let Err(err) = result {
            warn!(error = %err, "control process stdin closed; dropping further commands");
            closed.store(true, Ordering::Release);
            return;
        }
    }
    debug!("control input writer finished");
    let _ = writer.shutdown().await;
}
