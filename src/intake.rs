// Event intake: newline-delimited JSON notifications are validated on the reader side and
// stored by a dedicated writer task fed through a bounded channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::history_store::HistoryStore;
use crate::models::{AttributeEvent, Notification};

/// Channel capacity between the reader and the writer (backpressure if the store falls behind).
pub const INTAKE_CHANNEL_CAPACITY: usize = 1024;

/// Parses one line into a validated event. Blank lines yield `None`.
pub fn parse_line(
    line: &str,
    received_at: DateTime<Utc>,
    ignore_blank_spaces: bool,
) -> anyhow::Result<Option<AttributeEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let notification: Notification = serde_json::from_str(line)?;
    let event = notification.into_event(received_at, ignore_blank_spaces)?;
    Ok(Some(event))
}

/// Reads notifications until EOF and forwards the valid ones to `tx`.
/// Invalid lines are logged and skipped. Returns the number of events forwarded.
pub async fn read_notifications<R>(
    reader: R,
    tx: mpsc::Sender<AttributeEvent>,
    ignore_blank_spaces: bool,
) -> anyhow::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;
    let mut line_no: u64 = 0;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        match parse_line(&line, Utc::now(), ignore_blank_spaces) {
            Ok(Some(event)) => {
                if tx.send(event).await.is_err() {
                    warn!("intake writer gone; stop reading");
                    break;
                }
                forwarded += 1;
            }
            Ok(None) => {}
            Err(e) => warn!(line = line_no, error = %e, "rejected notification"),
        }
    }
    Ok(forwarded)
}

/// Spawns the task that stores every received event. It exits once every sender is dropped
/// and the channel is drained.
pub fn spawn_writer(
    mut rx: mpsc::Receiver<AttributeEvent>,
    store: Arc<HistoryStore>,
    stored_total: Arc<AtomicU64>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match store.store_event(&event).await {
                Ok(()) => {
                    stored_total.fetch_add(1, Ordering::Relaxed);
                    debug!(entity = %event.identity.entity_id, attr = %event.identity.attr_name, "event stored");
                }
                Err(e) => warn!(
                    entity = %event.identity.entity_id,
                    attr = %event.identity.attr_name,
                    error = %e,
                    "storing event failed"
                ),
            }
        }
    })
}
