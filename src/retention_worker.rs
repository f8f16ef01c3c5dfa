// Background retention worker: prunes expired documents from TTL collections every
// prune_interval_secs. VACUUM runs on a configurable schedule (cron expression or fixed interval).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::config::RetentionConfig;
use crate::history_store::HistoryStore;

/// Config for the retention worker.
#[derive(Debug, Clone)]
pub struct RetentionWorkerConfig {
    pub prune_interval_secs: u64,
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *" = 03:00 daily). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    pub vacuum_interval_secs: u64,
}

impl From<&RetentionConfig> for RetentionWorkerConfig {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            prune_interval_secs: config.prune_interval_secs,
            vacuum_schedule: config.vacuum_schedule.clone(),
            vacuum_interval_secs: config.vacuum_interval_secs,
        }
    }
}

/// Spawns the retention worker. It stops when `shutdown_rx` fires or its sender is dropped.
pub fn spawn(
    store: Arc<HistoryStore>,
    config: RetentionWorkerConfig,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(store, config, shutdown_rx).await;
    })
}

#[instrument(skip(store, shutdown_rx), fields(interval_secs = config.prune_interval_secs))]
async fn run(
    store: Arc<HistoryStore>,
    config: RetentionWorkerConfig,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    let mut prune_interval = tokio::time::interval(Duration::from_secs(config.prune_interval_secs));
    prune_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let (vacuum_tx, mut vacuum_rx) = tokio::sync::mpsc::channel::<()>(1);
    let scheduler = tokio::spawn(vacuum_scheduler(config.clone(), vacuum_tx));

    loop {
        tokio::select! {
            _ = prune_interval.tick() => {
                if let Err(e) = run_one_tick(&store).await {
                    warn!(error = %e, "retention tick failed");
                }
            }
            Some(()) = vacuum_rx.recv() => {
                if let Err(e) = store.vacuum().await {
                    warn!(error = %e, "vacuum failed");
                } else {
                    info!("vacuum complete");
                }
            }
            _ = &mut shutdown_rx => {
                info!("retention worker stopping");
                break;
            }
        }
    }
    scheduler.abort();
}

/// Sends a message on `tx` at each VACUUM time (cron or fixed interval). Uses local time for cron.
async fn vacuum_scheduler(config: RetentionWorkerConfig, tx: tokio::sync::mpsc::Sender<()>) {
    if let Some(ref cron_str) = config.vacuum_schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid vacuum_schedule; VACUUM will not run");
            return;
        };
        loop {
            let now = chrono::Local::now();
            let Some(next) = schedule.after(&now).next() else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                continue;
            };
            let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
            tokio::time::sleep(delay).await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    } else {
        let interval = Duration::from_secs(config.vacuum_interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    }
}

/// Runs one prune pass over every TTL collection. Returns the number of documents removed.
pub async fn run_one_tick(store: &HistoryStore) -> anyhow::Result<u64> {
    let pruned = store.prune_expired(Utc::now()).await?;
    Ok(pruned)
}
