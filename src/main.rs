use anyhow::Result;
use sth::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr; stdin carries the notifications.
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let app_config = config::AppConfig::load()?;
    let options = history_store::StoreOptions::from_config(&app_config);
    let ignore_blank_spaces = options.ignore_blank_spaces;
    let store = Arc::new(
        history_store::HistoryStore::connect(
            &app_config.database.path,
            app_config.database.max_pool_size,
            options,
        )
        .await?,
    );
    store.init().await?;
    tracing::info!(
        path = %app_config.database.path,
        data_model = %app_config.database.data_model,
        should_hash = app_config.database.should_hash,
        "history store ready"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let retention_handle = retention_worker::spawn(
        store.clone(),
        retention_worker::RetentionWorkerConfig::from(&app_config.retention),
        shutdown_rx,
    );

    let (event_tx, event_rx) = mpsc::channel(intake::INTAKE_CHANNEL_CAPACITY);
    let stored_total = Arc::new(AtomicU64::new(0));
    let writer_handle = intake::spawn_writer(event_rx, store.clone(), stored_total.clone());

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = intake::read_notifications(stdin, event_tx, ignore_blank_spaces) => {
            let forwarded = result?;
            tracing::info!(forwarded, "end of input");
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
        }
    }

    // The reader future (and its sender) is gone at this point; the writer drains and exits.
    let _ = writer_handle.await;
    let _ = shutdown_tx.send(());
    let _ = retention_handle.await;
    tracing::info!(
        stored = stored_total.load(Ordering::Relaxed),
        "shutdown complete"
    );

    Ok(())
}
