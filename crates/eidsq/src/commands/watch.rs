//! Watch command implementation

use anyhow::{bail, Context, Result};
use clap::Args;
use eidsq_core::codec::NotificationCodec;
use eidsq_core::config::QueueConfig;
use eidsq_core::{
    DirectoryWatcher, Drainer, JsonCodec, NotificationSink, RawCodec, UrlNotification, WatcherStatus,
};
use std::time::Duration;
use tracing::info;

use super::drain::{RawSink, UrlSink};
use super::{PayloadFormat, QueueArgs};

/// How often the command checks whether the worker stopped on its own
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Drain, then keep processing new notifications until interrupted
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Print each notification to stdout
    #[arg(long)]
    print: bool,

    /// Payload format; `json` decodes URL notification documents
    #[arg(long, value_enum, default_value_t)]
    format: PayloadFormat,
}

/// Execute the watch command
pub fn execute(queue: &QueueArgs, args: WatchArgs) -> Result<()> {
    let config = queue.resolve()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;

    runtime.block_on(async {
        match args.format {
            PayloadFormat::Raw => {
                watch_with(&config, RawCodec, RawSink { print: args.print }).await
            }
            PayloadFormat::Json => {
                let codec = JsonCodec::<UrlNotification>::new();
                watch_with(&config, codec, UrlSink { print: args.print }).await
            }
        }
    })
}

async fn watch_with<C, S>(config: &QueueConfig, codec: C, sink: S) -> Result<()>
where
    C: NotificationCodec + 'static,
    S: NotificationSink<C::Notification> + 'static,
{
    let watcher = DirectoryWatcher::new(Drainer::new("reader", config, codec, sink));
    watcher.start()?;

    let stopped_by_signal = tokio::select! {
        result = shutdown_signal() => {
            result?;
            true
        }
        _ = worker_stopped(&watcher) => false,
    };

    if let Some(handle) = watcher.shutdown() {
        handle.await.context("Watcher worker panicked")?;
    }

    let processed = watcher.drainer().file_count();
    if !stopped_by_signal {
        bail!("Watcher stopped after {processed} notification(s); see log for the cause");
    }
    info!("watcher stopped after {processed} notification(s)");
    Ok(())
}

async fn worker_stopped<C, S>(watcher: &DirectoryWatcher<C, S>)
where
    C: NotificationCodec + 'static,
    S: NotificationSink<C::Notification> + 'static,
{
    let mut interval = tokio::time::interval(STATUS_POLL_INTERVAL);
    loop {
        interval.tick().await;
        if watcher.status() == WatcherStatus::Stopped {
            return;
        }
    }
}

/// Resolves on SIGINT, or on SIGTERM where available
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("Failed to create SIGTERM handler")?;

        tokio::select! {
            result = ctrl_c => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Received SIGINT (Ctrl+C)");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
