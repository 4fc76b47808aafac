//! Drain command implementation

use anyhow::Result;
use clap::Args;
use eidsq_core::codec::NotificationCodec;
use eidsq_core::config::QueueConfig;
use eidsq_core::{
    Drainer, JsonCodec, NotificationSink, RawCodec, RawNotification, SinkError, UrlNotification,
};
use std::io::Write;
use tracing::info;

use super::{PayloadFormat, QueueArgs};

/// Process every queued notification once and exit
#[derive(Args, Debug)]
pub struct DrainArgs {
    /// Print each notification to stdout
    #[arg(long)]
    pub print: bool,

    /// Payload format; `json` decodes URL notification documents
    #[arg(long, value_enum, default_value_t)]
    pub format: PayloadFormat,
}

/// Execute the drain command
pub fn execute(queue: &QueueArgs, args: DrainArgs) -> Result<()> {
    let config = queue.resolve()?;
    config.prepare()?;

    let count = match args.format {
        PayloadFormat::Raw => drain_with(&config, RawCodec, RawSink { print: args.print })?,
        PayloadFormat::Json => {
            let codec = JsonCodec::<UrlNotification>::new();
            drain_with(&config, codec, UrlSink { print: args.print })?
        }
    };

    println!("Drained {count} notification(s)");
    Ok(())
}

fn drain_with<C, S>(config: &QueueConfig, codec: C, sink: S) -> Result<usize>
where
    C: NotificationCodec,
    S: NotificationSink<C::Notification>,
{
    let drainer = Drainer::new("reader", config, codec, sink);
    Ok(drainer.drain_once()?)
}

/// Prints raw payloads as text
pub struct RawSink {
    pub print: bool,
}

impl NotificationSink<RawNotification> for RawSink {
    fn receive(&self, notification: RawNotification) -> Result<(), SinkError> {
        if !self.print {
            info!("received {} byte(s)", notification.len());
            return Ok(());
        }
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(notification.as_bytes())
            .and_then(|()| writeln!(stdout))
            .map_err(|e| SinkError::with_source("Failed to write to stdout", e))
    }
}

/// Prints URL notifications as one JSON line each
pub struct UrlSink {
    pub print: bool,
}

impl NotificationSink<UrlNotification> for UrlSink {
    fn receive(&self, notification: UrlNotification) -> Result<(), SinkError> {
        if !self.print {
            info!("received {} ({})", notification.id, notification.product_url);
            return Ok(());
        }
        let line = serde_json::to_string(&notification)
            .map_err(|e| SinkError::with_source("Failed to encode notification", e))?;
        writeln!(std::io::stdout().lock(), "{line}")
            .map_err(|e| SinkError::with_source("Failed to write to stdout", e))
    }
}
