//! Write command implementation

use anyhow::{bail, Context, Result};
use clap::Args;
use eidsq_core::io::{NotificationWriter, WriteOutcome};
use eidsq_core::{JsonCodec, Lifecycle, RawCodec, RawNotification, UrlNotification};
use serde_json::json;
use std::io::Read;
use std::path::PathBuf;

use super::{PayloadFormat, QueueArgs};

/// Publish one notification into the queue
#[derive(Args, Debug)]
pub struct WriteArgs {
    /// Payload text (or omit to use --file or --stdin)
    text: Option<String>,

    /// Read the payload from a file
    #[arg(long, conflicts_with_all = ["stdin", "text"])]
    file: Option<PathBuf>,

    /// Read the payload from stdin
    #[arg(long, conflicts_with_all = ["file", "text"])]
    stdin: bool,

    /// Payload format; `json` validates a URL notification document
    #[arg(long, value_enum, default_value_t)]
    format: PayloadFormat,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the write command
pub fn execute(queue: &QueueArgs, args: WriteArgs) -> Result<()> {
    let config = queue.resolve()?;
    let payload = read_payload(&args)?;

    let outcome = match args.format {
        PayloadFormat::Raw => {
            let writer = NotificationWriter::new("writer", &config, RawCodec);
            writer.startup()?;
            writer.publish(&RawNotification::new(payload))
        }
        PayloadFormat::Json => {
            let notification: UrlNotification = serde_json::from_slice(&payload)
                .context("Payload is not a valid URL notification document")?;
            let codec = JsonCodec::<UrlNotification>::pretty();
            let writer = NotificationWriter::new("writer", &config, codec);
            writer.startup()?;
            writer.publish(&notification)
        }
    };

    match outcome {
        WriteOutcome::Written { path } => {
            if args.json {
                let output = json!({ "written": true, "path": path.display().to_string() });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("Queued {}", path.display());
            }
            Ok(())
        }
        WriteOutcome::Dropped { reason } => bail!("Notification dropped: {reason:?}"),
    }
}

fn read_payload(args: &WriteArgs) -> Result<Vec<u8>> {
    if let Some(ref text) = args.text {
        return Ok(text.clone().into_bytes());
    }
    if let Some(ref path) = args.file {
        return std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()));
    }
    if args.stdin {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    bail!("No payload: pass TEXT, --file or --stdin")
}
