//! Config command implementation

use anyhow::Result;
use clap::Args;
use eidsq_core::config::{
    CONFIG_FILE_NAME, KEY_FAILED_DIR, KEY_NOTIFICATION_DIR, KEY_NOTIFICATION_FILE_EXTENSION,
    KEY_NOTIFICATION_FILE_PREFIX, KEY_PROCESSED_DIR,
};
use serde_json::json;
use std::path::Path;

use super::QueueArgs;

/// Show the resolved queue configuration
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the config command
pub fn execute(queue: &QueueArgs, args: ConfigArgs) -> Result<()> {
    let config = queue.resolve()?;
    let config_path = match queue.config {
        Some(ref path) => path.clone(),
        None => std::env::current_dir()?.join(CONFIG_FILE_NAME),
    };
    let config_exists = config_path.exists();

    if args.json {
        let output = json!({
            "config": config,
            "configFile": {
                "path": config_path.display().to_string(),
                "exists": config_exists,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Configuration:");
    println!("  {KEY_NOTIFICATION_DIR}: {}", config.notification_dir.display());
    println!("  {KEY_NOTIFICATION_FILE_PREFIX}: {}", config.prefix());
    println!("  {KEY_NOTIFICATION_FILE_EXTENSION}: {}", config.extension);
    println!("  {KEY_PROCESSED_DIR}: {}", display_optional(config.processed_dir.as_deref()));
    println!("  {KEY_FAILED_DIR}: {}", display_optional(config.failed_dir.as_deref()));
    println!();
    let status = if config_exists { "(found)" } else { "(not found)" };
    println!("Config file: {} {status}", config_path.display());

    Ok(())
}

fn display_optional(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none)".to_string())
}
