//! Cache command implementation.

use std::time::Duration;

use serde_json::Value;

use crate::cache::DataCache;
use crate::cli::args::{CacheCommands, OutputFormat};
use crate::config::{Config, Paths};
use crate::context::OfflineContext;
use crate::error::OffsyncError;
use crate::network::ConnectivityMonitor;
use crate::output::{format_entries, format_entry, to_json};
use crate::sync::ExecutorRegistry;

/// Execute cache subcommands.
///
/// # Errors
///
/// Returns an error if the store cannot be opened, the key is missing or
/// output formatting fails.
pub fn cache(
    config: &Config,
    paths: &Paths,
    cmd: CacheCommands,
    format: OutputFormat,
) -> Result<String, OffsyncError> {
    let ctx = OfflineContext::open(
        config,
        paths,
        ExecutorRegistry::new(),
        ConnectivityMonitor::new(Some(false)),
    )?;
    run(&ctx.cache, cmd, format)
}

fn run(cache: &DataCache, cmd: CacheCommands, format: OutputFormat) -> Result<String, OffsyncError> {
    match cmd {
        CacheCommands::Get { key } => {
            let entry = cache
                .get_entry(&key)?
                .ok_or_else(|| OffsyncError::NotFound(format!("cache key '{key}'")))?;
            format_entry(&entry, format)
        },
        CacheCommands::Set { key, value, ttl } => {
            let value = parse_value(value);
            cache.set(&key, &value, ttl.map(Duration::from_secs))?;
            match format {
                OutputFormat::Json => to_json(&serde_json::json!({"stored": key})),
                OutputFormat::Pretty => Ok(format!("Stored: {key}")),
            }
        },
        CacheCommands::Clear { key: Some(key), .. } => {
            let removed = cache.clear(&key)?;
            match format {
                OutputFormat::Json => to_json(&serde_json::json!({"removed": removed})),
                OutputFormat::Pretty if removed => Ok(format!("Removed: {key}")),
                OutputFormat::Pretty => Ok(format!("Not cached: {key}")),
            }
        },
        CacheCommands::Clear { key: None, .. } => {
            cache.clear_all()?;
            match format {
                OutputFormat::Json => to_json(&serde_json::json!({"cleared": "all"})),
                OutputFormat::Pretty => {
                    Ok(format!("Cleared cache namespace '{}'", cache.namespace()))
                },
            }
        },
        CacheCommands::List => format_entries(&cache.entries()?, format),
    }
}

/// Interpret command-line input as JSON, falling back to a plain string.
fn parse_value(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}
