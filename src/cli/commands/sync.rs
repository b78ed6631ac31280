//! Sync queue command implementation.
//!
//! Handles sync queue management commands.

use std::collections::BTreeMap;

use chrono::Utc;
use colored::Colorize;
use tracing::info;

use super::registry;
use crate::cli::args::{OutputFormat, SyncCommands};
use crate::config::{Config, Paths};
use crate::context::OfflineContext;
use crate::error::OffsyncError;
use crate::network::{ConnectivityMonitor, TcpProbe};
use crate::output::{format_drain_status, format_operations, to_json};
use crate::sync::{HttpRequest, SyncQueue};

/// Execute sync subcommands.
///
/// # Errors
///
/// Returns an error if the store cannot be opened, the request is malformed
/// or a sync pass cannot persist its results.
pub async fn sync(
    config: &Config,
    paths: &Paths,
    cmd: SyncCommands,
    format: OutputFormat,
) -> Result<String, OffsyncError> {
    match cmd {
        SyncCommands::Status => {
            let probe = probe(config);
            let online = probe.check().await;
            let ctx = open(config, paths, Some(online))?;
            show_status(&ctx.queue, probe.target(), online, format)
        },
        SyncCommands::List { limit } => {
            let ctx = open(config, paths, Some(false))?;
            let operations: Vec<_> = ctx.queue.pending().into_iter().take(limit).collect();
            format_operations(&operations, format)
        },
        SyncCommands::Add {
            url,
            method,
            headers,
            body,
        } => {
            let request = build_request(url, &method, &headers, body.as_deref())?;
            let ctx = open(config, paths, Some(false))?;
            add_request(&ctx.queue, &request, format)
        },
        SyncCommands::Run => {
            let online = probe(config).check().await;
            let ctx = open(config, paths, Some(online))?;
            let status = ctx.queue.drain(ctx.queue.cancel_signal()).await;
            ctx.shutdown().await;
            format_drain_status(&status?, format)
        },
        SyncCommands::Watch => watch(config, paths).await,
        SyncCommands::Clear { force } => {
            let ctx = open(config, paths, Some(false))?;
            clear_operations(&ctx.queue, force, format)
        },
    }
}

fn probe(config: &Config) -> TcpProbe {
    TcpProbe::new(
        config.network.probe_target.clone(),
        config.network.probe_interval(),
        config.network.probe_timeout(),
    )
}

// With a fixed state the monitor never transitions, so no pass starts behind
// the command's back.
fn open(config: &Config, paths: &Paths, online: Option<bool>) -> Result<OfflineContext, OffsyncError> {
    OfflineContext::open(
        config,
        paths,
        registry(config)?,
        ConnectivityMonitor::new(online),
    )
}

/// Show queue status.
fn show_status(
    queue: &SyncQueue,
    target: &str,
    online: bool,
    format: OutputFormat,
) -> Result<String, OffsyncError> {
    let stats = queue.stats();

    match format {
        OutputFormat::Json => {
            let data = serde_json::json!({
                "pending": stats.pending,
                "oldest_pending": stats.oldest_pending.map(|t| t.to_rfc3339()),
                "online": online,
                "probe_target": target,
            });
            to_json(&data)
        },
        OutputFormat::Pretty => {
            let mut lines = Vec::new();

            lines.push("Sync Queue Status".bold().to_string());
            lines.push("─".repeat(40));

            lines.push(format!(
                "  Network:    {} {}",
                if online {
                    "online".green()
                } else {
                    "offline".yellow()
                },
                format!("({target})").dimmed()
            ));

            lines.push(format!(
                "  Pending:    {} {}",
                stats.pending,
                if stats.pending > 0 {
                    "operations waiting".dimmed()
                } else {
                    "".dimmed()
                }
            ));

            if let Some(oldest) = stats.oldest_pending {
                let age = Utc::now().signed_duration_since(oldest);
                let age_str = if age.num_days() > 0 {
                    format!("{} days ago", age.num_days())
                } else if age.num_hours() > 0 {
                    format!("{} hours ago", age.num_hours())
                } else if age.num_minutes() > 0 {
                    format!("{} minutes ago", age.num_minutes())
                } else {
                    "just now".to_string()
                };
                lines.push(format!("  Oldest:     {}", age_str.dimmed()));
            }

            if stats.pending > 0 {
                lines.push(String::new());
                lines.push(
                    "Run 'offsync sync run' to execute pending operations"
                        .dimmed()
                        .to_string(),
                );
            }

            Ok(lines.join("\n"))
        },
    }
}

/// Turn command-line pieces into a queued request.
fn build_request(
    url: String,
    method: &str,
    headers: &[String],
    body: Option<&str>,
) -> Result<HttpRequest, OffsyncError> {
    let mut request = HttpRequest::new(method.to_uppercase(), url);

    request.headers = headers
        .iter()
        .map(|header| {
            header
                .split_once(':')
                .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
                .filter(|(name, _)| !name.is_empty())
                .ok_or_else(|| {
                    OffsyncError::Config(format!("Invalid header '{header}', expected NAME:VALUE"))
                })
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    request.body = body
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| OffsyncError::Parse(format!("Request body is not valid JSON: {e}")))?;

    Ok(request)
}

/// Add a request to the queue.
fn add_request(
    queue: &SyncQueue,
    request: &HttpRequest,
    format: OutputFormat,
) -> Result<String, OffsyncError> {
    let id = queue.enqueue_command(request)?;

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({
            "id": id,
            "method": request.method,
            "url": request.url,
        })),
        OutputFormat::Pretty => Ok(format!(
            "Queued {} {} (ID: {id})",
            request.method, request.url
        )),
    }
}

/// Clear every pending operation.
fn clear_operations(
    queue: &SyncQueue,
    force: bool,
    format: OutputFormat,
) -> Result<String, OffsyncError> {
    if !force {
        return Err(OffsyncError::Config(
            "Use --force to clear all pending operations".to_string(),
        ));
    }

    let count = queue.clear()?;

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({"cleared": count})),
        OutputFormat::Pretty => Ok(format!("Cleared {count} pending operations")),
    }
}

/// Sync on every reconnect until Ctrl-C.
async fn watch(config: &Config, paths: &Paths) -> Result<String, OffsyncError> {
    let probe = probe(config);
    let monitor = ConnectivityMonitor::attach(&probe)?;
    let ctx = OfflineContext::open(config, paths, registry(config)?, monitor)?;

    ctx.queue.on_operation_dropped(|op| {
        eprintln!(
            "{} dropped #{} {}: {}",
            "✗".red(),
            op.id,
            op.kind,
            op.last_error.as_deref().unwrap_or("Unknown error")
        );
    });
    let _changes = ctx.monitor.subscribe(|online| {
        if online {
            eprintln!("{} network is back, syncing", "●".green());
        } else {
            eprintln!("{} network lost, queueing", "○".yellow());
        }
    });

    eprintln!(
        "Watching {} with {} pending. Press Ctrl-C to stop.",
        probe.target(),
        ctx.queue.size()
    );

    // The first probe may have come back before the queue subscribed.
    if ctx.monitor.current_state() {
        let status = ctx.queue.drain(ctx.queue.cancel_signal()).await?;
        info!(?status, "catch-up pass finished");
    }

    let signal = tokio::signal::ctrl_c()
        .await
        .map_err(|e| OffsyncError::Network(format!("Failed to listen for Ctrl-C: {e}")));
    ctx.shutdown().await;
    signal?;

    Ok(format!("Stopped. {} operations pending.", ctx.queue.size()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ConnectivityMonitor;
    use crate::storage::MemoryStore;
    use crate::sync::{ExecutorRegistry, QueueOptions};
    use serde_json::json;
    use std::sync::Arc;

    fn offline_queue() -> SyncQueue {
        SyncQueue::open(
            Arc::new(MemoryStore::new()),
            "cli",
            ExecutorRegistry::new(),
            ConnectivityMonitor::new(Some(false)),
            QueueOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_build_request() {
        let request = build_request(
            "http://localhost/progress".to_string(),
            "put",
            &["Authorization: Bearer t".to_string(), "X-A:b".to_string()],
            Some(r#"{"ayah": 5}"#),
        )
        .unwrap();

        assert_eq!(request.method, "PUT");
        assert_eq!(request.headers["Authorization"], "Bearer t");
        assert_eq!(request.headers["X-A"], "b");
        assert_eq!(request.body, Some(json!({"ayah": 5})));
    }

    #[test]
    fn test_build_request_rejects_bad_header() {
        let err = build_request("http://x".to_string(), "POST", &["nocolon".to_string()], None)
            .unwrap_err();
        assert!(matches!(err, OffsyncError::Config(_)));

        let err = build_request("http://x".to_string(), "POST", &[":v".to_string()], None)
            .unwrap_err();
        assert!(matches!(err, OffsyncError::Config(_)));
    }

    #[test]
    fn test_build_request_rejects_bad_body() {
        let err = build_request("http://x".to_string(), "POST", &[], Some("{nope")).unwrap_err();
        assert!(matches!(err, OffsyncError::Parse(_)));
    }

    #[test]
    fn test_add_request_enqueues_http_kind() {
        let queue = offline_queue();
        let request = HttpRequest::new("POST", "http://localhost/bookmarks");

        let output = add_request(&queue, &request, OutputFormat::Pretty).unwrap();
        assert_eq!(output, "Queued POST http://localhost/bookmarks (ID: 0)");

        let pending = queue.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, "http");
        assert_eq!(pending[0].decode::<HttpRequest>().unwrap(), request);
    }

    #[test]
    fn test_clear_requires_force() {
        let queue = offline_queue();
        queue.enqueue("http", json!({"url": "http://x"})).unwrap();

        assert!(clear_operations(&queue, false, OutputFormat::Pretty).is_err());
        assert_eq!(queue.size(), 1);

        let output = clear_operations(&queue, true, OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["cleared"], 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_show_status() {
        colored::control::set_override(false);
        let queue = offline_queue();
        queue.enqueue("http", json!({"url": "http://x"})).unwrap();

        let output = show_status(&queue, "127.0.0.1:1", false, OutputFormat::Pretty).unwrap();
        assert!(output.contains("offline"));
        assert!(output.contains("Pending:    1"));
        assert!(output.contains("just now"));

        let output = show_status(&queue, "127.0.0.1:1", true, OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["pending"], 1);
        assert_eq!(parsed["online"], true);
    }
}
