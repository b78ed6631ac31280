use colored::Colorize;

use crate::cache::CacheEntry;
use crate::sync::{DrainReport, DrainStatus, QueuedOperation};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

fn compact(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max.saturating_sub(1)).collect();
    short.push('…');
    short
}

/// Format a single cache entry
pub fn format_entry_pretty(entry: &CacheEntry) -> String {
    let mut output = format!("{}\n", entry.key.bold());
    output.push_str(&format!("  {}: {}\n", "Value".dimmed(), compact(&entry.value)));
    output.push_str(&format!(
        "  {}: {}\n",
        "Stored".dimmed(),
        entry.stored_at.format(TIME_FORMAT)
    ));

    match entry.expires_at {
        Some(expires) => output.push_str(&format!(
            "  {}: {}\n",
            "Expires".dimmed(),
            expires.format(TIME_FORMAT).to_string().yellow()
        )),
        None => output.push_str(&format!("  {}: {}\n", "Expires".dimmed(), "never".green())),
    }

    output
}

/// Format a list of cache entries
pub fn format_entries_pretty(entries: &[CacheEntry]) -> String {
    if entries.is_empty() {
        return "Cache (0 entries)\n  No entries".to_string();
    }

    let mut output = format!("Cache ({} entries)\n", entries.len());
    output.push_str(&"─".repeat(60));
    output.push('\n');

    for entry in entries {
        let expiry = entry.expires_at.map_or_else(
            || "never expires".dimmed(),
            |t| format!("expires {}", t.format(TIME_FORMAT)).yellow(),
        );
        output.push_str(&format!(
            "{}  {}  {}\n",
            entry.key.bold(),
            truncate(&compact(&entry.value), 40),
            expiry
        ));
    }

    output
}

/// Format queued operations in FIFO order
pub fn format_operations_pretty(operations: &[QueuedOperation]) -> String {
    if operations.is_empty() {
        return "No pending operations in queue.".to_string();
    }

    let mut lines = Vec::new();

    lines.push(format!("Pending Operations ({})", operations.len()));
    lines.push("─".repeat(60));
    lines.push(format!(
        "{:<6} {:<12} {:<18} {:<9} {}",
        "ID", "Kind", "Enqueued", "Attempts", "Last error"
    ));
    lines.push("─".repeat(60));

    for op in operations {
        let attempts = if op.attempts > 0 {
            op.attempts.to_string().yellow().to_string()
        } else {
            op.attempts.to_string()
        };
        lines.push(format!(
            "{:<6} {:<12} {:<18} {:<9} {}",
            op.id,
            truncate(&op.kind, 12),
            op.enqueued_at.format(TIME_FORMAT),
            attempts,
            op.last_error
                .as_deref()
                .map(|e| truncate(e, 40).red().to_string())
                .unwrap_or_default()
        ));
    }

    lines.join("\n")
}

/// Format the result of a drain pass
pub fn format_drain_report_pretty(report: &DrainReport) -> String {
    let mut lines = Vec::new();

    lines.push(format!("Sync pass: {} operations attempted", report.attempted));
    lines.push("─".repeat(40));

    if report.succeeded > 0 {
        lines.push(format!(
            "  {} {}",
            "✓".green(),
            format!("{} succeeded", report.succeeded).green()
        ));
    }

    if report.retrying > 0 {
        lines.push(format!(
            "  {} {}",
            "↻".yellow(),
            format!("{} will retry", report.retrying).yellow()
        ));
    }

    if !report.dropped.is_empty() {
        lines.push(format!(
            "  {} {}",
            "✗".red(),
            format!("{} dropped after too many attempts", report.dropped.len()).red()
        ));
    }

    if report.cancelled {
        lines.push(format!("  {} {}", "○".yellow(), "cancelled".yellow()));
    }

    lines.push(format!("  {} remaining", report.remaining));

    // Show the first few dropped operations
    if !report.dropped.is_empty() {
        lines.push(String::new());
        lines.push("Dropped:".to_string());
        for op in report.dropped.iter().take(3) {
            lines.push(format!(
                "  - #{} {}: {}",
                op.id,
                op.kind,
                op.last_error.as_deref().unwrap_or("Unknown error")
            ));
        }
    }

    lines.join("\n")
}

/// Format any drain outcome
pub fn format_drain_status_pretty(status: &DrainStatus) -> String {
    match status {
        DrainStatus::Offline => format!("{} nothing was synced.", "Offline:".yellow()),
        DrainStatus::AlreadyDraining => "A sync pass is already running.".to_string(),
        DrainStatus::Idle => "No pending operations to sync.".to_string(),
        DrainStatus::Ran(report) => format_drain_report_pretty(report),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn make_entry(key: &str, expires: bool) -> CacheEntry {
        let now = Utc::now();
        CacheEntry {
            key: key.to_string(),
            value: json!({"title": "Al-Mulk"}),
            stored_at: now,
            expires_at: expires.then(|| now + chrono::Duration::hours(1)),
        }
    }

    fn make_operation(id: u64, attempts: u32) -> QueuedOperation {
        QueuedOperation {
            id,
            kind: "http".to_string(),
            payload: json!({"url": "https://example.com"}),
            enqueued_at: Utc::now(),
            attempts,
            last_attempt: None,
            last_error: (attempts > 0).then(|| "connection refused".to_string()),
        }
    }

    #[test]
    fn test_format_entry() {
        colored::control::set_override(false);
        let output = format_entry_pretty(&make_entry("surah:67", false));
        assert!(output.contains("surah:67"));
        assert!(output.contains("Al-Mulk"));
        assert!(output.contains("never"));
    }

    #[test]
    fn test_format_empty_entries() {
        let output = format_entries_pretty(&[]);
        assert!(output.contains("0 entries"));
    }

    #[test]
    fn test_format_entries() {
        colored::control::set_override(false);
        let output = format_entries_pretty(&[make_entry("a", true), make_entry("b", false)]);
        assert!(output.contains("2 entries"));
        assert!(output.contains("expires"));
        assert!(output.contains("never expires"));
    }

    #[test]
    fn test_format_operations() {
        colored::control::set_override(false);
        let output = format_operations_pretty(&[make_operation(0, 0), make_operation(1, 2)]);
        assert!(output.contains("Pending Operations (2)"));
        assert!(output.contains("connection refused"));
    }

    #[test]
    fn test_format_drain_report() {
        colored::control::set_override(false);
        let report = DrainReport {
            attempted: 3,
            succeeded: 1,
            retrying: 1,
            dropped: vec![make_operation(7, 3)],
            cancelled: false,
            remaining: 1,
        };
        let output = format_drain_report_pretty(&report);
        assert!(output.contains("3 operations attempted"));
        assert!(output.contains("1 succeeded"));
        assert!(output.contains("1 will retry"));
        assert!(output.contains("#7 http: connection refused"));
    }

    #[test]
    fn test_format_drain_status_variants() {
        colored::control::set_override(false);
        assert!(format_drain_status_pretty(&DrainStatus::Offline).contains("Offline"));
        assert!(format_drain_status_pretty(&DrainStatus::Idle).contains("No pending"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }
}
