//! Output formatting for offsync.
//!
//! This module provides formatters for displaying cache and queue data in
//! various formats.

mod json;
mod pretty;

use crate::cache::CacheEntry;
use crate::cli::args::OutputFormat;
use crate::error::OffsyncError;
use crate::sync::{DrainStatus, QueuedOperation};

pub use json::*;
pub use pretty::*;

/// Format a cache entry based on output format
///
/// # Errors
///
/// Returns `OffsyncError::Parse` if JSON serialization fails.
pub fn format_entry(entry: &CacheEntry, format: OutputFormat) -> Result<String, OffsyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_entry_pretty(entry)),
        OutputFormat::Json => format_entry_json(entry),
    }
}

/// Format cache entries based on output format
///
/// # Errors
///
/// Returns `OffsyncError::Parse` if JSON serialization fails.
pub fn format_entries(entries: &[CacheEntry], format: OutputFormat) -> Result<String, OffsyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_entries_pretty(entries)),
        OutputFormat::Json => format_entries_json(entries),
    }
}

/// Format queued operations based on output format
///
/// # Errors
///
/// Returns `OffsyncError::Parse` if JSON serialization fails.
pub fn format_operations(
    operations: &[QueuedOperation],
    format: OutputFormat,
) -> Result<String, OffsyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_operations_pretty(operations)),
        OutputFormat::Json => format_operations_json(operations),
    }
}

/// Format a drain outcome based on output format
///
/// # Errors
///
/// Returns `OffsyncError::Parse` if JSON serialization fails.
pub fn format_drain_status(status: &DrainStatus, format: OutputFormat) -> Result<String, OffsyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_drain_status_pretty(status)),
        OutputFormat::Json => format_drain_status_json(status),
    }
}
