//! Command-line interface for offsync.

pub mod args;
pub mod commands;
pub mod completions;
