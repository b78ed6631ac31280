//! Command implementations for offsync.
//!
//! Each command opens the offline context it needs, runs, and returns the
//! text to print.

mod cache;
mod sync;

pub use cache::cache;
pub use sync::sync;

use clap_complete::Shell;

use crate::cli::completions::{completion_install_instructions, generate_completions};
use crate::config::Config;
use crate::error::OffsyncError;
use crate::sync::{Command, ExecutorRegistry, HttpExecutor, HttpRequest};

/// Executors available to the command line: deferred HTTP requests.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn registry(config: &Config) -> Result<ExecutorRegistry, OffsyncError> {
    let mut registry = ExecutorRegistry::new();
    registry.register(
        HttpRequest::KIND,
        HttpExecutor::new(config.sync.request_timeout())?,
    );
    Ok(registry)
}

/// Execute the completions command
///
/// # Errors
///
/// Returns an error if the generated script cannot be rendered.
pub fn completions(shell: Shell, install: bool) -> Result<String, OffsyncError> {
    if install {
        Ok(completion_install_instructions(shell))
    } else {
        generate_completions(shell)
    }
}
