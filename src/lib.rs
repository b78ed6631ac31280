//! offsync - offline-first persistence for connected clients
//!
//! This crate provides a durable key-value cache with expiry, a connectivity
//! monitor that reports online/offline transitions, and a durable queue of
//! deferred operations that replays itself when the network comes back.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod network;
pub mod output;
pub mod storage;
pub mod sync;

pub use cache::{CacheEntry, DataCache};
pub use cli::args::{Cli, Commands, OutputFormat};
pub use context::OfflineContext;
pub use error::OffsyncError;
pub use network::{ConnectivityMonitor, ConnectivityState};
pub use sync::{ExecutorRegistry, SyncQueue};
