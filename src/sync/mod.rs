//! Sync queue for deferred operations.
//!
//! Mutations that need the network are queued as tagged commands, persisted
//! durably, and replayed when connectivity returns.
//!
//! Features:
//! - Typed commands resolved to executors at drain time
//! - Bounded retries with an optional hook for dropped operations
//! - Single-flight drain passes with cancellation

mod executor;
mod operation;
mod queue;

pub use executor::{ExecutorRegistry, HttpExecutor, HttpRequest, OperationExecutor};
pub use operation::{Command, QueuedOperation};
pub use queue::{CancelSignal, DrainReport, DrainStatus, QueueOptions, QueueStats, SyncQueue};
