//! Connectivity tracking.
//!
//! A [`ConnectivitySource`] produces raw observations; the
//! [`ConnectivityMonitor`] turns them into a deduplicated online/offline
//! signal with transition listeners.

mod monitor;
mod probe;
mod source;

pub use monitor::{ConnectivityMonitor, Subscription};
pub use probe::TcpProbe;
pub use source::{ConnectivitySource, ConnectivityState, ManualSource, SourceCallback, Unsubscribe};
