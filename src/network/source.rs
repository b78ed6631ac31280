//! Connectivity source boundary.
//!
//! A source reports raw reachability observations. It may repeat the same
//! state on every poll; deduplication is the monitor's job.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::OffsyncError;

/// A reachability observation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectivityState {
    /// Whether the network is reachable
    pub online: bool,
    /// Opaque transport description (e.g. "tcp:1.1.1.1:443")
    pub transport: Option<String>,
}

impl ConnectivityState {
    /// A state with no transport metadata.
    #[must_use]
    pub const fn new(online: bool) -> Self {
        Self {
            online,
            transport: None,
        }
    }
}

/// Callback a source invokes with each observation.
pub type SourceCallback = Box<dyn Fn(ConnectivityState) + Send + Sync>;

/// Releases a source subscription when called.
pub type Unsubscribe = Box<dyn FnOnce() + Send>;

/// A platform primitive that reports reachability.
pub trait ConnectivitySource: Send + Sync {
    /// The last known state, or `None` when unknown.
    fn current_state(&self) -> Option<ConnectivityState>;

    /// Start delivering observations to `callback`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot start observing.
    fn subscribe(&self, callback: SourceCallback) -> Result<Unsubscribe, OffsyncError>;
}

type SharedCallbacks = Arc<Mutex<Vec<(u64, Arc<dyn Fn(ConnectivityState) + Send + Sync>)>>>;

/// A source driven by hand. Every [`ManualSource::set`] is forwarded to
/// subscribers, repeats included, like a chatty platform API would.
#[derive(Clone, Default)]
pub struct ManualSource {
    state: Arc<Mutex<Option<ConnectivityState>>>,
    callbacks: SharedCallbacks,
    next_id: Arc<AtomicU64>,
}

impl ManualSource {
    /// A source whose state is unknown.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A source that starts in a known state.
    #[must_use]
    pub fn with_state(online: bool) -> Self {
        let source = Self::default();
        *source.state.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(ConnectivityState::new(online));
        source
    }

    /// Record an observation and deliver it to every subscriber.
    pub fn set(&self, online: bool) {
        let state = ConnectivityState::new(online);
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = Some(state.clone());

        let callbacks: Vec<_> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(state.clone());
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ConnectivitySource for ManualSource {
    fn current_state(&self) -> Option<ConnectivityState> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn subscribe(&self, callback: SourceCallback) -> Result<Unsubscribe, OffsyncError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::from(callback)));

        let callbacks = Arc::clone(&self.callbacks);
        Ok(Box::new(move || {
            callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(existing, _)| *existing != id);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_manual_source_forwards_repeats() {
        let source = ManualSource::new();
        assert_eq!(source.current_state(), None);

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let unsubscribe = source
            .subscribe(Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        source.set(true);
        source.set(true);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(source.current_state(), Some(ConnectivityState::new(true)));

        unsubscribe();
        assert_eq!(source.subscriber_count(), 0);
        source.set(false);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
