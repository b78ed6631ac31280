//! Connectivity monitor: current state plus transition notifications.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, info};

use super::source::{ConnectivitySource, ConnectivityState, Unsubscribe};
use crate::error::OffsyncError;

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

/// Tracks online/offline and notifies listeners exactly on transitions.
///
/// Cloning yields another handle to the same monitor.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    state: Mutex<ConnectivityState>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
    // Held for the whole compare-and-notify step so deliveries never overlap.
    delivery: Mutex<()>,
    platform: Mutex<Option<Unsubscribe>>,
    shut_down: AtomicBool,
}

impl ConnectivityMonitor {
    /// Create a monitor fed through [`ConnectivityMonitor::report`].
    ///
    /// An unknown initial state (`None`) is treated as offline.
    #[must_use]
    pub fn new(initial: Option<bool>) -> Self {
        Self::from_state(ConnectivityState::new(initial.unwrap_or(false)))
    }

    fn from_state(state: ConnectivityState) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                state: Mutex::new(state),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                delivery: Mutex::new(()),
                platform: Mutex::new(None),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Create a monitor seeded from `source` and subscribed to it until
    /// [`ConnectivityMonitor::shutdown`].
    ///
    /// # Errors
    ///
    /// Returns an error if the source refuses the subscription.
    pub fn attach(source: &dyn ConnectivitySource) -> Result<Self, OffsyncError> {
        let monitor = Self::from_state(source.current_state().unwrap_or_default());

        let weak: Weak<MonitorInner> = Arc::downgrade(&monitor.inner);
        let unsubscribe = source.subscribe(Box::new(move |state| {
            if let Some(inner) = weak.upgrade() {
                Self { inner }.report(state);
            }
        }))?;

        *monitor.platform() = Some(unsubscribe);
        Ok(monitor)
    }

    /// Whether the network is currently considered reachable.
    #[must_use]
    pub fn current_state(&self) -> bool {
        self.state_lock().online
    }

    /// The full current state, including transport metadata.
    #[must_use]
    pub fn state(&self) -> ConnectivityState {
        self.state_lock().clone()
    }

    /// Apply an observation.
    ///
    /// Listeners run only if `online` differs from the current value. They
    /// run on the calling thread, one at a time, and must not call `report`
    /// themselves.
    pub fn report(&self, observed: ConnectivityState) {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return;
        }

        let _delivery = self
            .inner
            .delivery
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let online = observed.online;
        let changed = {
            let mut state = self.state_lock();
            let changed = state.online != online;
            *state = observed;
            changed
        };

        if !changed {
            return;
        }

        info!(online, "connectivity changed");

        let listeners: Vec<Listener> = self
            .listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            if self.inner.shut_down.load(Ordering::SeqCst) {
                break;
            }
            listener(online);
        }
    }

    /// Register a listener for transitions. The current state is not
    /// replayed; call [`ConnectivityMonitor::current_state`] for it.
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// dropped or unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners().push((id, Arc::new(listener)));

        Subscription {
            id,
            monitor: Arc::downgrade(&self.inner),
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }

    /// Release the platform subscription and stop all notifications.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(unsubscribe) = self.platform().take() {
            unsubscribe();
        }
        self.listeners().clear();
        debug!("connectivity monitor shut down");
    }

    /// Whether [`ConnectivityMonitor::shutdown`] has run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    fn state_lock(&self) -> MutexGuard<'_, ConnectivityState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<(u64, Listener)>> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn platform(&self) -> MutexGuard<'_, Option<Unsubscribe>> {
        self.inner
            .platform
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle returned by [`ConnectivityMonitor::subscribe`].
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    monitor: Weak<MonitorInner>,
}

impl Subscription {
    /// Remove the listener now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.monitor.upgrade() {
            inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}
