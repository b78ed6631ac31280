//! Application-wide offline context.
//!
//! Built once at startup and passed to whatever needs the cache, the
//! connectivity monitor or the sync queue.

use std::sync::Arc;

use tracing::debug;

use crate::cache::DataCache;
use crate::config::{Config, Paths, StorageBackend};
use crate::error::OffsyncError;
use crate::network::ConnectivityMonitor;
use crate::storage::{Database, FileStore, KvStore, MemoryStore};
use crate::sync::{ExecutorRegistry, SyncQueue};

/// The three offline components wired around one durable store.
pub struct OfflineContext {
    /// Durable key-value cache
    pub cache: DataCache,
    /// Connectivity monitor shared with the queue
    pub monitor: ConnectivityMonitor,
    /// Deferred operation queue
    pub queue: SyncQueue,
}

impl OfflineContext {
    /// Open the store selected by `config` under `paths` and build the
    /// components on top of it.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory, the store or the persisted
    /// queue cannot be opened.
    pub fn open(
        config: &Config,
        paths: &Paths,
        registry: ExecutorRegistry,
        monitor: ConnectivityMonitor,
    ) -> Result<Self, OffsyncError> {
        paths.ensure_dirs()?;

        let store: Arc<dyn KvStore> = match config.storage.backend {
            StorageBackend::Sqlite => Arc::new(Database::open_at(&paths.database)?),
            StorageBackend::File => Arc::new(FileStore::new(paths.store.clone())?),
        };
        debug!(backend = ?config.storage.backend, root = %paths.root.display(), "store opened");

        Self::with_store(store, config, registry, monitor)
    }

    /// Build the components on an existing store.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted queue cannot be loaded.
    pub fn with_store(
        store: Arc<dyn KvStore>,
        config: &Config,
        registry: ExecutorRegistry,
        monitor: ConnectivityMonitor,
    ) -> Result<Self, OffsyncError> {
        let cache = DataCache::new(Arc::clone(&store), &config.cache.namespace)
            .with_default_ttl(config.cache.default_ttl());
        let queue = SyncQueue::open(
            store,
            &config.sync.namespace,
            registry,
            monitor.clone(),
            config.sync.queue_options(),
        )?;

        Ok(Self {
            cache,
            monitor,
            queue,
        })
    }

    /// A context backed by memory only, with default settings.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches [`OfflineContext::open`].
    pub fn in_memory(
        registry: ExecutorRegistry,
        monitor: ConnectivityMonitor,
    ) -> Result<Self, OffsyncError> {
        Self::with_store(
            Arc::new(MemoryStore::new()),
            &Config::default(),
            registry,
            monitor,
        )
    }

    /// Shut the queue down, then the monitor.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
        self.monitor.shutdown();
    }
}
