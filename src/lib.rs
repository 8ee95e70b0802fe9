//! # Statdex
//!
//! An embedded storage engine for sparse, append-mostly numeric counters
//! keyed by (entity, metric) pairs, built to answer two query shapes on a
//! latency-sensitive host: point lookup of a single counter and top-K
//! ranking across all entities for a metric.
//!
//! Opaque entity UUIDs and metric key strings are mapped to dense integer
//! ids by append-logged registries; counter values live in a fixed-stride
//! memory-mapped matrix file addressed by those ids. A background indexer
//! incrementally reconciles the matrix against per-entity record files,
//! skipping sources unchanged since the last pass. Leaderboard queries
//! merge the persisted matrix with live override values supplied by the
//! caller.

pub mod config;
pub mod indexer;
pub mod matrix;
pub mod model;
pub mod query;
pub mod registry;
pub mod sources;

// Re-export main types for convenience
pub use config::StoreConfig;
pub use indexer::{ReconcileReport, SourceLister, SourceReader};
pub use matrix::MatrixStore;
pub use model::{EntityId, LeaderboardRow, MetricId, MetricKey, SourceInfo, StoreError};
pub use registry::{IdRegistry, NameCache};
pub use sources::FsStatSources;

use indexer::FreshnessCache;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use uuid::Uuid;

const DATA_FILE: &str = "data.bin";

/// Everything the query path and the background indexer share.
pub(crate) struct Shared {
    pub(crate) config: StoreConfig,
    pub(crate) registry: IdRegistry,
    pub(crate) names: NameCache,
    pub(crate) matrix: MatrixStore,
    pub(crate) freshness: FreshnessCache,
    /// Single-flight flag for reconciliation passes.
    pub(crate) syncing: AtomicBool,
}

impl Shared {
    pub(crate) fn open(dir: &Path, config: StoreConfig) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let registry = IdRegistry::open(dir, config.max_entities)?;
        let names = NameCache::open(dir)?;
        let freshness = FreshnessCache::open(dir)?;
        let matrix = MatrixStore::open(&dir.join(DATA_FILE), &config)?;
        Ok(Self {
            config,
            registry,
            names,
            matrix,
            freshness,
            syncing: AtomicBool::new(false),
        })
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let _ = self.matrix.flush();
    }
}

/// The store facade: one instance per installation directory, owned by the
/// host's startup/shutdown hooks and passed by reference into every call.
///
/// Queries run on the caller's thread in microseconds; reconciliation runs
/// on a background thread and never blocks them.
pub struct Statdex {
    inner: Arc<Shared>,
}

impl Statdex {
    /// Open or create a store rooted at `dir`.
    ///
    /// Loads both id registries, the name cache, and the freshness cache
    /// into memory and maps the data file. An initialization failure
    /// surfaces here; there is no degraded half-open state.
    pub fn open(dir: impl AsRef<Path>, config: StoreConfig) -> Result<Self, StoreError> {
        Ok(Self {
            inner: Arc::new(Shared::open(dir.as_ref(), config)?),
        })
    }

    /// Point lookup: current value of one counter, 0 if never recorded.
    pub fn stat(&self, entity: Uuid, key: &MetricKey) -> i32 {
        query::stat_of(&self.inner.registry, &self.inner.matrix, entity, key)
    }

    /// One page of the leaderboard for `key`, merged with live overrides.
    /// See [`query::top`] for ordering and pagination semantics.
    pub fn top(
        &self,
        key: &MetricKey,
        page: usize,
        page_size: usize,
        overrides: &HashMap<Uuid, i32>,
    ) -> Vec<LeaderboardRow> {
        query::top(
            &self.inner.registry,
            &self.inner.matrix,
            key,
            page,
            page_size,
            overrides,
        )
    }

    /// Persist a single live value immediately, assigning dense ids as
    /// needed, without waiting for the next reconciliation pass. Used on
    /// an entity's session end.
    pub fn record(&self, entity: Uuid, key: &MetricKey, value: i32) -> Result<(), StoreError> {
        let entity = self.inner.registry.get_or_create_entity(entity)?;
        let metric = self.inner.registry.get_or_create_metric(key.as_str())?;
        self.inner.matrix.write(metric, entity, value)
    }

    /// Remember the latest display name observed for an entity.
    pub fn cache_name(&self, entity: Uuid, name: &str) -> Result<(), StoreError> {
        self.inner.names.cache_name(entity, name)
    }

    /// Last-known display name, if any was ever cached.
    pub fn name_of(&self, entity: Uuid) -> Option<String> {
        self.inner.names.name_of(entity)
    }

    /// Kick off a reconciliation pass on a background thread and return
    /// immediately. If a pass is already in flight the new one is a no-op.
    ///
    /// The pass is not joined at shutdown; it only performs idempotent
    /// overwrites, so letting it finish against a closed facade is safe.
    pub fn sync_all<L, R>(&self, lister: L, reader: R) -> Result<(), StoreError>
    where
        L: SourceLister + Send + 'static,
        R: SourceReader + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        std::thread::Builder::new()
            .name("statdex-sync".into())
            .spawn(move || {
                indexer::reconcile(&inner, &lister, &reader);
            })?;
        Ok(())
    }

    /// Run a reconciliation pass on the calling thread and return its
    /// report. Intended for embedders and tests that need completion.
    pub fn reconcile_blocking(
        &self,
        lister: &dyn SourceLister,
        reader: &dyn SourceReader,
    ) -> ReconcileReport {
        indexer::reconcile(&self.inner, lister, reader)
    }

    /// Flush the matrix and the freshness bookkeeping to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.inner.matrix.flush()?;
        self.inner.freshness.checkpoint()
    }

    /// Flush and release the store. A reconciliation pass still running
    /// keeps the backing files alive until it completes.
    pub fn close(self) -> Result<(), StoreError> {
        self.flush()
    }
}
