//! # Incremental Indexer
//!
//! Reconciles the counter matrix against external per-entity record
//! sources. Sources unchanged since the last pass are skipped via a
//! persisted modification-time cache; a failing source is logged and does
//! not abort the rest of the pass. At most one reconciliation runs at a
//! time, enforced by an atomic in-progress flag that is released on every
//! exit path.

use crate::model::{SourceInfo, StoreError};
use crate::Shared;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

const FRESHNESS_FILE: &str = "incremental.cache";

/// Enumerates the external record sources available for reconciliation.
pub trait SourceLister {
    fn list_sources(&self) -> Result<Vec<SourceInfo>, StoreError>;
}

/// Streams the counter triples of one record source.
///
/// The sink receives `(category, name, value)`; implementations report a
/// malformed source through the returned error, not through the sink.
pub trait SourceReader {
    fn for_each_counter(
        &self,
        source: &SourceInfo,
        f: &mut dyn FnMut(&str, &str, i64),
    ) -> Result<(), StoreError>;
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// False when the pass was a no-op because another was in flight.
    pub ran: bool,
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl ReconcileReport {
    fn already_running() -> Self {
        Self::default()
    }
}

/// Last-seen modification time per source, persisted as
/// `source=timestamp` lines and rewritten whole on checkpoint.
///
/// Monotonic: once a source is marked at time T it is skipped while its
/// modification time stays at or below T.
pub(crate) struct FreshnessCache {
    inner: Mutex<FreshnessInner>,
}

struct FreshnessInner {
    seen: HashMap<String, i64>,
    path: PathBuf,
}

impl FreshnessCache {
    pub(crate) fn open(dir: &Path) -> Result<Self, StoreError> {
        let path = dir.join(FRESHNESS_FILE);
        let mut seen = HashMap::new();
        if path.exists() {
            for line in BufReader::new(File::open(&path)?).lines() {
                let line = line?;
                let Some((name, stamp)) = line.split_once('=') else {
                    continue;
                };
                match stamp.parse::<i64>() {
                    Ok(stamp) => {
                        seen.insert(name.to_string(), stamp);
                    }
                    Err(_) => warn!(%line, "skipping malformed freshness entry"),
                }
            }
        }
        Ok(Self {
            inner: Mutex::new(FreshnessInner { seen, path }),
        })
    }

    fn is_fresh(&self, source: &str, modified_ms: i64) -> bool {
        self.inner
            .lock()
            .seen
            .get(source)
            .is_some_and(|&seen| seen >= modified_ms)
    }

    fn mark(&self, source: &str, modified_ms: i64) {
        self.inner.lock().seen.insert(source.to_string(), modified_ms);
    }

    pub(crate) fn checkpoint(&self) -> Result<(), StoreError> {
        let inner = self.inner.lock();
        let mut file = File::create(&inner.path)?;
        for (source, stamp) in &inner.seen {
            writeln!(file, "{source}={stamp}")?;
        }
        Ok(())
    }
}

/// Clears the in-progress flag on every exit path, normal or panicking.
struct SyncGuard<'a>(&'a AtomicBool);

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Run one reconciliation pass, or no-op if one is already in flight.
pub(crate) fn reconcile(
    shared: &Shared,
    lister: &dyn SourceLister,
    reader: &dyn SourceReader,
) -> ReconcileReport {
    if shared
        .syncing
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        debug!("reconciliation already in flight");
        return ReconcileReport::already_running();
    }
    let _guard = SyncGuard(&shared.syncing);
    run_pass(shared, lister, reader)
}

fn run_pass(
    shared: &Shared,
    lister: &dyn SourceLister,
    reader: &dyn SourceReader,
) -> ReconcileReport {
    let mut report = ReconcileReport {
        ran: true,
        ..Default::default()
    };
    info!("starting incremental counter reconciliation");

    let sources = match lister.list_sources() {
        Ok(sources) => sources,
        Err(err) => {
            error!(error = %err, "failed to enumerate record sources");
            return report;
        }
    };

    for source in &sources {
        if shared.freshness.is_fresh(&source.name, source.modified_ms) {
            report.skipped += 1;
            continue;
        }
        match index_source(shared, reader, source) {
            Ok(()) => {
                // Mark with the time observed at enumeration, so a source
                // touched mid-pass is re-scanned next run.
                shared.freshness.mark(&source.name, source.modified_ms);
                report.processed += 1;
                if report.processed % shared.config.checkpoint_every == 0 {
                    if let Err(err) = shared.freshness.checkpoint() {
                        warn!(error = %err, "freshness checkpoint failed");
                    }
                }
            }
            Err(err) => {
                warn!(source = %source.name, error = %err, "failed to index record source");
                report.failed += 1;
            }
        }
    }

    if let Err(err) = shared.freshness.checkpoint() {
        warn!(error = %err, "final freshness checkpoint failed");
    }
    info!(
        processed = report.processed,
        skipped = report.skipped,
        failed = report.failed,
        "reconciliation pass complete"
    );
    report
}

/// Index one source: full-overwrite of the entity's current totals.
fn index_source(
    shared: &Shared,
    reader: &dyn SourceReader,
    source: &SourceInfo,
) -> Result<(), StoreError> {
    let entity = shared.registry.get_or_create_entity(source.entity)?;
    let mut sink_err: Option<StoreError> = None;
    reader.for_each_counter(source, &mut |category, name, value| {
        if sink_err.is_some() || value <= 0 {
            // Zero is equivalent to absent: unset cells already read as 0.
            return;
        }
        let value = value.min(i32::MAX as i64) as i32;
        let key = format!("{category}/{name}");
        let outcome = shared
            .registry
            .get_or_create_metric(&key)
            .and_then(|metric| shared.matrix.write(metric, entity, value));
        if let Err(err) = outcome {
            sink_err = Some(err);
        }
    })?;
    match sink_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
