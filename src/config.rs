//! # Store Configuration
//!
//! Sizing and checkpoint tuning for the counter matrix. The defaults match
//! the production deployment profile: up to 100k entities, a 128 MiB
//! initial data file grown in 64 MiB steps.

/// Bytes per counter cell.
pub const CELL_BYTES: u64 = 4;

/// Sizing parameters for a store.
///
/// `max_entities` fixes the per-metric stride of the data file and is agreed
/// for the lifetime of the store; changing it on an existing store would
/// require a full rewrite, which is not supported.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Hard ceiling on the dense entity id space.
    pub max_entities: u32,
    /// Initial length of the data file.
    pub initial_data_len: u64,
    /// Growth step for the data file; the file length is always a multiple
    /// of this.
    pub grow_quantum: u64,
    /// Persist the source freshness cache every N processed sources during
    /// a reconciliation pass.
    pub checkpoint_every: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_entities: 100_000,
            initial_data_len: 128 * 1024 * 1024,
            grow_quantum: 64 * 1024 * 1024,
            checkpoint_every: 100,
        }
    }
}

impl StoreConfig {
    /// Small-footprint profile for tests and tooling: tiny data file,
    /// aggressive checkpointing.
    pub fn compact() -> Self {
        Self {
            max_entities: 1024,
            initial_data_len: 64 * 1024,
            grow_quantum: 64 * 1024,
            checkpoint_every: 4,
        }
    }

    /// Byte stride of one metric row.
    pub fn stride_bytes(&self) -> u64 {
        self.max_entities as u64 * CELL_BYTES
    }
}
