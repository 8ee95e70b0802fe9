//! # Matrix Store
//!
//! A growable memory-mapped matrix of 32-bit counters with a fixed
//! per-metric stride. Cell addressing is
//! `(metric_id * max_entities + entity_id) * 4` bytes, so a metric row can
//! hold every entity the store will ever admit without rewriting the file.
//!
//! Values are stored little-endian, and that layout is stable across
//! restarts of the same store. All cell access goes through 4-byte-aligned
//! atomics, so a reconciliation write racing a query read observes either
//! the old or the new value, never a torn one.

use crate::config::{StoreConfig, CELL_BYTES};
use crate::model::{EntityId, MetricId, StoreError};
use memmap2::MmapMut;
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::debug;

struct Mapping {
    file: File,
    map: MmapMut,
    len: u64,
}

impl Mapping {
    fn cell(&self, offset: u64) -> &AtomicI32 {
        debug_assert!(offset + CELL_BYTES <= self.len);
        debug_assert_eq!(offset % CELL_BYTES, 0);
        // Offsets are 4-byte multiples into a page-aligned mapping, so the
        // cast target is properly aligned.
        unsafe { &*(self.map.as_ptr().add(offset as usize) as *const AtomicI32) }
    }

    fn load(&self, offset: u64) -> i32 {
        i32::from_le(self.cell(offset).load(Ordering::Relaxed))
    }

    fn store(&self, offset: u64, value: i32) {
        self.cell(offset).store(value.to_le(), Ordering::Relaxed);
    }
}

/// Fixed-stride counter matrix backed by a memory-mapped file.
///
/// Plain reads and writes of disjoint aligned cells proceed under a shared
/// lock; growing the file replaces the mapping wholesale and therefore
/// takes the lock exclusively.
pub struct MatrixStore {
    mapping: RwLock<Mapping>,
    stride: u64,
    grow_quantum: u64,
}

impl MatrixStore {
    /// Open or create the data file and map it.
    ///
    /// The mapped length is the larger of the existing file and the
    /// configured initial size, rounded up to the growth quantum. Existing
    /// bytes are never truncated.
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let existing = file.metadata()?.len();
        let len = round_up(existing.max(config.initial_data_len), config.grow_quantum);
        if len != existing {
            file.set_len(len)?;
        }
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            mapping: RwLock::new(Mapping { file, map, len }),
            stride: config.stride_bytes(),
            grow_quantum: config.grow_quantum,
        })
    }

    fn offset_of(&self, metric: MetricId, entity: EntityId) -> u64 {
        metric.0 as u64 * self.stride + entity.0 as u64 * CELL_BYTES
    }

    /// Write one counter cell, growing the file first if the cell lies
    /// beyond the current mapping.
    pub fn write(&self, metric: MetricId, entity: EntityId, value: i32) -> Result<(), StoreError> {
        let offset = self.offset_of(metric, entity);
        let end = offset + CELL_BYTES;
        {
            let mapping = self.mapping.read();
            if end <= mapping.len {
                mapping.store(offset, value);
                return Ok(());
            }
        }
        let mut mapping = self.mapping.write();
        if end > mapping.len {
            self.grow(&mut mapping, end)?;
        }
        mapping.store(offset, value);
        Ok(())
    }

    /// Extend the file and replace the mapping. Must hold the write lock.
    ///
    /// If remapping fails the previous mapping stays installed; the file is
    /// only ever extended, so prior bytes remain durable either way.
    fn grow(&self, mapping: &mut Mapping, required: u64) -> Result<(), StoreError> {
        let new_len = round_up(required + self.grow_quantum, self.grow_quantum);
        mapping.map.flush()?;
        mapping.file.set_len(new_len)?;
        mapping.map = unsafe { MmapMut::map_mut(&mapping.file)? };
        mapping.len = new_len;
        debug!(new_len, "grew counter matrix");
        Ok(())
    }

    /// Read one counter cell. A cell beyond the current mapping reads as 0:
    /// the metric was never recorded for that entity.
    pub fn read(&self, metric: MetricId, entity: EntityId) -> i32 {
        let offset = self.offset_of(metric, entity);
        let mapping = self.mapping.read();
        if offset + CELL_BYTES > mapping.len {
            return 0;
        }
        mapping.load(offset)
    }

    /// Visit every positive cell of one metric row across the first
    /// `entity_count` dense entity ids.
    ///
    /// A linear scan: per-query cost is one aligned read per known entity,
    /// which keeps writes O(1) and avoids any per-metric secondary index.
    pub fn for_each_in_metric(
        &self,
        metric: MetricId,
        entity_count: u32,
        mut f: impl FnMut(EntityId, i32),
    ) {
        let mapping = self.mapping.read();
        let base = metric.0 as u64 * self.stride;
        for id in 0..entity_count {
            let offset = base + id as u64 * CELL_BYTES;
            if offset + CELL_BYTES > mapping.len {
                break;
            }
            let value = mapping.load(offset);
            if value > 0 {
                f(EntityId(id), value);
            }
        }
    }

    /// Flush dirty pages to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.mapping.read().map.flush()?;
        Ok(())
    }

    /// Current mapped length in bytes.
    pub fn data_len(&self) -> u64 {
        self.mapping.read().len
    }
}

fn round_up(n: u64, quantum: u64) -> u64 {
    n.div_ceil(quantum) * quantum
}
