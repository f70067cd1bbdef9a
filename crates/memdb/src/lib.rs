//! # MemDb - RiptideTS in-memory write buffer
//!
//! Buffers recent samples per series and field in fixed-size slot blocks,
//! folds duplicate writes through the field's aggregation function, and
//! compacts closed windows into the `TSB1` block encoding until a flush
//! hands them to persistent storage.
//!
//! ## Layout
//!
//! ```text
//! MemDb
//!   |  DashMap<SeriesId, Arc<SeriesStore>>
//!   v
//! ┌──────────────────────────────────────────────┐
//! │ SeriesStore                                  │
//! │   RwLock<HashMap<FieldId, Arc<Mutex<..>>>>   │
//! │        |                                     │
//! │        v                                     │
//! │   FieldStore                                 │
//! │     BTreeMap<family_time, SegmentStore>      │
//! │        |                                     │
//! │        v                                     │
//! │   SegmentStore                               │
//! │     current Block  (live slots + compacted)  │
//! │     sealed windows (compacted bytes)         │
//! └──────────────────────────────────────────────┘
//!          ^                      |
//!          | allocate             | release (flush / evict)
//!          └────── BlockPool <────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module        | Purpose                                                |
//! |---------------|--------------------------------------------------------|
//! | [`lib.rs`]    | `MemDb` struct, constructor, accessors, `Debug`        |
//! | [`segment`]   | `SegmentStore`: window placement, rollup, compaction   |
//! | [`field`]     | `FieldStore`: segment stores of one field by family    |
//! | [`series`]    | `SeriesStore`: field map of one series                 |
//! | [`scan`]      | scan collaborators and the per-series scan             |
//! | [`write`]     | `WritePoint`, `MemDb::write()`                         |
//! | [`flush`]     | `flush_family()`, `evict_series()`                     |
//!
//! ## Memory accounting
//!
//! Every write returns the change of the touched segment store's
//! `mem_size()`. `MemDb` sums those deltas into one counter; flush and
//! eviction subtract what they remove. A write adds its delta before it
//! releases the field lock, so a flush never subtracts bytes that were not
//! yet counted. [`MemDb::is_full`] compares the counter with the configured
//! flush threshold.
mod error;
pub mod field;
mod flush;
pub mod scan;
pub mod segment;
pub mod series;
mod write;

use anyhow::{Context, Result};
use block::{BlockPool, PoolStats};
use config::MemDbConfig;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use error::StoreError;
pub use field::FieldStore;
pub use flush::FlushedSegment;
pub use scan::{FieldMeta, ScanContext, ScanWorker, SeriesAggregator, Version};
pub use segment::{FieldSegment, SegmentBytes, SegmentStore, WriteContext, EMPTY_SEGMENT_STORE_SIZE};
pub use series::SeriesStore;
pub use write::WritePoint;

/// Identifier of a time series.
pub type SeriesId = u32;
/// Identifier of a field within a metric.
pub type FieldId = u16;

/// Locks a mutex, recovering the data of a poisoned one.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory store of every series written since the last flush.
pub struct MemDb {
    pub(crate) config: MemDbConfig,
    pub(crate) pool: BlockPool,
    pub(crate) series: DashMap<SeriesId, Arc<SeriesStore>>,
    /// Sum of the segment store sizes, maintained from write deltas.
    pub(crate) mem_size: AtomicUsize,
}

impl std::fmt::Debug for MemDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemDb")
            .field("time_window", &self.config.time_window)
            .field("flush_threshold", &self.config.flush_threshold)
            .field("series_count", &self.series.len())
            .field("mem_size", &self.mem_size())
            .field("pool", &self.pool.stats())
            .finish()
    }
}

impl MemDb {
    /// Creates an empty memdb after validating `config`.
    pub fn new(config: MemDbConfig) -> Result<Self> {
        config.validate().context("invalid memdb config")?;
        let pool = BlockPool::new(config.time_window, config.pool_max_free);
        Ok(Self {
            config,
            pool,
            series: DashMap::new(),
            mem_size: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn config(&self) -> &MemDbConfig {
        &self.config
    }

    #[must_use]
    pub fn pool(&self) -> &BlockPool {
        &self.pool
    }

    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Approximate bytes held by all segment stores.
    #[must_use]
    pub fn mem_size(&self) -> usize {
        self.mem_size.load(Ordering::Acquire)
    }

    /// `true` once the memory counter reaches the flush threshold.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.mem_size() >= self.config.flush_threshold
    }

    #[must_use]
    pub fn series(&self, series_id: SeriesId) -> Option<Arc<SeriesStore>> {
        self.series.get(&series_id).map(|s| s.value().clone())
    }

    #[must_use]
    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Series ids currently buffered, ascending.
    #[must_use]
    pub fn series_ids(&self) -> Vec<SeriesId> {
        let mut ids: Vec<SeriesId> = self.series.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Scans `series_ids` in order. Series with no store are reported
    /// complete without any field dispatch.
    pub fn scan(
        &self,
        ctx: &ScanContext,
        version: Version,
        series_ids: &[SeriesId],
        field_metas: &HashMap<FieldId, FieldMeta>,
    ) {
        for series_id in series_ids {
            match self.series(*series_id) {
                Some(store) => store.scan(ctx, version, *series_id, field_metas),
                None => ctx.worker().complete(*series_id),
            }
        }
    }

    pub(crate) fn add_mem(&self, delta: isize) {
        if delta >= 0 {
            self.mem_size.fetch_add(delta as usize, Ordering::AcqRel);
        } else {
            self.sub_mem(delta.unsigned_abs());
        }
    }

    pub(crate) fn sub_mem(&self, bytes: usize) {
        // saturating, the counter never wraps
        let _ = self
            .mem_size
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                Some(cur.saturating_sub(bytes))
            });
    }
}

#[cfg(test)]
mod tests;
