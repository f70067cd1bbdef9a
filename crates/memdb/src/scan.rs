//! Scan path: the collaborators a query hands in, and the per-series fan-out.
//!
//! A query builds a [`ScanContext`] naming the fields it wants and the
//! [`ScanWorker`] that receives the output. For each series, the scan looks
//! up every requested field under the series lock (lookup only), runs the
//! field's scan into a [`SeriesAggregator`] obtained from the worker, and
//! finally reports the series as complete, even when no field matched.

use block::{AggType, FieldValue, SlotRange, ValueType};
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{lock, FieldId, SeriesId, SeriesStore};

/// Snapshot version a query runs against.
pub type Version = u64;

/// Query-side description of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMeta {
    pub field_id: FieldId,
    pub value_type: ValueType,
    pub agg_type: AggType,
}

/// Sink receiving the raw values of one field of one series.
pub trait SeriesAggregator: Send {
    fn aggregate(&mut self, family_time: i64, slot: u32, value: FieldValue);
}

/// Query-side worker driving a scan.
pub trait ScanWorker: Send + Sync {
    /// Returns the sink for `field` of `series_id`, or `None` to skip it.
    fn series_aggregator(
        &self,
        version: Version,
        series_id: SeriesId,
        field: &FieldMeta,
    ) -> Option<Box<dyn SeriesAggregator>>;

    /// Called once per scanned series after all of its fields were dispatched.
    fn complete(&self, series_id: SeriesId);
}

/// Everything a scan needs from the query that issued it.
#[derive(Clone)]
pub struct ScanContext {
    field_ids: Vec<FieldId>,
    worker: Arc<dyn ScanWorker>,
    slot_range: Option<SlotRange>,
    cancelled: Arc<AtomicBool>,
}

impl std::fmt::Debug for ScanContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanContext")
            .field("field_ids", &self.field_ids)
            .field("slot_range", &self.slot_range)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl ScanContext {
    pub fn new(field_ids: Vec<FieldId>, worker: Arc<dyn ScanWorker>) -> Self {
        Self {
            field_ids,
            worker,
            slot_range: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Restricts emitted values to slots inside `range`.
    #[must_use]
    pub fn with_slot_range(mut self, range: SlotRange) -> Self {
        self.slot_range = Some(range);
        self
    }

    #[must_use]
    pub fn field_ids(&self) -> &[FieldId] {
        &self.field_ids
    }

    #[must_use]
    pub fn worker(&self) -> &Arc<dyn ScanWorker> {
        &self.worker
    }

    #[must_use]
    pub fn slot_range(&self) -> Option<SlotRange> {
        self.slot_range
    }

    /// Flag shared with the caller; setting it stops further field scans.
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl SeriesStore {
    /// Scans the requested fields of this series into the context's worker.
    ///
    /// Fields are visited in the order the context lists them. Missing fields
    /// are skipped. A field absent from `field_metas` is scanned with the
    /// value type and aggregation its store holds. Cancellation is checked
    /// before each field. [`ScanWorker::complete`] is always called exactly once.
    pub fn scan(
        &self,
        ctx: &ScanContext,
        version: Version,
        series_id: SeriesId,
        field_metas: &HashMap<FieldId, FieldMeta>,
    ) {
        let worker = ctx.worker();
        for field_id in ctx.field_ids() {
            if ctx.is_cancelled() {
                debug!("scan of series {} cancelled", series_id);
                break;
            }

            // the series lock is held for the lookup only
            let store = match self.field(*field_id) {
                Some(store) => store,
                None => continue,
            };
            let store = lock(&store);
            let meta = match field_metas.get(field_id) {
                Some(meta) => meta.clone(),
                None => match store.meta() {
                    Some(meta) => {
                        debug!(
                            "no metadata for field {} of series {}, using the buffered one",
                            field_id, series_id
                        );
                        meta
                    }
                    // never written, nothing buffered
                    None => continue,
                },
            };
            if let Some(mut agg) = worker.series_aggregator(version, series_id, &meta) {
                store.scan(agg.as_mut(), ctx);
            }
        }

        // notify the worker that this series is done
        worker.complete(series_id);
    }
}
