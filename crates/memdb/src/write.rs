/// Write path: `WritePoint` and `MemDb::write()`.
///
/// A write resolves (or creates) the series store, then the field store, and
/// hands the sample to the segment store of its family under the field lock.
/// The returned memory delta feeds the memdb-wide counter.
///
/// Locks are taken in one order everywhere: series map entry, series store,
/// field store.
use anyhow::{Context, Result};
use block::{AggFunc, AggType, FieldValue};
use std::sync::Arc;

use crate::segment::WriteContext;
use crate::{lock, FieldId, MemDb, SeriesId, SeriesStore};

/// One sample addressed to a series, field and slot.
#[derive(Clone)]
pub struct WritePoint {
    pub series_id: SeriesId,
    pub field_id: FieldId,
    /// Coarse time bucket the slot is relative to.
    pub family_time: i64,
    pub slot: u32,
    pub value: FieldValue,
    /// Used only when the field is created by this write.
    pub agg_func: Arc<dyn AggFunc>,
}

impl std::fmt::Debug for WritePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritePoint")
            .field("series_id", &self.series_id)
            .field("field_id", &self.field_id)
            .field("family_time", &self.family_time)
            .field("slot", &self.slot)
            .field("value", &self.value)
            .field("agg_type", &self.agg_func.agg_type())
            .finish()
    }
}

impl WritePoint {
    pub fn new(
        series_id: SeriesId,
        field_id: FieldId,
        family_time: i64,
        slot: u32,
        value: FieldValue,
        agg_type: AggType,
    ) -> Self {
        Self {
            series_id,
            field_id,
            family_time,
            slot,
            value,
            agg_func: Arc::new(agg_type),
        }
    }
}

impl MemDb {
    /// Buffers one sample. Returns the change of the memory counter.
    ///
    /// Fails when the sample's value type differs from what the field already
    /// holds. Compaction failures caused by a window rollover are logged by
    /// the segment store and do not fail the write.
    ///
    /// The series entry stays read-locked for the whole write, so a flush or
    /// an eviction cannot drop the series while a sample is landing in it.
    pub fn write(&self, point: &WritePoint) -> Result<isize> {
        loop {
            if let Some(series) = self.series.get(&point.series_id) {
                return self.write_series(series.value(), point);
            }
            // the entry may be dropped again before the next lookup
            self.series
                .entry(point.series_id)
                .or_insert_with(|| Arc::new(SeriesStore::new()));
        }
    }

    fn write_series(&self, series: &SeriesStore, point: &WritePoint) -> Result<isize> {
        let field = series.get_or_create_field(point.field_id, point.agg_func.clone());

        let ctx = WriteContext {
            pool: &self.pool,
            slot: point.slot,
        };
        let mut field = lock(&field);
        let delta = field
            .write(point.family_time, point.value, &ctx)
            .with_context(|| {
                format!(
                    "write to series {} field {} family {} slot {}",
                    point.series_id, point.field_id, point.family_time, point.slot
                )
            })?;

        // counted before a flush can detach the segment
        self.add_mem(delta);
        Ok(delta)
    }
}
