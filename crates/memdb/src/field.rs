//! Field store: every family of one field of one series.

use block::{AggFunc, AggType, FieldValue, ValueType};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::StoreError;
use crate::scan::{FieldMeta, ScanContext, SeriesAggregator};
use crate::segment::{FieldSegment, SegmentScan, SegmentStore, WriteContext, EMPTY_SEGMENT_STORE_SIZE};
use crate::FieldId;

/// Segment stores of a single field, keyed by family time.
///
/// The aggregation function is fixed when the field is created and shared
/// by all of its segment stores. The value type is pinned by the first
/// successful write and holds across every family, flushed ones included.
pub struct FieldStore {
    field_id: FieldId,
    agg_func: Arc<dyn AggFunc>,
    value_type: Option<ValueType>,
    segments: BTreeMap<i64, SegmentStore>,
}

impl std::fmt::Debug for FieldStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldStore")
            .field("field_id", &self.field_id)
            .field("agg_type", &self.agg_func.agg_type())
            .field("value_type", &self.value_type)
            .field("families", &self.segments.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FieldStore {
    pub fn new(field_id: FieldId, agg_func: Arc<dyn AggFunc>) -> Self {
        Self {
            field_id,
            agg_func,
            value_type: None,
            segments: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn field_id(&self) -> FieldId {
        self.field_id
    }

    #[must_use]
    pub fn agg_type(&self) -> AggType {
        self.agg_func.agg_type()
    }

    /// Value type of the field, `None` before the first write.
    #[must_use]
    pub fn value_type(&self) -> Option<ValueType> {
        self.value_type
    }

    /// Scan metadata as the buffered data describes it.
    #[must_use]
    pub fn meta(&self) -> Option<FieldMeta> {
        Some(FieldMeta {
            field_id: self.field_id,
            value_type: self.value_type?,
            agg_type: self.agg_type(),
        })
    }

    /// Writes `value` into the segment store of `family_time`, creating it on
    /// first use. Returns the memory delta, creation overhead included.
    ///
    /// A value of the other type than the field holds is rejected before
    /// anything is created.
    pub fn write(
        &mut self,
        family_time: i64,
        value: FieldValue,
        ctx: &WriteContext<'_>,
    ) -> Result<isize, StoreError> {
        let actual = value.value_type();
        match self.value_type {
            Some(expected) if expected != actual => {
                return Err(StoreError::ValueTypeMismatch { expected, actual })
            }
            _ => {}
        }

        let mut created = 0;
        let segment = self.segments.entry(family_time).or_insert_with(|| {
            created = EMPTY_SEGMENT_STORE_SIZE as isize;
            SegmentStore::new(family_time, self.agg_func.clone())
        });

        let delta = match value {
            FieldValue::Int(v) => segment.write_int(v, ctx)?,
            FieldValue::Float(v) => segment.write_float(v, ctx)?,
        };
        self.value_type = Some(actual);
        Ok(created + delta)
    }

    #[must_use]
    pub fn segment(&self, family_time: i64) -> Option<&SegmentStore> {
        self.segments.get(&family_time)
    }

    pub fn segment_mut(&mut self, family_time: i64) -> Option<&mut SegmentStore> {
        self.segments.get_mut(&family_time)
    }

    /// Family times with a segment store, ascending.
    #[must_use]
    pub fn families(&self) -> Vec<i64> {
        self.segments.keys().copied().collect()
    }

    /// Removes and returns the segment store of `family_time`.
    pub fn take_segment(&mut self, family_time: i64) -> Option<SegmentStore> {
        self.segments.remove(&family_time)
    }

    /// Removes every segment store.
    pub fn drain_segments(&mut self) -> Vec<SegmentStore> {
        std::mem::take(&mut self.segments).into_values().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    #[must_use]
    pub fn mem_size(&self) -> usize {
        self.segments.values().map(FieldSegment::mem_size).sum()
    }

    /// Scans every family, oldest first.
    pub(crate) fn scan(&self, agg: &mut dyn SeriesAggregator, ctx: &ScanContext) {
        for segment in self.segments.values() {
            segment.scan(agg, ctx);
        }
    }
}
