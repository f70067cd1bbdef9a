//! Series store: the field map of one series.

use block::AggFunc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::field::FieldStore;
use crate::segment::SegmentStore;
use crate::{lock, FieldId};

/// Maps field ids to field stores.
///
/// The read-write lock guards only the map itself. Writes and scans go
/// through the per-field mutex, so a lookup never waits on a scan in
/// progress on another field.
#[derive(Debug, Default)]
pub struct SeriesStore {
    fields: RwLock<HashMap<FieldId, Arc<Mutex<FieldStore>>>>,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<FieldId, Arc<Mutex<FieldStore>>>> {
        self.fields.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<FieldId, Arc<Mutex<FieldStore>>>> {
        self.fields.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up a field store.
    #[must_use]
    pub fn field(&self, field_id: FieldId) -> Option<Arc<Mutex<FieldStore>>> {
        self.read().get(&field_id).cloned()
    }

    /// Returns the field store for `field_id`, creating it with `agg_func` if
    /// the field has never been written. An existing store keeps its own
    /// aggregation function.
    pub fn get_or_create_field(
        &self,
        field_id: FieldId,
        agg_func: Arc<dyn AggFunc>,
    ) -> Arc<Mutex<FieldStore>> {
        if let Some(store) = self.field(field_id) {
            return store;
        }
        self.write()
            .entry(field_id)
            .or_insert_with(|| Arc::new(Mutex::new(FieldStore::new(field_id, agg_func))))
            .clone()
    }

    /// Field ids with a store, ascending.
    #[must_use]
    pub fn field_ids(&self) -> Vec<FieldId> {
        let mut ids: Vec<FieldId> = self.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn field_count(&self) -> usize {
        self.read().len()
    }

    /// True when no field buffers any family.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().values().all(|f| lock(f).is_empty())
    }

    #[must_use]
    pub fn mem_size(&self) -> usize {
        self.read().values().map(|f| lock(f).mem_size()).sum()
    }

    /// Detaches the segment stores of `family_time` from every field.
    ///
    /// Field stores stay in the map even when left empty: a writer may hold
    /// one already, and its value type stays pinned.
    pub fn take_family(&self, family_time: i64) -> Vec<(FieldId, SegmentStore)> {
        let fields = self.read();
        let mut taken: Vec<(FieldId, SegmentStore)> = fields
            .iter()
            .filter_map(|(field_id, store)| {
                lock(store)
                    .take_segment(family_time)
                    .map(|segment| (*field_id, segment))
            })
            .collect();
        taken.sort_by_key(|(field_id, _)| *field_id);
        taken
    }

    /// Detaches every segment store of every field and clears the map.
    pub fn drain(&self) -> Vec<(FieldId, SegmentStore)> {
        let mut fields = self.write();
        let mut drained = Vec::new();
        for (field_id, store) in fields.drain() {
            for segment in lock(&store).drain_segments() {
                drained.push((field_id, segment));
            }
        }
        drained
    }
}
