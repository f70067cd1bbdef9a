use crate::*;
use block::FieldValue;
use std::sync::{Arc, Mutex};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One value handed to an aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct Emitted {
    pub series_id: SeriesId,
    pub field_id: FieldId,
    pub family_time: i64,
    pub slot: u32,
    pub value: FieldValue,
}

/// Worker recording dispatches, completions and every emitted value.
#[derive(Debug, Default)]
pub struct RecordingWorker {
    pub dispatched: Mutex<Vec<(SeriesId, FieldId)>>,
    pub metas: Mutex<Vec<FieldMeta>>,
    pub completed: Mutex<Vec<SeriesId>>,
    pub emitted: Arc<Mutex<Vec<Emitted>>>,
    /// Fields for which no aggregator is handed out.
    pub skip_fields: Vec<FieldId>,
}

impl RecordingWorker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn dispatched(&self) -> Vec<(SeriesId, FieldId)> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn metas(&self) -> Vec<FieldMeta> {
        self.metas.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<SeriesId> {
        self.completed.lock().unwrap().clone()
    }

    pub fn emitted(&self) -> Vec<Emitted> {
        self.emitted.lock().unwrap().clone()
    }
}

struct RecordingAggregator {
    series_id: SeriesId,
    field_id: FieldId,
    out: Arc<Mutex<Vec<Emitted>>>,
}

impl SeriesAggregator for RecordingAggregator {
    fn aggregate(&mut self, family_time: i64, slot: u32, value: FieldValue) {
        self.out.lock().unwrap().push(Emitted {
            series_id: self.series_id,
            field_id: self.field_id,
            family_time,
            slot,
            value,
        });
    }
}

impl ScanWorker for RecordingWorker {
    fn series_aggregator(
        &self,
        _version: Version,
        series_id: SeriesId,
        field: &FieldMeta,
    ) -> Option<Box<dyn SeriesAggregator>> {
        if self.skip_fields.contains(&field.field_id) {
            return None;
        }
        self.dispatched
            .lock()
            .unwrap()
            .push((series_id, field.field_id));
        self.metas.lock().unwrap().push(field.clone());
        Some(Box::new(RecordingAggregator {
            series_id,
            field_id: field.field_id,
            out: self.emitted.clone(),
        }))
    }

    fn complete(&self, series_id: SeriesId) {
        self.completed.lock().unwrap().push(series_id);
    }
}

pub fn int_meta(field_id: FieldId, agg_type: block::AggType) -> FieldMeta {
    FieldMeta {
        field_id,
        value_type: block::ValueType::Integer,
        agg_type,
    }
}
