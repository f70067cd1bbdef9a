/// Flush path: `flush_family()` and `evict_series()`.
///
/// Flushing a family exports, for every series and field, the sealed windows
/// of that family plus the compacted current window, detaches the segment
/// stores and gives their blocks back to the pool. Persisting the exported
/// bytes is the caller's job.
use anyhow::{Context, Result};
use block::{AggType, ValueType};
use log::{debug, error};

use crate::segment::{FieldSegment, SegmentStore};
use crate::{lock, FieldId, MemDb, SeriesId, StoreError};

/// Compacted output of one segment store.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushedSegment {
    pub series_id: SeriesId,
    pub field_id: FieldId,
    pub family_time: i64,
    pub agg_type: AggType,
    pub value_type: ValueType,
    /// Encoded windows, oldest first. The last entry is the window that was
    /// current at flush time.
    pub blocks: Vec<Vec<u8>>,
}

impl MemDb {
    /// Exports and removes everything buffered for `family_time`.
    ///
    /// The family is compacted in place first; if any segment store fails to
    /// compact, the error is returned and nothing is removed.
    ///
    /// A series is dropped once none of its fields buffers anything. The
    /// check runs under the write lock of its map entry, which waits out
    /// writes in flight.
    pub fn flush_family(&self, family_time: i64) -> Result<Vec<FlushedSegment>> {
        let series_ids = self.series_ids();

        // compact first so a failure leaves the memdb untouched
        for series_id in &series_ids {
            let series = match self.series(*series_id) {
                Some(series) => series,
                None => continue,
            };
            for field_id in series.field_ids() {
                let field = match series.field(field_id) {
                    Some(field) => field,
                    None => continue,
                };
                let mut field = lock(&field);
                if let Some(segment) = field.segment_mut(family_time) {
                    match segment.bytes(false) {
                        Ok(_) | Err(StoreError::EmptyStore) => {}
                        Err(err) => {
                            return Err(err).with_context(|| {
                                format!(
                                    "flush family {}: series {} field {}",
                                    family_time, series_id, field_id
                                )
                            })
                        }
                    }
                }
            }
        }

        let mut flushed = Vec::new();
        for series_id in series_ids {
            let series = match self.series(series_id) {
                Some(series) => series,
                None => continue,
            };
            for (field_id, segment) in series.take_family(family_time) {
                if let Some(out) = self.detach_segment(series_id, field_id, segment) {
                    flushed.push(out);
                }
            }
            self.series.remove_if(&series_id, |_, s| s.is_empty());
        }

        debug!(
            "flushed family {}: {} segments, mem_size now {}",
            family_time,
            flushed.len(),
            self.mem_size()
        );
        Ok(flushed)
    }

    /// Drops a series and returns its blocks to the pool. Returns the number
    /// of bytes released from the memory counter.
    pub fn evict_series(&self, series_id: SeriesId) -> usize {
        let series = match self.series.remove(&series_id) {
            Some((_, series)) => series,
            None => return 0,
        };

        let mut freed = 0;
        for (_, segment) in series.drain() {
            freed += segment.mem_size();
            if let Some(block) = segment.into_block() {
                self.pool.release(block);
            }
        }
        self.sub_mem(freed);
        debug!("evicted series {}, released {} bytes", series_id, freed);
        freed
    }

    fn detach_segment(
        &self,
        series_id: SeriesId,
        field_id: FieldId,
        mut segment: SegmentStore,
    ) -> Option<FlushedSegment> {
        self.sub_mem(segment.mem_size());

        let family_time = segment.family_time();
        let agg_type = segment.agg_type();
        let value_type = segment.value_type()?;
        let mut blocks = segment.take_sealed();
        match segment.bytes(false) {
            Ok(current) => blocks.push(current.data),
            Err(StoreError::EmptyStore) => {}
            // a write raced in after the compaction pass and broke the window
            Err(err) => error!(
                "flush family {}: series {} field {} lost its current window: {}",
                family_time, series_id, field_id, err
            ),
        }
        if let Some(block) = segment.into_block() {
            self.pool.release(block);
        }

        if blocks.is_empty() {
            return None;
        }
        Some(FlushedSegment {
            series_id,
            field_id,
            family_time,
            agg_type,
            value_type,
            blocks,
        })
    }
}
