//! Segment store: the per-(family, field) value buffer.
//!
//! Every write lands in the store's current [`Block`]. The slot time of the
//! sample decides what happens:
//!
//! 1. no block yet: allocate one from the pool, anchor it at the slot;
//! 2. slot outside `[start, start + time_window)`: roll the window. The block
//!    is compacted, the compacted bytes become a *sealed* window, and the block
//!    is re-anchored at the incoming slot. A failed compaction is logged and
//!    the stale data dropped; the write itself always goes through;
//! 3. slot inside the window: plain write, or rollup through the field's
//!    aggregation function when the slot already holds a value.
//!
//! Samples behind the window and samples ahead of it are treated alike: both
//! roll the window.

use block::{AggFunc, AggType, Block, BlockError, BlockPool, FieldValue, SlotRange, SlotValue, ValueType};
use log::{debug, error, warn};
use std::sync::Arc;

use crate::error::StoreError;
use crate::scan::{ScanContext, SeriesAggregator};

/// Fixed overhead of a segment store without a block.
pub const EMPTY_SEGMENT_STORE_SIZE: usize = 8 // family time
    + 8 // agg func
    + 8; // block pointer

/// Per-write inputs that do not belong to the store itself.
#[derive(Debug, Clone, Copy)]
pub struct WriteContext<'a> {
    pub pool: &'a BlockPool,
    /// Slot time of the sample within its family.
    pub slot: u32,
}

/// Encoded export of a segment store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentBytes {
    pub data: Vec<u8>,
    /// Populated slot range, present when it was asked for.
    pub slot_range: Option<SlotRange>,
}

/// Write and export contract of a segment store.
pub trait FieldSegment {
    /// Coarse time bucket all slots of this store are relative to.
    fn family_time(&self) -> i64;

    fn agg_type(&self) -> AggType;

    /// Writes an integer sample; returns the change of [`mem_size`](Self::mem_size).
    fn write_int(&mut self, value: i64, ctx: &WriteContext<'_>) -> Result<isize, StoreError>;

    /// Writes a float sample; returns the change of [`mem_size`](Self::mem_size).
    fn write_float(&mut self, value: f64, ctx: &WriteContext<'_>) -> Result<isize, StoreError>;

    /// Compacts the current block and returns its encoded form.
    ///
    /// # Errors
    ///
    /// [`StoreError::EmptyStore`] if nothing was ever written,
    /// [`StoreError::Compaction`] if encoding fails.
    fn bytes(&mut self, need_slot_range: bool) -> Result<SegmentBytes, StoreError>;

    /// Slot range of the current window without compacting it.
    fn slot_range(&self) -> Result<SlotRange, StoreError>;

    fn mem_size(&self) -> usize;
}

/// Read path of a segment store. Crate-private: queries go through
/// [`SeriesStore::scan`](crate::SeriesStore::scan).
pub(crate) trait SegmentScan {
    fn scan(&self, agg: &mut dyn SeriesAggregator, ctx: &ScanContext);
}

pub struct SegmentStore {
    family_time: i64,
    agg_func: Arc<dyn AggFunc>,
    block: Option<Block>,
    /// Compacted windows closed by rollover, oldest first.
    sealed: Vec<Vec<u8>>,
}

impl std::fmt::Debug for SegmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentStore")
            .field("family_time", &self.family_time)
            .field("agg_type", &self.agg_func.agg_type())
            .field("value_type", &self.value_type())
            .field("start_time", &self.block.as_ref().map(Block::start_time))
            .field("sealed_windows", &self.sealed.len())
            .field("mem_size", &self.mem_size())
            .finish()
    }
}

impl SegmentStore {
    pub fn new(family_time: i64, agg_func: Arc<dyn AggFunc>) -> Self {
        Self {
            family_time,
            agg_func,
            block: None,
            sealed: Vec::new(),
        }
    }

    /// Value type of the current block, `None` before the first write.
    #[must_use]
    pub fn value_type(&self) -> Option<ValueType> {
        self.block.as_ref().map(Block::value_type)
    }

    #[must_use]
    pub fn block(&self) -> Option<&Block> {
        self.block.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn block_mut(&mut self) -> Option<&mut Block> {
        self.block.as_mut()
    }

    /// Number of rolled-over windows waiting for flush.
    #[must_use]
    pub fn sealed_count(&self) -> usize {
        self.sealed.len()
    }

    /// Drains the compacted bytes of rolled-over windows, oldest first.
    pub fn take_sealed(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.sealed)
    }

    /// Gives up the block so it can go back to the pool.
    pub fn into_block(self) -> Option<Block> {
        self.block
    }

    fn write<T: SlotValue>(&mut self, value: T, ctx: &WriteContext<'_>) -> Result<isize, StoreError> {
        if let Some(expected) = self.value_type() {
            if expected != T::VALUE_TYPE {
                return Err(StoreError::ValueTypeMismatch {
                    expected,
                    actual: T::VALUE_TYPE,
                });
            }
        }

        let old_size = self.mem_size() as isize;
        let (pos, need_rollup) = self.calc_time_window(ctx.pool, ctx.slot, T::VALUE_TYPE);

        let block = self.block.as_mut().ok_or(StoreError::EmptyStore)?;
        let expected = block.value_type();
        let slots = T::slots_mut(block).ok_or(StoreError::ValueTypeMismatch {
            expected,
            actual: T::VALUE_TYPE,
        })?;
        if need_rollup {
            // rollup with the value already in the slot
            let old = slots.get(pos);
            slots.set(pos, T::aggregate(self.agg_func.as_ref(), old, value));
        } else {
            slots.set(pos, value);
        }

        Ok(self.mem_size() as isize - old_size)
    }

    /// Picks the block position for `slot`, allocating or rolling the block
    /// as needed. Returns `(pos, need_rollup)`.
    fn calc_time_window(&mut self, pool: &BlockPool, slot: u32, value_type: ValueType) -> (usize, bool) {
        let start_time = match self.block.as_ref() {
            Some(block) => block.start_time(),
            None => {
                let mut block = pool.allocate(value_type);
                block.set_start_time(slot);
                self.block = Some(block);
                return (0, false);
            }
        };

        if slot < start_time || slot - start_time >= pool.time_window() {
            if let Err(err) = self.roll_window(slot) {
                error!(
                    "compact block data error, data will be lost (family {}, window {}): {}",
                    self.family_time, start_time, err
                );
            }
            return (0, false);
        }

        let pos = (slot - start_time) as usize;
        let need_rollup = self.block.as_ref().map_or(false, |b| b.has_value(pos));
        (pos, need_rollup)
    }

    /// Closes the current window and re-anchors the block at `slot`.
    ///
    /// The block is re-anchored whether or not compaction succeeds; the
    /// returned error only reports that the closed window's data was lost.
    fn roll_window(&mut self, slot: u32) -> Result<(), StoreError> {
        let block = match self.block.as_mut() {
            Some(block) => block,
            None => return Ok(()),
        };
        let previous = block.start_time();

        let result = if block.is_empty() {
            Ok(())
        } else {
            match block.compact(self.agg_func.as_ref()).map(|(range, _)| range) {
                Ok(range) => {
                    let mut sealed = block.take_compacted();
                    sealed.shrink_to_fit();
                    self.sealed.push(sealed);
                    debug!(
                        "family {} sealed window {} covering slots [{}, {}]",
                        self.family_time, previous, range.start, range.end
                    );
                    Ok(())
                }
                Err(err) => Err(StoreError::Compaction(err)),
            }
        };

        block.reset(slot);
        result
    }

    fn sealed_size(&self) -> usize {
        self.sealed.iter().map(Vec::len).sum()
    }

    fn emit(&self, values: Vec<(u32, FieldValue)>, agg: &mut dyn SeriesAggregator, ctx: &ScanContext) {
        for (slot, value) in values {
            if ctx.slot_range().map_or(true, |r| r.contains(slot)) {
                agg.aggregate(self.family_time, slot, value);
            }
        }
    }
}

impl FieldSegment for SegmentStore {
    fn family_time(&self) -> i64 {
        self.family_time
    }

    fn agg_type(&self) -> AggType {
        self.agg_func.agg_type()
    }

    fn write_int(&mut self, value: i64, ctx: &WriteContext<'_>) -> Result<isize, StoreError> {
        self.write(value, ctx)
    }

    fn write_float(&mut self, value: f64, ctx: &WriteContext<'_>) -> Result<isize, StoreError> {
        self.write(value, ctx)
    }

    fn bytes(&mut self, need_slot_range: bool) -> Result<SegmentBytes, StoreError> {
        let block = self.block.as_mut().ok_or(StoreError::EmptyStore)?;
        let range = match block.compact(self.agg_func.as_ref()).map(|(range, _)| range) {
            Ok(range) => range,
            Err(BlockError::EmptyBlock) => return Err(StoreError::EmptyStore),
            Err(err) => return Err(StoreError::Compaction(err)),
        };
        Ok(SegmentBytes {
            data: block.bytes().to_vec(),
            slot_range: need_slot_range.then_some(range),
        })
    }

    fn slot_range(&self) -> Result<SlotRange, StoreError> {
        self.block
            .as_ref()
            .and_then(Block::slot_range)
            .ok_or(StoreError::EmptyStore)
    }

    fn mem_size(&self) -> usize {
        let block = self.block.as_ref().map_or(0, Block::mem_size);
        EMPTY_SEGMENT_STORE_SIZE + block + self.sealed_size()
    }
}

impl SegmentScan for SegmentStore {
    fn scan(&self, agg: &mut dyn SeriesAggregator, ctx: &ScanContext) {
        for window in &self.sealed {
            match block::decode_values(window) {
                Ok(values) => self.emit(values, agg, ctx),
                Err(err) => warn!(
                    "skipping undecodable sealed window of family {}: {}",
                    self.family_time, err
                ),
            }
        }

        if let Some(current) = &self.block {
            match current.merged_values(self.agg_func.as_ref()) {
                Ok(values) => self.emit(values, agg, ctx),
                Err(err) => warn!(
                    "skipping undecodable window {} of family {}: {}",
                    current.start_time(),
                    self.family_time,
                    err
                ),
            }
        }
    }
}
