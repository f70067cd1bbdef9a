//! Fixed-capacity slot blocks.
//!
//! A block buffers the values of one time window: position `p` holds the
//! sample of slot `start_time + p`. Next to the live slots the block keeps the
//! compacted bytes of its current window, so repeated compactions of the same
//! window fold new samples into what was encoded before.

use std::mem::size_of;

use crate::encoding::{self, max_encoded_len};
use crate::error::Result;
use crate::field::{AggFunc, FieldValue, ValueType};

/// Inclusive range of slot times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotRange {
    pub start: u32,
    pub end: u32,
}

impl SlotRange {
    #[must_use]
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    #[must_use]
    pub fn contains(&self, slot: u32) -> bool {
        self.start <= slot && slot <= self.end
    }

    /// Number of slots covered, both ends included.
    #[must_use]
    pub fn width(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    #[must_use]
    pub fn union(self, other: SlotRange) -> SlotRange {
        SlotRange::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// Types a block can hold. Implemented for `i64` and `f64` only.
pub trait SlotValue: Copy + Default + PartialEq + std::fmt::Debug + Send + 'static {
    const VALUE_TYPE: ValueType;

    fn to_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;
    fn aggregate(agg: &dyn AggFunc, old: Self, new: Self) -> Self;
    fn into_field_value(self) -> FieldValue;

    /// Typed view of a block; `None` if the block holds the other type.
    fn slots(block: &Block) -> Option<&SlotBlock<Self>>;
    fn slots_mut(block: &mut Block) -> Option<&mut SlotBlock<Self>>;
}

impl SlotValue for i64 {
    const VALUE_TYPE: ValueType = ValueType::Integer;

    fn to_bits(self) -> u64 {
        self as u64
    }

    fn from_bits(bits: u64) -> Self {
        bits as i64
    }

    fn aggregate(agg: &dyn AggFunc, old: Self, new: Self) -> Self {
        agg.aggregate_int(old, new)
    }

    fn into_field_value(self) -> FieldValue {
        FieldValue::Int(self)
    }

    fn slots(block: &Block) -> Option<&SlotBlock<Self>> {
        block.as_int()
    }

    fn slots_mut(block: &mut Block) -> Option<&mut SlotBlock<Self>> {
        block.as_int_mut()
    }
}

impl SlotValue for f64 {
    const VALUE_TYPE: ValueType = ValueType::Float;

    fn to_bits(self) -> u64 {
        f64::to_bits(self)
    }

    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }

    fn aggregate(agg: &dyn AggFunc, old: Self, new: Self) -> Self {
        agg.aggregate_float(old, new)
    }

    fn into_field_value(self) -> FieldValue {
        FieldValue::Float(self)
    }

    fn slots(block: &Block) -> Option<&SlotBlock<Self>> {
        block.as_float()
    }

    fn slots_mut(block: &mut Block) -> Option<&mut SlotBlock<Self>> {
        block.as_float_mut()
    }
}

/// Slot array of a single value type.
#[derive(Debug)]
pub struct SlotBlock<T> {
    start_time: u32,
    values: Box<[T]>,
    /// One bit per position.
    present: Box<[u64]>,
    /// Encoded output of the last compaction of the current window.
    compacted: Vec<u8>,
}

impl<T: SlotValue> SlotBlock<T> {
    /// Allocates a zeroed block of `capacity` slots. The compaction buffer is
    /// reserved up front for a full window.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            start_time: 0,
            values: vec![T::default(); capacity].into_boxed_slice(),
            present: vec![0u64; (capacity + 63) / 64].into_boxed_slice(),
            compacted: Vec::with_capacity(max_encoded_len(capacity)),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn start_time(&self) -> u32 {
        self.start_time
    }

    pub fn set_start_time(&mut self, start_time: u32) {
        self.start_time = start_time;
    }

    /// `true` iff a live write landed on `pos` since the last compaction.
    #[must_use]
    pub fn has_value(&self, pos: usize) -> bool {
        pos < self.capacity() && self.present[pos / 64] & (1 << (pos % 64)) != 0
    }

    /// Returns the live value at `pos` (zero if the slot is empty).
    ///
    /// # Panics
    ///
    /// Panics if `pos >= capacity`.
    #[must_use]
    pub fn get(&self, pos: usize) -> T {
        self.values[pos]
    }

    /// Stores `value` at `pos` and marks the slot present.
    ///
    /// # Panics
    ///
    /// Panics if `pos >= capacity`.
    pub fn set(&mut self, pos: usize, value: T) {
        self.values[pos] = value;
        self.present[pos / 64] |= 1 << (pos % 64);
    }

    /// `true` if the block has neither live slots nor compacted bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.compacted.is_empty() && self.present.iter().all(|w| *w == 0)
    }

    /// Positions with a live value, ascending.
    fn live_positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.present.iter().enumerate().flat_map(|(word_idx, word)| {
            let mut bits = *word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(word_idx * 64 + bit)
            })
        })
    }

    /// Compacted values of the current window merged with the live slots.
    ///
    /// A slot present on both sides is combined as `agg(compacted, live)`.
    /// Does not mutate the block; the scan path reads through this.
    pub fn merged_values(&self, agg: &dyn AggFunc) -> Result<Vec<(u32, T)>> {
        let earlier = if self.compacted.is_empty() {
            Vec::new()
        } else {
            encoding::decode::<T>(&self.compacted)?.values
        };

        let mut merged = Vec::with_capacity(earlier.len() + self.capacity());
        let mut earlier = earlier.into_iter().peekable();
        for pos in self.live_positions() {
            let slot = self.start_time + pos as u32;
            let mut live = self.values[pos];
            while let Some(&(old_slot, old)) = earlier.peek() {
                if old_slot > slot {
                    break;
                }
                earlier.next();
                if old_slot == slot {
                    live = T::aggregate(agg, old, live);
                } else {
                    merged.push((old_slot, old));
                }
            }
            merged.push((slot, live));
        }
        merged.extend(earlier);
        Ok(merged)
    }

    /// Folds the live slots into the compacted bytes of the window and clears
    /// the live slots.
    ///
    /// On error the block is left untouched.
    pub fn compact(&mut self, agg: &dyn AggFunc) -> Result<(SlotRange, &[u8])> {
        let entries = self.merged_values(agg)?;
        let mut encoded = Vec::with_capacity(self.compacted.capacity());
        let range = encoding::encode_into(&mut encoded, self.start_time, &entries)?;

        self.compacted = encoded;
        self.clear_live();
        Ok((range, &self.compacted))
    }

    /// Compacted bytes of the current window; empty if never compacted.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.compacted
    }

    /// Moves the compacted bytes out, leaving an equally reserved buffer.
    pub fn take_compacted(&mut self) -> Vec<u8> {
        let capacity = self.compacted.capacity();
        std::mem::replace(&mut self.compacted, Vec::with_capacity(capacity))
    }

    /// Overwrites the compacted bytes as-is, valid or not.
    #[cfg(any(test, feature = "test-util"))]
    pub fn replace_compacted(&mut self, raw: Vec<u8>) {
        self.compacted = raw;
    }

    /// Range covered by the compacted bytes and the live slots together.
    #[must_use]
    pub fn slot_range(&self) -> Option<SlotRange> {
        let compacted = if self.compacted.is_empty() {
            None
        } else {
            encoding::decode_slot_range(&self.compacted).ok()
        };

        let mut live = self.live_positions();
        let live = live.next().map(|first| {
            let last = self.live_positions().last().unwrap_or(first);
            SlotRange::new(
                self.start_time + first as u32,
                self.start_time + last as u32,
            )
        });

        match (compacted, live) {
            (Some(a), Some(b)) => Some(a.union(b)),
            (a, b) => a.or(b),
        }
    }

    /// Drops all data and re-anchors the block at `start_time`.
    pub fn reset(&mut self, start_time: u32) {
        self.clear_live();
        self.compacted.clear();
        self.start_time = start_time;
    }

    fn clear_live(&mut self) {
        let positions: Vec<usize> = self.live_positions().collect();
        for pos in positions {
            self.values[pos] = T::default();
        }
        self.present.iter_mut().for_each(|w| *w = 0);
    }

    /// Footprint in bytes. Constant for the lifetime of the block.
    #[must_use]
    pub fn mem_size(&self) -> usize {
        size_of::<Self>()
            + self.values.len() * size_of::<T>()
            + self.present.len() * size_of::<u64>()
            + self.compacted.capacity()
    }
}

/// A block of either value type, owned by exactly one segment store.
#[derive(Debug)]
pub enum Block {
    Int(SlotBlock<i64>),
    Float(SlotBlock<f64>),
}

macro_rules! with_slots {
    ($block:expr, $slots:ident => $body:expr) => {
        match $block {
            Block::Int($slots) => $body,
            Block::Float($slots) => $body,
        }
    };
}

impl Block {
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Block::Int(_) => ValueType::Integer,
            Block::Float(_) => ValueType::Float,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        with_slots!(self, s => s.capacity())
    }

    #[must_use]
    pub fn start_time(&self) -> u32 {
        with_slots!(self, s => s.start_time())
    }

    pub fn set_start_time(&mut self, start_time: u32) {
        with_slots!(self, s => s.set_start_time(start_time))
    }

    #[must_use]
    pub fn has_value(&self, pos: usize) -> bool {
        with_slots!(self, s => s.has_value(pos))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        with_slots!(self, s => s.is_empty())
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&SlotBlock<i64>> {
        match self {
            Block::Int(s) => Some(s),
            Block::Float(_) => None,
        }
    }

    pub fn as_int_mut(&mut self) -> Option<&mut SlotBlock<i64>> {
        match self {
            Block::Int(s) => Some(s),
            Block::Float(_) => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<&SlotBlock<f64>> {
        match self {
            Block::Float(s) => Some(s),
            Block::Int(_) => None,
        }
    }

    pub fn as_float_mut(&mut self) -> Option<&mut SlotBlock<f64>> {
        match self {
            Block::Float(s) => Some(s),
            Block::Int(_) => None,
        }
    }

    /// See [`SlotBlock::compact`].
    pub fn compact(&mut self, agg: &dyn AggFunc) -> Result<(SlotRange, &[u8])> {
        with_slots!(self, s => s.compact(agg))
    }

    /// Type-erased [`SlotBlock::merged_values`].
    pub fn merged_values(&self, agg: &dyn AggFunc) -> Result<Vec<(u32, FieldValue)>> {
        with_slots!(self, s => Ok(s
            .merged_values(agg)?
            .into_iter()
            .map(|(slot, v)| (slot, v.into_field_value()))
            .collect()))
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        with_slots!(self, s => s.bytes())
    }

    pub fn take_compacted(&mut self) -> Vec<u8> {
        with_slots!(self, s => s.take_compacted())
    }

    /// See [`SlotBlock::replace_compacted`].
    #[cfg(any(test, feature = "test-util"))]
    pub fn replace_compacted(&mut self, raw: Vec<u8>) {
        with_slots!(self, s => s.replace_compacted(raw))
    }

    #[must_use]
    pub fn slot_range(&self) -> Option<SlotRange> {
        with_slots!(self, s => s.slot_range())
    }

    pub fn reset(&mut self, start_time: u32) {
        with_slots!(self, s => s.reset(start_time))
    }

    #[must_use]
    pub fn mem_size(&self) -> usize {
        with_slots!(self, s => s.mem_size())
    }
}

/// Decodes compacted bytes of either value type into `(slot, value)` pairs.
pub fn decode_values(data: &[u8]) -> Result<Vec<(u32, FieldValue)>> {
    let header = encoding::decode_header(data)?;
    let values = match header.value_type {
        ValueType::Integer => encoding::decode::<i64>(data)?
            .values
            .into_iter()
            .map(|(slot, v)| (slot, FieldValue::Int(v)))
            .collect(),
        ValueType::Float => encoding::decode::<f64>(data)?
            .values
            .into_iter()
            .map(|(slot, v)| (slot, FieldValue::Float(v)))
            .collect(),
    };
    Ok(values)
}

