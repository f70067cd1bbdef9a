//! Block allocation and recycling.

use log::debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::block::{Block, SlotBlock};
use crate::field::ValueType;

/// Counters describing pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Blocks created from fresh memory.
    pub allocated: usize,
    /// Blocks handed out again from the free lists.
    pub reused: usize,
    /// Blocks returned through [`BlockPool::release`].
    pub released: usize,
    /// Integer blocks currently waiting on the free list.
    pub free_int: usize,
    /// Float blocks currently waiting on the free list.
    pub free_float: usize,
}

/// Hands out zeroed blocks of `time_window` slots and takes them back once a
/// store is done with them.
///
/// The pool keeps no reference to a block it handed out: ownership moves to
/// the caller on [`allocate`](BlockPool::allocate) and back on
/// [`release`](BlockPool::release). At most `max_free` released blocks are
/// retained per value type; the rest are dropped.
#[derive(Debug)]
pub struct BlockPool {
    time_window: u32,
    max_free: usize,
    free_int: Mutex<Vec<SlotBlock<i64>>>,
    free_float: Mutex<Vec<SlotBlock<f64>>>,
    allocated: AtomicUsize,
    reused: AtomicUsize,
    released: AtomicUsize,
}

impl BlockPool {
    /// A `time_window` of zero is raised to one slot.
    pub fn new(time_window: u32, max_free: usize) -> Self {
        Self {
            time_window: time_window.max(1),
            max_free,
            free_int: Mutex::new(Vec::new()),
            free_float: Mutex::new(Vec::new()),
            allocated: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    /// Slots per block.
    #[must_use]
    pub fn time_window(&self) -> u32 {
        self.time_window
    }

    /// Returns a zeroed block for `value_type`, anchored at slot 0.
    pub fn allocate(&self, value_type: ValueType) -> Block {
        let recycled = match value_type {
            ValueType::Integer => Self::pop(&self.free_int).map(Block::Int),
            ValueType::Float => Self::pop(&self.free_float).map(Block::Float),
        };
        match recycled {
            Some(block) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                block
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "allocating {} block of {} slots",
                    value_type, self.time_window
                );
                let capacity = self.time_window as usize;
                match value_type {
                    ValueType::Integer => Block::Int(SlotBlock::new(capacity)),
                    ValueType::Float => Block::Float(SlotBlock::new(capacity)),
                }
            }
        }
    }

    /// Takes a block back. Its contents are cleared before it is reused.
    pub fn release(&self, mut block: Block) {
        self.released.fetch_add(1, Ordering::Relaxed);
        if block.capacity() != self.time_window as usize {
            return;
        }
        block.reset(0);
        match block {
            Block::Int(b) => Self::push(&self.free_int, b, self.max_free),
            Block::Float(b) => Self::push(&self.free_float, b, self.max_free),
        }
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            free_int: self
                .free_int
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            free_float: self
                .free_float
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }

    fn pop<T>(list: &Mutex<Vec<T>>) -> Option<T> {
        list.lock().unwrap_or_else(PoisonError::into_inner).pop()
    }

    fn push<T>(list: &Mutex<Vec<T>>, block: T, max_free: usize) {
        let mut free = list.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < max_free {
            free.push(block);
        }
    }
}
