//! # Block - slot buffers for the RiptideTS write path
//!
//! A [`Block`] buffers one time window of a single field: `time_window`
//! contiguous slots of either integers or floats, a presence bitmap, and the
//! anchor slot of position 0. Blocks come from a [`BlockPool`] and are owned
//! by exactly one segment store until they are released.
//!
//! When a window closes (or the owner asks for its bytes) the block is
//! *compacted*: the populated slot range is encoded into the format described
//! in [`encoding`], and any earlier compacted bytes of the same window are
//! folded in through the field's [`AggFunc`].
//!
//! ```text
//!   allocate(ValueType)          write slot s: pos = s - start_time
//! BlockPool ──────────▶ Block ──────────────────────────────────────┐
//!     ▲                  │   set(pos, v) / agg(get(pos), v)          │
//!     │ release          │                                           │
//!     └──────────────────┤ compact(agg) ─▶ [TSB1 | range | bitmap | values | crc]
//!                        │                        ▲
//!                        └──── decode_slot_range ─┘
//! ```
//!
//! | Module       | Purpose                                              |
//! |--------------|------------------------------------------------------|
//! | [`field`]    | `ValueType`, `FieldValue`, `AggType`, `AggFunc`       |
//! | [`block`]    | `SlotBlock<T>`, the `Block` variant, `SlotRange`      |
//! | [`pool`]     | `BlockPool` allocation/recycling and its counters     |
//! | [`encoding`] | compacted block layout, encode / decode              |

pub mod block;
pub mod encoding;
mod error;
pub mod field;
pub mod pool;

pub use block::{decode_values, Block, SlotBlock, SlotRange, SlotValue};
pub use encoding::{decode, decode_slot_range, DecodedBlock, Header, BLOCK_MAGIC};
pub use error::{BlockError, Result};
pub use field::{AggFunc, AggType, FieldValue, ValueType};
pub use pool::{BlockPool, PoolStats};

#[cfg(test)]
mod tests;
