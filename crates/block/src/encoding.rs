//! Compacted block binary format and its encode/decode helpers.
//!
//! ## v1 layout - magic `TSB1` (`0x5453_4231`)
//!
//! ```text
//! [magic: u32 LE][value_type: u8][anchor: u32 LE]
//! [start_slot: u32 LE][end_slot: u32 LE]
//! [bitmap: ceil((end_slot - start_slot + 1) / 8) bytes]
//! [values: u64 LE per present slot, ascending slot order]
//! [crc32: u32 LE]
//! ```
//!
//! Bit `i` of the bitmap (byte `i / 8`, bit `i % 8`) marks slot
//! `start_slot + i` as present. Integers are stored as their two's complement
//! bits, floats as their IEEE-754 bits. The CRC32 covers everything between
//! the magic and the checksum itself.
//!
//! The slot range sits at a fixed offset so [`decode_slot_range`] never has to
//! touch the value section.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::io::{Cursor, Read};

use crate::block::{SlotRange, SlotValue};
use crate::error::{BlockError, Result};
use crate::field::ValueType;

/// Magic number identifying compacted blocks (ASCII "TSB1").
pub const BLOCK_MAGIC: u32 = 0x5453_4231;

/// Header size: 4 (`magic`) + 1 (`value_type`) + 4 (`anchor`) + 4 (`start`) + 4 (`end`).
pub const HEADER_BYTES: usize = 4 + 1 + 4 + 4 + 4;

/// Trailing checksum size.
pub const CRC_BYTES: usize = 4;

/// Worst-case encoded size of a window of `capacity` slots (every slot set).
#[must_use]
pub fn max_encoded_len(capacity: usize) -> usize {
    HEADER_BYTES + bitmap_len(capacity) + capacity * 8 + CRC_BYTES
}

fn bitmap_len(width: usize) -> usize {
    (width + 7) / 8
}

/// Parsed header of a compacted block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub value_type: ValueType,
    /// Slot time the originating block was anchored at.
    pub anchor: u32,
    pub range: SlotRange,
}

/// Fully decoded compacted block.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBlock<T> {
    pub header: Header,
    /// `(slot, value)` pairs in ascending slot order.
    pub values: Vec<(u32, T)>,
}

/// Encodes `entries` into `buf`, which is cleared first.
///
/// `entries` must be non-empty and strictly ascending by slot. Returns the
/// slot range that was written into the header.
pub fn encode_into<T: SlotValue>(
    buf: &mut Vec<u8>,
    anchor: u32,
    entries: &[(u32, T)],
) -> Result<SlotRange> {
    let (start, end) = match (entries.first(), entries.last()) {
        (Some(first), Some(last)) => (first.0, last.0),
        _ => return Err(BlockError::EmptyBlock),
    };
    debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
    let range = SlotRange::new(start, end);

    buf.clear();
    buf.write_u32::<LittleEndian>(BLOCK_MAGIC)?;
    buf.write_u8(T::VALUE_TYPE.to_u8())?;
    buf.write_u32::<LittleEndian>(anchor)?;
    buf.write_u32::<LittleEndian>(start)?;
    buf.write_u32::<LittleEndian>(end)?;

    let mut bitmap = vec![0u8; bitmap_len(range.width())];
    for (slot, _) in entries {
        let i = (slot - start) as usize;
        bitmap[i / 8] |= 1 << (i % 8);
    }
    buf.extend_from_slice(&bitmap);

    for (_, value) in entries {
        buf.write_u64::<LittleEndian>(value.to_bits())?;
    }

    let mut hasher = Crc32::new();
    hasher.update(&buf[4..]);
    let crc = hasher.finalize();
    buf.write_u32::<LittleEndian>(crc)?;

    Ok(range)
}

/// Reads the header of a compacted block without verifying the checksum.
pub fn decode_header(data: &[u8]) -> Result<Header> {
    if data.len() < HEADER_BYTES + CRC_BYTES {
        return Err(BlockError::Corrupt(format!(
            "compacted block too small: {} bytes",
            data.len()
        )));
    }

    let mut r = Cursor::new(data);
    let magic = r.read_u32::<LittleEndian>()?;
    if magic != BLOCK_MAGIC {
        return Err(BlockError::Corrupt(format!(
            "unknown block magic: {:#x}",
            magic
        )));
    }
    let tag = r.read_u8()?;
    let value_type = ValueType::from_u8(tag)
        .ok_or_else(|| BlockError::Corrupt(format!("unknown value type tag: {}", tag)))?;
    let anchor = r.read_u32::<LittleEndian>()?;
    let start = r.read_u32::<LittleEndian>()?;
    let end = r.read_u32::<LittleEndian>()?;
    if start > end {
        return Err(BlockError::Corrupt(format!(
            "inverted slot range [{}, {}]",
            start, end
        )));
    }

    Ok(Header {
        value_type,
        anchor,
        range: SlotRange::new(start, end),
    })
}

/// Decodes only the slot range of a compacted block.
pub fn decode_slot_range(data: &[u8]) -> Result<SlotRange> {
    decode_header(data).map(|h| h.range)
}

/// Verifies and fully decodes a compacted block of value type `T`.
pub fn decode<T: SlotValue>(data: &[u8]) -> Result<DecodedBlock<T>> {
    let header = decode_header(data)?;
    if header.value_type != T::VALUE_TYPE {
        return Err(BlockError::ValueTypeMismatch {
            expected: T::VALUE_TYPE,
            actual: header.value_type,
        });
    }

    let body_end = data.len() - CRC_BYTES;
    let expected = u32::from_le_bytes([
        data[body_end],
        data[body_end + 1],
        data[body_end + 2],
        data[body_end + 3],
    ]);
    let mut hasher = Crc32::new();
    hasher.update(&data[4..body_end]);
    let actual = hasher.finalize();
    if expected != actual {
        return Err(BlockError::Checksum { expected, actual });
    }

    let width = header.range.width();
    let mut r = Cursor::new(&data[HEADER_BYTES..body_end]);
    let mut bitmap = vec![0u8; bitmap_len(width)];
    r.read_exact(&mut bitmap)
        .map_err(|_| BlockError::Corrupt("truncated slot bitmap".to_string()))?;

    let present = bitmap.iter().map(|b| b.count_ones() as usize).sum::<usize>();
    let remaining = (body_end - HEADER_BYTES - bitmap.len()) / 8;
    if present != remaining || (body_end - HEADER_BYTES - bitmap.len()) % 8 != 0 {
        return Err(BlockError::Corrupt(format!(
            "bitmap marks {} slots but {} values follow",
            present, remaining
        )));
    }

    let mut values = Vec::with_capacity(present);
    for i in 0..width {
        if bitmap[i / 8] & (1 << (i % 8)) != 0 {
            let bits = r.read_u64::<LittleEndian>()?;
            values.push((header.range.start + i as u32, T::from_bits(bits)));
        }
    }

    Ok(DecodedBlock { header, values })
}
