use crate::encoding::{self, decode_header, encode_into, max_encoded_len, CRC_BYTES, HEADER_BYTES};
use crate::*;
use anyhow::Result;

fn encoded(entries: &[(u32, i64)]) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_into(&mut buf, 0, entries).unwrap();
    buf
}

#[test]
fn header_layout_is_stable() -> Result<()> {
    let buf = encoded(&[(5, 1), (12, 2)]);
    assert_eq!(&buf[0..4], &BLOCK_MAGIC.to_le_bytes());
    assert_eq!(buf[4], ValueType::Integer.to_u8());
    assert_eq!(u32::from_le_bytes(buf[9..13].try_into()?), 5);
    assert_eq!(u32::from_le_bytes(buf[13..17].try_into()?), 12);
    // 8 slots wide -> 1 bitmap byte, 2 values, crc
    assert_eq!(buf.len(), HEADER_BYTES + 1 + 2 * 8 + CRC_BYTES);
    Ok(())
}

#[test]
fn slot_range_is_decodable_from_header_alone() -> Result<()> {
    let buf = encoded(&[(40, 1), (41, 2), (59, 3)]);
    assert_eq!(decode_slot_range(&buf)?, SlotRange::new(40, 59));

    // the range survives even if the value section is damaged
    let mut damaged = buf.clone();
    let n = damaged.len();
    damaged[n - 6] ^= 0x55;
    assert_eq!(decode_slot_range(&damaged)?, SlotRange::new(40, 59));
    assert!(matches!(
        decode::<i64>(&damaged),
        Err(BlockError::Checksum { .. })
    ));
    Ok(())
}

#[test]
fn sparse_values_decode_in_slot_order() -> Result<()> {
    let entries = vec![(0, -7), (9, 0), (17, i64::MIN)];
    let buf = encoded(&entries);
    let decoded = decode::<i64>(&buf)?;
    assert_eq!(decoded.values, entries);
    assert_eq!(decoded.header.range, SlotRange::new(0, 17));
    Ok(())
}

#[test]
fn decode_rejects_wrong_value_type() {
    let buf = encoded(&[(1, 1)]);
    assert!(matches!(
        decode::<f64>(&buf),
        Err(BlockError::ValueTypeMismatch {
            expected: ValueType::Float,
            actual: ValueType::Integer
        })
    ));
}

#[test]
fn decode_rejects_bad_magic_and_short_input() {
    let mut buf = encoded(&[(1, 1)]);
    buf[0] = b'X';
    assert!(matches!(decode_header(&buf), Err(BlockError::Corrupt(_))));
    assert!(matches!(
        decode_slot_range(&[0u8; 5]),
        Err(BlockError::Corrupt(_))
    ));
}

#[test]
fn encode_rejects_empty_entries() {
    let mut buf = Vec::new();
    assert!(matches!(
        encode_into::<i64>(&mut buf, 0, &[]),
        Err(BlockError::EmptyBlock)
    ));
}

#[test]
fn full_window_fits_reserved_size() {
    let entries: Vec<(u32, i64)> = (0..60).map(|s| (s, s as i64)).collect();
    let buf = encoded(&entries);
    assert_eq!(buf.len(), max_encoded_len(60));
}

#[test]
fn decode_values_dispatches_on_header_type() -> Result<()> {
    let mut buf = Vec::new();
    encoding::encode_into(&mut buf, 3, &[(3, 1.5f64)])?;
    assert_eq!(decode_values(&buf)?, vec![(3, FieldValue::Float(1.5))]);
    assert_eq!(decode_values(&encoded(&[(2, 4)]))?, vec![(2, FieldValue::Int(4))]);
    Ok(())
}
