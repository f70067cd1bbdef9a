use super::helpers::{init_logger, RecordingWorker};
use crate::segment::SegmentScan;
use crate::*;
use anyhow::Result;
use block::{AggType, BlockPool, FieldValue, SlotRange, ValueType};
use std::sync::Arc;

fn store(agg: AggType) -> SegmentStore {
    SegmentStore::new(1_000, Arc::new(agg))
}

fn at(pool: &BlockPool, slot: u32) -> WriteContext<'_> {
    WriteContext { pool, slot }
}

fn current_ints(store: &mut SegmentStore) -> Result<Vec<(u32, i64)>> {
    let out = store.bytes(false)?;
    Ok(block::decode::<i64>(&out.data)?.values)
}

// --------------------- Empty store ---------------------

#[test]
fn empty_store_has_no_bytes_or_range() {
    let mut s = store(AggType::Sum);
    assert!(matches!(s.bytes(true), Err(StoreError::EmptyStore)));
    assert!(matches!(s.slot_range(), Err(StoreError::EmptyStore)));
    assert_eq!(s.mem_size(), EMPTY_SEGMENT_STORE_SIZE);
    assert_eq!(s.value_type(), None);
}

#[test]
fn single_write_gives_one_slot_range() -> Result<()> {
    let pool = BlockPool::new(60, 4);
    let mut s = store(AggType::Sum);
    s.write_int(42, &at(&pool, 17))?;

    let out = s.bytes(true)?;
    assert_eq!(out.slot_range, Some(SlotRange::new(17, 17)));
    assert_eq!(block::decode_slot_range(&out.data)?, SlotRange::new(17, 17));

    let without = s.bytes(false)?;
    assert_eq!(without.slot_range, None);
    Ok(())
}

// --------------------- Memory accounting ---------------------

#[test]
fn first_write_charges_the_block_then_nothing() -> Result<()> {
    let pool = BlockPool::new(60, 4);
    let mut s = store(AggType::Sum);

    let first = s.write_int(1, &at(&pool, 10))?;
    let block_size = s.block().map(|b| b.mem_size()).unwrap_or_default();
    assert_eq!(first, block_size as isize);
    assert_eq!(s.mem_size(), EMPTY_SEGMENT_STORE_SIZE + block_size);

    let mut last = s.mem_size();
    for slot in 11..70 {
        let delta = s.write_int(i64::from(slot), &at(&pool, slot))?;
        assert_eq!(delta, 0);
        assert!(s.mem_size() >= last);
        last = s.mem_size();
    }
    Ok(())
}

#[test]
fn bytes_then_rewrite_folds_and_keeps_size() -> Result<()> {
    let pool = BlockPool::new(60, 4);
    let mut s = store(AggType::Sum);

    s.write_int(10, &at(&pool, 3))?;
    let out = s.bytes(true)?;
    assert_eq!(out.slot_range, Some(SlotRange::new(3, 3)));
    let size = s.mem_size();

    let delta = s.write_int(7, &at(&pool, 3))?;
    assert_eq!(delta, 0);
    assert_eq!(s.mem_size(), size);
    assert_eq!(current_ints(&mut s)?, vec![(3, 17)]);
    Ok(())
}

// --------------------- Rollup ---------------------

#[test]
fn same_slot_rolls_up_through_agg_func() -> Result<()> {
    let pool = BlockPool::new(60, 4);

    let mut sum = store(AggType::Sum);
    sum.write_int(4, &at(&pool, 5))?;
    sum.write_int(6, &at(&pool, 5))?;
    assert_eq!(current_ints(&mut sum)?, vec![(5, 10)]);

    let mut max = store(AggType::Max);
    max.write_int(9, &at(&pool, 5))?;
    max.write_int(2, &at(&pool, 5))?;
    let live = max.block().and_then(|b| b.as_int()).map(|b| b.get(0));
    assert_eq!(live, Some(9));

    let mut last = store(AggType::Last);
    last.write_float(1.5, &at(&pool, 8))?;
    last.write_float(2.5, &at(&pool, 8))?;
    let out = last.bytes(false)?;
    assert_eq!(block::decode::<f64>(&out.data)?.values, vec![(8, 2.5)]);
    Ok(())
}

// --------------------- Window rollover ---------------------

#[test]
fn full_window_round_trips_slot_range() -> Result<()> {
    let pool = BlockPool::new(60, 4);
    let mut s = store(AggType::Sum);
    for slot in 5..65 {
        s.write_int(i64::from(slot) * 2, &at(&pool, slot))?;
    }
    assert_eq!(s.sealed_count(), 0);

    let out = s.bytes(true)?;
    let range = out.slot_range.unwrap_or(SlotRange::new(0, 0));
    assert_eq!(range, SlotRange::new(5, 64));
    assert_eq!(block::decode_slot_range(&out.data)?, range);

    let values = block::decode::<i64>(&out.data)?.values;
    assert_eq!(values.len(), 60);
    assert_eq!(values[0], (5, 10));
    assert_eq!(values[59], (64, 128));
    Ok(())
}

#[test]
fn later_slot_rolls_window_forward() -> Result<()> {
    init_logger();
    let pool = BlockPool::new(60, 4);
    let mut s = store(AggType::Sum);

    s.write_int(1, &at(&pool, 10))?;
    let before = s.mem_size();
    s.write_int(2, &at(&pool, 75))?;

    assert_eq!(s.sealed_count(), 1);
    assert_eq!(s.block().map(|b| b.start_time()), Some(75));
    assert_eq!(s.slot_range()?, SlotRange::new(75, 75));
    assert!(s.mem_size() > before);
    assert_eq!(current_ints(&mut s)?, vec![(75, 2)]);

    let sealed = s.take_sealed();
    assert_eq!(sealed.len(), 1);
    assert_eq!(block::decode::<i64>(&sealed[0])?.values, vec![(10, 1)]);
    Ok(())
}

#[test]
fn earlier_slot_rolls_window_backward() -> Result<()> {
    let pool = BlockPool::new(60, 4);
    let mut s = store(AggType::Sum);

    s.write_int(1, &at(&pool, 30))?;
    s.write_int(2, &at(&pool, 10))?;

    assert_eq!(s.sealed_count(), 1);
    assert_eq!(s.block().map(|b| b.start_time()), Some(10));
    assert_eq!(s.slot_range()?, SlotRange::new(10, 10));
    Ok(())
}

#[test]
fn window_edge_is_exclusive() -> Result<()> {
    let pool = BlockPool::new(60, 4);
    let mut s = store(AggType::Sum);

    s.write_int(1, &at(&pool, 100))?;
    s.write_int(2, &at(&pool, 159))?;
    assert_eq!(s.sealed_count(), 0);

    s.write_int(3, &at(&pool, 160))?;
    assert_eq!(s.sealed_count(), 1);
    assert_eq!(s.block().map(|b| b.start_time()), Some(160));
    Ok(())
}

#[test]
fn slot_range_spans_compacted_and_live_data() -> Result<()> {
    let pool = BlockPool::new(60, 4);
    let mut s = store(AggType::Sum);

    s.write_int(1, &at(&pool, 20))?;
    s.bytes(false)?;
    s.write_int(1, &at(&pool, 50))?;

    assert_eq!(s.slot_range()?, SlotRange::new(20, 50));
    Ok(())
}

// --------------------- Compaction failures ---------------------

/// Replaces the compacted bytes with garbage, keeping the reserved capacity.
fn corrupt_compacted(s: &mut SegmentStore) {
    if let Some(b) = s.block_mut() {
        let mut raw = b.take_compacted();
        raw.clear();
        raw.extend_from_slice(&[0u8; 8]);
        b.replace_compacted(raw);
    }
}

#[test]
fn failed_rollover_compaction_drops_window_and_keeps_writing() -> Result<()> {
    init_logger();
    let pool = BlockPool::new(60, 4);
    let mut s = store(AggType::Sum);

    s.write_int(1, &at(&pool, 10))?;
    corrupt_compacted(&mut s);
    let before = s.mem_size();

    let delta = s.write_int(2, &at(&pool, 75))?;
    assert_eq!(delta, 0);
    assert_eq!(s.mem_size(), before);
    assert_eq!(s.sealed_count(), 0);
    assert_eq!(s.block().map(|b| b.start_time()), Some(75));
    assert_eq!(s.slot_range()?, SlotRange::new(75, 75));
    assert_eq!(current_ints(&mut s)?, vec![(75, 2)]);
    Ok(())
}

#[test]
fn bytes_reports_compaction_failure_and_keeps_live_values() -> Result<()> {
    let pool = BlockPool::new(60, 4);
    let mut s = store(AggType::Sum);

    s.write_int(7, &at(&pool, 5))?;
    corrupt_compacted(&mut s);

    assert!(matches!(s.bytes(true), Err(StoreError::Compaction(_))));
    assert_eq!(s.slot_range()?, SlotRange::new(5, 5));
    assert!(s.block().map_or(false, |b| b.has_value(0)));
    Ok(())
}

// --------------------- Value types ---------------------

#[test]
fn mismatched_value_type_is_rejected() -> Result<()> {
    let pool = BlockPool::new(60, 4);
    let mut s = store(AggType::Sum);
    s.write_int(1, &at(&pool, 1))?;

    let err = s.write_float(1.0, &at(&pool, 2)).unwrap_err();
    assert!(matches!(
        err,
        StoreError::ValueTypeMismatch {
            expected: ValueType::Integer,
            actual: ValueType::Float,
        }
    ));
    assert_eq!(s.value_type(), Some(ValueType::Integer));
    Ok(())
}

// --------------------- Scan ---------------------

#[test]
fn scan_emits_sealed_windows_then_current() -> Result<()> {
    let pool = BlockPool::new(60, 4);
    let mut s = store(AggType::Sum);
    s.write_int(1, &at(&pool, 10))?;
    s.write_int(2, &at(&pool, 75))?;
    s.write_int(3, &at(&pool, 76))?;

    let worker = RecordingWorker::new();
    let ctx = ScanContext::new(vec![1], worker.clone());
    let meta = super::helpers::int_meta(1, AggType::Sum);
    let mut agg = worker
        .series_aggregator(0, 9, &meta)
        .ok_or_else(|| anyhow::anyhow!("no aggregator"))?;
    s.scan(agg.as_mut(), &ctx);

    let seen: Vec<(i64, u32, FieldValue)> = worker
        .emitted()
        .into_iter()
        .map(|e| (e.family_time, e.slot, e.value))
        .collect();
    assert_eq!(
        seen,
        vec![
            (1_000, 10, FieldValue::Int(1)),
            (1_000, 75, FieldValue::Int(2)),
            (1_000, 76, FieldValue::Int(3)),
        ]
    );
    Ok(())
}

#[test]
fn scan_respects_slot_range_filter() -> Result<()> {
    let pool = BlockPool::new(60, 4);
    let mut s = store(AggType::Sum);
    for slot in 0..10 {
        s.write_int(i64::from(slot), &at(&pool, slot))?;
    }

    let worker = RecordingWorker::new();
    let ctx = ScanContext::new(vec![1], worker.clone()).with_slot_range(SlotRange::new(3, 5));
    let meta = super::helpers::int_meta(1, AggType::Sum);
    let mut agg = worker
        .series_aggregator(0, 9, &meta)
        .ok_or_else(|| anyhow::anyhow!("no aggregator"))?;
    s.scan(agg.as_mut(), &ctx);

    let slots: Vec<u32> = worker.emitted().iter().map(|e| e.slot).collect();
    assert_eq!(slots, vec![3, 4, 5]);
    Ok(())
}
