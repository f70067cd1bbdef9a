use anyhow::{anyhow, Context, Result};
use block::{AggType, FieldValue};
use memdb::{
    FieldId, FieldMeta, FieldSegment, MemDb, ScanContext, ScanWorker, SeriesAggregator, SeriesId,
    StoreError, Version, WritePoint,
};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

/// What the shell should do after a command.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Print the text (if any) and read the next line.
    Continue(String),
    /// Print the text and stop.
    Exit(String),
}

/// Executes one input line against `db`.
pub fn execute(db: &MemDb, line: &str) -> Outcome {
    let mut parts = line.split_whitespace();
    let cmd = match parts.next() {
        Some(cmd) => cmd.to_uppercase(),
        None => return Outcome::Continue(String::new()),
    };
    let args: Vec<&str> = parts.collect();

    let result = match cmd.as_str() {
        "WRITE" => write(db, &args),
        "SCAN" => scan(db, &args),
        "BYTES" => bytes(db, &args),
        "RANGE" => range(db, &args),
        "FLUSH" => flush(db, &args),
        "EVICT" => evict(db, &args),
        "STATS" => Ok(format!("{:?}", db)),
        "EXIT" | "QUIT" => return Outcome::Exit("bye".to_string()),
        other => Ok(format!("unknown command: {}", other)),
    };

    match result {
        Ok(out) => Outcome::Continue(out),
        Err(e) => Outcome::Continue(format!("ERR {:#}", e)),
    }
}

fn parse<T: FromStr>(token: &str, what: &str) -> Result<T> {
    token
        .parse()
        .map_err(|_| anyhow!("invalid {}: {}", what, token))
}

/// Integers stay integers; anything else numeric becomes a float.
fn parse_value(token: &str) -> Result<FieldValue> {
    if let Ok(v) = token.parse::<i64>() {
        return Ok(FieldValue::Int(v));
    }
    token
        .parse::<f64>()
        .map(FieldValue::Float)
        .map_err(|_| anyhow!("invalid value: {}", token))
}

fn parse_list<T: FromStr>(token: &str, what: &str) -> Result<Vec<T>> {
    token.split(',').map(|t| parse(t, what)).collect()
}

fn write(db: &MemDb, args: &[&str]) -> Result<String> {
    anyhow::ensure!(
        (5..=6).contains(&args.len()),
        "usage: WRITE series field family slot value [agg]"
    );
    let agg_type = match args.get(5) {
        Some(name) => AggType::parse(name).ok_or_else(|| anyhow!("unknown agg: {}", name))?,
        None => AggType::Sum,
    };
    let point = WritePoint::new(
        parse(args[0], "series")?,
        parse(args[1], "field")?,
        parse(args[2], "family")?,
        parse(args[3], "slot")?,
        parse_value(args[4])?,
        agg_type,
    );

    let delta = db.write(&point)?;
    Ok(format!("OK (delta={}, mem={})", delta, db.mem_size()))
}

/// Runs `f` on the segment store of `(series, field, family)`.
fn with_segment<R>(
    db: &MemDb,
    args: &[&str],
    usage: &str,
    f: impl FnOnce(&mut memdb::SegmentStore) -> Result<R>,
) -> Result<Option<R>> {
    anyhow::ensure!(args.len() == 3, "usage: {}", usage);
    let series_id: SeriesId = parse(args[0], "series")?;
    let field_id: FieldId = parse(args[1], "field")?;
    let family_time: i64 = parse(args[2], "family")?;

    let field = match db.series(series_id).and_then(|s| s.field(field_id)) {
        Some(field) => field,
        None => return Ok(None),
    };
    let mut field = field.lock().unwrap_or_else(PoisonError::into_inner);
    match field.segment_mut(family_time) {
        Some(segment) => f(segment).map(Some),
        None => Ok(None),
    }
}

fn bytes(db: &MemDb, args: &[&str]) -> Result<String> {
    let out = with_segment(db, args, "BYTES series field family", |segment| {
        match segment.bytes(true) {
            Ok(out) => Ok(Some(out)),
            Err(StoreError::EmptyStore) => Ok(None),
            Err(e) => Err(e).context("compaction failed"),
        }
    })?;

    let out = match out.flatten() {
        Some(out) => out,
        None => return Ok("(empty)".to_string()),
    };
    let mut text = match out.slot_range {
        Some(r) => format!("range=[{}, {}] len={}\n", r.start, r.end, out.data.len()),
        None => format!("len={}\n", out.data.len()),
    };
    for byte in &out.data {
        let _ = write!(text, "{:02x}", byte);
    }
    Ok(text)
}

fn range(db: &MemDb, args: &[&str]) -> Result<String> {
    let r = with_segment(db, args, "RANGE series field family", |segment| {
        Ok(segment.slot_range().ok())
    })?;
    Ok(match r.flatten() {
        Some(r) => format!("[{}, {}]", r.start, r.end),
        None => "(empty)".to_string(),
    })
}

fn flush(db: &MemDb, args: &[&str]) -> Result<String> {
    anyhow::ensure!(args.len() == 1, "usage: FLUSH family");
    let family_time: i64 = parse(args[0], "family")?;

    let flushed = db.flush_family(family_time)?;
    let mut text = String::new();
    for seg in &flushed {
        let bytes: usize = seg.blocks.iter().map(Vec::len).sum();
        let _ = writeln!(
            text,
            "series={} field={} family={} blocks={} bytes={}",
            seg.series_id,
            seg.field_id,
            seg.family_time,
            seg.blocks.len(),
            bytes
        );
    }
    let _ = write!(text, "OK ({} segments, mem={})", flushed.len(), db.mem_size());
    Ok(text)
}

fn evict(db: &MemDb, args: &[&str]) -> Result<String> {
    anyhow::ensure!(args.len() == 1, "usage: EVICT series");
    let freed = db.evict_series(parse(args[0], "series")?);
    Ok(format!("OK (freed {} bytes)", freed))
}

type Lines = Arc<Mutex<Vec<(SeriesId, FieldId, i64, u32, FieldValue)>>>;

/// Worker collecting scanned values for printing.
#[derive(Default)]
struct PrintWorker {
    lines: Lines,
    completed: Mutex<usize>,
}

struct PrintAggregator {
    series_id: SeriesId,
    field_id: FieldId,
    lines: Lines,
}

impl SeriesAggregator for PrintAggregator {
    fn aggregate(&mut self, family_time: i64, slot: u32, value: FieldValue) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((self.series_id, self.field_id, family_time, slot, value));
    }
}

impl ScanWorker for PrintWorker {
    fn series_aggregator(
        &self,
        _version: Version,
        series_id: SeriesId,
        field: &FieldMeta,
    ) -> Option<Box<dyn SeriesAggregator>> {
        Some(Box::new(PrintAggregator {
            series_id,
            field_id: field.field_id,
            lines: self.lines.clone(),
        }))
    }

    fn complete(&self, _series_id: SeriesId) {
        *self.completed.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }
}

/// Field metadata as the buffered data describes it.
fn field_metas(db: &MemDb, series_ids: &[SeriesId], field_ids: &[FieldId]) -> HashMap<FieldId, FieldMeta> {
    let mut metas = HashMap::new();
    for series in series_ids.iter().filter_map(|id| db.series(*id)) {
        for field_id in field_ids {
            if metas.contains_key(field_id) {
                continue;
            }
            let meta = series
                .field(*field_id)
                .and_then(|field| field.lock().unwrap_or_else(PoisonError::into_inner).meta());
            if let Some(meta) = meta {
                metas.insert(*field_id, meta);
            }
        }
    }
    metas
}

fn scan(db: &MemDb, args: &[&str]) -> Result<String> {
    anyhow::ensure!(
        args.len() == 2 || args.len() == 4,
        "usage: SCAN series[,series..] field[,field..] [start end]"
    );
    let series_ids: Vec<SeriesId> = parse_list(args[0], "series")?;
    let field_ids: Vec<FieldId> = parse_list(args[1], "field")?;

    let worker = Arc::new(PrintWorker::default());
    let mut ctx = ScanContext::new(field_ids.clone(), worker.clone());
    if args.len() == 4 {
        let start: u32 = parse(args[2], "start")?;
        let end: u32 = parse(args[3], "end")?;
        anyhow::ensure!(start <= end, "start {} is after end {}", start, end);
        ctx = ctx.with_slot_range(block::SlotRange::new(start, end));
    }

    let metas = field_metas(db, &series_ids, &field_ids);
    db.scan(&ctx, 0, &series_ids, &metas);

    let lines = worker.lines.lock().unwrap_or_else(PoisonError::into_inner);
    let completed = *worker.completed.lock().unwrap_or_else(PoisonError::into_inner);
    let mut text = String::new();
    for (series_id, field_id, family_time, slot, value) in lines.iter() {
        let _ = writeln!(
            text,
            "series={} field={} family={} slot={} value={}",
            series_id, field_id, family_time, slot, value
        );
    }
    let _ = write!(text, "({} values, {} series)", lines.len(), completed);
    Ok(text)
}
