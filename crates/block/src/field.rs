//! Value types and the rollup (aggregation-on-write) policy of a field.

use std::fmt;

/// Physical type of the values a block stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Integer = 1,
    Float = 2,
}

impl ValueType {
    /// Tag written into the compacted block header.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parses a header tag; `None` for unknown tags.
    #[must_use]
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ValueType::Integer),
            2 => Some(ValueType::Float),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Integer => f.write_str("integer"),
            ValueType::Float => f.write_str("float"),
        }
    }
}

/// A single sample value, tagged with its type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
}

impl FieldValue {
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            FieldValue::Int(_) => ValueType::Integer,
            FieldValue::Float(_) => ValueType::Float,
        }
    }

    /// Lossy numeric view, convenient for downstream aggregation.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        match self {
            FieldValue::Int(v) => *v as f64,
            FieldValue::Float(v) => *v,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Kind of rollup a field performs; exposed so the query layer knows how to
/// combine values coming out of different stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggType {
    Sum,
    Min,
    Max,
    First,
    Last,
}

impl AggType {
    /// Case-insensitive name lookup (`sum`, `min`, `max`, `first`, `last`).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sum" => Some(AggType::Sum),
            "min" => Some(AggType::Min),
            "max" => Some(AggType::Max),
            "first" => Some(AggType::First),
            "last" => Some(AggType::Last),
            _ => None,
        }
    }
}

impl fmt::Display for AggType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggType::Sum => "sum",
            AggType::Min => "min",
            AggType::Max => "max",
            AggType::First => "first",
            AggType::Last => "last",
        };
        f.write_str(name)
    }
}

/// Rollup policy injected per field.
///
/// `old` is always the value already stored for the slot and `new` the one
/// being written (or, during compaction, the earlier compacted value and the
/// live one).
pub trait AggFunc: Send + Sync {
    fn aggregate_int(&self, old: i64, new: i64) -> i64;
    fn aggregate_float(&self, old: f64, new: f64) -> f64;
    fn agg_type(&self) -> AggType;
}

/// The built-in policies.
impl AggFunc for AggType {
    fn aggregate_int(&self, old: i64, new: i64) -> i64 {
        match self {
            AggType::Sum => old.saturating_add(new),
            AggType::Min => old.min(new),
            AggType::Max => old.max(new),
            AggType::First => old,
            AggType::Last => new,
        }
    }

    fn aggregate_float(&self, old: f64, new: f64) -> f64 {
        match self {
            AggType::Sum => old + new,
            AggType::Min => old.min(new),
            AggType::Max => old.max(new),
            AggType::First => old,
            AggType::Last => new,
        }
    }

    fn agg_type(&self) -> AggType {
        *self
    }
}
