use block::{BlockError, ValueType};
use thiserror::Error;

/// Errors surfaced by segment stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No block was ever allocated: there is no data to export.
    #[error("segment store is empty")]
    EmptyStore,

    /// Compaction failed during an explicit export.
    #[error("compaction failed: {0}")]
    Compaction(#[from] BlockError),

    /// A sample of one value type was written into a store holding the other.
    #[error("value type mismatch: store holds {expected} values, write carried {actual}")]
    ValueTypeMismatch {
        expected: ValueType,
        actual: ValueType,
    },
}
