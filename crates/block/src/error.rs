use crate::field::ValueType;
use std::io;
use thiserror::Error;

/// Convenience `Result` for block operations.
pub type Result<T> = std::result::Result<T, BlockError>;

/// Failures of block compaction and of decoding compacted bytes.
#[derive(Debug, Error)]
pub enum BlockError {
    /// Compaction was asked for a block that holds no value at all.
    #[error("block holds no data to compact")]
    EmptyBlock,

    /// Compacted bytes are structurally invalid.
    #[error("corrupt compacted block: {0}")]
    Corrupt(String),

    /// Compacted bytes do not match their trailing CRC32.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    Checksum { expected: u32, actual: u32 },

    /// Compacted bytes carry a different value type than the decoder asked for.
    #[error("value type mismatch: expected {expected}, found {actual}")]
    ValueTypeMismatch {
        expected: ValueType,
        actual: ValueType,
    },

    #[error("encoding I/O error: {0}")]
    Io(#[from] io::Error),
}
