use crate::types::{ColumnShape, ColumnType};

pub type ColumnarResult<T> = Result<T, ColumnarError>;

#[derive(Debug, thiserror::Error)]
pub enum ColumnarError {
    #[error("schema mismatch for shard {shard}: expected {expected} values, got {actual}")]
    SchemaMismatch {
        shard: String,
        expected: usize,
        actual: usize,
    },

    #[error("type mismatch for {shard}[{column}]: expected {expected}, got {actual}")]
    TypeMismatch {
        shard: String,
        column: String,
        expected: ColumnType,
        actual: ColumnType,
    },

    #[error("shape mismatch for {shard}[{column}]: column is {expected:?}")]
    ShapeMismatch {
        shard: String,
        column: String,
        expected: ColumnShape,
    },

    #[error("duplicate column {shard}[{column}]")]
    DuplicateColumn { shard: String, column: String },

    #[error("shard {shard} is unavailable: {reason}")]
    UnavailableShard { shard: String, reason: String },

    #[error("shard index {index} out of range ({count} shards)")]
    ShardOutOfRange { index: usize, count: usize },

    #[error("row {row} out of range for shard {shard} ({rows} rows)")]
    RowOutOfRange { shard: String, row: u64, rows: u64 },
}
