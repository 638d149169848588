use tally_columnar::{ColumnType, ColumnarError};

pub type TallyResult<T> = Result<T, TallyError>;

#[derive(Debug, thiserror::Error)]
pub enum TallyError {
    #[error("cut {0} already exists")]
    DuplicateCut(String),
    #[error("cut \"{0}\" not defined")]
    UnknownCut(String),
    #[error("cannot add {what} with no name")]
    EmptyName { what: &'static str },
    #[error("cut {cut} has {expected} categories but {actual} targets were given")]
    CategoryCountMismatch {
        cut: String,
        expected: usize,
        actual: usize,
    },
    #[error("record table {table} already has the maximum of {max} fields")]
    TooManyFields { table: String, max: usize },
    #[error("record table {table} already has a field named {field}")]
    DuplicateField { table: String, field: String },
    #[error("prescale factor must be positive")]
    InvalidPrescale,
    #[error("alias {0} already exists")]
    DuplicateAlias(String),
    #[error("column with name {0} already exists in the dataset; cannot define alias")]
    AliasShadowsColumn(String),
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("parse error: {0}")]
    Parse(String),
    #[error("unknown column {column} in expression {expr:?}")]
    UnknownColumn { expr: String, column: String },
    #[error("lookup source {source_kind} has {expected} dimensions but {actual} expressions were given")]
    LookupDimension {
        source_kind: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("empty expression")]
    EmptyExpression,

    #[error("could not find column {column} in shard {shard}")]
    MissingColumn { shard: String, column: String },
    #[error("do not know how to read column {column} of type {column_type}")]
    UnreadableColumnType {
        column: String,
        column_type: ColumnType,
    },
    #[error("category index out of bounds for {target}: index {category} >= maximum {categories}")]
    CategoryOutOfBounds {
        target: String,
        category: i32,
        categories: usize,
    },
    #[error("shard {shard} is unavailable: {reason}")]
    UnavailableShard { shard: String, reason: String },
    #[error(transparent)]
    Columnar(ColumnarError),

    #[error("function {0} used before it was linked")]
    UnlinkedFunction(String),

    #[error("cannot merge {target}: {reason}")]
    IncompatibleMerge { target: String, reason: String },

    #[error("invalid options: {0}")]
    Options(#[from] serde_json::Error),
}

impl From<ColumnarError> for TallyError {
    fn from(err: ColumnarError) -> Self {
        match err {
            ColumnarError::UnavailableShard { shard, reason } => {
                TallyError::UnavailableShard { shard, reason }
            }
            other => TallyError::Columnar(other),
        }
    }
}

impl TallyError {
    /// Runtime read errors may be skipped instead of aborting the run.
    pub fn is_read_error(&self) -> bool {
        matches!(
            self,
            TallyError::MissingColumn { .. }
                | TallyError::UnreadableColumnType { .. }
                | TallyError::CategoryOutOfBounds { .. }
                | TallyError::UnavailableShard { .. }
        )
    }
}
