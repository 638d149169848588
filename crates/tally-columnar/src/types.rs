use std::fmt;

/// Physical value type of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Float32,
    Float64,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Bool,
}

impl ColumnType {
    pub fn is_float(self) -> bool {
        matches!(self, ColumnType::Float32 | ColumnType::Float64)
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ColumnType::Int32 | ColumnType::UInt32 | ColumnType::Int64 | ColumnType::UInt64
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(self, ColumnType::UInt32 | ColumnType::UInt64)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Float32 => "f32",
            ColumnType::Float64 => "f64",
            ColumnType::Int32 => "i32",
            ColumnType::UInt32 => "u32",
            ColumnType::Int64 => "i64",
            ColumnType::UInt64 => "u64",
            ColumnType::Bool => "bool",
        };
        f.write_str(name)
    }
}

/// Whether a column holds one value per row or a variable-length list per row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnShape {
    Scalar,
    Jagged,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Float32(f32),
    Float64(f64),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Bool(bool),
}

impl Value {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Float32(_) => ColumnType::Float32,
            Value::Float64(_) => ColumnType::Float64,
            Value::Int32(_) => ColumnType::Int32,
            Value::UInt32(_) => ColumnType::UInt32,
            Value::Int64(_) => ColumnType::Int64,
            Value::UInt64(_) => ColumnType::UInt64,
            Value::Bool(_) => ColumnType::Bool,
        }
    }

    /// Numeric view used by the expression evaluator. Booleans map to `0.0` / `1.0`.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Float32(v) => f64::from(v),
            Value::Float64(v) => v,
            Value::Int32(v) => f64::from(v),
            Value::UInt32(v) => f64::from(v),
            Value::Int64(v) => v as f64,
            Value::UInt64(v) => v as f64,
            Value::Bool(v) => {
                if v {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Unsigned view of an integer value (signed values are reinterpreted, as a C cast would).
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::Int32(v) => Some(v as u64),
            Value::UInt32(v) => Some(u64::from(v)),
            Value::Int64(v) => Some(v as u64),
            Value::UInt64(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// One row's worth of input for a single column when building a shard.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Scalar(Value),
    Array(Vec<Value>),
}

macro_rules! scalar_cell_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Cell {
                fn from(v: $ty) -> Self {
                    Cell::Scalar(Value::from(v))
                }
            }
        )*
    };
}

scalar_cell_from!(f64, f32, i32, u32, i64, u64, bool);

impl From<Value> for Cell {
    fn from(v: Value) -> Self {
        Cell::Scalar(v)
    }
}

impl Cell {
    pub fn array<T: Into<Value>>(values: impl IntoIterator<Item = T>) -> Self {
        Cell::Array(values.into_iter().map(Into::into).collect())
    }
}
