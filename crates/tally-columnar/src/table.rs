use crate::error::{ColumnarError, ColumnarResult};
use crate::types::{Cell, ColumnShape, ColumnType, Value};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: ColumnType,
    pub shape: ColumnShape,
}

impl ColumnSchema {
    pub fn scalar(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            shape: ColumnShape::Scalar,
        }
    }

    pub fn jagged(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            shape: ColumnShape::Jagged,
        }
    }
}

/// Typed backing vector of a column. Jagged columns store all rows' values back to back.
#[derive(Clone, Debug)]
enum ColumnValues {
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Bool(Vec<bool>),
}

impl ColumnValues {
    fn new(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Float32 => ColumnValues::Float32(Vec::new()),
            ColumnType::Float64 => ColumnValues::Float64(Vec::new()),
            ColumnType::Int32 => ColumnValues::Int32(Vec::new()),
            ColumnType::UInt32 => ColumnValues::UInt32(Vec::new()),
            ColumnType::Int64 => ColumnValues::Int64(Vec::new()),
            ColumnType::UInt64 => ColumnValues::UInt64(Vec::new()),
            ColumnType::Bool => ColumnValues::Bool(Vec::new()),
        }
    }

    /// Appends `value`, returning its type on mismatch.
    fn push(&mut self, value: Value) -> Result<(), ColumnType> {
        match (self, value) {
            (ColumnValues::Float32(v), Value::Float32(x)) => v.push(x),
            (ColumnValues::Float64(v), Value::Float64(x)) => v.push(x),
            (ColumnValues::Int32(v), Value::Int32(x)) => v.push(x),
            (ColumnValues::UInt32(v), Value::UInt32(x)) => v.push(x),
            (ColumnValues::Int64(v), Value::Int64(x)) => v.push(x),
            (ColumnValues::UInt64(v), Value::UInt64(x)) => v.push(x),
            (ColumnValues::Bool(v), Value::Bool(x)) => v.push(x),
            (_, other) => return Err(other.column_type()),
        }
        Ok(())
    }

    fn get(&self, idx: usize) -> Option<Value> {
        match self {
            ColumnValues::Float32(v) => v.get(idx).copied().map(Value::Float32),
            ColumnValues::Float64(v) => v.get(idx).copied().map(Value::Float64),
            ColumnValues::Int32(v) => v.get(idx).copied().map(Value::Int32),
            ColumnValues::UInt32(v) => v.get(idx).copied().map(Value::UInt32),
            ColumnValues::Int64(v) => v.get(idx).copied().map(Value::Int64),
            ColumnValues::UInt64(v) => v.get(idx).copied().map(Value::UInt64),
            ColumnValues::Bool(v) => v.get(idx).copied().map(Value::Bool),
        }
    }

    fn len(&self) -> usize {
        match self {
            ColumnValues::Float32(v) => v.len(),
            ColumnValues::Float64(v) => v.len(),
            ColumnValues::Int32(v) => v.len(),
            ColumnValues::UInt32(v) => v.len(),
            ColumnValues::Int64(v) => v.len(),
            ColumnValues::UInt64(v) => v.len(),
            ColumnValues::Bool(v) => v.len(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Column {
    schema: ColumnSchema,
    values: ColumnValues,
    /// Row boundaries into `values` for jagged columns (`rows + 1` entries).
    offsets: Option<Vec<usize>>,
}

impl Column {
    fn new(schema: ColumnSchema) -> Self {
        let offsets = match schema.shape {
            ColumnShape::Scalar => None,
            ColumnShape::Jagged => Some(vec![0]),
        };
        Self {
            values: ColumnValues::new(schema.column_type),
            schema,
            offsets,
        }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.schema.column_type
    }

    pub fn shape(&self) -> ColumnShape {
        self.schema.shape
    }

    pub fn is_jagged(&self) -> bool {
        self.offsets.is_some()
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    /// Number of values stored for `row` (always 1 for scalar columns).
    pub fn len_at(&self, row: usize) -> usize {
        match &self.offsets {
            None => usize::from(row < self.values.len()),
            Some(offsets) => match (offsets.get(row), offsets.get(row + 1)) {
                (Some(start), Some(end)) => end - start,
                _ => 0,
            },
        }
    }

    /// Value `idx` of `row`. Scalar columns only have `idx == 0`.
    pub fn value(&self, row: usize, idx: usize) -> Option<Value> {
        match &self.offsets {
            None if idx == 0 => self.values.get(row),
            None => None,
            Some(offsets) => {
                let start = *offsets.get(row)?;
                let end = *offsets.get(row + 1)?;
                if start + idx >= end {
                    return None;
                }
                self.values.get(start + idx)
            }
        }
    }

    pub fn f64_at(&self, row: usize, idx: usize) -> Option<f64> {
        self.value(row, idx).map(|v| v.as_f64())
    }

    fn push_cell(&mut self, shard: &str, cell: &Cell) -> ColumnarResult<()> {
        let type_err = |actual| ColumnarError::TypeMismatch {
            shard: shard.to_string(),
            column: self.schema.name.clone(),
            expected: self.schema.column_type,
            actual,
        };
        match (cell, &mut self.offsets) {
            (Cell::Scalar(value), None) => self.values.push(*value).map_err(type_err),
            (Cell::Array(values), Some(offsets)) => {
                for value in values {
                    self.values.push(*value).map_err(type_err)?;
                }
                offsets.push(self.values.len());
                Ok(())
            }
            _ => Err(ColumnarError::ShapeMismatch {
                shard: shard.to_string(),
                column: self.schema.name.clone(),
                expected: self.schema.shape,
            }),
        }
    }

    /// Rolls the column back to `rows` rows after a partially appended row failed.
    fn truncate_rows(&mut self, rows: usize) {
        let keep = match &mut self.offsets {
            None => rows,
            Some(offsets) => {
                offsets.truncate(rows + 1);
                offsets.last().copied().unwrap_or(0)
            }
        };
        match &mut self.values {
            ColumnValues::Float32(v) => v.truncate(keep),
            ColumnValues::Float64(v) => v.truncate(keep),
            ColumnValues::Int32(v) => v.truncate(keep),
            ColumnValues::UInt32(v) => v.truncate(keep),
            ColumnValues::Int64(v) => v.truncate(keep),
            ColumnValues::UInt64(v) => v.truncate(keep),
            ColumnValues::Bool(v) => v.truncate(keep),
        }
    }
}

/// One shard (file-like unit) of a dataset: an immutable set of equally long columns.
#[derive(Clone, Debug)]
pub struct Shard {
    name: String,
    columns: Vec<Column>,
    column_index: HashMap<String, usize>,
    rows: usize,
}

impl Shard {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn schema(&self) -> Vec<ColumnSchema> {
        self.columns.iter().map(|c| c.schema.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_index.get(name).copied()
    }

    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.column(self.column_index(name)?)
    }
}

/// Row-wise builder for a [`Shard`].
#[derive(Debug)]
pub struct ShardBuilder {
    name: String,
    columns: Vec<Column>,
    column_index: HashMap<String, usize>,
    rows: usize,
}

impl ShardBuilder {
    pub fn new(name: impl Into<String>, schema: Vec<ColumnSchema>) -> ColumnarResult<Self> {
        let name = name.into();
        let mut column_index = HashMap::with_capacity(schema.len());
        for (idx, column) in schema.iter().enumerate() {
            if column_index.insert(column.name.clone(), idx).is_some() {
                return Err(ColumnarError::DuplicateColumn {
                    shard: name,
                    column: column.name.clone(),
                });
            }
        }
        Ok(Self {
            name,
            columns: schema.into_iter().map(Column::new).collect(),
            column_index,
            rows: 0,
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Appends one row. On error the builder is left unchanged.
    pub fn append_row(&mut self, row: &[Cell]) -> ColumnarResult<()> {
        if row.len() != self.columns.len() {
            return Err(ColumnarError::SchemaMismatch {
                shard: self.name.clone(),
                expected: self.columns.len(),
                actual: row.len(),
            });
        }

        for idx in 0..self.columns.len() {
            if let Err(err) = self.columns[idx].push_cell(&self.name, &row[idx]) {
                for column in &mut self.columns[..=idx] {
                    column.truncate_rows(self.rows);
                }
                return Err(err);
            }
        }
        self.rows += 1;
        Ok(())
    }

    pub fn finalize(self) -> Shard {
        Shard {
            name: self.name,
            columns: self.columns,
            column_index: self.column_index,
            rows: self.rows,
        }
    }
}
