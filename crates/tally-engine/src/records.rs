use crate::error::{TallyError, TallyResult};
use serde::Serialize;

/// Maximum number of expression fields a record table holds, the `weight` field excluded.
pub const MAX_FIELDS: usize = 128;

/// Tuple-like output: one row of named scalar fields per accepted sub-index.
///
/// The first field is always `weight`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecordTable {
    name: String,
    fields: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl RecordTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: vec!["weight".to_string()],
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field names, `weight` first.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Declares a field and returns its position among the expression fields (0-based, `weight`
    /// not counted). An existing name is an error unless `rebind` is set, in which case the
    /// existing position is returned.
    pub fn add_field(&mut self, name: &str, rebind: bool) -> TallyResult<usize> {
        if let Some(pos) = self.fields.iter().position(|field| field == name) {
            if rebind && pos > 0 {
                return Ok(pos - 1);
            }
            return Err(TallyError::DuplicateField {
                table: self.name.clone(),
                field: name.to_string(),
            });
        }
        if self.fields.len() > MAX_FIELDS {
            return Err(TallyError::TooManyFields {
                table: self.name.clone(),
                max: MAX_FIELDS,
            });
        }
        self.fields.push(name.to_string());
        Ok(self.fields.len() - 2)
    }

    /// Appends one row. Missing trailing values are written as `0.0`.
    pub fn append(&mut self, weight: f64, values: &[f64]) {
        let mut row = Vec::with_capacity(self.fields.len());
        row.push(weight);
        row.extend(values.iter().copied().take(self.fields.len() - 1));
        row.resize(self.fields.len(), 0.0);
        self.rows.push(row);
    }

    /// Every value of `field`, in row order.
    pub fn column(&self, field: &str) -> Option<Vec<f64>> {
        let pos = self.fields.iter().position(|f| f == field)?;
        Some(self.rows.iter().map(|row| row[pos]).collect())
    }

    pub fn empty_clone(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: self.fields.clone(),
            rows: Vec::new(),
        }
    }

    /// Concatenates the rows of `other`.
    pub fn append_table(&mut self, other: &RecordTable) -> TallyResult<()> {
        if self.fields != other.fields {
            return Err(TallyError::IncompatibleMerge {
                target: self.name.clone(),
                reason: format!("fields differ from {}", other.name),
            });
        }
        self.rows.extend(other.rows.iter().cloned());
        Ok(())
    }
}
