use crate::expr::Multiplicity;
use serde::Serialize;
use smallvec::SmallVec;

/// Storage class of one derived column, fixed when the alias is compiled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AliasLayout {
    pub name: String,
    pub multiplicity: Multiplicity,
}

impl AliasLayout {
    /// Everything but a scalar alias is stored as a variable-length array; optional values
    /// (at most one element) included.
    pub fn is_array(&self) -> bool {
        !matches!(self.multiplicity, Multiplicity::Scalar)
    }
}

pub(crate) type AliasValues = SmallVec<[f64; 4]>;

/// Auxiliary per-worker table of alias values joined to the dataset row by row.
///
/// Rows are only ever appended and read back at the current entry, so the table keeps the latest
/// row and the number of rows appended so far.
#[derive(Clone, Debug, Default)]
pub struct AliasTable {
    layouts: Vec<AliasLayout>,
    values: Vec<AliasValues>,
    rows: u64,
}

impl AliasTable {
    pub fn layouts(&self) -> &[AliasLayout] {
        &self.layouts
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Number of rows appended since the table was created.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub(crate) fn declare(&mut self, layout: AliasLayout) -> usize {
        self.layouts.push(layout);
        self.values.push(AliasValues::new());
        self.layouts.len() - 1
    }

    pub fn slot(&self, name: &str) -> Option<usize> {
        self.layouts.iter().position(|layout| layout.name == name)
    }

    pub fn layout(&self, slot: usize) -> Option<&AliasLayout> {
        self.layouts.get(slot)
    }

    pub fn values(&self, slot: usize) -> &[f64] {
        self.values.get(slot).map_or(&[], |values| values.as_slice())
    }

    pub(crate) fn set(&mut self, slot: usize, values: AliasValues) {
        if let Some(current) = self.values.get_mut(slot) {
            *current = values;
        }
    }

    pub(crate) fn finish_row(&mut self) {
        self.rows += 1;
    }
}
