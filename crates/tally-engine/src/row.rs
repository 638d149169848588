use crate::alias::AliasTable;
use std::sync::Arc;
use tally_columnar::{Dataset, Shard};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LeafRef {
    Column(usize),
    Alias(usize),
    Missing,
}

#[derive(Clone, Debug)]
struct Leaf {
    name: String,
    binding: LeafRef,
    jagged: bool,
}

/// Handle to a column (or alias) read by a function-kind expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ColumnHandle(pub(crate) usize);

impl ColumnHandle {
    pub fn len(self, row: &RowContext) -> usize {
        row.len(self.0)
    }

    pub fn is_empty(self, row: &RowContext) -> bool {
        self.len(row) == 0
    }

    /// Value `i` of the current row, `0.0` when out of range.
    pub fn get(self, row: &RowContext, i: usize) -> f64 {
        row.value(self.0, i)
    }
}

/// The row a worker is positioned on: the current shard and row, the leaves compiled expressions
/// read, and the worker's alias table.
///
/// Leaves are registered by name when expressions are compiled and re-resolved against every new
/// shard, so column positions may differ between shards.
#[derive(Debug)]
pub struct RowContext {
    shard: Option<Arc<Shard>>,
    local_row: usize,
    entry: u64,
    leaves: Vec<Leaf>,
    aliases: AliasTable,
}

impl RowContext {
    /// Context positioned before the first row of the first readable shard of `dataset`.
    pub fn new(dataset: &Dataset) -> Self {
        Self {
            shard: dataset.shards().iter().find_map(|h| h.shard().cloned()),
            local_row: 0,
            entry: 0,
            leaves: Vec::new(),
            aliases: AliasTable::default(),
        }
    }

    pub fn shard(&self) -> Option<&Arc<Shard>> {
        self.shard.as_ref()
    }

    pub fn local_row(&self) -> usize {
        self.local_row
    }

    pub fn entry(&self) -> u64 {
        self.entry
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub(crate) fn aliases_mut(&mut self) -> &mut AliasTable {
        &mut self.aliases
    }

    pub(crate) fn set_position(&mut self, local_row: usize, entry: u64) {
        self.local_row = local_row;
        self.entry = entry;
    }

    /// Binds every registered leaf to `shard`, returning the names that could not be found.
    pub(crate) fn set_shard(&mut self, shard: Arc<Shard>) -> Vec<String> {
        self.shard = Some(shard);
        let mut missing = Vec::new();
        for idx in 0..self.leaves.len() {
            let (binding, jagged) = self.resolve(&self.leaves[idx].name);
            if binding == LeafRef::Missing {
                missing.push(self.leaves[idx].name.clone());
            }
            let leaf = &mut self.leaves[idx];
            leaf.binding = binding;
            leaf.jagged = jagged;
        }
        missing
    }

    fn resolve(&self, name: &str) -> (LeafRef, bool) {
        if let Some(slot) = self.aliases.slot(name) {
            let jagged = self.aliases.layout(slot).is_some_and(|l| l.is_array());
            return (LeafRef::Alias(slot), jagged);
        }
        let column = self.shard.as_ref().and_then(|shard| {
            let idx = shard.column_index(name)?;
            Some((idx, shard.column(idx)?.is_jagged()))
        });
        match column {
            Some((idx, jagged)) => (LeafRef::Column(idx), jagged),
            None => (LeafRef::Missing, false),
        }
    }

    /// Whether `name` is a column of the current shard (aliases excluded).
    pub fn has_column(&self, name: &str) -> bool {
        self.shard
            .as_ref()
            .is_some_and(|shard| shard.column_index(name).is_some())
    }

    /// Leaf id for `name`, registering it on first use. `None` if no such column or alias exists.
    pub(crate) fn leaf(&mut self, name: &str) -> Option<usize> {
        if let Some(idx) = self.leaves.iter().position(|leaf| leaf.name == name) {
            return Some(idx);
        }
        let (binding, jagged) = self.resolve(name);
        if binding == LeafRef::Missing {
            return None;
        }
        self.leaves.push(Leaf {
            name: name.to_string(),
            binding,
            jagged,
        });
        Some(self.leaves.len() - 1)
    }

    /// Points every leaf named `from` at `to`. Returns the number of rewritten leaves.
    pub(crate) fn rename_leaf(&mut self, from: &str, to: &str) -> usize {
        let mut renamed = 0;
        for idx in 0..self.leaves.len() {
            if self.leaves[idx].name != from {
                continue;
            }
            let (binding, jagged) = self.resolve(to);
            let leaf = &mut self.leaves[idx];
            leaf.name = to.to_string();
            leaf.binding = binding;
            leaf.jagged = jagged;
            renamed += 1;
        }
        renamed
    }

    pub fn leaf_name(&self, leaf: usize) -> Option<&str> {
        self.leaves.get(leaf).map(|l| l.name.as_str())
    }

    pub(crate) fn is_jagged(&self, leaf: usize) -> bool {
        self.leaves.get(leaf).is_some_and(|l| l.jagged)
    }

    pub(crate) fn is_alias(&self, leaf: usize) -> bool {
        self.leaves
            .get(leaf)
            .is_some_and(|l| matches!(l.binding, LeafRef::Alias(_)))
    }

    pub(crate) fn len(&self, leaf: usize) -> usize {
        match self.leaves.get(leaf).map(|l| l.binding) {
            Some(LeafRef::Column(idx)) => self
                .shard
                .as_ref()
                .and_then(|shard| shard.column(idx))
                .map_or(0, |column| column.len_at(self.local_row)),
            Some(LeafRef::Alias(slot)) => self.aliases.values(slot).len(),
            Some(LeafRef::Missing) | None => 0,
        }
    }

    pub(crate) fn value(&self, leaf: usize, i: usize) -> f64 {
        match self.leaves.get(leaf).map(|l| l.binding) {
            Some(LeafRef::Column(idx)) => self
                .shard
                .as_ref()
                .and_then(|shard| shard.column(idx))
                .and_then(|column| column.f64_at(self.local_row, i))
                .unwrap_or(0.0),
            Some(LeafRef::Alias(slot)) => self.aliases.values(slot).get(i).copied().unwrap_or(0.0),
            Some(LeafRef::Missing) | None => 0.0,
        }
    }
}
