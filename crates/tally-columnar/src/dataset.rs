use crate::cursor::{ReadErrorPolicy, RowCursor};
use crate::entry_list::EntryList;
use crate::error::{ColumnarError, ColumnarResult};
use crate::table::{ColumnSchema, Shard};
use std::ops::Range;
use std::sync::Arc;

/// A shard slot of a dataset. Unavailable shards model inputs that could not be opened.
#[derive(Clone, Debug)]
pub enum ShardHandle {
    Loaded(Arc<Shard>),
    Unavailable { name: String, reason: String },
}

impl ShardHandle {
    pub fn name(&self) -> &str {
        match self {
            ShardHandle::Loaded(shard) => shard.name(),
            ShardHandle::Unavailable { name, .. } => name,
        }
    }

    pub fn shard(&self) -> Option<&Arc<Shard>> {
        match self {
            ShardHandle::Loaded(shard) => Some(shard),
            ShardHandle::Unavailable { .. } => None,
        }
    }

    pub fn row_count(&self) -> usize {
        self.shard().map_or(0, |shard| shard.row_count())
    }
}

/// An ordered collection of shards read as one logical table.
#[derive(Clone, Debug)]
pub struct Dataset {
    name: String,
    shards: Vec<ShardHandle>,
    concurrent_transitions: bool,
}

impl Dataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shards: Vec::new(),
            concurrent_transitions: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_shard(&mut self, shard: Shard) -> usize {
        self.shards.push(ShardHandle::Loaded(Arc::new(shard)));
        self.shards.len() - 1
    }

    pub fn add_unavailable_shard(
        &mut self,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> usize {
        self.shards.push(ShardHandle::Unavailable {
            name: name.into(),
            reason: reason.into(),
        });
        self.shards.len() - 1
    }

    pub fn with_shard(mut self, shard: Shard) -> Self {
        self.add_shard(shard);
        self
    }

    /// Whether several readers may cross shard boundaries at the same time.
    pub fn concurrent_transitions(&self) -> bool {
        self.concurrent_transitions
    }

    pub fn set_concurrent_transitions(&mut self, concurrent: bool) {
        self.concurrent_transitions = concurrent;
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard(&self, index: usize) -> ColumnarResult<&ShardHandle> {
        self.shards.get(index).ok_or(ColumnarError::ShardOutOfRange {
            index,
            count: self.shards.len(),
        })
    }

    pub fn shards(&self) -> &[ShardHandle] {
        &self.shards
    }

    /// Row count of shard `index`; unavailable shards contribute no rows.
    pub fn shard_rows(&self, index: usize) -> usize {
        self.shards.get(index).map_or(0, ShardHandle::row_count)
    }

    /// Prefix sums of shard row counts (`shard_count() + 1` entries).
    pub fn offsets(&self) -> Vec<u64> {
        let mut offsets = Vec::with_capacity(self.shards.len() + 1);
        let mut total = 0u64;
        offsets.push(total);
        for shard in &self.shards {
            total += shard.row_count() as u64;
            offsets.push(total);
        }
        offsets
    }

    pub fn total_rows(&self) -> u64 {
        self.shards.iter().map(|s| s.row_count() as u64).sum()
    }

    /// Schema of the first readable shard.
    pub fn schema(&self) -> Vec<ColumnSchema> {
        self.shards
            .iter()
            .find_map(ShardHandle::shard)
            .map(|shard| shard.schema())
            .unwrap_or_default()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.schema().iter().any(|column| column.name == name)
    }
}

/// A (possibly restricted) window over a shared [`Dataset`]: a contiguous shard range and an
/// optional entry list.
#[derive(Clone, Debug)]
pub struct DatasetView {
    dataset: Arc<Dataset>,
    shards: Range<usize>,
    entry_list: Option<Arc<EntryList>>,
}

impl DatasetView {
    pub fn new(dataset: Arc<Dataset>) -> Self {
        let shards = 0..dataset.shard_count();
        Self {
            dataset,
            shards,
            entry_list: None,
        }
    }

    pub fn with_entry_list(mut self, entry_list: Arc<EntryList>) -> Self {
        self.entry_list = Some(entry_list);
        self
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn shards(&self) -> Range<usize> {
        self.shards.clone()
    }

    pub fn entry_list(&self) -> Option<&Arc<EntryList>> {
        self.entry_list.as_ref()
    }

    /// Number of entries shard `index` contributes to this view.
    pub fn shard_entries(&self, index: usize) -> u64 {
        if !self.shards.contains(&index) {
            return 0;
        }
        match &self.entry_list {
            Some(list) => list.shard_len(index) as u64,
            None => self.dataset.shard_rows(index) as u64,
        }
    }

    /// Total number of entries visible through this view.
    pub fn entries(&self) -> u64 {
        self.shards.clone().map(|idx| self.shard_entries(idx)).sum()
    }

    /// Entry number (dataset-wide) of the first entry of shard `index`.
    pub fn shard_offset(&self, index: usize) -> u64 {
        (0..index.min(self.dataset.shard_count()))
            .map(|idx| match &self.entry_list {
                Some(list) => list.shard_len(idx) as u64,
                None => self.dataset.shard_rows(idx) as u64,
            })
            .sum()
    }

    /// View over `shards` only. The range is clamped to the dataset.
    pub fn restrict_shards(&self, shards: Range<usize>) -> Self {
        let end = shards.end.min(self.dataset.shard_count());
        let start = shards.start.min(end);
        Self {
            dataset: Arc::clone(&self.dataset),
            shards: start..end,
            entry_list: self.entry_list.clone(),
        }
    }

    /// Cursor over at most `limit` entries starting at view entry `first_entry`.
    pub fn cursor(&self, first_entry: u64, limit: Option<u64>, policy: ReadErrorPolicy) -> RowCursor {
        RowCursor::new(self.clone(), first_entry, limit, policy)
    }
}
