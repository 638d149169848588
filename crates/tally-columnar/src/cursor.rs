use crate::dataset::{DatasetView, ShardHandle};
use crate::error::{ColumnarError, ColumnarResult};
use crate::table::Shard;
use std::sync::Arc;

/// What a cursor does when it reaches a shard that cannot be read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadErrorPolicy {
    /// Log the failure and continue with the next shard.
    #[default]
    Skip,
    /// Return [`ColumnarError::UnavailableShard`].
    Abort,
}

/// Location of one entry produced by a [`RowCursor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowPosition {
    /// Dataset-wide entry number (counts allow-listed rows only when an entry list is set).
    pub entry: u64,
    /// Dataset-wide physical row number.
    pub absolute_row: u64,
    pub shard: usize,
    pub local_row: usize,
    /// Set on the first entry read from a shard.
    pub shard_changed: bool,
}

/// Sequential reader over a [`DatasetView`].
#[derive(Debug)]
pub struct RowCursor {
    view: DatasetView,
    policy: ReadErrorPolicy,
    row_offsets: Vec<u64>,
    shard: usize,
    pos: usize,
    entry: u64,
    remaining: Option<u64>,
    current: Option<Arc<Shard>>,
    entered: bool,
}

impl RowCursor {
    pub(crate) fn new(
        view: DatasetView,
        first_entry: u64,
        limit: Option<u64>,
        policy: ReadErrorPolicy,
    ) -> Self {
        let row_offsets = view.dataset().offsets();
        let mut shard = view.shards().start;
        let mut skip = first_entry;
        while shard < view.shards().end {
            let entries = view.shard_entries(shard);
            if skip < entries {
                break;
            }
            skip -= entries;
            shard += 1;
        }
        let entry = view.shard_offset(shard) + skip;
        Self {
            view,
            policy,
            row_offsets,
            shard,
            pos: skip as usize,
            entry,
            remaining: limit,
            current: None,
            entered: false,
        }
    }

    /// The shard the last returned entry belongs to.
    pub fn current_shard(&self) -> Option<&Arc<Shard>> {
        self.current.as_ref()
    }

    pub fn view(&self) -> &DatasetView {
        &self.view
    }

    /// Advances to the next entry. `Ok(None)` marks the end of the view or of the limit.
    pub fn advance(&mut self) -> ColumnarResult<Option<RowPosition>> {
        loop {
            if self.remaining == Some(0) || self.shard >= self.view.shards().end {
                return Ok(None);
            }

            let mut shard_changed = false;
            if !self.entered {
                let handle = self.view.dataset().shard(self.shard)?.clone();
                match handle {
                    ShardHandle::Loaded(shard) => {
                        log::debug!("reading shard {} ({})", self.shard, shard.name());
                        self.current = Some(shard);
                        self.entered = true;
                        shard_changed = true;
                    }
                    ShardHandle::Unavailable { name, reason } => {
                        self.next_shard();
                        match self.policy {
                            ReadErrorPolicy::Skip => {
                                log::warn!("skipping unreadable shard {name}: {reason}");
                                continue;
                            }
                            ReadErrorPolicy::Abort => {
                                return Err(ColumnarError::UnavailableShard {
                                    shard: name,
                                    reason,
                                });
                            }
                        }
                    }
                }
            }

            let local_row = match self.view.entry_list() {
                Some(list) => list.rows(self.shard).get(self.pos).map(|&row| row as usize),
                None => Some(self.pos).filter(|&pos| pos < self.view.dataset().shard_rows(self.shard)),
            };
            let Some(local_row) = local_row else {
                self.next_shard();
                continue;
            };
            if local_row >= self.view.dataset().shard_rows(self.shard) {
                return Err(ColumnarError::RowOutOfRange {
                    shard: self.view.dataset().shard(self.shard)?.name().to_string(),
                    row: local_row as u64,
                    rows: self.view.dataset().shard_rows(self.shard) as u64,
                });
            }

            let position = RowPosition {
                entry: self.entry,
                absolute_row: self.row_offsets[self.shard] + local_row as u64,
                shard: self.shard,
                local_row,
                shard_changed,
            };
            self.pos += 1;
            self.entry += 1;
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }
            return Ok(Some(position));
        }
    }

    fn next_shard(&mut self) {
        self.shard += 1;
        self.pos = 0;
        self.entered = false;
        self.entry = self.view.shard_offset(self.shard);
    }
}
