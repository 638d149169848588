use crate::options::RunOptions;
use std::ops::Range;

/// The slice of the dataset one worker reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Partition {
    /// Whole shards.
    Shards(Range<usize>),
    /// `count` consecutive entries starting at entry `first`.
    Entries { first: u64, count: u64 },
}

/// Splits a dataset of `shard_count` shards and `entries` visible entries into one partition per
/// worker. The first partition belongs to the calling thread and takes the rounding remainder.
///
/// Whole shards are handed out when the run reads everything and there are more shards than
/// workers; otherwise the entries are split into contiguous ranges. Empty trailing partitions are
/// dropped.
pub fn plan_partitions(shard_count: usize, entries: u64, options: &RunOptions) -> Vec<Partition> {
    let workers = options.workers.max(1);

    if workers > 1 && options.row_budget.is_none() && options.first_row == 0 && shard_count > workers
    {
        let per = shard_count / workers;
        let main = shard_count - per * (workers - 1);
        let mut partitions = vec![Partition::Shards(0..main)];
        partitions.extend((1..workers).map(|k| {
            let start = main + (k - 1) * per;
            Partition::Shards(start..start + per)
        }));
        return partitions;
    }

    let mut total = entries.saturating_sub(options.first_row);
    if let Some(budget) = options.row_budget {
        total = total.min(budget);
    }
    let workers = workers as u64;
    let per = total / workers;
    let main = total - per * (workers - 1);
    let mut partitions = vec![Partition::Entries {
        first: options.first_row,
        count: main,
    }];
    if per > 0 {
        partitions.extend((1..workers).map(|k| Partition::Entries {
            first: options.first_row + main + (k - 1) * per,
            count: per,
        }));
    }
    partitions
}
