use crate::error::TallyResult;
use serde::{Deserialize, Serialize};
use tally_columnar::ReadErrorPolicy;

/// Run-level knobs of [`crate::Tally::execute`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Number of partitions, the calling thread included.
    pub workers: usize,
    /// Maximum number of entries to read; `None` reads to the end.
    pub row_budget: Option<u64>,
    /// First entry to read.
    pub first_row: u64,
    /// Turn runtime read errors into a failed run instead of skipping the shard or entry.
    pub abort_on_read_error: bool,
    /// Record and log where the main worker spends its time.
    pub time_profile: bool,
    /// Rows between progress messages.
    pub progress_every: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            row_budget: None,
            first_row: 0,
            abort_on_read_error: false,
            time_profile: false,
            progress_every: 100_000,
        }
    }
}

impl RunOptions {
    /// Parses options from JSON; missing keys keep their defaults.
    pub fn from_json(text: &str) -> TallyResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub(crate) fn read_error_policy(&self) -> ReadErrorPolicy {
        if self.abort_on_read_error {
            ReadErrorPolicy::Abort
        } else {
            ReadErrorPolicy::Skip
        }
    }
}
