use crate::error::{TallyError, TallyResult};
use crate::hist::{Hist1D, Hist2D};
use crate::records::RecordTable;
use serde::Serialize;

/// An aggregation target a sink fills.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum Target {
    Hist1D(Hist1D),
    Hist2D(Hist2D),
    Records(RecordTable),
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::Hist1D(h) => h.name(),
            Target::Hist2D(h) => h.name(),
            Target::Records(t) => t.name(),
        }
    }

    /// Number of fills (rows for a record table).
    pub fn entries(&self) -> u64 {
        match self {
            Target::Hist1D(h) => h.entries(),
            Target::Hist2D(h) => h.entries(),
            Target::Records(t) => t.len() as u64,
        }
    }

    /// Empty copy for a worker, renamed so clones never collide.
    pub fn worker_clone(&self, worker: usize) -> Self {
        let name = format!("{}_worker{worker}", self.name());
        match self {
            Target::Hist1D(h) => Target::Hist1D(h.empty_clone(name)),
            Target::Hist2D(h) => Target::Hist2D(h.empty_clone(name)),
            Target::Records(t) => Target::Records(t.empty_clone(name)),
        }
    }

    /// Empties the target, keeping its name and binning or fields.
    pub fn clear(&mut self) {
        let name = self.name().to_string();
        let fresh = match &*self {
            Target::Hist1D(h) => Target::Hist1D(h.empty_clone(name)),
            Target::Hist2D(h) => Target::Hist2D(h.empty_clone(name)),
            Target::Records(t) => Target::Records(t.empty_clone(name)),
        };
        *self = fresh;
    }

    /// Adds histogram contents, or concatenates record rows.
    pub fn merge_from(&mut self, other: &Target) -> TallyResult<()> {
        match (self, other) {
            (Target::Hist1D(a), Target::Hist1D(b)) => a.add(b),
            (Target::Hist2D(a), Target::Hist2D(b)) => a.add(b),
            (Target::Records(a), Target::Records(b)) => a.append_table(b),
            (this, other) => Err(TallyError::IncompatibleMerge {
                target: this.name().to_string(),
                reason: format!("{} is a different kind of target", other.name()),
            }),
        }
    }

    pub fn as_hist1d(&self) -> Option<&Hist1D> {
        match self {
            Target::Hist1D(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_hist2d(&self) -> Option<&Hist2D> {
        match self {
            Target::Hist2D(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_records(&self) -> Option<&RecordTable> {
        match self {
            Target::Records(t) => Some(t),
            _ => None,
        }
    }
}

impl From<Hist1D> for Target {
    fn from(h: Hist1D) -> Self {
        Target::Hist1D(h)
    }
}

impl From<Hist2D> for Target {
    fn from(h: Hist2D) -> Self {
        Target::Hist2D(h)
    }
}

impl From<RecordTable> for Target {
    fn from(t: RecordTable) -> Self {
        Target::Records(t)
    }
}
