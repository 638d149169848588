use crate::error::{TallyError, TallyResult};
use crate::expr::{ColumnExpr, EvalGroup, ExprSource};
use crate::hist::{Hist1D, Hist2D};
use crate::library::ExprLibrary;
use crate::records::RecordTable;
use crate::reweight::{Reweight, ReweightSource};
use crate::row::RowContext;
use crate::target::Target;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// What a 1-D plot does with values above its range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowMode {
    /// Values land in the overflow bin.
    #[default]
    Default,
    /// The last bin collects everything above its lower edge.
    Dedicated,
    /// Values above the upper edge are merged into the last bin.
    MergeLast,
}

/// A consumer of weighted, categorized sub-index events, filling one aggregation target (or one
/// per category).
///
/// Plots take one expression per dimension; record tables take one expression per field, added
/// with [`Sink::add_field`].
#[derive(Clone, Debug)]
pub struct Sink {
    targets: Vec<Target>,
    categorized: bool,
    sources: Vec<ExprSource>,
    reweight: Option<ReweightSource>,
    overflow: OverflowMode,
    count: u64,
}

impl Sink {
    fn with_targets(targets: Vec<Target>, categorized: bool, sources: Vec<ExprSource>) -> Self {
        Self {
            targets,
            categorized,
            sources,
            reweight: None,
            overflow: OverflowMode::Default,
            count: 0,
        }
    }

    pub fn plot(hist: Hist1D, expr: impl Into<ExprSource>) -> Self {
        Self::with_targets(vec![hist.into()], false, vec![expr.into()])
    }

    /// One histogram per category of the cut the sink is attached to.
    pub fn plot_list(hists: Vec<Hist1D>, expr: impl Into<ExprSource>) -> TallyResult<Self> {
        let targets = non_empty(hists.into_iter().map(Target::from).collect())?;
        Ok(Self::with_targets(targets, true, vec![expr.into()]))
    }

    pub fn plot2d(hist: Hist2D, x: impl Into<ExprSource>, y: impl Into<ExprSource>) -> Self {
        Self::with_targets(vec![hist.into()], false, vec![x.into(), y.into()])
    }

    pub fn plot2d_list(
        hists: Vec<Hist2D>,
        x: impl Into<ExprSource>,
        y: impl Into<ExprSource>,
    ) -> TallyResult<Self> {
        let targets = non_empty(hists.into_iter().map(Target::from).collect())?;
        Ok(Self::with_targets(targets, true, vec![x.into(), y.into()]))
    }

    pub fn records(name: impl Into<String>) -> Self {
        Self::with_targets(vec![RecordTable::new(name).into()], false, Vec::new())
    }

    /// One record table per category.
    pub fn records_list<I, S>(names: I) -> TallyResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let targets = non_empty(
            names
                .into_iter()
                .map(|name| RecordTable::new(name).into())
                .collect(),
        )?;
        Ok(Self::with_targets(targets, true, Vec::new()))
    }

    pub fn with_reweight(mut self, reweight: ReweightSource) -> Self {
        self.reweight = Some(reweight);
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowMode) -> Self {
        self.overflow = overflow;
        self
    }

    /// Adds a field to a record sink. A name already present is an error unless `rebind` is set,
    /// in which case the field is recomputed from `expr`.
    pub fn add_field(
        &mut self,
        name: &str,
        expr: impl Into<ExprSource>,
        rebind: bool,
    ) -> TallyResult<()> {
        let expr = expr.into();
        let mut position = None;
        for target in &mut self.targets {
            match target {
                Target::Records(table) => position = Some(table.add_field(name, rebind)?),
                other => {
                    return Err(TallyError::InvalidTarget(format!(
                        "{} does not take named fields",
                        other.name()
                    )))
                }
            }
        }
        match position {
            Some(pos) if pos < self.sources.len() => self.sources[pos] = expr,
            Some(_) => self.sources.push(expr),
            None => {}
        }
        Ok(())
    }

    /// Name of the first target.
    pub fn name(&self) -> &str {
        self.targets.first().map_or("", Target::name)
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn target(&self, category: usize) -> Option<&Target> {
        self.targets.get(category)
    }

    pub fn is_categorized(&self) -> bool {
        self.categorized
    }

    pub fn overflow(&self) -> OverflowMode {
        self.overflow
    }

    /// Sub-indices accepted during the last run.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Empty copy for worker `worker`, targets renamed `<name>_worker<k>`.
    pub(crate) fn worker_clone(&self, worker: usize) -> Self {
        Self {
            targets: self
                .targets
                .iter()
                .map(|target| target.worker_clone(worker))
                .collect(),
            categorized: self.categorized,
            sources: self.sources.clone(),
            reweight: self.reweight.clone(),
            overflow: self.overflow,
            count: 0,
        }
    }

    /// Adds a worker clone's targets into this sink, category by category.
    pub(crate) fn merge_from(&mut self, clone: &Sink) -> TallyResult<()> {
        if clone.targets.len() != self.targets.len() {
            return Err(TallyError::IncompatibleMerge {
                target: self.name().to_string(),
                reason: format!(
                    "{} targets against {}",
                    clone.targets.len(),
                    self.targets.len()
                ),
            });
        }
        for (target, other) in self.targets.iter_mut().zip(&clone.targets) {
            target.merge_from(other)?;
        }
        self.count += clone.count;
        Ok(())
    }

    /// Compiles the sink's expressions and weight pipeline. Clears the targets and counter.
    pub(crate) fn bind<'a>(
        &'a mut self,
        library: &mut ExprLibrary,
        verbose: bool,
        abort_on_read_error: bool,
    ) -> TallyResult<BoundSink<'a>> {
        let exprs = self
            .sources
            .iter()
            .map(|source| library.bind(source))
            .collect::<TallyResult<Vec<_>>>()?;
        let reweight = self
            .reweight
            .as_ref()
            .map(|source| source.compile(library))
            .transpose()?;
        for target in &mut self.targets {
            target.clear();
        }
        self.count = 0;
        if verbose {
            log::debug!(
                "sink {} bound to {}",
                self.name(),
                self.sources
                    .iter()
                    .map(ExprSource::describe)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Ok(BoundSink {
            sink: self,
            exprs,
            reweight,
            verbose,
            abort_on_read_error,
        })
    }
}

fn non_empty(targets: Vec<Target>) -> TallyResult<Vec<Target>> {
    if targets.is_empty() {
        return Err(TallyError::InvalidTarget(
            "a sink list needs at least one target".into(),
        ));
    }
    Ok(targets)
}

/// A sink whose expressions are compiled against one worker's library.
pub(crate) struct BoundSink<'a> {
    sink: &'a mut Sink,
    exprs: Vec<ColumnExpr>,
    reweight: Option<Reweight>,
    verbose: bool,
    abort_on_read_error: bool,
}

impl<'a> BoundSink<'a> {
    /// Groups the sink's expressions for shared evaluation.
    pub(crate) fn initialize(self) -> ActiveSink<'a> {
        ActiveSink {
            sink: self.sink,
            group: EvalGroup::new(self.exprs),
            reweight: self.reweight,
            verbose: self.verbose,
            abort_on_read_error: self.abort_on_read_error,
        }
    }
}

/// A sink ready to be filled row by row.
pub(crate) struct ActiveSink<'a> {
    sink: &'a mut Sink,
    group: EvalGroup,
    reweight: Option<Reweight>,
    verbose: bool,
    abort_on_read_error: bool,
}

impl ActiveSink<'_> {
    /// Fills every sub-index with a non-negative category.
    ///
    /// Sub-indices past the end of `weights` use its last element. A category without a target
    /// is skipped for that sub-index only, unless read errors abort the run.
    pub(crate) fn fill(
        &mut self,
        weights: &[f64],
        categories: &[i32],
        row: &RowContext,
    ) -> TallyResult<()> {
        let n = self
            .group
            .members()
            .first()
            .map_or(1, |expr| expr.ndata(row))
            .min(categories.len());
        let mut primed = false;
        for (i, &category) in categories.iter().enumerate().take(n) {
            if category < 0 {
                continue;
            }
            let Some(index) = self.target_index(category)? else {
                continue;
            };
            self.sink.count += 1;
            if !primed {
                self.group.prime(row)?;
                primed = true;
            }
            let mut weight = weights.get(i).or(weights.last()).copied().unwrap_or(1.0);
            if let Some(reweight) = &self.reweight {
                weight *= reweight.evaluate(row, i)?;
            }
            self.fill_target(i, index, weight, row)?;
        }
        Ok(())
    }

    fn target_index(&self, category: i32) -> TallyResult<Option<usize>> {
        let index = if self.sink.categorized {
            category as usize
        } else {
            0
        };
        let categories = self.sink.targets.len();
        if index < categories {
            return Ok(Some(index));
        }
        let err = TallyError::CategoryOutOfBounds {
            target: self.sink.name().to_string(),
            category,
            categories,
        };
        if self.abort_on_read_error {
            return Err(err);
        }
        log::warn!("skipping sub-index: {err}");
        Ok(None)
    }

    fn fill_target(
        &mut self,
        i: usize,
        index: usize,
        weight: f64,
        row: &RowContext,
    ) -> TallyResult<()> {
        let overflow = self.sink.overflow;
        let exprs = self.group.members();
        match &mut self.sink.targets[index] {
            Target::Hist1D(hist) => {
                let x = value(exprs, 0, row, i)?;
                let x = apply_overflow(hist, x, overflow);
                if self.verbose {
                    log::trace!("{} <- {x} (weight {weight})", hist.name());
                }
                hist.fill(x, weight);
            }
            Target::Hist2D(hist) => {
                let x = value(exprs, 0, row, i)?;
                let y = value(exprs, 1, row, i)?;
                if self.verbose {
                    log::trace!("{} <- ({x}, {y}) (weight {weight})", hist.name());
                }
                hist.fill(x, y, weight);
            }
            Target::Records(table) => {
                let values = exprs
                    .iter()
                    .map(|expr| expr.evaluate(row, i))
                    .collect::<TallyResult<SmallVec<[f64; 8]>>>()?;
                if self.verbose {
                    log::trace!("{} <- {values:?} (weight {weight})", table.name());
                }
                table.append(weight, &values);
            }
        }
        Ok(())
    }
}

fn value(exprs: &[ColumnExpr], pos: usize, row: &RowContext, i: usize) -> TallyResult<f64> {
    match exprs.get(pos) {
        Some(expr) => expr.evaluate(row, i),
        None => Err(TallyError::EmptyExpression),
    }
}

fn apply_overflow(hist: &Hist1D, x: f64, overflow: OverflowMode) -> f64 {
    let axis = hist.axis();
    let last = axis.bins();
    match overflow {
        OverflowMode::Default => x,
        OverflowMode::Dedicated if x > axis.low_edge(last) => axis.low_edge(last),
        OverflowMode::MergeLast if x > axis.up_edge(last) => axis.low_edge(last),
        OverflowMode::Dedicated | OverflowMode::MergeLast => x,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hist::Axis;

    #[test]
    fn overflow_modes() {
        let hist = Hist1D::new("h", Axis::uniform(2, 0.0, 2.0).unwrap());
        assert_eq!(apply_overflow(&hist, 7.0, OverflowMode::Default), 7.0);
        assert_eq!(apply_overflow(&hist, 7.0, OverflowMode::Dedicated), 1.0);
        assert_eq!(apply_overflow(&hist, 1.5, OverflowMode::Dedicated), 1.0);
        assert_eq!(apply_overflow(&hist, 2.0, OverflowMode::MergeLast), 2.0);
        assert_eq!(apply_overflow(&hist, 2.5, OverflowMode::MergeLast), 1.0);
    }

    #[test]
    fn add_field_rejects_plots() {
        let mut sink = Sink::plot(Hist1D::new("h", Axis::uniform(1, 0.0, 1.0).unwrap()), "x");
        assert!(matches!(
            sink.add_field("a", "x", false),
            Err(TallyError::InvalidTarget(_))
        ));
    }

    #[test]
    fn record_fields_rebind_in_place() {
        let mut sink = Sink::records("t");
        sink.add_field("a", "x", false).unwrap();
        sink.add_field("b", "y", false).unwrap();
        sink.add_field("a", "2 * x", true).unwrap();
        assert_eq!(sink.sources.len(), 2);
        assert_eq!(sink.sources[0].describe(), "2 * x");
    }
}
