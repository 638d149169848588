use crate::error::{TallyError, TallyResult};
use crate::expr::{ColumnExpr, EvalGroup, ExprSource};
use crate::library::ExprLibrary;
use crate::row::RowContext;
use crate::sink::{ActiveSink, BoundSink, Sink};
use std::collections::BTreeMap;

/// A named selection with optional categorization, owning the sinks it feeds.
///
/// Lifecycle: a `Cut` is configuration. [`Cut::bind`] compiles it against a worker's
/// [`ExprLibrary`] into a [`BoundCut`], whose [`BoundCut::initialize`] yields the [`ActiveCut`]
/// evaluated row by row.
#[derive(Clone, Debug)]
pub struct Cut {
    name: String,
    expr: Option<ExprSource>,
    categorization: Option<ExprSource>,
    categories: Vec<ExprSource>,
    sinks: Vec<Sink>,
    count: u64,
}

impl Cut {
    pub fn new(name: impl Into<String>, expr: Option<ExprSource>) -> Self {
        Self {
            name: name.into(),
            expr,
            categorization: None,
            categories: Vec::new(),
            sinks: Vec::new(),
            count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expr(&self) -> Option<&ExprSource> {
        self.expr.as_ref()
    }

    pub fn set_expr(&mut self, expr: Option<ExprSource>) {
        self.expr = expr;
    }

    /// Number of rows that reached the sinks during the last run.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sinks(&self) -> &[Sink] {
        &self.sinks
    }

    pub(crate) fn sinks_mut(&mut self) -> &mut [Sink] {
        &mut self.sinks
    }

    /// Categorizes with the truncated integer value of `expr`. Drops any explicit categories.
    pub fn set_categorization(&mut self, expr: ExprSource) {
        self.categories.clear();
        self.categorization = Some(expr);
    }

    /// Appends an explicit category; a sub-index falls into the first category whose expression
    /// is non-zero. Drops an integer categorization.
    ///
    /// Categorized sinks already attached must have one target per category afterwards.
    pub fn add_category(&mut self, expr: ExprSource) -> TallyResult<()> {
        let expected = match self.categorization {
            Some(_) => 1,
            None => self.categories.len() + 1,
        };
        self.check_sinks(expected)?;
        self.categorization = None;
        self.categories.push(expr);
        Ok(())
    }

    fn check_sinks(&self, expected: usize) -> TallyResult<()> {
        let mismatch = self
            .sinks
            .iter()
            .find(|sink| sink.is_categorized() && sink.targets().len() != expected);
        match mismatch {
            Some(sink) => Err(TallyError::CategoryCountMismatch {
                cut: self.name.clone(),
                expected,
                actual: sink.targets().len(),
            }),
            None => Ok(()),
        }
    }

    /// `None` when categories come from an integer expression and are only known per row.
    pub fn n_categories(&self) -> Option<usize> {
        match self.categorization {
            Some(_) => None,
            None => Some(self.categories.len()),
        }
    }

    /// Attaches `sink`. A categorized sink must have one target per category when the number of
    /// categories is known.
    pub fn add_sink(&mut self, sink: Sink) -> TallyResult<usize> {
        if sink.is_categorized() {
            if let Some(expected) = self.n_categories() {
                if expected != sink.targets().len() {
                    return Err(TallyError::CategoryCountMismatch {
                        cut: self.name.clone(),
                        expected,
                        actual: sink.targets().len(),
                    });
                }
            }
        }
        self.sinks.push(sink);
        Ok(self.sinks.len() - 1)
    }

    /// Configuration copy for worker `worker`, with empty renamed targets.
    pub(crate) fn worker_clone(&self, worker: usize) -> Self {
        Self {
            name: self.name.clone(),
            expr: self.expr.clone(),
            categorization: self.categorization.clone(),
            categories: self.categories.clone(),
            sinks: self
                .sinks
                .iter()
                .map(|sink| sink.worker_clone(worker))
                .collect(),
            count: 0,
        }
    }

    pub(crate) fn merge_from(&mut self, clone: &Cut) -> TallyResult<()> {
        if clone.sinks.len() != self.sinks.len() {
            return Err(TallyError::IncompatibleMerge {
                target: self.name.clone(),
                reason: "sink lists differ".into(),
            });
        }
        for (sink, other) in self.sinks.iter_mut().zip(&clone.sinks) {
            sink.merge_from(other)?;
        }
        self.count += clone.count;
        Ok(())
    }

    /// Compiles the selection, the categorization and every sink. Resets the pass counter.
    pub(crate) fn bind<'a>(
        &'a mut self,
        library: &mut ExprLibrary,
        verbose: bool,
        abort_on_read_error: bool,
    ) -> TallyResult<BoundCut<'a>> {
        let expr = self
            .expr
            .as_ref()
            .map(|source| library.bind(source))
            .transpose()?;
        let categorization = self
            .categorization
            .as_ref()
            .map(|source| library.bind(source))
            .transpose()?;
        let categories = self
            .categories
            .iter()
            .map(|source| library.bind(source))
            .collect::<TallyResult<Vec<_>>>()?;
        self.count = 0;
        let sinks = self
            .sinks
            .iter_mut()
            .map(|sink| sink.bind(library, verbose, abort_on_read_error))
            .collect::<TallyResult<Vec<_>>>()?;
        Ok(BoundCut {
            name: &self.name,
            count: &mut self.count,
            expr,
            categorization,
            categories,
            sinks,
            verbose,
        })
    }
}

/// A cut compiled against one worker's library.
pub(crate) struct BoundCut<'a> {
    name: &'a str,
    count: &'a mut u64,
    expr: Option<ColumnExpr>,
    categorization: Option<ColumnExpr>,
    categories: Vec<ColumnExpr>,
    sinks: Vec<BoundSink<'a>>,
    verbose: bool,
}

impl<'a> BoundCut<'a> {
    /// Groups the selection and categorization expressions so their multiplicity is computed
    /// once per row, and initializes the sinks.
    pub(crate) fn initialize(self) -> ActiveCut<'a> {
        let mut members: Vec<ColumnExpr> = self.expr.iter().cloned().collect();
        members.extend(self.categorization.iter().cloned());
        members.extend(self.categories.iter().cloned());
        ActiveCut {
            name: self.name,
            count: self.count,
            expr: self.expr,
            categorization: self.categorization,
            categories: self.categories,
            group: EvalGroup::new(members),
            sinks: self
                .sinks
                .into_iter()
                .map(BoundSink::initialize)
                .collect(),
            category_index: Vec::new(),
            verbose: self.verbose,
        }
    }
}

/// A cut evaluated row by row.
pub(crate) struct ActiveCut<'a> {
    name: &'a str,
    count: &'a mut u64,
    expr: Option<ColumnExpr>,
    categorization: Option<ColumnExpr>,
    categories: Vec<ColumnExpr>,
    group: EvalGroup,
    sinks: Vec<ActiveSink<'a>>,
    category_index: Vec<i32>,
    verbose: bool,
}

impl ActiveCut<'_> {
    pub(crate) fn name(&self) -> &str {
        self.name
    }

    /// Whether any selection or categorization expression reads an alias column.
    pub(crate) fn depends_on_aliases(&self, row: &RowContext) -> bool {
        self.group
            .members()
            .iter()
            .any(|expr| expr.reads_alias(row))
    }

    /// Decides the category of every sub-index of the current row; `-1` marks a rejected or
    /// uncategorized sub-index. Returns whether any sub-index passed the selection.
    pub(crate) fn evaluate(&mut self, row: &RowContext) -> TallyResult<bool> {
        let n = if self.expr.is_some() {
            self.group.ndata(row)
        } else {
            1
        };
        self.category_index.clear();
        self.category_index.resize(n, -1);
        self.group.prime(row)?;

        let mut any = false;
        for i in 0..n {
            if let Some(expr) = &self.expr {
                if expr.evaluate(row, i)? == 0.0 {
                    continue;
                }
            }
            let category = if let Some(categorization) = &self.categorization {
                categorization.evaluate(row, i)? as i32
            } else if !self.categories.is_empty() {
                let mut matched = -1;
                for (pos, category) in self.categories.iter().enumerate() {
                    if category.evaluate(row, i)? != 0.0 {
                        matched = pos as i32;
                        break;
                    }
                }
                matched
            } else {
                0
            };
            self.category_index[i] = category;
            any = true;
            if self.verbose {
                log::trace!("cut {} passed sub-index {i} in category {category}", self.name);
            }
        }
        Ok(any)
    }

    /// Hands the categories of the last [`ActiveCut::evaluate`] and the row weights to every sink.
    pub(crate) fn fill_exprs(&mut self, weights: &[f64], row: &RowContext) -> TallyResult<()> {
        *self.count += 1;
        for sink in &mut self.sinks {
            sink.fill(weights, &self.category_index, row)?;
        }
        Ok(())
    }
}

/// The filter and the named cuts of a configuration.
#[derive(Clone, Debug)]
pub(crate) struct CutSet {
    pub(crate) filter: Cut,
    pub(crate) cuts: BTreeMap<String, Cut>,
}

impl Default for CutSet {
    fn default() -> Self {
        Self {
            filter: Cut::new("", None),
            cuts: BTreeMap::new(),
        }
    }
}

impl CutSet {
    pub(crate) fn worker_clone(&self, worker: usize) -> Self {
        Self {
            filter: self.filter.worker_clone(worker),
            cuts: self
                .cuts
                .iter()
                .map(|(name, cut)| (name.clone(), cut.worker_clone(worker)))
                .collect(),
        }
    }

    pub(crate) fn merge_from(&mut self, clone: &CutSet) -> TallyResult<()> {
        self.filter.merge_from(&clone.filter)?;
        for (name, cut) in &mut self.cuts {
            if let Some(other) = clone.cuts.get(name) {
                cut.merge_from(other)?;
            }
        }
        Ok(())
    }

    pub(crate) fn sink_count(&self) -> usize {
        self.filter.sinks.len() + self.cuts.values().map(|cut| cut.sinks.len()).sum::<usize>()
    }

    /// Binds and initializes the filter and every named cut that has sinks.
    pub(crate) fn activate<'a>(
        &'a mut self,
        library: &mut ExprLibrary,
        verbose: bool,
        abort_on_read_error: bool,
    ) -> TallyResult<(ActiveCut<'a>, Vec<ActiveCut<'a>>)> {
        let filter = self
            .filter
            .bind(library, verbose, abort_on_read_error)?
            .initialize();
        let mut cuts = Vec::new();
        for cut in self.cuts.values_mut() {
            if cut.sinks.is_empty() {
                continue;
            }
            cuts.push(cut.bind(library, verbose, abort_on_read_error)?.initialize());
        }
        Ok((filter, cuts))
    }
}
