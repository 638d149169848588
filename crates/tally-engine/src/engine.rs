use crate::cache::ProgramCache;
use crate::cut::{Cut, CutSet};
use crate::error::{TallyError, TallyResult};
use crate::executor;
use crate::expr::ExprSource;
use crate::hist::{Hist1D, Hist2D};
use crate::options::RunOptions;
use crate::reweight::ReweightSource;
use crate::sink::Sink;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tally_columnar::{Dataset, DatasetView, EntryList};

/// Constant weight of one shard, replacing the global constant weight when `exclusive` and
/// multiplying it otherwise.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ShardWeight {
    pub(crate) weight: f64,
    pub(crate) exclusive: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct ShardReweight {
    pub(crate) source: ReweightSource,
    pub(crate) exclusive: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Prescale {
    pub(crate) factor: u64,
    /// Integer column holding the event number; the absolute row number otherwise.
    pub(crate) column: Option<String>,
}

/// Allow-list of rows keyed on one or two integer-valued columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GoodRows {
    columns: Vec<String>,
    keys: HashSet<(i64, i64)>,
}

impl GoodRows {
    pub fn single(column: impl Into<String>, values: impl IntoIterator<Item = i64>) -> Self {
        Self {
            columns: vec![column.into()],
            keys: values.into_iter().map(|v| (v, 0)).collect(),
        }
    }

    /// Rows are kept when the `(major, minor)` pair is listed, e.g. run and luminosity block.
    pub fn pair(
        major: impl Into<String>,
        minor: impl Into<String>,
        keys: impl IntoIterator<Item = (i64, i64)>,
    ) -> Self {
        Self {
            columns: vec![major.into(), minor.into()],
            keys: keys.into_iter().collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// `minor` is ignored for a single-column list.
    pub fn contains(&self, major: i64, minor: i64) -> bool {
        let minor = if self.columns.len() > 1 { minor } else { 0 };
        self.keys.contains(&(major, minor))
    }
}

/// Identifies a sink attached to a cut. The filter is the cut with the empty name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SinkId {
    cut: String,
    index: usize,
}

impl SinkId {
    pub fn cut(&self) -> &str {
        &self.cut
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// A single-pass tally over a dataset: the filter, the named cuts with their sinks, aliases and
/// weights, and the run options.
///
/// ```
/// use tally_columnar::{Cell, ColumnSchema, ColumnType, Dataset, ShardBuilder};
/// use tally_engine::{Axis, Hist1D, Tally};
///
/// let mut builder = ShardBuilder::new("s0", vec![ColumnSchema::scalar("x", ColumnType::Float64)])?;
/// for x in [-1.0, 3.0, 5.0] {
///     builder.append_row(&[Cell::from(x)])?;
/// }
/// let mut tally = Tally::new(Dataset::new("events").with_shard(builder.finalize()));
/// tally.set_filter("x > 0");
/// tally.add_cut("signal", None)?;
/// let id = tally.add_plot("signal", Hist1D::new("h", Axis::uniform(10, 0.0, 10.0)?), "x")?;
/// tally.execute()?;
/// assert_eq!(tally.cut("signal").map(|cut| cut.count()), Some(2));
/// assert_eq!(tally.sink(&id).and_then(|s| s.targets()[0].as_hist1d()).map(|h| h.entries()), Some(2));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Tally {
    pub(crate) dataset: Arc<Dataset>,
    pub(crate) entry_list: Option<Arc<EntryList>>,
    pub(crate) cuts: CutSet,
    pub(crate) aliases: Vec<(String, ExprSource)>,
    pub(crate) weight_column: Option<String>,
    pub(crate) constant_weight: f64,
    pub(crate) shard_weights: HashMap<usize, ShardWeight>,
    pub(crate) reweight: Option<ReweightSource>,
    pub(crate) shard_reweights: HashMap<usize, ShardReweight>,
    pub(crate) prescale: Option<Prescale>,
    pub(crate) good_rows: Option<GoodRows>,
    pub(crate) replacements: Vec<(String, String)>,
    pub(crate) options: RunOptions,
    pub(crate) programs: Arc<ProgramCache>,
    total_rows: u64,
}

impl Tally {
    pub fn new(dataset: impl Into<Arc<Dataset>>) -> Self {
        Self {
            dataset: dataset.into(),
            entry_list: None,
            cuts: CutSet::default(),
            aliases: Vec::new(),
            weight_column: None,
            constant_weight: 1.0,
            shard_weights: HashMap::new(),
            reweight: None,
            shard_reweights: HashMap::new(),
            prescale: None,
            good_rows: None,
            replacements: Vec::new(),
            options: RunOptions::default(),
            programs: Arc::new(ProgramCache::new()),
            total_rows: 0,
        }
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub(crate) fn view(&self) -> DatasetView {
        let view = DatasetView::new(Arc::clone(&self.dataset));
        match &self.entry_list {
            Some(list) => view.with_entry_list(Arc::clone(list)),
            None => view,
        }
    }

    /// Restricts the run to the rows of `entry_list`.
    pub fn set_entry_list(&mut self, entry_list: Option<EntryList>) {
        self.entry_list = entry_list.map(Arc::new);
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: RunOptions) {
        self.options = options;
    }

    pub fn set_filter(&mut self, expr: impl Into<ExprSource>) {
        self.cuts.filter.set_expr(Some(expr.into()));
    }

    pub fn clear_filter(&mut self) {
        self.cuts.filter.set_expr(None);
    }

    pub fn filter(&self) -> &Cut {
        &self.cuts.filter
    }

    /// Adds a named cut. `None` accepts every row that passed the filter.
    pub fn add_cut(&mut self, name: &str, expr: Option<ExprSource>) -> TallyResult<()> {
        if name.is_empty() {
            return Err(TallyError::EmptyName { what: "a cut" });
        }
        if self.cuts.cuts.contains_key(name) {
            return Err(TallyError::DuplicateCut(name.to_string()));
        }
        self.cuts
            .cuts
            .insert(name.to_string(), Cut::new(name, expr));
        Ok(())
    }

    pub fn remove_cut(&mut self, name: &str) -> TallyResult<Cut> {
        self.cuts
            .cuts
            .remove(name)
            .ok_or_else(|| TallyError::UnknownCut(name.to_string()))
    }

    /// The named cut, or the filter for the empty name.
    pub fn cut(&self, name: &str) -> Option<&Cut> {
        if name.is_empty() {
            return Some(&self.cuts.filter);
        }
        self.cuts.cuts.get(name)
    }

    fn cut_mut(&mut self, name: &str) -> TallyResult<&mut Cut> {
        if name.is_empty() {
            return Ok(&mut self.cuts.filter);
        }
        self.cuts
            .cuts
            .get_mut(name)
            .ok_or_else(|| TallyError::UnknownCut(name.to_string()))
    }

    /// Names of the cuts in evaluation order.
    pub fn cut_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.cuts.cuts.keys().map(String::as_str)
    }

    pub fn add_category(&mut self, cut: &str, expr: impl Into<ExprSource>) -> TallyResult<()> {
        self.cut_mut(cut)?.add_category(expr.into())
    }

    pub fn set_categorization(&mut self, cut: &str, expr: impl Into<ExprSource>) -> TallyResult<()> {
        self.cut_mut(cut)?.set_categorization(expr.into());
        Ok(())
    }

    /// Declares a derived column computed for every row that passes an alias-independent filter.
    /// Aliases are computed in declaration order, so later ones may read earlier ones.
    pub fn add_alias(&mut self, name: &str, expr: impl Into<ExprSource>) -> TallyResult<()> {
        if name.is_empty() {
            return Err(TallyError::EmptyName { what: "an alias" });
        }
        if self.aliases.iter().any(|(existing, _)| existing == name) {
            return Err(TallyError::DuplicateAlias(name.to_string()));
        }
        if self.dataset.has_column(name) {
            return Err(TallyError::AliasShadowsColumn(name.to_string()));
        }
        self.aliases.push((name.to_string(), expr.into()));
        Ok(())
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> + '_ {
        self.aliases.iter().map(|(name, _)| name.as_str())
    }

    /// Floating-point column holding the base weight of every row.
    pub fn set_weight_column(&mut self, column: Option<&str>) {
        self.weight_column = column.map(str::to_string);
    }

    pub fn set_constant_weight(&mut self, weight: f64) {
        self.constant_weight = weight;
    }

    /// Constant weight for the rows of shard `shard`. An exclusive weight replaces the global
    /// constant weight; otherwise the two are multiplied.
    pub fn set_shard_weight(&mut self, shard: usize, weight: f64, exclusive: bool) {
        self.shard_weights
            .insert(shard, ShardWeight { weight, exclusive });
    }

    pub fn set_reweight(&mut self, reweight: Option<ReweightSource>) {
        self.reweight = reweight;
    }

    /// Weight pipeline for the rows of shard `shard`. An exclusive pipeline replaces the global
    /// one; otherwise the two are multiplied.
    pub fn set_shard_reweight(&mut self, shard: usize, reweight: ReweightSource, exclusive: bool) {
        self.shard_reweights.insert(
            shard,
            ShardReweight {
                source: reweight,
                exclusive,
            },
        );
    }

    /// Keeps only the rows whose event number is a multiple of `factor`. The event number comes
    /// from the integer column `column`, or is the absolute row number.
    pub fn set_prescale(&mut self, factor: u64, column: Option<&str>) -> TallyResult<()> {
        if factor == 0 {
            return Err(TallyError::InvalidPrescale);
        }
        self.prescale = Some(Prescale {
            factor,
            column: column.map(str::to_string),
        });
        Ok(())
    }

    pub fn set_good_rows(&mut self, good_rows: Option<GoodRows>) {
        self.good_rows = good_rows;
    }

    /// Attaches `sink` to cut `cut` (the filter for the empty name).
    pub fn add_sink(&mut self, cut: &str, sink: Sink) -> TallyResult<SinkId> {
        let index = self.cut_mut(cut)?.add_sink(sink)?;
        log::debug!("added sink {index} to cut {cut:?}");
        Ok(SinkId {
            cut: cut.to_string(),
            index,
        })
    }

    pub fn add_plot(
        &mut self,
        cut: &str,
        hist: Hist1D,
        expr: impl Into<ExprSource>,
    ) -> TallyResult<SinkId> {
        self.add_sink(cut, Sink::plot(hist, expr))
    }

    pub fn add_plot_list(
        &mut self,
        cut: &str,
        hists: Vec<Hist1D>,
        expr: impl Into<ExprSource>,
    ) -> TallyResult<SinkId> {
        self.add_sink(cut, Sink::plot_list(hists, expr)?)
    }

    pub fn add_plot2d(
        &mut self,
        cut: &str,
        hist: Hist2D,
        x: impl Into<ExprSource>,
        y: impl Into<ExprSource>,
    ) -> TallyResult<SinkId> {
        self.add_sink(cut, Sink::plot2d(hist, x, y))
    }

    pub fn add_records(&mut self, cut: &str, name: &str) -> TallyResult<SinkId> {
        self.add_sink(cut, Sink::records(name))
    }

    pub fn sink(&self, id: &SinkId) -> Option<&Sink> {
        self.cut(&id.cut)?.sinks().get(id.index)
    }

    /// Adds a field to the record sink `id`; see [`Sink::add_field`].
    pub fn add_field(
        &mut self,
        id: &SinkId,
        name: &str,
        expr: impl Into<ExprSource>,
        rebind: bool,
    ) -> TallyResult<()> {
        let sink = self
            .cut_mut(&id.cut)?
            .sinks_mut()
            .get_mut(id.index)
            .ok_or_else(|| TallyError::InvalidTarget(format!("no sink {}", id.index)))?;
        sink.add_field(name, expr, rebind)
    }

    /// Reads column `to` wherever a compiled expression reads column `from`.
    pub fn replace_column(&mut self, from: &str, to: &str) {
        match self.replacements.iter_mut().find(|(f, _)| f == from) {
            Some(entry) => entry.1 = to.to_string(),
            None => self.replacements.push((from.to_string(), to.to_string())),
        }
    }

    pub fn reset_replace_column(&mut self, from: &str) {
        let before = self.replacements.len();
        self.replacements.retain(|(f, _)| f != from);
        if self.replacements.len() == before {
            log::warn!("no replacement registered for column {from}");
        }
    }

    /// Number of entries read by the last successful [`Tally::execute`].
    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    /// Number of sinks, the filter's included.
    pub fn object_count(&self) -> usize {
        self.cuts.sink_count()
    }

    /// Runs the tally. Targets and counters are cleared first, so running twice gives the same
    /// results. Returns the number of entries read.
    pub fn execute(&mut self) -> TallyResult<u64> {
        let owners = std::mem::take(&mut self.cuts);
        let (owners, result) = executor::execute(self, owners);
        self.cuts = owners;
        let rows = result?;
        self.total_rows = rows;

        log::info!("{rows} rows processed");
        if self.cuts.filter.expr().is_some() {
            log::info!("filter passed {} rows", self.cuts.filter.count());
        }
        for cut in self.cuts.cuts.values().filter(|cut| !cut.sinks().is_empty()) {
            log::info!("cut {} passed {} rows", cut.name(), cut.count());
        }
        Ok(rows)
    }
}
