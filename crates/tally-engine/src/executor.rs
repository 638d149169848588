//! The partitioned row loop.
//!
//! The calling thread processes the first partition on the configuration's own cuts. Every other
//! partition runs on a scoped thread with an empty clone of the cuts. Once the calling thread has
//! finished and handed the cuts back, the clones are merged into them one worker at a time, in
//! worker order.

use crate::alias::{AliasLayout, AliasValues};
use crate::cut::{ActiveCut, CutSet};
use crate::engine::Tally;
use crate::error::{TallyError, TallyResult};
use crate::expr::{ColumnExpr, Multiplicity};
use crate::library::ExprLibrary;
use crate::partition::{plan_partitions, Partition};
use crate::reweight::Reweight;
use crate::row::RowContext;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tally_columnar::{ColumnType, DatasetView, RowCursor, RowPosition, Shard};

#[derive(Debug)]
struct MergeState {
    main_done: bool,
    owners: Option<CutSet>,
    next_merge: usize,
}

/// State shared by the workers of one run.
#[derive(Debug)]
struct SyncTools {
    state: Mutex<MergeState>,
    turn: Condvar,
    progress: AtomicU64,
}

impl SyncTools {
    fn new() -> Self {
        Self {
            state: Mutex::new(MergeState {
                main_done: false,
                owners: None,
                next_merge: 1,
            }),
            turn: Condvar::new(),
            progress: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MergeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the main worker is done and every earlier worker has merged.
    fn wait_turn(&self, worker: usize) -> MutexGuard<'_, MergeState> {
        let mut state = self.lock();
        while !(state.main_done && state.next_merge == worker) {
            state = self
                .turn
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state
    }

    fn finish_main(&self, owners: Option<CutSet>) {
        let mut state = self.lock();
        state.owners = owners;
        state.main_done = true;
        drop(state);
        self.turn.notify_all();
    }
}

/// Releases the workers when the main partition ends, even by unwinding.
struct MainDone<'s> {
    sync: &'s SyncTools,
    signaled: bool,
}

impl MainDone<'_> {
    fn finish(mut self, owners: CutSet) {
        self.signaled = true;
        self.sync.finish_main(Some(owners));
    }
}

impl Drop for MainDone<'_> {
    fn drop(&mut self) {
        if !self.signaled {
            self.sync.finish_main(None);
        }
    }
}

/// A worker's place in the merge order. Dropping it without merging passes the turn on.
struct MergeTurn<'s> {
    sync: &'s SyncTools,
    worker: usize,
    done: bool,
}

impl MergeTurn<'_> {
    fn merge(mut self, cuts: &CutSet) -> TallyResult<()> {
        let mut state = self.sync.wait_turn(self.worker);
        let merged = match state.owners.as_mut() {
            Some(owners) => owners.merge_from(cuts),
            None => Ok(()),
        };
        state.next_merge += 1;
        self.done = true;
        drop(state);
        self.sync.turn.notify_all();
        merged
    }
}

impl Drop for MergeTurn<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut state = self.sync.wait_turn(self.worker);
        state.next_merge += 1;
        drop(state);
        self.sync.turn.notify_all();
    }
}

/// Runs every partition and returns the cuts (with merged results) together with the number of
/// entries read. The cuts are returned on failure too.
pub(crate) fn execute(config: &Tally, mut owners: CutSet) -> (CutSet, TallyResult<u64>) {
    let view = config.view();
    let partitions = plan_partitions(
        view.dataset().shard_count(),
        view.entries(),
        &config.options,
    );
    log::debug!("running {} partition(s): {partitions:?}", partitions.len());
    let sync = SyncTools::new();
    let clones: Vec<CutSet> = (1..partitions.len())
        .map(|worker| owners.worker_clone(worker))
        .collect();

    let result = thread::scope(|scope| {
        let handles: Vec<_> = partitions
            .iter()
            .skip(1)
            .zip(clones)
            .enumerate()
            .map(|(idx, (partition, cuts))| {
                let (view, sync) = (&view, &sync);
                scope.spawn(move || run_worker(config, view, partition, idx + 1, cuts, sync))
            })
            .collect();

        let main_done = MainDone {
            sync: &sync,
            signaled: false,
        };
        let mut result = match partitions.first() {
            Some(partition) => run_partition(config, &view, partition, 0, &mut owners, &sync),
            None => Ok(0),
        };
        main_done.finish(std::mem::take(&mut owners));

        for handle in handles {
            let worker = match handle.join() {
                Ok(worker) => worker,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            result = match (result, worker) {
                (Ok(a), Ok(b)) => Ok(a + b),
                (Err(err), _) | (Ok(_), Err(err)) => Err(err),
            };
        }
        result
    });

    let owners = sync.lock().owners.take().unwrap_or(owners);
    (owners, result)
}

fn run_worker(
    config: &Tally,
    view: &DatasetView,
    partition: &Partition,
    worker: usize,
    mut cuts: CutSet,
    sync: &SyncTools,
) -> TallyResult<u64> {
    let turn = MergeTurn {
        sync,
        worker,
        done: false,
    };
    let rows = run_partition(config, view, partition, worker, &mut cuts, sync)?;
    turn.merge(&cuts)?;
    Ok(rows)
}

fn run_partition(
    config: &Tally,
    view: &DatasetView,
    partition: &Partition,
    worker: usize,
    cuts: &mut CutSet,
    sync: &SyncTools,
) -> TallyResult<u64> {
    let verbose = worker == 0;
    let mut library = ExprLibrary::new(view.dataset(), Arc::clone(&config.programs));

    let aliases = {
        let _lock = sync.lock();
        declare_aliases(config, &mut library, verbose)?
    };
    let (filter, cuts) =
        cuts.activate(&mut library, verbose, config.options.abort_on_read_error)?;
    let global = config
        .reweight
        .as_ref()
        .map(|source| source.compile(&mut library))
        .transpose()?;
    let mut shard_reweights = HashMap::with_capacity(config.shard_reweights.len());
    for (&shard, reweight) in &config.shard_reweights {
        let compiled = reweight.source.compile(&mut library)?;
        shard_reweights.insert(shard, (compiled, reweight.exclusive));
    }
    let good_rows = match &config.good_rows {
        Some(good) => good
            .columns()
            .iter()
            .map(|column| library.compile(column))
            .collect::<TallyResult<Vec<_>>>()?,
        None => Vec::new(),
    };
    for (from, to) in &config.replacements {
        library.replace_column_reference(from, to);
    }
    let filter_late = filter.depends_on_aliases(library.row());
    let profile = (verbose && config.options.time_profile).then(|| Profile {
        cuts: vec![Duration::ZERO; cuts.len() + 1],
        ..Profile::default()
    });

    let policy = config.options.read_error_policy();
    let cursor = match partition {
        Partition::Shards(range) => view.restrict_shards(range.clone()).cursor(0, None, policy),
        Partition::Entries { first, count } => view.cursor(*first, Some(*count), policy),
    };

    let mut run = PartitionRun {
        config,
        sync,
        verbose,
        library,
        aliases,
        filter,
        filter_late,
        cuts,
        global,
        shard_reweights,
        good_rows,
        shard: None,
        weights: Vec::new(),
        profile,
    };
    run.run(cursor)
}

/// Compiles the aliases in declaration order and lays out their storage. Later aliases may read
/// earlier ones.
fn declare_aliases(
    config: &Tally,
    library: &mut ExprLibrary,
    verbose: bool,
) -> TallyResult<Vec<(usize, ColumnExpr)>> {
    let mut aliases = Vec::with_capacity(config.aliases.len());
    for (name, source) in &config.aliases {
        if library.row().has_column(name) {
            return Err(TallyError::AliasShadowsColumn(name.clone()));
        }
        let expr = library.bind(source)?;
        let multiplicity = expr.multiplicity(library.row());
        if verbose {
            log::debug!("alias {name} = {} ({multiplicity:?})", source.describe());
            if multiplicity == Multiplicity::Optional {
                log::info!(
                    "alias {name} holds at most one value per row and is stored as an array; read it as {name}[0]"
                );
            }
        }
        let slot = library
            .row_mut()
            .aliases_mut()
            .declare(AliasLayout {
                name: name.clone(),
                multiplicity,
            });
        aliases.push((slot, expr));
    }
    Ok(aliases)
}

fn alias_values(expr: &ColumnExpr, row: &RowContext, slot: usize) -> TallyResult<AliasValues> {
    let array = row.aliases().layout(slot).is_some_and(AliasLayout::is_array);
    if !array {
        let mut values = AliasValues::new();
        values.push(expr.evaluate(row, 0)?);
        return Ok(values);
    }
    (0..expr.ndata(row)).map(|i| expr.evaluate(row, i)).collect()
}

/// Column of `shard` named `name`, checked with `readable`.
fn typed_column(
    shard: &Shard,
    name: &str,
    readable: fn(ColumnType) -> bool,
) -> TallyResult<usize> {
    let found = shard
        .column_index(name)
        .and_then(|idx| Some((idx, shard.column(idx)?.column_type())));
    let Some((idx, column_type)) = found else {
        return Err(TallyError::MissingColumn {
            shard: shard.name().to_string(),
            column: name.to_string(),
        });
    };
    if !readable(column_type) {
        return Err(TallyError::UnreadableColumnType {
            column: name.to_string(),
            column_type,
        });
    }
    Ok(idx)
}

/// Per-shard bookkeeping, refreshed on every shard transition.
#[derive(Debug)]
struct ShardState {
    index: usize,
    shard: Arc<Shard>,
    weight_column: Option<usize>,
    event_column: Option<usize>,
    weight: f64,
}

#[derive(Debug, Default)]
struct Profile {
    input: Duration,
    weighting: Duration,
    /// The filter first, then every active cut.
    cuts: Vec<Duration>,
}

impl Profile {
    fn report<'n>(&self, rows: u64, names: impl Iterator<Item = &'n str>) {
        if rows == 0 {
            return;
        }
        let per_row = |d: Duration| d.as_secs_f64() * 1e6 / rows as f64;
        log::info!("input: {:.3} us/row", per_row(self.input));
        log::info!("event weighting: {:.3} us/row", per_row(self.weighting));
        for (name, spent) in names.zip(&self.cuts) {
            let name = if name.is_empty() { "filter" } else { name };
            log::info!("{name}: {:.3} us/row", per_row(*spent));
        }
    }
}

struct PartitionRun<'c, 'a> {
    config: &'c Tally,
    sync: &'c SyncTools,
    verbose: bool,
    library: ExprLibrary,
    aliases: Vec<(usize, ColumnExpr)>,
    filter: ActiveCut<'a>,
    filter_late: bool,
    cuts: Vec<ActiveCut<'a>>,
    global: Option<Reweight>,
    shard_reweights: HashMap<usize, (Reweight, bool)>,
    good_rows: Vec<ColumnExpr>,
    shard: Option<ShardState>,
    weights: Vec<f64>,
    profile: Option<Profile>,
}

impl PartitionRun<'_, '_> {
    fn abort_on_read_error(&self) -> bool {
        self.config.options.abort_on_read_error
    }

    fn run(&mut self, mut cursor: RowCursor) -> TallyResult<u64> {
        let progress_every = self.config.options.progress_every.max(1);
        let mut rows = 0u64;
        let mut pending = 0u64;

        while let Some(position) = cursor.advance()? {
            rows += 1;
            pending += 1;
            if pending == progress_every {
                let total = self.sync.progress.fetch_add(pending, Ordering::Relaxed) + pending;
                pending = 0;
                if self.verbose {
                    log::info!("processed {total} rows");
                }
            }

            if position.shard_changed {
                if let Some(shard) = cursor.current_shard() {
                    self.enter_shard(position.shard, Arc::clone(shard))?;
                }
            }
            if self.shard.is_none() {
                continue;
            }

            match self.process_row(&position) {
                Ok(()) => {}
                Err(err) if err.is_read_error() && !self.abort_on_read_error() => {
                    log::warn!("skipping entry {}: {err}", position.entry);
                }
                Err(err) => return Err(err),
            }
        }
        self.sync.progress.fetch_add(pending, Ordering::Relaxed);

        if let Some(profile) = &self.profile {
            let names = std::iter::once(self.filter.name())
                .chain(self.cuts.iter().map(|cut| cut.name()));
            profile.report(rows, names);
        }
        Ok(rows)
    }

    /// Rebinds everything that depends on the shard. A shard that cannot be read is skipped
    /// unless read errors abort the run.
    fn enter_shard(&mut self, index: usize, shard: Arc<Shard>) -> TallyResult<()> {
        let sync = self.sync;
        let _transition = (!self.config.dataset.concurrent_transitions()).then(|| sync.lock());
        let name = shard.name().to_string();
        match self.bind_shard(index, shard) {
            Ok(state) => {
                if self.verbose {
                    log::debug!("entered shard {index} ({name}) with weight {}", state.weight);
                }
                self.shard = Some(state);
                Ok(())
            }
            Err(err) if err.is_read_error() && !self.abort_on_read_error() => {
                log::warn!("skipping shard {name}: {err}");
                self.shard = None;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn bind_shard(&mut self, index: usize, shard: Arc<Shard>) -> TallyResult<ShardState> {
        let missing = self.library.set_shard(Arc::clone(&shard));
        if let Some(column) = missing.into_iter().next() {
            return Err(TallyError::MissingColumn {
                shard: shard.name().to_string(),
                column,
            });
        }
        let weight_column = self
            .config
            .weight_column
            .as_deref()
            .map(|name| typed_column(&shard, name, ColumnType::is_float))
            .transpose()?;
        let event_column = self
            .config
            .prescale
            .as_ref()
            .and_then(|prescale| prescale.column.as_deref())
            .map(|name| typed_column(&shard, name, ColumnType::is_integer))
            .transpose()?;
        let constant = self.config.constant_weight;
        let weight = match self.config.shard_weights.get(&index) {
            Some(shard_weight) if shard_weight.exclusive => shard_weight.weight,
            Some(shard_weight) => constant * shard_weight.weight,
            None => constant,
        };
        Ok(ShardState {
            index,
            shard,
            weight_column,
            event_column,
            weight,
        })
    }

    fn process_row(&mut self, position: &RowPosition) -> TallyResult<()> {
        let Some(state) = self.shard.as_ref() else {
            return Ok(());
        };
        let started = self.profile.is_some().then(Instant::now);

        self.library.set_row(position.local_row, position.absolute_row)?;
        self.library.reset_cache();

        if let Some(good) = &self.config.good_rows {
            let row = self.library.row();
            let mut key = [0i64; 2];
            for (slot, expr) in key.iter_mut().zip(&self.good_rows) {
                *slot = expr.evaluate(row, 0)? as i64;
            }
            if !good.contains(key[0], key[1]) {
                return Ok(());
            }
        }

        if let Some(prescale) = self.config.prescale.as_ref().filter(|p| p.factor > 1) {
            let event = match state.event_column {
                Some(idx) => state
                    .shard
                    .column(idx)
                    .and_then(|column| column.value(position.local_row, 0))
                    .and_then(|value| value.as_u64())
                    .ok_or_else(|| TallyError::MissingColumn {
                        shard: state.shard.name().to_string(),
                        column: prescale.column.clone().unwrap_or_default(),
                    })?,
                None => position.absolute_row,
            };
            if event % prescale.factor != 0 {
                return Ok(());
            }
        }

        if !self.filter_late && !self.filter.evaluate(self.library.row())? {
            return Ok(());
        }

        if !self.aliases.is_empty() {
            for (slot, expr) in &self.aliases {
                let values = alias_values(expr, self.library.row(), *slot)?;
                if self.verbose {
                    log::trace!("alias slot {slot} = {values:?}");
                }
                self.library.row_mut().aliases_mut().set(*slot, values);
            }
            self.library.row_mut().aliases_mut().finish_row();
        }

        if self.filter_late && !self.filter.evaluate(self.library.row())? {
            return Ok(());
        }

        let weighting = match (&mut self.profile, started) {
            (Some(profile), Some(started)) => {
                let now = Instant::now();
                profile.input += now - started;
                Some(now)
            }
            _ => None,
        };

        let row = self.library.row();
        let base = match state.weight_column {
            Some(idx) => state
                .shard
                .column(idx)
                .and_then(|column| column.f64_at(position.local_row, 0))
                .unwrap_or(0.0),
            None => 1.0,
        };
        let common = base * state.weight;
        let (reweight, global) = match self.shard_reweights.get(&state.index) {
            Some((reweight, exclusive)) => {
                let global = if *exclusive { None } else { self.global.as_ref() };
                (Some(reweight), global)
            }
            None => (self.global.as_ref(), None),
        };
        self.weights.clear();
        match reweight {
            Some(reweight) => {
                let mut n = reweight.ndata(row);
                if let Some(global) = global {
                    n = n.max(global.ndata(row));
                }
                if n == 0 {
                    return Ok(());
                }
                for i in 0..n {
                    let mut weight = reweight.evaluate(row, i)? * common;
                    if let Some(global) = global {
                        weight *= global.evaluate(row, i)?;
                    }
                    self.weights.push(weight);
                }
            }
            None => self.weights.push(common),
        }
        if self.verbose {
            log::trace!("entry {} weights {:?}", position.entry, self.weights);
        }

        let mut mark = match (&mut self.profile, weighting) {
            (Some(profile), Some(started)) => {
                let now = Instant::now();
                profile.weighting += now - started;
                Some(now)
            }
            _ => None,
        };

        self.filter.fill_exprs(&self.weights, row)?;
        if let (Some(profile), Some(started)) = (&mut self.profile, mark) {
            let now = Instant::now();
            profile.cuts[0] += now - started;
            mark = Some(now);
        }
        for (pos, cut) in self.cuts.iter_mut().enumerate() {
            if cut.evaluate(row)? {
                cut.fill_exprs(&self.weights, row)?;
            }
            if let (Some(profile), Some(started)) = (&mut self.profile, mark) {
                let now = Instant::now();
                profile.cuts[pos + 1] += now - started;
                mark = Some(now);
            }
        }
        Ok(())
    }
}
