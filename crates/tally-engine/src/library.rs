use crate::cache::{CachedFormula, ProgramCache};
use crate::error::TallyResult;
use crate::expr::{ColumnExpr, ExprSource};
use crate::function::FunctionLibrary;
use crate::program::Program;
use crate::row::RowContext;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use tally_columnar::{Dataset, Shard};

/// Compiles column expressions for one worker.
///
/// Formulas are deduplicated by exact text: every request for the same text returns an evaluator
/// backed by the same value cache. Function-kind expressions are linked once per prototype.
#[derive(Debug)]
pub struct ExprLibrary {
    row: RowContext,
    formulas: HashMap<String, Rc<CachedFormula>>,
    functions: FunctionLibrary,
    programs: Arc<ProgramCache>,
}

impl ExprLibrary {
    pub fn new(dataset: &Dataset, programs: Arc<ProgramCache>) -> Self {
        Self {
            row: RowContext::new(dataset),
            formulas: HashMap::new(),
            functions: FunctionLibrary::default(),
            programs,
        }
    }

    pub fn row(&self) -> &RowContext {
        &self.row
    }

    pub(crate) fn row_mut(&mut self) -> &mut RowContext {
        &mut self.row
    }

    pub fn formula_count(&self) -> usize {
        self.formulas.len()
    }

    pub fn functions(&self) -> &FunctionLibrary {
        &self.functions
    }

    pub fn compile(&mut self, text: &str) -> TallyResult<ColumnExpr> {
        self.get_formula(text, false).map(ColumnExpr::Formula)
    }

    /// Like [`ExprLibrary::compile`] without the warning on failure.
    pub fn compile_silent(&mut self, text: &str) -> TallyResult<ColumnExpr> {
        self.get_formula(text, true).map(ColumnExpr::Formula)
    }

    pub fn bind(&mut self, source: &ExprSource) -> TallyResult<ColumnExpr> {
        match source {
            ExprSource::Formula(text) => self.compile(text),
            ExprSource::Function(prototype) => self
                .functions
                .get_function(prototype, &mut self.row)
                .map(ColumnExpr::Function),
        }
    }

    fn get_formula(&mut self, text: &str, silent: bool) -> TallyResult<Rc<CachedFormula>> {
        if let Some(formula) = self.formulas.get(text) {
            return Ok(Rc::clone(formula));
        }
        let compiled = self
            .programs
            .get_or_parse(text)
            .and_then(|expr| Program::bind(text, &expr, &mut self.row));
        match compiled {
            Ok(program) => {
                let formula = Rc::new(CachedFormula::new(program));
                self.formulas.insert(text.to_string(), Rc::clone(&formula));
                Ok(formula)
            }
            Err(err) => {
                if !silent {
                    log::warn!("failed to compile {text:?}: {err}");
                }
                Err(err)
            }
        }
    }

    /// Invalidates every value cache. Called once per row before anything is evaluated.
    pub fn reset_cache(&self) {
        for formula in self.formulas.values() {
            formula.reset();
        }
    }

    /// Moves to a new row of the current shard and runs the row hook of every linked function.
    pub fn set_row(&mut self, local_row: usize, entry: u64) -> TallyResult<()> {
        self.row.set_position(local_row, entry);
        self.functions.begin_row(&self.row)
    }

    /// Rebinds every compiled leaf to `shard`. Returns the names that no longer resolve.
    pub fn set_shard(&mut self, shard: Arc<Shard>) -> Vec<String> {
        let missing = self.row.set_shard(shard);
        self.reset_cache();
        missing
    }

    /// Rewrites every compiled reference to column `from` into a reference to `to`, for formulas
    /// and functions alike. Caches are reset if anything was rewritten.
    pub fn replace_column_reference(&mut self, from: &str, to: &str) -> usize {
        let replaced = self.row.rename_leaf(from, to);
        if replaced != 0 {
            log::debug!("replaced column {from} with {to}");
            self.reset_cache();
        }
        replaced
    }
}
