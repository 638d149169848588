use crate::error::TallyResult;
use crate::parser::{parse, Expr};
use crate::program::Program;
use crate::row::RowContext;
use dashmap::DashMap;
use std::cell::RefCell;
use std::sync::Arc;

/// Parsed formulas keyed by their exact text, shared by every worker of a run.
///
/// Parse failures are never cached.
#[derive(Debug, Default)]
pub struct ProgramCache {
    parsed: DashMap<Arc<str>, Arc<Expr>>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.parsed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsed.is_empty()
    }

    pub fn get_or_parse(&self, text: &str) -> TallyResult<Arc<Expr>> {
        if let Some(expr) = self.parsed.get(text) {
            return Ok(Arc::clone(expr.value()));
        }
        let expr = Arc::new(parse(text)?);
        Ok(self
            .parsed
            .entry(Arc::from(text))
            .or_insert(expr)
            .value()
            .clone())
    }
}

#[derive(Debug, Default)]
struct ValueCache {
    ndata: Option<usize>,
    values: Vec<Option<f64>>,
    evaluations: u64,
}

/// A bound formula together with the row-scoped value cache every evaluator compiled from the
/// same text shares.
///
/// Within one row a sub-index is computed at most once. Indices past the row's multiplicity read
/// the last valid sub-index, and a row without sub-values reads `0.0`.
#[derive(Debug)]
pub struct CachedFormula {
    program: Program,
    cache: RefCell<ValueCache>,
}

impl CachedFormula {
    pub(crate) fn new(program: Program) -> Self {
        Self {
            program,
            cache: RefCell::new(ValueCache::default()),
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub(crate) fn reset(&self) {
        let mut cache = self.cache.borrow_mut();
        cache.ndata = None;
        cache.values.clear();
    }

    pub fn ndata(&self, row: &RowContext) -> usize {
        let mut cache = self.cache.borrow_mut();
        if let Some(n) = cache.ndata {
            return n;
        }
        let n = self.program.ndata(row);
        cache.ndata = Some(n);
        cache.values.clear();
        cache.values.resize(n, None);
        n
    }

    pub fn evaluate(&self, row: &RowContext, i: usize) -> f64 {
        let n = self.ndata(row);
        if n == 0 {
            return 0.0;
        }
        let i = i.min(n - 1);
        if let Some(v) = self.cache.borrow().values[i] {
            return v;
        }
        let v = self.program.eval(row, i);
        let mut cache = self.cache.borrow_mut();
        cache.values[i] = Some(v);
        cache.evaluations += 1;
        v
    }

    /// Number of sub-values actually computed (cache misses) since the formula was compiled.
    pub fn evaluations(&self) -> u64 {
        self.cache.borrow().evaluations
    }
}
