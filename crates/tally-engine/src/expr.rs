use crate::cache::CachedFormula;
use crate::error::TallyResult;
use crate::function::{LinkedFunction, RowFunction};
use crate::row::RowContext;
use serde::Serialize;
use std::rc::Rc;
use std::sync::Arc;

/// How many sub-values an expression yields per row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Multiplicity {
    /// Exactly one value.
    Scalar,
    /// A fixed-length vector.
    Fixed(usize),
    /// Zero or one value.
    Optional,
    /// Any number of values, decided per row.
    Variable,
}

/// Uncompiled column expression as held by the configuration.
#[derive(Clone, Debug)]
pub enum ExprSource {
    Formula(String),
    Function(Arc<dyn RowFunction>),
}

impl ExprSource {
    pub fn function(function: impl RowFunction + 'static) -> Self {
        ExprSource::Function(Arc::new(function))
    }

    /// Formula text, or the function name in brackets.
    pub fn describe(&self) -> String {
        match self {
            ExprSource::Formula(text) => text.clone(),
            ExprSource::Function(function) => format!("[{}]", function.name()),
        }
    }
}

impl From<&str> for ExprSource {
    fn from(text: &str) -> Self {
        ExprSource::Formula(text.to_string())
    }
}

impl From<String> for ExprSource {
    fn from(text: String) -> Self {
        ExprSource::Formula(text)
    }
}

/// A compiled column expression bound to one worker's expression library.
#[derive(Clone, Debug)]
pub enum ColumnExpr {
    Formula(Rc<CachedFormula>),
    Function(Rc<LinkedFunction>),
}

impl ColumnExpr {
    pub fn ndata(&self, row: &RowContext) -> usize {
        match self {
            ColumnExpr::Formula(formula) => formula.ndata(row),
            ColumnExpr::Function(function) => function.ndata(row),
        }
    }

    pub fn evaluate(&self, row: &RowContext, i: usize) -> TallyResult<f64> {
        match self {
            ColumnExpr::Formula(formula) => Ok(formula.evaluate(row, i)),
            ColumnExpr::Function(function) => function.evaluate(row, i),
        }
    }

    pub fn multiplicity(&self, row: &RowContext) -> Multiplicity {
        match self {
            ColumnExpr::Formula(formula) => formula.program().multiplicity(row),
            ColumnExpr::Function(function) => function.multiplicity(),
        }
    }

    /// Leaf ids this expression reads.
    pub fn leaves(&self) -> Vec<usize> {
        match self {
            ColumnExpr::Formula(formula) => formula.program().leaves().to_vec(),
            ColumnExpr::Function(function) => function.leaves().to_vec(),
        }
    }

    /// Whether any leaf is an alias column.
    pub fn reads_alias(&self, row: &RowContext) -> bool {
        self.leaves().into_iter().any(|leaf| row.is_alias(leaf))
    }

    /// Cache misses of a formula; functions are not cached and report `0`.
    pub fn evaluations(&self) -> u64 {
        match self {
            ColumnExpr::Formula(formula) => formula.evaluations(),
            ColumnExpr::Function(_) => 0,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ColumnExpr::Formula(formula) => formula.program().text().to_string(),
            ColumnExpr::Function(function) => format!("[{}]", function.name()),
        }
    }
}

/// Expressions evaluated side by side; their common multiplicity is the smallest member's.
#[derive(Clone, Debug, Default)]
pub struct EvalGroup {
    members: Vec<ColumnExpr>,
}

impl EvalGroup {
    pub fn new(members: Vec<ColumnExpr>) -> Self {
        Self { members }
    }

    pub fn members(&self) -> &[ColumnExpr] {
        &self.members
    }

    pub fn ndata(&self, row: &RowContext) -> usize {
        self.members
            .iter()
            .map(|expr| expr.ndata(row))
            .min()
            .unwrap_or(1)
    }

    /// Computes every member's multiplicity and first value, binding their caches for the row.
    pub fn prime(&self, row: &RowContext) -> TallyResult<()> {
        for expr in &self.members {
            expr.ndata(row);
            expr.evaluate(row, 0)?;
        }
        Ok(())
    }
}
