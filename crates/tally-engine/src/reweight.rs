//! Weight pipelines: per sub-index multiplicative weights computed from row values.

use crate::error::{TallyError, TallyResult};
use crate::expr::{ColumnExpr, ExprSource};
use crate::hist::{Hist1D, Hist2D};
use crate::library::ExprLibrary;
use crate::lookup::{LookupSource, Spline, Surface};
use crate::row::RowContext;
use std::cell::Cell;
use std::sync::Arc;

/// Uncompiled weight pipeline as held by the configuration.
#[derive(Clone, Debug)]
pub enum ReweightSource {
    /// Expressions mapped through an optional lookup. Without a lookup there must be exactly one
    /// expression, whose value is the weight.
    Lookup {
        exprs: Vec<ExprSource>,
        lookup: Option<LookupSource>,
    },
    /// Product of two pipelines.
    Factorized(Box<ReweightSource>, Box<ReweightSource>),
}

impl ReweightSource {
    pub fn raw(expr: impl Into<ExprSource>) -> Self {
        ReweightSource::Lookup {
            exprs: vec![expr.into()],
            lookup: None,
        }
    }

    /// `lookup` evaluated at the values of `exprs`; one expression per lookup dimension.
    pub fn lookup<I, E>(lookup: impl Into<LookupSource>, exprs: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<ExprSource>,
    {
        ReweightSource::Lookup {
            exprs: exprs.into_iter().map(Into::into).collect(),
            lookup: Some(lookup.into()),
        }
    }

    pub fn factorized(left: ReweightSource, right: ReweightSource) -> Self {
        ReweightSource::Factorized(Box::new(left), Box::new(right))
    }

    /// Compiles every expression and selects the evaluation strategy from the lookup kind.
    pub fn compile(&self, library: &mut ExprLibrary) -> TallyResult<Reweight> {
        let kind = match self {
            ReweightSource::Factorized(left, right) => ReweightKind::Factorized {
                left: Box::new(left.compile(library)?),
                right: Box::new(right.compile(library)?),
                mismatch_logged: Cell::new(false),
            },
            ReweightSource::Lookup { exprs, lookup } => {
                let (kind, expected) = match lookup {
                    None => ("raw", 1),
                    Some(source) => (source.kind(), source.dimensions()),
                };
                if exprs.len() != expected {
                    return Err(TallyError::LookupDimension {
                        source_kind: kind,
                        expected,
                        actual: exprs.len(),
                    });
                }
                let mut compiled = exprs
                    .iter()
                    .map(|source| library.bind(source))
                    .collect::<TallyResult<Vec<_>>>()?
                    .into_iter();
                // Lengths were checked above.
                let mut next = || compiled.next().ok_or(TallyError::EmptyExpression);
                match lookup {
                    None => ReweightKind::Raw(next()?),
                    Some(LookupSource::Table1D(table)) => {
                        ReweightKind::Table1D(Arc::clone(table), next()?)
                    }
                    Some(LookupSource::Table2D(table)) => {
                        ReweightKind::Table2D(Arc::clone(table), next()?, next()?)
                    }
                    Some(LookupSource::Curve(curve)) => {
                        ReweightKind::Curve(Spline::new(curve), next()?)
                    }
                    Some(LookupSource::Surface(surface)) => {
                        let mut args = Vec::with_capacity(surface.ndim());
                        for _ in 0..surface.ndim() {
                            args.push(next()?);
                        }
                        ReweightKind::Surface(Arc::clone(surface), args)
                    }
                }
            }
        };
        Ok(Reweight { kind })
    }
}

#[derive(Debug)]
enum ReweightKind {
    Raw(ColumnExpr),
    Table1D(Arc<Hist1D>, ColumnExpr),
    Table2D(Arc<Hist2D>, ColumnExpr, ColumnExpr),
    Curve(Spline, ColumnExpr),
    Surface(Arc<Surface>, Vec<ColumnExpr>),
    Factorized {
        left: Box<Reweight>,
        right: Box<Reweight>,
        mismatch_logged: Cell<bool>,
    },
}

/// A compiled weight pipeline bound to one worker's expressions.
///
/// Out-of-range table coordinates read the table's underflow or overflow bin. A factorized
/// pipeline has the multiplicity of its left factor.
#[derive(Debug)]
pub struct Reweight {
    kind: ReweightKind,
}

impl Reweight {
    fn exprs(&self) -> Vec<&ColumnExpr> {
        match &self.kind {
            ReweightKind::Raw(e) | ReweightKind::Table1D(_, e) | ReweightKind::Curve(_, e) => {
                vec![e]
            }
            ReweightKind::Table2D(_, x, y) => vec![x, y],
            ReweightKind::Surface(_, args) => args.iter().collect(),
            ReweightKind::Factorized { .. } => Vec::new(),
        }
    }

    /// Every expression the pipeline reads, factors included.
    pub fn columns(&self) -> Vec<&ColumnExpr> {
        match &self.kind {
            ReweightKind::Factorized { left, right, .. } => {
                let mut out = left.columns();
                out.extend(right.columns());
                out
            }
            _ => self.exprs(),
        }
    }

    pub fn ndata(&self, row: &RowContext) -> usize {
        match &self.kind {
            ReweightKind::Factorized {
                left,
                right,
                mismatch_logged,
            } => {
                let n = left.ndata(row);
                if !mismatch_logged.get() {
                    let other = right.ndata(row);
                    if other != n {
                        log::debug!(
                            "factorized reweight factors differ in multiplicity ({n} and {other}); using {n}"
                        );
                        mismatch_logged.set(true);
                    }
                }
                n
            }
            _ => self
                .exprs()
                .first()
                .map_or(1, |expr| expr.ndata(row)),
        }
    }

    pub fn evaluate(&self, row: &RowContext, i: usize) -> TallyResult<f64> {
        if let ReweightKind::Factorized { left, right, .. } = &self.kind {
            return Ok(left.evaluate(row, i)? * right.evaluate(row, i)?);
        }
        if i != 0 {
            for expr in self.exprs() {
                expr.ndata(row);
                expr.evaluate(row, 0)?;
            }
        }
        let weight = match &self.kind {
            ReweightKind::Raw(expr) => expr.evaluate(row, i)?,
            ReweightKind::Table1D(table, x) => {
                table.bin_content(table.find_bin(x.evaluate(row, i)?))
            }
            ReweightKind::Table2D(table, x, y) => {
                let bin = table.find_bin(x.evaluate(row, i)?, y.evaluate(row, i)?);
                table.bin_content(bin)
            }
            ReweightKind::Curve(spline, x) => spline.eval(x.evaluate(row, i)?),
            ReweightKind::Surface(surface, args) => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(row, i))
                    .collect::<TallyResult<Vec<_>>>()?;
                surface.eval(&values)
            }
            ReweightKind::Factorized { .. } => {
                debug_assert!(false, "factorized reweight handled above");
                1.0
            }
        };
        Ok(weight)
    }
}
