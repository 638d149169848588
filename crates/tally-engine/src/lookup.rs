//! Lookup sources a reweight maps row values through: bin tables, interpolation curves and
//! analytic surfaces.

use crate::error::{TallyError, TallyResult};
use crate::hist::{Hist1D, Hist2D};
use crate::parser::{parse, Expr};
use crate::program::{binary, unary, MathFn};
use ordered_float::OrderedFloat;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum LookupSource {
    Table1D(Arc<Hist1D>),
    Table2D(Arc<Hist2D>),
    Curve(Arc<Curve>),
    Surface(Arc<Surface>),
}

impl LookupSource {
    pub fn kind(&self) -> &'static str {
        match self {
            LookupSource::Table1D(_) => "1-D table",
            LookupSource::Table2D(_) => "2-D table",
            LookupSource::Curve(_) => "curve",
            LookupSource::Surface(_) => "surface",
        }
    }

    /// Number of coordinates a lookup takes.
    pub fn dimensions(&self) -> usize {
        match self {
            LookupSource::Table1D(_) | LookupSource::Curve(_) => 1,
            LookupSource::Table2D(_) => 2,
            LookupSource::Surface(surface) => surface.ndim(),
        }
    }
}

impl From<Hist1D> for LookupSource {
    fn from(table: Hist1D) -> Self {
        LookupSource::Table1D(Arc::new(table))
    }
}

impl From<Hist2D> for LookupSource {
    fn from(table: Hist2D) -> Self {
        LookupSource::Table2D(Arc::new(table))
    }
}

impl From<Curve> for LookupSource {
    fn from(curve: Curve) -> Self {
        LookupSource::Curve(Arc::new(curve))
    }
}

impl From<Surface> for LookupSource {
    fn from(surface: Surface) -> Self {
        LookupSource::Surface(Arc::new(surface))
    }
}

/// Control points of a 1-D curve, sorted by abscissa.
#[derive(Clone, Debug, PartialEq)]
pub struct Curve {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl Curve {
    /// Needs at least two points with distinct, non-NaN abscissae.
    pub fn new(points: impl IntoIterator<Item = (f64, f64)>) -> TallyResult<Self> {
        let mut points: Vec<(f64, f64)> = points.into_iter().collect();
        if points.len() < 2 {
            return Err(TallyError::InvalidTarget(
                "a curve needs at least two points".into(),
            ));
        }
        if points.iter().any(|(x, _)| x.is_nan()) {
            return Err(TallyError::InvalidTarget("curve abscissa is NaN".into()));
        }
        points.sort_by_key(|&(x, _)| OrderedFloat(x));
        if let Some(w) = points.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(TallyError::InvalidTarget(format!(
                "curve has two points at x = {}",
                w[0].0
            )));
        }
        let (xs, ys) = points.into_iter().unzip();
        Ok(Self { xs, ys })
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.xs.iter().copied().zip(self.ys.iter().copied())
    }
}

/// Natural cubic spline through the points of a [`Curve`]. Outside the control points the end
/// segments' polynomials are extended.
#[derive(Clone, Debug)]
pub struct Spline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    b: Vec<f64>,
    c: Vec<f64>,
    d: Vec<f64>,
}

impl Spline {
    pub fn new(curve: &Curve) -> Self {
        let xs = curve.xs.clone();
        let ys = curve.ys.clone();
        let n = xs.len();

        // Second derivatives; zero at both ends.
        let mut m = vec![0.0; n];
        if n > 2 {
            let k = n - 2;
            let mut lower = vec![0.0; k];
            let mut diag = vec![0.0; k];
            let mut upper = vec![0.0; k];
            let mut rhs = vec![0.0; k];
            for j in 0..k {
                let i = j + 1;
                let h0 = xs[i] - xs[i - 1];
                let h1 = xs[i + 1] - xs[i];
                lower[j] = h0;
                diag[j] = 2.0 * (h0 + h1);
                upper[j] = h1;
                rhs[j] = 6.0 * ((ys[i + 1] - ys[i]) / h1 - (ys[i] - ys[i - 1]) / h0);
            }
            for j in 1..k {
                let w = lower[j] / diag[j - 1];
                diag[j] -= w * upper[j - 1];
                rhs[j] -= w * rhs[j - 1];
            }
            m[k] = rhs[k - 1] / diag[k - 1];
            for j in (0..k - 1).rev() {
                m[j + 1] = (rhs[j] - upper[j] * m[j + 2]) / diag[j];
            }
        }

        let segments = n - 1;
        let mut b = Vec::with_capacity(segments);
        let mut c = Vec::with_capacity(segments);
        let mut d = Vec::with_capacity(segments);
        for i in 0..segments {
            let h = xs[i + 1] - xs[i];
            b.push((ys[i + 1] - ys[i]) / h - h * (2.0 * m[i] + m[i + 1]) / 6.0);
            c.push(m[i] / 2.0);
            d.push((m[i + 1] - m[i]) / (6.0 * h));
        }
        Self { xs, ys, b, c, d }
    }

    /// NaN in, NaN out.
    pub fn eval(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        let last = self.b.len() - 1;
        let seg = if x <= self.xs[0] {
            0
        } else if x >= self.xs[last + 1] {
            last
        } else {
            self.xs.partition_point(|&v| v <= x).saturating_sub(1)
        };
        let dx = x - self.xs[seg];
        self.ys[seg] + dx * (self.b[seg] + dx * (self.c[seg] + dx * self.d[seg]))
    }
}

type SurfaceFn = dyn Fn(&[f64]) -> f64 + Send + Sync;

enum SurfaceKind {
    Native(Arc<SurfaceFn>),
    /// Formula over the variables `x` and `y`.
    Formula(Expr),
}

/// A 1- or 2-argument analytic function.
pub struct Surface {
    name: String,
    ndim: usize,
    kind: SurfaceKind,
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("name", &self.name)
            .field("ndim", &self.ndim)
            .finish_non_exhaustive()
    }
}

impl Surface {
    pub fn new(
        name: impl Into<String>,
        ndim: usize,
        function: impl Fn(&[f64]) -> f64 + Send + Sync + 'static,
    ) -> TallyResult<Self> {
        let name = name.into();
        if !(1..=2).contains(&ndim) {
            return Err(TallyError::InvalidTarget(format!(
                "surface {name} must take 1 or 2 arguments, not {ndim}"
            )));
        }
        Ok(Self {
            name,
            ndim,
            kind: SurfaceKind::Native(Arc::new(function)),
        })
    }

    /// Surface defined by a formula in `x` (and optionally `y`), e.g. `"1 + 0.5 * x * y"`.
    pub fn from_formula(name: impl Into<String>, text: &str) -> TallyResult<Self> {
        let expr = parse(text)?;
        check_surface_expr(text, &expr)?;
        let ndim = if expr.leaf_names().contains(&"y") { 2 } else { 1 };
        Ok(Self {
            name: name.into(),
            ndim,
            kind: SurfaceKind::Formula(expr),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ndim(&self) -> usize {
        self.ndim
    }

    /// Missing coordinates read as `0.0`.
    pub fn eval(&self, args: &[f64]) -> f64 {
        match &self.kind {
            SurfaceKind::Native(f) => f(args),
            SurfaceKind::Formula(expr) => eval_surface_expr(expr, args),
        }
    }
}

fn check_surface_expr(text: &str, expr: &Expr) -> TallyResult<()> {
    match expr {
        Expr::Number(_) => Ok(()),
        Expr::Leaf { name, index: None } if name == "x" || name == "y" => Ok(()),
        Expr::Leaf { name, .. } => Err(TallyError::UnknownColumn {
            expr: text.to_string(),
            column: name.clone(),
        }),
        Expr::Call { name, args } => match MathFn::from_name(name) {
            Some((_, arity)) if arity == args.len() => {
                args.iter().try_for_each(|arg| check_surface_expr(text, arg))
            }
            Some((_, arity)) => Err(TallyError::Parse(format!(
                "{name} expects {arity} argument(s), got {}",
                args.len()
            ))),
            None => Err(TallyError::Parse(format!("unknown function {name}"))),
        },
        Expr::UnaryOp { expr, .. } => check_surface_expr(text, expr),
        Expr::BinaryOp { left, right, .. } => {
            check_surface_expr(text, left)?;
            check_surface_expr(text, right)
        }
    }
}

fn eval_surface_expr(expr: &Expr, args: &[f64]) -> f64 {
    match expr {
        Expr::Number(v) => *v,
        Expr::Leaf { name, .. } => {
            let pos = usize::from(name == "y");
            args.get(pos).copied().unwrap_or(0.0)
        }
        Expr::Call { name, args: call_args } => {
            let Some((f, _)) = MathFn::from_name(name) else {
                debug_assert!(false, "unchecked surface function {name}");
                return 0.0;
            };
            let a = call_args.first().map_or(0.0, |e| eval_surface_expr(e, args));
            let b = call_args.get(1).map_or(0.0, |e| eval_surface_expr(e, args));
            f.apply(a, b)
        }
        Expr::UnaryOp { op, expr } => unary(*op, eval_surface_expr(expr, args)),
        Expr::BinaryOp { op, left, right } => binary(
            *op,
            eval_surface_expr(left, args),
            eval_surface_expr(right, args),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spline_reproduces_knots_and_lines() {
        let curve = Curve::new([(2.0, 5.0), (0.0, 1.0), (1.0, 3.0), (3.0, 7.0)]).unwrap();
        let spline = Spline::new(&curve);
        for (x, y) in curve.points() {
            assert!((spline.eval(x) - y).abs() < 1e-12);
        }
        // Collinear points give a straight line, extrapolated beyond the ends.
        assert!((spline.eval(1.5) - 4.0).abs() < 1e-12);
        assert!((spline.eval(-1.0) - -1.0).abs() < 1e-12);
        assert!((spline.eval(4.0) - 9.0).abs() < 1e-12);
    }

    #[test]
    fn spline_passes_nan_through() {
        let curve = Curve::new([(0.0, 1.0), (1.0, 2.0), (2.0, 3.0)]).unwrap();
        let spline = Spline::new(&curve);
        assert!(spline.eval(f64::NAN).is_nan());
        assert!(spline.eval(-f64::NAN).is_nan());
    }

    #[test]
    fn curve_rejects_duplicate_abscissa() {
        assert!(Curve::new([(1.0, 1.0), (1.0, 2.0)]).is_err());
        assert!(Curve::new([(1.0, 1.0)]).is_err());
    }

    #[test]
    fn formula_surface_dimensions() {
        let one = Surface::from_formula("f", "2 * x + 1").unwrap();
        assert_eq!(one.ndim(), 1);
        assert_eq!(one.eval(&[3.0]), 7.0);
        let two = Surface::from_formula("g", "x * y").unwrap();
        assert_eq!(two.ndim(), 2);
        assert_eq!(two.eval(&[3.0, 4.0]), 12.0);
        assert!(Surface::from_formula("h", "x * z").is_err());
    }
}
