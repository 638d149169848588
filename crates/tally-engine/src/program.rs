//! Formulas bound to the leaves of a [`RowContext`].

use crate::error::{TallyError, TallyResult};
use crate::expr::Multiplicity;
use crate::parser::{BinaryOp, Expr, UnaryOp};
use crate::row::RowContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MathFn {
    Abs,
    Sqrt,
    Exp,
    Log,
    Log10,
    Sin,
    Cos,
    Tan,
    Floor,
    Ceil,
    Atan2,
    Pow,
    Min,
    Max,
    Hypot,
}

impl MathFn {
    /// The function and its arity.
    pub(crate) fn from_name(name: &str) -> Option<(Self, usize)> {
        let f = match name {
            "abs" => (MathFn::Abs, 1),
            "sqrt" => (MathFn::Sqrt, 1),
            "exp" => (MathFn::Exp, 1),
            "log" => (MathFn::Log, 1),
            "log10" => (MathFn::Log10, 1),
            "sin" => (MathFn::Sin, 1),
            "cos" => (MathFn::Cos, 1),
            "tan" => (MathFn::Tan, 1),
            "floor" => (MathFn::Floor, 1),
            "ceil" => (MathFn::Ceil, 1),
            "atan2" => (MathFn::Atan2, 2),
            "pow" => (MathFn::Pow, 2),
            "min" => (MathFn::Min, 2),
            "max" => (MathFn::Max, 2),
            "hypot" => (MathFn::Hypot, 2),
            _ => return None,
        };
        Some(f)
    }

    pub(crate) fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            MathFn::Abs => a.abs(),
            MathFn::Sqrt => a.sqrt(),
            MathFn::Exp => a.exp(),
            MathFn::Log => a.ln(),
            MathFn::Log10 => a.log10(),
            MathFn::Sin => a.sin(),
            MathFn::Cos => a.cos(),
            MathFn::Tan => a.tan(),
            MathFn::Floor => a.floor(),
            MathFn::Ceil => a.ceil(),
            MathFn::Atan2 => a.atan2(b),
            MathFn::Pow => a.powf(b),
            MathFn::Min => a.min(b),
            MathFn::Max => a.max(b),
            MathFn::Hypot => a.hypot(b),
        }
    }
}

/// Per-row reductions over the sub-values of their argument; they always yield one value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Reduction {
    Sum,
    Count,
    MaxOf,
    MinOf,
    Any,
}

impl Reduction {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(Reduction::Sum),
            "count" => Some(Reduction::Count),
            "max_of" => Some(Reduction::MaxOf),
            "min_of" => Some(Reduction::MinOf),
            "any" => Some(Reduction::Any),
            _ => None,
        }
    }
}

/// Leaves that decide how many sub-values an expression has on a given row.
#[derive(Clone, Debug, Default)]
struct Scope {
    /// Leaves read without an explicit index; jagged ones are iterated.
    iterated: Vec<usize>,
    /// Leaves read at a fixed element index.
    indexed: Vec<(usize, usize)>,
}

impl Scope {
    fn ndata(&self, row: &RowContext) -> usize {
        if self
            .indexed
            .iter()
            .any(|&(leaf, index)| index >= row.len(leaf))
        {
            return 0;
        }
        self.iterated
            .iter()
            .filter(|&&leaf| row.is_jagged(leaf))
            .map(|&leaf| row.len(leaf))
            .min()
            .unwrap_or(1)
    }

    fn multiplicity(&self, row: &RowContext) -> Multiplicity {
        if self.iterated.iter().any(|&leaf| row.is_jagged(leaf)) {
            Multiplicity::Variable
        } else if self.indexed.iter().any(|&(leaf, _)| row.is_jagged(leaf)) {
            Multiplicity::Optional
        } else {
            Multiplicity::Scalar
        }
    }
}

#[derive(Clone, Debug)]
enum Node {
    Const(f64),
    Leaf { leaf: usize, index: Option<usize> },
    Unary(UnaryOp, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Math(MathFn, Box<[Node]>),
    Reduce(Reduction, Box<Node>, Scope),
}

fn truth(v: bool) -> f64 {
    if v {
        1.0
    } else {
        0.0
    }
}

pub(crate) fn unary(op: UnaryOp, v: f64) -> f64 {
    match op {
        UnaryOp::Negate => -v,
        UnaryOp::Not => truth(v == 0.0),
    }
}

pub(crate) fn binary(op: BinaryOp, l: f64, r: f64) -> f64 {
    match op {
        BinaryOp::Add => l + r,
        BinaryOp::Subtract => l - r,
        BinaryOp::Multiply => l * r,
        BinaryOp::Divide => l / r,
        BinaryOp::Modulo => l % r,
        BinaryOp::Equals => truth(l == r),
        BinaryOp::NotEquals => truth(l != r),
        BinaryOp::Less => truth(l < r),
        BinaryOp::LessEquals => truth(l <= r),
        BinaryOp::Greater => truth(l > r),
        BinaryOp::GreaterEquals => truth(l >= r),
        BinaryOp::And => truth(l != 0.0 && r != 0.0),
        BinaryOp::Or => truth(l != 0.0 || r != 0.0),
    }
}

impl Node {
    fn eval(&self, row: &RowContext, i: usize) -> f64 {
        match self {
            Node::Const(v) => *v,
            Node::Leaf { leaf, index } => match index {
                Some(k) => row.value(*leaf, *k),
                None if row.is_jagged(*leaf) => row.value(*leaf, i),
                None => row.value(*leaf, 0),
            },
            Node::Unary(op, expr) => unary(*op, expr.eval(row, i)),
            Node::Binary(op, left, right) => {
                let l = left.eval(row, i);
                // `&&` and `||` short-circuit.
                match op {
                    BinaryOp::And if l == 0.0 => return 0.0,
                    BinaryOp::Or if l != 0.0 => return 1.0,
                    _ => {}
                }
                binary(*op, l, right.eval(row, i))
            }
            Node::Math(f, args) => {
                let a = args.first().map_or(0.0, |arg| arg.eval(row, i));
                let b = args.get(1).map_or(0.0, |arg| arg.eval(row, i));
                f.apply(a, b)
            }
            Node::Reduce(reduction, inner, scope) => {
                let n = scope.ndata(row);
                let mut values = (0..n).map(|j| inner.eval(row, j));
                match reduction {
                    Reduction::Sum => values.sum(),
                    Reduction::Count => n as f64,
                    Reduction::MaxOf => values.reduce(f64::max).unwrap_or(0.0),
                    Reduction::MinOf => values.reduce(f64::min).unwrap_or(0.0),
                    Reduction::Any => truth(values.any(|v| v != 0.0)),
                }
            }
        }
    }
}

/// A parsed formula whose leaves are registered in one worker's [`RowContext`].
#[derive(Clone, Debug)]
pub struct Program {
    text: String,
    root: Node,
    scope: Scope,
    leaves: Vec<usize>,
}

impl Program {
    pub(crate) fn bind(text: &str, expr: &Expr, row: &mut RowContext) -> TallyResult<Self> {
        let mut binder = Binder {
            text,
            row,
            leaves: Vec::new(),
        };
        let mut scope = Scope::default();
        let root = binder.bind(expr, &mut scope)?;
        let leaves = binder.leaves;
        Ok(Self {
            text: text.to_string(),
            root,
            scope,
            leaves,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Leaf ids read anywhere in the formula, reductions included.
    pub fn leaves(&self) -> &[usize] {
        &self.leaves
    }

    pub fn ndata(&self, row: &RowContext) -> usize {
        self.scope.ndata(row)
    }

    pub fn multiplicity(&self, row: &RowContext) -> Multiplicity {
        self.scope.multiplicity(row)
    }

    pub fn eval(&self, row: &RowContext, i: usize) -> f64 {
        self.root.eval(row, i)
    }
}

struct Binder<'a> {
    text: &'a str,
    row: &'a mut RowContext,
    leaves: Vec<usize>,
}

impl Binder<'_> {
    fn bind(&mut self, expr: &Expr, scope: &mut Scope) -> TallyResult<Node> {
        match expr {
            Expr::Number(v) => Ok(Node::Const(*v)),
            Expr::Leaf { name, index } => {
                let leaf = self
                    .row
                    .leaf(name)
                    .ok_or_else(|| TallyError::UnknownColumn {
                        expr: self.text.to_string(),
                        column: name.clone(),
                    })?;
                if !self.leaves.contains(&leaf) {
                    self.leaves.push(leaf);
                }
                match index {
                    Some(k) => scope.indexed.push((leaf, *k)),
                    None if !scope.iterated.contains(&leaf) => scope.iterated.push(leaf),
                    None => {}
                }
                Ok(Node::Leaf {
                    leaf,
                    index: *index,
                })
            }
            Expr::UnaryOp { op, expr } => Ok(Node::Unary(*op, Box::new(self.bind(expr, scope)?))),
            Expr::BinaryOp { op, left, right } => Ok(Node::Binary(
                *op,
                Box::new(self.bind(left, scope)?),
                Box::new(self.bind(right, scope)?),
            )),
            Expr::Call { name, args } => {
                if let Some(reduction) = Reduction::from_name(name) {
                    let [arg] = args.as_slice() else {
                        return Err(arity_error(name, 1, args.len()));
                    };
                    let mut inner = Scope::default();
                    let node = self.bind(arg, &mut inner)?;
                    return Ok(Node::Reduce(reduction, Box::new(node), inner));
                }
                let Some((f, arity)) = MathFn::from_name(name) else {
                    return Err(TallyError::Parse(format!("unknown function {name}")));
                };
                if args.len() != arity {
                    return Err(arity_error(name, arity, args.len()));
                }
                let args = args
                    .iter()
                    .map(|arg| self.bind(arg, scope))
                    .collect::<TallyResult<Vec<_>>>()?;
                Ok(Node::Math(f, args.into_boxed_slice()))
            }
        }
    }
}

fn arity_error(name: &str, expected: usize, actual: usize) -> TallyError {
    TallyError::Parse(format!(
        "{name} expects {expected} argument(s), got {actual}"
    ))
}
