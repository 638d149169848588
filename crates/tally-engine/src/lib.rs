//! Single-pass, multi-sink tallying over sharded columnar datasets.
//!
//! This crate focuses on:
//! - A small formula language compiled against the dataset's columns, with per-row caching of
//!   every sub-value (jagged columns expand a row into several sub-values).
//! - Cascading selections ("cuts") with categorization, feeding histogram and record sinks.
//! - Weight pipelines: raw expressions, bin tables, interpolation curves, analytic surfaces and
//!   their products.
//! - A partitioned row loop that splits the dataset across threads and merges the partial
//!   results back in a fixed order.

#![forbid(unsafe_code)]

mod alias;
mod cache;
mod cut;
mod engine;
mod error;
mod executor;
mod expr;
mod function;
mod hist;
mod library;
mod lookup;
mod options;
mod parser;
mod partition;
mod program;
mod records;
mod reweight;
mod row;
mod sink;
mod target;

pub use crate::alias::{AliasLayout, AliasTable};
pub use crate::cache::{CachedFormula, ProgramCache};
pub use crate::cut::Cut;
pub use crate::engine::{GoodRows, SinkId, Tally};
pub use crate::error::{TallyError, TallyResult};
pub use crate::expr::{ColumnExpr, EvalGroup, ExprSource, Multiplicity};
pub use crate::function::{FunctionLibrary, FunctionLinker, LinkedFunction, RowFunction};
pub use crate::hist::{Axis, Hist1D, Hist2D};
pub use crate::library::ExprLibrary;
pub use crate::lookup::{Curve, LookupSource, Spline, Surface};
pub use crate::options::RunOptions;
pub use crate::parser::{parse, BinaryOp, Expr, UnaryOp};
pub use crate::partition::{plan_partitions, Partition};
pub use crate::program::Program;
pub use crate::records::{RecordTable, MAX_FIELDS};
pub use crate::reweight::{Reweight, ReweightSource};
pub use crate::row::{ColumnHandle, RowContext};
pub use crate::sink::{OverflowMode, Sink};
pub use crate::target::Target;
