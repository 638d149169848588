//! Sharded columnar storage for Tally.
//!
//! This crate focuses on:
//! - Typed scalar and jagged (variable-length per row) columns.
//! - Datasets made of several shards, some of which may be unreadable.
//! - Row allow-lists ("entry lists") keyed by shard.
//! - Sequential cursors restricted to an entry range or a subset of shards, which is what the
//!   partitioned row loop in `tally-engine` consumes.

#![forbid(unsafe_code)]

mod cursor;
mod dataset;
mod entry_list;
mod error;
mod table;
mod types;

pub use crate::cursor::{ReadErrorPolicy, RowCursor, RowPosition};
pub use crate::dataset::{Dataset, DatasetView, ShardHandle};
pub use crate::entry_list::EntryList;
pub use crate::error::{ColumnarError, ColumnarResult};
pub use crate::table::{Column, ColumnSchema, Shard, ShardBuilder};
pub use crate::types::{Cell, ColumnShape, ColumnType, Value};
