#![allow(dead_code)]

use tally_columnar::{Cell, ColumnSchema, ColumnType, Dataset, Shard, ShardBuilder};
use tally_engine::{Axis, Hist1D, Sink, SinkId, Tally, Target};

/// Shard with a single float column.
pub fn scalar_shard(name: &str, column: &str, values: &[f64]) -> Shard {
    let mut builder =
        ShardBuilder::new(name, vec![ColumnSchema::scalar(column, ColumnType::Float64)]).unwrap();
    for &v in values {
        builder.append_row(&[Cell::from(v)]).unwrap();
    }
    builder.finalize()
}

/// Dataset with one shard and one float column.
pub fn scalar_dataset(column: &str, values: &[f64]) -> Dataset {
    Dataset::new("events").with_shard(scalar_shard("s0", column, values))
}

/// Dataset splitting `values` into shards of `per_shard` rows (the last one may be shorter).
pub fn sharded_dataset(column: &str, values: &[f64], per_shard: usize) -> Dataset {
    let mut dataset = Dataset::new("events");
    for (idx, chunk) in values.chunks(per_shard.max(1)).enumerate() {
        dataset.add_shard(scalar_shard(&format!("s{idx}"), column, chunk));
    }
    dataset
}

/// Rows of `(x, pt)` with a scalar float `x` and a jagged float `pt`.
pub fn jagged_shard(name: &str, rows: &[(f64, Vec<f64>)]) -> Shard {
    let mut builder = ShardBuilder::new(
        name,
        vec![
            ColumnSchema::scalar("x", ColumnType::Float64),
            ColumnSchema::jagged("pt", ColumnType::Float32),
        ],
    )
    .unwrap();
    for (x, pt) in rows {
        builder
            .append_row(&[Cell::from(*x), Cell::array(pt.iter().map(|&v| v as f32))])
            .unwrap();
    }
    builder.finalize()
}

pub fn hist(name: &str, bins: usize, low: f64, high: f64) -> Hist1D {
    Hist1D::new(name, Axis::uniform(bins, low, high).unwrap())
}

pub fn target<'t>(tally: &'t Tally, id: &SinkId, category: usize) -> &'t Target {
    tally.sink(id).and_then(|sink| sink.target(category)).unwrap()
}

pub fn hist1d<'t>(tally: &'t Tally, id: &SinkId) -> &'t Hist1D {
    target(tally, id, 0).as_hist1d().unwrap()
}

pub fn sink<'t>(tally: &'t Tally, id: &SinkId) -> &'t Sink {
    tally.sink(id).unwrap()
}

pub fn cut_count(tally: &Tally, name: &str) -> u64 {
    tally.cut(name).map(|cut| cut.count()).unwrap()
}
