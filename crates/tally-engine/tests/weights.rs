mod common;

use common::{hist, hist1d, jagged_shard, scalar_shard};
use pretty_assertions::assert_eq;
use tally_columnar::{Cell, ColumnSchema, ColumnType, Dataset, ShardBuilder};
use tally_engine::{Axis, Curve, Hist2D, ReweightSource, Sink, Surface, Tally, TallyError};

fn weighted_shard(name: &str, rows: &[(f64, f64)]) -> tally_columnar::Shard {
    let mut builder = ShardBuilder::new(
        name,
        vec![
            ColumnSchema::scalar("x", ColumnType::Float64),
            ColumnSchema::scalar("w", ColumnType::Float64),
        ],
    )
    .unwrap();
    for &(x, w) in rows {
        builder.append_row(&[Cell::from(x), Cell::from(w)]).unwrap();
    }
    builder.finalize()
}

#[test]
fn weight_column_times_constant_weight() {
    let dataset = Dataset::new("events").with_shard(weighted_shard("s0", &[(0.5, 2.0), (1.5, 0.5)]));
    let mut tally = Tally::new(dataset);
    tally.set_weight_column(Some("w"));
    tally.set_constant_weight(3.0);
    let id = tally.add_plot("", hist("h", 2, 0.0, 2.0), "x").unwrap();
    tally.execute().unwrap();

    let h = hist1d(&tally, &id);
    assert_eq!(h.bin_content(1), 6.0);
    assert_eq!(h.bin_content(2), 1.5);
}

#[test]
fn integer_weight_column_skips_the_shard() {
    let mut builder = ShardBuilder::new(
        "ints",
        vec![
            ColumnSchema::scalar("x", ColumnType::Float64),
            ColumnSchema::scalar("w", ColumnType::Int32),
        ],
    )
    .unwrap();
    builder.append_row(&[Cell::from(0.5), Cell::from(2)]).unwrap();
    let dataset = Dataset::new("events")
        .with_shard(weighted_shard("floats", &[(0.5, 2.0)]))
        .with_shard(builder.finalize());

    let mut tally = Tally::new(dataset);
    tally.set_weight_column(Some("w"));
    let id = tally.add_plot("", hist("h", 2, 0.0, 2.0), "x").unwrap();
    assert_eq!(tally.execute().unwrap(), 2);
    assert_eq!(hist1d(&tally, &id).entries(), 1);
    assert_eq!(hist1d(&tally, &id).integral(), 2.0);
}

#[test]
fn shard_weights_replace_or_multiply() {
    let dataset = Dataset::new("events")
        .with_shard(scalar_shard("a", "x", &[0.5]))
        .with_shard(scalar_shard("b", "x", &[0.5]))
        .with_shard(scalar_shard("c", "x", &[0.5]));
    let mut tally = Tally::new(dataset);
    tally.set_constant_weight(2.0);
    tally.set_shard_weight(1, 5.0, true);
    tally.set_shard_weight(2, 5.0, false);
    let id = tally.add_plot("", hist("h", 1, 0.0, 1.0), "x").unwrap();
    tally.execute().unwrap();

    assert_eq!(hist1d(&tally, &id).bin_content(1), 2.0 + 5.0 + 10.0);
}

#[test]
fn shard_reweights_replace_or_combine_with_the_global_one() {
    let dataset = Dataset::new("events")
        .with_shard(scalar_shard("a", "x", &[0.5]))
        .with_shard(scalar_shard("b", "x", &[0.5]))
        .with_shard(scalar_shard("c", "x", &[0.5]));
    let mut tally = Tally::new(dataset);
    tally.set_reweight(Some(ReweightSource::raw("2")));
    tally.set_shard_reweight(1, ReweightSource::raw("3"), true);
    tally.set_shard_reweight(2, ReweightSource::raw("3"), false);
    let id = tally.add_plot("", hist("h", 1, 0.0, 1.0), "x").unwrap();
    tally.execute().unwrap();

    assert_eq!(hist1d(&tally, &id).bin_content(1), 2.0 + 3.0 + 6.0);
}

#[test]
fn jagged_reweight_gives_one_weight_per_sub_index() {
    let dataset =
        Dataset::new("events").with_shard(jagged_shard("s0", &[(1.0, vec![10.0, 30.0])]));
    let mut tally = Tally::new(dataset);
    // A jagged filter gives the filter's sinks one category slot per sub-index.
    tally.set_filter("pt > 0");
    tally.set_reweight(Some(ReweightSource::raw("pt / 10")));
    let id = tally.add_plot("", hist("pt", 4, 0.0, 40.0), "pt").unwrap();
    tally.execute().unwrap();

    let h = hist1d(&tally, &id);
    assert_eq!(h.bin_content(h.find_bin(10.0)), 1.0);
    assert_eq!(h.bin_content(h.find_bin(30.0)), 3.0);
}

#[test]
fn rows_with_no_weight_values_are_dropped() {
    let dataset = Dataset::new("events").with_shard(jagged_shard(
        "s0",
        &[(1.0, vec![]), (2.0, vec![10.0])],
    ));
    let mut tally = Tally::new(dataset);
    tally.set_reweight(Some(ReweightSource::raw("pt")));
    let id = tally.add_plot("", hist("x", 4, 0.0, 4.0), "x").unwrap();
    tally.execute().unwrap();

    assert_eq!(hist1d(&tally, &id).entries(), 1);
    assert_eq!(tally.filter().count(), 1);
}

#[test]
fn curve_reweight_interpolates() {
    let curve = Curve::new([(0.0, 1.0), (1.0, 2.0), (2.0, 3.0)]).unwrap();
    let dataset = Dataset::new("events").with_shard(scalar_shard("s0", "x", &[0.5, 1.5]));
    let mut tally = Tally::new(dataset);
    tally.set_reweight(Some(ReweightSource::lookup(curve, ["x"])));
    let id = tally.add_plot("", hist("h", 2, 0.0, 2.0), "x").unwrap();
    tally.execute().unwrap();

    let h = hist1d(&tally, &id);
    assert!((h.bin_content(1) - 1.5).abs() < 1e-12);
    assert!((h.bin_content(2) - 2.5).abs() < 1e-12);
}

#[test]
fn curve_reweight_at_nan_coordinate_gives_nan_weight() {
    let curve = Curve::new([(0.0, 1.0), (1.0, 2.0), (2.0, 3.0)]).unwrap();
    let dataset = Dataset::new("events").with_shard(scalar_shard("s0", "x", &[-1.0, 4.0]));
    let mut tally = Tally::new(dataset);
    tally.set_reweight(Some(ReweightSource::lookup(curve, ["sqrt(x)"])));
    let id = tally.add_plot("", hist("h", 5, 0.0, 5.0), "x").unwrap();
    assert_eq!(tally.execute().unwrap(), 2);

    let h = hist1d(&tally, &id);
    assert_eq!(h.entries(), 2);
    assert!(h.bin_content(0).is_nan());
    assert!((h.bin_content(5) - 3.0).abs() < 1e-12);
}

#[test]
fn surface_reweight_reads_both_coordinates() {
    let surface = Surface::from_formula("sf", "1 + x * y").unwrap();
    let dataset = Dataset::new("events").with_shard(weighted_shard("s0", &[(0.5, 4.0)]));
    let mut tally = Tally::new(dataset);
    tally.set_reweight(Some(ReweightSource::lookup(surface, ["x", "w"])));
    let id = tally.add_plot("", hist("h", 1, 0.0, 1.0), "x").unwrap();
    tally.execute().unwrap();

    assert_eq!(hist1d(&tally, &id).bin_content(1), 3.0);
}

#[test]
fn table_2d_reweight_and_native_surface() {
    let mut table = Hist2D::new(
        "sf2",
        Axis::uniform(2, 0.0, 2.0).unwrap(),
        Axis::uniform(1, 0.0, 10.0).unwrap(),
    );
    table.set_bin_content(table.bin(1, 1), 0.5);
    table.set_bin_content(table.bin(2, 1), 4.0);
    let doubling = Surface::new("double", 1, |args| 2.0 * args[0]).unwrap();

    let dataset =
        Dataset::new("events").with_shard(weighted_shard("s0", &[(0.5, 1.0), (1.5, 1.0)]));
    let mut tally = Tally::new(dataset);
    tally.set_reweight(Some(ReweightSource::factorized(
        ReweightSource::lookup(table, ["x", "w"]),
        ReweightSource::lookup(doubling, ["w"]),
    )));
    let id = tally.add_plot("", hist("h", 2, 0.0, 2.0), "x").unwrap();
    tally.execute().unwrap();

    let h = hist1d(&tally, &id);
    assert_eq!(h.bin_content(1), 1.0);
    assert_eq!(h.bin_content(2), 8.0);
}

#[test]
fn lookup_dimension_mismatch_fails_the_run() {
    let dataset = Dataset::new("events").with_shard(scalar_shard("s0", "x", &[0.5]));
    let mut tally = Tally::new(dataset);
    tally.set_reweight(Some(ReweightSource::lookup(hist("t", 1, 0.0, 1.0), ["x", "x"])));
    tally.add_plot("", hist("h", 1, 0.0, 1.0), "x").unwrap();
    assert!(matches!(
        tally.execute(),
        Err(TallyError::LookupDimension {
            expected: 1,
            actual: 2,
            ..
        })
    ));
}

#[test]
fn sink_reweight_applies_to_its_sink_only() {
    let dataset = Dataset::new("events").with_shard(scalar_shard("s0", "x", &[0.5]));
    let mut tally = Tally::new(dataset);
    let plain = tally.add_plot("", hist("plain", 1, 0.0, 1.0), "x").unwrap();
    let scaled = tally
        .add_sink(
            "",
            Sink::plot(hist("scaled", 1, 0.0, 1.0), "x").with_reweight(ReweightSource::raw("x * 4")),
        )
        .unwrap();
    tally.execute().unwrap();

    assert_eq!(hist1d(&tally, &plain).bin_content(1), 1.0);
    assert_eq!(hist1d(&tally, &scaled).bin_content(1), 2.0);
}
