mod common;

use common::{hist, hist1d, scalar_shard};
use pretty_assertions::assert_eq;
use tally_columnar::Dataset;
use tally_engine::{RunOptions, Tally, TallyError};

fn with_unavailable_shard() -> Dataset {
    let mut dataset = Dataset::new("events").with_shard(scalar_shard("a", "x", &[0.5, 1.5]));
    dataset.add_unavailable_shard("b", "file not found");
    dataset.add_shard(scalar_shard("c", "x", &[2.5]));
    dataset
}

fn with_missing_column() -> Dataset {
    Dataset::new("events")
        .with_shard(scalar_shard("a", "x", &[0.5]))
        .with_shard(scalar_shard("b", "other", &[9.0, 9.0]))
        .with_shard(scalar_shard("c", "x", &[2.5]))
}

fn tally(dataset: Dataset, abort: bool) -> (Tally, tally_engine::SinkId) {
    let mut tally = Tally::new(dataset);
    tally.set_options(RunOptions {
        abort_on_read_error: abort,
        ..RunOptions::default()
    });
    let id = tally.add_plot("", hist("h", 3, 0.0, 3.0), "x").unwrap();
    (tally, id)
}

#[test]
fn unavailable_shard_is_skipped() {
    let (mut tally, id) = tally(with_unavailable_shard(), false);
    assert_eq!(tally.execute().unwrap(), 3);
    assert_eq!(hist1d(&tally, &id).entries(), 3);
}

#[test]
fn unavailable_shard_aborts_when_asked() {
    let (mut tally, _) = tally(with_unavailable_shard(), true);
    assert!(matches!(
        tally.execute(),
        Err(TallyError::UnavailableShard { shard, .. }) if shard == "b"
    ));
}

#[test]
fn shard_missing_a_column_is_skipped() {
    let (mut tally, id) = tally(with_missing_column(), false);
    assert_eq!(tally.execute().unwrap(), 4);
    let h = hist1d(&tally, &id);
    assert_eq!(h.entries(), 2);
    assert_eq!(h.bin_content(1), 1.0);
    assert_eq!(h.bin_content(3), 1.0);
}

#[test]
fn shard_missing_a_column_aborts_when_asked() {
    let (mut tally, _) = tally(with_missing_column(), true);
    let err = tally.execute().unwrap_err();
    assert!(err.is_read_error());
    assert!(matches!(
        err,
        TallyError::MissingColumn { shard, column } if shard == "b" && column == "x"
    ));
}

#[test]
fn failed_worker_keeps_the_configuration_usable() {
    let (mut tally, id) = tally(with_missing_column(), true);
    tally.set_options(RunOptions {
        workers: 3,
        abort_on_read_error: true,
        ..RunOptions::default()
    });
    assert!(tally.execute().is_err());
    assert_eq!(tally.object_count(), 1);

    tally.set_options(RunOptions {
        workers: 3,
        ..RunOptions::default()
    });
    assert_eq!(tally.execute().unwrap(), 4);
    assert_eq!(hist1d(&tally, &id).entries(), 2);
}
