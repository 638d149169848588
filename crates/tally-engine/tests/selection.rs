mod common;

use common::{hist, hist1d, scalar_dataset, sharded_dataset};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use tally_columnar::{Cell, ColumnSchema, ColumnType, Dataset, EntryList, ShardBuilder};
use tally_engine::{GoodRows, RunOptions, Tally, TallyError};

fn index_values(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64).collect()
}

fn run_rows(workers: usize, first_row: u64, row_budget: Option<u64>) -> (u64, Vec<f64>) {
    let mut tally = Tally::new(sharded_dataset("x", &index_values(10), 4));
    tally.set_options(RunOptions {
        workers,
        first_row,
        row_budget,
        ..RunOptions::default()
    });
    tally.add_cut("all", None).unwrap();
    let id = tally.add_records("all", "rows").unwrap();
    tally.add_field(&id, "x", "x", false).unwrap();
    let rows = tally.execute().unwrap();
    let table = tally.sink(&id).unwrap().targets()[0].as_records().unwrap();
    (rows, table.column("x").unwrap())
}

#[test]
fn first_row_and_budget_bound_the_run() {
    assert_eq!(run_rows(1, 3, Some(4)), (4, vec![3.0, 4.0, 5.0, 6.0]));
    assert_eq!(run_rows(2, 3, Some(4)), (4, vec![3.0, 4.0, 5.0, 6.0]));
    assert_eq!(run_rows(3, 8, None), (2, vec![8.0, 9.0]));
    assert_eq!(run_rows(2, 20, None), (0, vec![]));
}

#[test]
fn entry_list_restricts_rows() {
    let mut list = EntryList::new(3);
    list.enter(0, 1);
    list.enter(2, 0);
    list.enter(2, 1);

    let mut tally = Tally::new(sharded_dataset("x", &index_values(10), 4));
    tally.set_entry_list(Some(list));
    let id = tally.add_records("", "rows").unwrap();
    tally.add_field(&id, "x", "x", false).unwrap();
    assert_eq!(tally.execute().unwrap(), 3);

    let table = tally.sink(&id).unwrap().targets()[0].as_records().unwrap();
    assert_eq!(table.column("x").unwrap(), vec![1.0, 8.0, 9.0]);
}

fn run_lumi_dataset() -> Dataset {
    let mut builder = ShardBuilder::new(
        "s0",
        vec![
            ColumnSchema::scalar("run", ColumnType::UInt32),
            ColumnSchema::scalar("lumi", ColumnType::UInt32),
            ColumnSchema::scalar("event", ColumnType::UInt64),
        ],
    )
    .unwrap();
    for (run, lumi, event) in [(1u32, 1u32, 10u64), (1, 2, 11), (2, 1, 12), (2, 2, 15)] {
        builder
            .append_row(&[Cell::from(run), Cell::from(lumi), Cell::from(event)])
            .unwrap();
    }
    Dataset::new("events").with_shard(builder.finalize())
}

#[test]
fn good_rows_by_run_and_lumi() {
    let mut tally = Tally::new(run_lumi_dataset());
    tally.set_good_rows(Some(GoodRows::pair("run", "lumi", [(1, 2), (2, 1)])));
    let id = tally.add_plot("", hist("run", 3, 0.0, 3.0), "run").unwrap();
    tally.execute().unwrap();

    let h = hist1d(&tally, &id);
    assert_eq!(h.bin_content(h.find_bin(1.0)), 1.0);
    assert_eq!(h.bin_content(h.find_bin(2.0)), 1.0);
    assert_eq!(tally.filter().count(), 2);
}

#[test]
fn good_rows_by_run_only() {
    let mut tally = Tally::new(run_lumi_dataset());
    tally.set_good_rows(Some(GoodRows::single("run", [2])));
    let id = tally.add_plot("", hist("run", 3, 0.0, 3.0), "run").unwrap();
    tally.execute().unwrap();

    assert_eq!(hist1d(&tally, &id).entries(), 2);
}

#[test]
fn prescale_by_event_column() {
    let mut tally = Tally::new(run_lumi_dataset());
    tally.set_prescale(5, Some("event")).unwrap();
    let id = tally.add_plot("", hist("run", 3, 0.0, 3.0), "run").unwrap();
    tally.execute().unwrap();

    // Events 10 and 15.
    assert_eq!(hist1d(&tally, &id).entries(), 2);
}

fn jagged_event_dataset() -> Dataset {
    let mut builder = ShardBuilder::new(
        "s0",
        vec![
            ColumnSchema::jagged("event", ColumnType::Int64),
            ColumnSchema::scalar("x", ColumnType::Float64),
        ],
    )
    .unwrap();
    for (event, x) in [(vec![10i64], 1.0), (vec![], 2.0), (vec![12], 3.0), (vec![20], 4.0)] {
        builder
            .append_row(&[Cell::array(event), Cell::from(x)])
            .unwrap();
    }
    Dataset::new("events").with_shard(builder.finalize())
}

#[test]
fn rows_without_an_event_number_are_not_prescaled_in() {
    let mut tally = Tally::new(jagged_event_dataset());
    tally.set_prescale(10, Some("event")).unwrap();
    let id = tally.add_plot("", hist("x", 5, 0.0, 5.0), "x").unwrap();
    assert_eq!(tally.execute().unwrap(), 4);

    let h = hist1d(&tally, &id);
    assert_eq!(h.entries(), 2);
    assert_eq!(h.bin_content(h.find_bin(1.0)), 1.0);
    assert_eq!(h.bin_content(h.find_bin(4.0)), 1.0);
}

#[test]
fn missing_event_number_aborts_when_asked() {
    let mut tally = Tally::new(jagged_event_dataset());
    tally.set_options(RunOptions {
        abort_on_read_error: true,
        ..RunOptions::default()
    });
    tally.set_prescale(10, Some("event")).unwrap();
    tally.add_plot("", hist("x", 5, 0.0, 5.0), "x").unwrap();
    assert!(matches!(
        tally.execute(),
        Err(TallyError::MissingColumn { column, .. }) if column == "event"
    ));
}

#[test]
fn prescale_factor_must_be_positive() {
    let mut tally = Tally::new(scalar_dataset("x", &[1.0]));
    assert!(matches!(
        tally.set_prescale(0, None),
        Err(TallyError::InvalidPrescale)
    ));
}

proptest! {
    #[test]
    fn prescale_keeps_every_nth_row(rows in 1usize..60, factor in 1u64..7, workers in 1usize..4) {
        let mut tally = Tally::new(sharded_dataset("x", &index_values(rows), 7));
        tally.set_options(RunOptions { workers, ..RunOptions::default() });
        tally.set_prescale(factor, None).unwrap();
        tally.add_cut("all", None).unwrap();
        let id = tally.add_records("all", "kept").unwrap();
        tally.add_field(&id, "x", "x", false).unwrap();
        tally.execute().unwrap();

        let table = tally.sink(&id).unwrap().targets()[0].as_records().unwrap();
        let expected: Vec<f64> = (0..rows as u64)
            .filter(|row| row % factor == 0)
            .map(|row| row as f64)
            .collect();
        prop_assert_eq!(table.column("x").unwrap(), expected);
    }
}
