use pretty_assertions::assert_eq;
use std::sync::Arc;
use tally_columnar::{
    Cell, ColumnSchema, ColumnType, ColumnarError, Dataset, DatasetView, EntryList,
    ReadErrorPolicy, RowPosition, Shard, ShardBuilder,
};

fn shard(name: &str, xs: &[f64]) -> Shard {
    let mut builder = ShardBuilder::new(
        name,
        vec![
            ColumnSchema::scalar("x", ColumnType::Float64),
            ColumnSchema::jagged("pt", ColumnType::Float32),
        ],
    )
    .unwrap();
    for &x in xs {
        builder
            .append_row(&[Cell::from(x), Cell::array([x as f32, 2.0 * x as f32])])
            .unwrap();
    }
    builder.finalize()
}

fn collect(view: &DatasetView, first: u64, limit: Option<u64>) -> Vec<(u64, u64, usize, usize)> {
    let mut cursor = view.cursor(first, limit, ReadErrorPolicy::Skip);
    let mut out = Vec::new();
    while let Some(pos) = cursor.advance().unwrap() {
        out.push((pos.entry, pos.absolute_row, pos.shard, pos.local_row));
    }
    out
}

fn three_shards() -> Arc<Dataset> {
    Arc::new(
        Dataset::new("events")
            .with_shard(shard("a", &[1.0, 2.0]))
            .with_shard(shard("b", &[3.0]))
            .with_shard(shard("c", &[4.0, 5.0, 6.0])),
    )
}

#[test]
fn offsets_are_prefix_sums() {
    let dataset = three_shards();
    assert_eq!(dataset.offsets(), vec![0, 2, 3, 6]);
    assert_eq!(dataset.total_rows(), 6);
    assert_eq!(dataset.schema()[1], ColumnSchema::jagged("pt", ColumnType::Float32));
}

#[test]
fn cursor_seeks_into_the_middle_of_a_shard() {
    let view = DatasetView::new(three_shards());
    assert_eq!(
        collect(&view, 1, Some(3)),
        vec![(1, 1, 0, 1), (2, 2, 1, 0), (3, 3, 2, 0)]
    );
    assert_eq!(collect(&view, 5, None), vec![(5, 5, 2, 2)]);
    assert_eq!(collect(&view, 9, None), vec![]);
}

#[test]
fn shard_restricted_views_keep_dataset_wide_numbers() {
    let view = DatasetView::new(three_shards()).restrict_shards(1..3);
    assert_eq!(view.entries(), 4);
    let rows = collect(&view, 0, None);
    assert_eq!(rows.first(), Some(&(2, 2, 1, 0)));
    assert_eq!(rows.len(), 4);
}

#[test]
fn shard_changed_is_reported_once_per_shard() {
    let view = DatasetView::new(three_shards());
    let mut cursor = view.cursor(0, None, ReadErrorPolicy::Skip);
    let mut changes = Vec::new();
    while let Some(RowPosition {
        shard,
        shard_changed,
        ..
    }) = cursor.advance().unwrap()
    {
        if shard_changed {
            changes.push(shard);
        }
    }
    assert_eq!(changes, vec![0, 1, 2]);
}

#[test]
fn entry_list_limits_visited_rows() {
    let dataset = three_shards();
    let mut list = EntryList::new(dataset.shard_count());
    list.enter(0, 1);
    list.enter(2, 0);
    list.enter(2, 2);
    let view = DatasetView::new(dataset).with_entry_list(Arc::new(list));
    assert_eq!(view.entries(), 3);
    assert_eq!(
        collect(&view, 0, None),
        vec![(0, 1, 0, 1), (1, 3, 2, 0), (2, 5, 2, 2)]
    );
    assert_eq!(collect(&view, 2, None), vec![(2, 5, 2, 2)]);
}

#[test]
fn unavailable_shards_are_skipped_or_abort() {
    let mut dataset = Dataset::new("events");
    dataset.add_shard(shard("a", &[1.0]));
    dataset.add_unavailable_shard("broken", "checksum mismatch");
    dataset.add_shard(shard("c", &[2.0]));
    let view = DatasetView::new(Arc::new(dataset));

    assert_eq!(collect(&view, 0, None), vec![(0, 0, 0, 0), (1, 1, 2, 0)]);

    let mut cursor = view.cursor(0, None, ReadErrorPolicy::Abort);
    assert!(cursor.advance().unwrap().is_some());
    let err = cursor.advance().unwrap_err();
    assert!(matches!(err, ColumnarError::UnavailableShard { ref shard, .. } if shard == "broken"));
}

#[test]
fn jagged_values_are_addressed_per_row() {
    let dataset = three_shards();
    let shard = dataset.shard(2).unwrap().shard().unwrap().clone();
    let pt = shard.column_by_name("pt").unwrap();
    assert_eq!(pt.len_at(1), 2);
    assert_eq!(pt.f64_at(1, 1), Some(10.0));
    assert_eq!(pt.f64_at(1, 2), None);
    let x = shard.column_by_name("x").unwrap();
    assert_eq!(x.len_at(0), 1);
    assert_eq!(x.f64_at(2, 0), Some(6.0));
}

#[test]
fn builder_rejects_wrong_width_and_shape() {
    let mut builder =
        ShardBuilder::new("s", vec![ColumnSchema::scalar("x", ColumnType::Int32)]).unwrap();
    assert!(matches!(
        builder.append_row(&[]),
        Err(ColumnarError::SchemaMismatch { expected: 1, actual: 0, .. })
    ));
    assert!(matches!(
        builder.append_row(&[Cell::array([1i32])]),
        Err(ColumnarError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        ShardBuilder::new(
            "s",
            vec![
                ColumnSchema::scalar("x", ColumnType::Int32),
                ColumnSchema::scalar("x", ColumnType::Int32),
            ],
        ),
        Err(ColumnarError::DuplicateColumn { .. })
    ));
}
