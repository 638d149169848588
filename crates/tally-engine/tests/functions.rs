mod common;

use common::{hist, hist1d, jagged_shard, scalar_shard};
use pretty_assertions::assert_eq;
use tally_columnar::{Cell, ColumnSchema, ColumnType, Dataset, ShardBuilder};
use tally_engine::{
    ColumnHandle, ExprSource, FunctionLinker, LinkedFunction, Multiplicity, RowContext,
    RowFunction, Tally, TallyError, TallyResult,
};

/// Sum of the jagged `pt` values above a threshold, one value per row.
#[derive(Clone, Debug)]
struct SumAbove {
    threshold: f64,
    pt: Option<ColumnHandle>,
}

impl SumAbove {
    fn new(threshold: f64) -> Self {
        Self {
            threshold,
            pt: None,
        }
    }
}

impl RowFunction for SumAbove {
    fn name(&self) -> &str {
        "sum_above"
    }

    fn clone_box(&self) -> Box<dyn RowFunction> {
        Box::new(self.clone())
    }

    fn link(&mut self, linker: &mut FunctionLinker<'_>) -> TallyResult<()> {
        self.pt = Some(linker.column("pt")?);
        Ok(())
    }

    fn ndata(&self, _row: &RowContext) -> usize {
        1
    }

    fn evaluate(&self, row: &RowContext, _i: usize) -> f64 {
        let Some(pt) = self.pt else {
            return 0.0;
        };
        (0..pt.len(row))
            .map(|i| pt.get(row, i))
            .filter(|&v| v > self.threshold)
            .sum()
    }
}

/// Every `pt` value doubled.
#[derive(Clone, Debug, Default)]
struct Doubled {
    pt: Option<ColumnHandle>,
}

impl RowFunction for Doubled {
    fn name(&self) -> &str {
        "doubled"
    }

    fn multiplicity(&self) -> Multiplicity {
        Multiplicity::Variable
    }

    fn clone_box(&self) -> Box<dyn RowFunction> {
        Box::new(self.clone())
    }

    fn link(&mut self, linker: &mut FunctionLinker<'_>) -> TallyResult<()> {
        self.pt = Some(linker.column("pt")?);
        Ok(())
    }

    fn ndata(&self, row: &RowContext) -> usize {
        self.pt.map_or(0, |pt| pt.len(row))
    }

    fn evaluate(&self, row: &RowContext, i: usize) -> f64 {
        self.pt.map_or(0.0, |pt| 2.0 * pt.get(row, i))
    }
}

/// Reads a column that does not exist.
#[derive(Clone, Debug)]
struct Broken;

impl RowFunction for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn clone_box(&self) -> Box<dyn RowFunction> {
        Box::new(Broken)
    }

    fn link(&mut self, linker: &mut FunctionLinker<'_>) -> TallyResult<()> {
        linker.column("missing")?;
        Ok(())
    }

    fn ndata(&self, _row: &RowContext) -> usize {
        1
    }

    fn evaluate(&self, _row: &RowContext, _i: usize) -> f64 {
        0.0
    }
}

fn jets() -> Dataset {
    Dataset::new("events").with_shard(jagged_shard(
        "s0",
        &[(1.0, vec![30.0, 10.0]), (2.0, vec![5.0]), (3.0, vec![50.0, 25.0])],
    ))
}

#[test]
fn function_expressions_fill_sinks_on_every_worker() {
    for workers in [1, 3] {
        let mut tally = Tally::new(jets());
        tally.set_options(tally_engine::RunOptions {
            workers,
            ..Default::default()
        });
        let selection = ExprSource::function(SumAbove::new(20.0));
        tally.add_cut("hard", Some(selection.clone())).unwrap();
        let id = tally
            .add_plot("hard", hist("sum", 10, 0.0, 100.0), selection)
            .unwrap();
        tally.execute().unwrap();

        let h = hist1d(&tally, &id);
        assert_eq!(h.entries(), 2);
        assert_eq!(h.bin_content(h.find_bin(30.0)), 1.0);
        assert_eq!(h.bin_content(h.find_bin(75.0)), 1.0);
    }
}

#[test]
fn jagged_function_alias() {
    let mut tally = Tally::new(jets());
    tally
        .add_alias("pt2", ExprSource::function(Doubled::default()))
        .unwrap();
    tally.set_filter("pt2 > 30");
    let id = tally.add_plot("", hist("pt2", 10, 0.0, 200.0), "pt2").unwrap();
    tally.execute().unwrap();

    // 60, 100 and 50 pass; 20 and 10 do not.
    assert_eq!(hist1d(&tally, &id).entries(), 3);
}

#[test]
fn function_linking_an_unknown_column_fails() {
    let mut tally = Tally::new(jets());
    tally
        .add_plot("", hist("h", 1, 0.0, 1.0), ExprSource::function(Broken))
        .unwrap();
    assert!(matches!(
        tally.execute(),
        Err(TallyError::UnknownColumn { column, .. }) if column == "missing"
    ));
}

#[test]
fn unlinked_function_refuses_to_evaluate() {
    let dataset = jets();
    let row = RowContext::new(&dataset);
    let function = LinkedFunction::unlinked(Box::new(SumAbove::new(0.0)));
    assert!(!function.is_linked());
    assert_eq!(function.ndata(&row), 0);
    assert!(matches!(
        function.evaluate(&row, 0),
        Err(TallyError::UnlinkedFunction(name)) if name == "sum_above"
    ));
}

#[test]
fn replaced_column_is_read_instead() {
    let mut builder = ShardBuilder::new(
        "s0",
        vec![
            ColumnSchema::scalar("x", ColumnType::Float64),
            ColumnSchema::scalar("x_up", ColumnType::Float64),
        ],
    )
    .unwrap();
    builder.append_row(&[Cell::from(0.5), Cell::from(1.5)]).unwrap();
    let dataset = Dataset::new("events").with_shard(builder.finalize());

    let mut tally = Tally::new(dataset);
    tally.add_cut("shifted", Some("x > 1".into())).unwrap();
    let id = tally
        .add_plot("shifted", hist("h", 2, 0.0, 2.0), "x")
        .unwrap();

    tally.replace_column("x", "x_up");
    tally.execute().unwrap();
    assert_eq!(hist1d(&tally, &id).bin_content(2), 1.0);

    tally.reset_replace_column("x");
    tally.execute().unwrap();
    assert_eq!(hist1d(&tally, &id).entries(), 0);
}

#[test]
fn replacement_missing_in_a_shard_skips_it() {
    let dataset = Dataset::new("events").with_shard(scalar_shard("s0", "x", &[0.5]));
    let mut tally = Tally::new(dataset);
    let id = tally.add_plot("", hist("h", 1, 0.0, 1.0), "x").unwrap();
    tally.replace_column("x", "nowhere");
    assert_eq!(tally.execute().unwrap(), 1);
    assert_eq!(hist1d(&tally, &id).entries(), 0);
}
