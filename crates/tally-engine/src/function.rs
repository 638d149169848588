use crate::error::{TallyError, TallyResult};
use crate::expr::Multiplicity;
use crate::row::{ColumnHandle, RowContext};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Custom per-row code usable wherever a formula is accepted.
///
/// The configuration holds the prototype; every worker evaluates its own linked copy, created
/// with [`RowFunction::clone_box`] and then [`RowFunction::link`]ed to the worker's columns.
pub trait RowFunction: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Shape of the values per row, used to lay out alias storage.
    fn multiplicity(&self) -> Multiplicity {
        Multiplicity::Scalar
    }

    fn clone_box(&self) -> Box<dyn RowFunction>;

    /// Resolves the columns the function reads.
    fn link(&mut self, linker: &mut FunctionLinker<'_>) -> TallyResult<()>;

    /// Called once per row before any evaluation.
    fn begin_row(&mut self, _row: &RowContext) -> TallyResult<()> {
        Ok(())
    }

    fn ndata(&self, row: &RowContext) -> usize;

    fn evaluate(&self, row: &RowContext, i: usize) -> f64;
}

/// Column lookup offered to [`RowFunction::link`].
pub struct FunctionLinker<'a> {
    function: &'a str,
    row: &'a mut RowContext,
    leaves: Vec<usize>,
}

impl FunctionLinker<'_> {
    pub fn column(&mut self, name: &str) -> TallyResult<ColumnHandle> {
        let leaf = self.row.leaf(name).ok_or_else(|| TallyError::UnknownColumn {
            expr: format!("[{}]", self.function),
            column: name.to_string(),
        })?;
        if !self.leaves.contains(&leaf) {
            self.leaves.push(leaf);
        }
        Ok(ColumnHandle(leaf))
    }
}

/// A worker-local function instance. Evaluation fails until it has been linked.
#[derive(Debug)]
pub struct LinkedFunction {
    name: String,
    function: RefCell<Box<dyn RowFunction>>,
    linked: bool,
    leaves: Vec<usize>,
}

impl LinkedFunction {
    pub fn unlinked(function: Box<dyn RowFunction>) -> Self {
        Self {
            name: function.name().to_string(),
            function: RefCell::new(function),
            linked: false,
            leaves: Vec::new(),
        }
    }

    pub fn link(&mut self, row: &mut RowContext) -> TallyResult<()> {
        let mut linker = FunctionLinker {
            function: &self.name,
            row,
            leaves: Vec::new(),
        };
        self.function.get_mut().link(&mut linker)?;
        self.leaves = linker.leaves;
        self.linked = true;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    pub(crate) fn leaves(&self) -> &[usize] {
        &self.leaves
    }

    pub fn multiplicity(&self) -> Multiplicity {
        self.function.borrow().multiplicity()
    }

    pub fn begin_row(&self, row: &RowContext) -> TallyResult<()> {
        if !self.linked {
            return Err(TallyError::UnlinkedFunction(self.name.clone()));
        }
        self.function.borrow_mut().begin_row(row)
    }

    /// `0` for an unlinked function.
    pub fn ndata(&self, row: &RowContext) -> usize {
        if !self.linked {
            return 0;
        }
        self.function.borrow().ndata(row)
    }

    pub fn evaluate(&self, row: &RowContext, i: usize) -> TallyResult<f64> {
        if !self.linked {
            return Err(TallyError::UnlinkedFunction(self.name.clone()));
        }
        Ok(self.function.borrow().evaluate(row, i))
    }
}

/// Linked copies of the functions used in one worker, one per prototype.
#[derive(Debug, Default)]
pub struct FunctionLibrary {
    linked: Vec<(Arc<dyn RowFunction>, Rc<LinkedFunction>)>,
}

impl FunctionLibrary {
    pub fn len(&self) -> usize {
        self.linked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.linked.is_empty()
    }

    pub(crate) fn get_function(
        &mut self,
        prototype: &Arc<dyn RowFunction>,
        row: &mut RowContext,
    ) -> TallyResult<Rc<LinkedFunction>> {
        let key = Arc::as_ptr(prototype) as *const ();
        if let Some((_, linked)) = self
            .linked
            .iter()
            .find(|(proto, _)| Arc::as_ptr(proto) as *const () == key)
        {
            return Ok(Rc::clone(linked));
        }
        let mut function = LinkedFunction::unlinked(prototype.clone_box());
        function.link(row)?;
        let function = Rc::new(function);
        self.linked.push((Arc::clone(prototype), Rc::clone(&function)));
        Ok(function)
    }

    /// Row hook of every linked function; called once per row.
    pub(crate) fn begin_row(&self, row: &RowContext) -> TallyResult<()> {
        for (_, function) in &self.linked {
            function.begin_row(row)?;
        }
        Ok(())
    }
}
