//! Notebook - an ordered list of cells over one shared reactive module.
//!
//! The notebook owns the runtime, the main module, and the import registry.
//! Structural edits (add, remove, move, duplicate) and content edits all
//! bump a monotonic version and refresh the updated-at timestamp. The cell
//! list lock is never held across an await; execution always happens on a
//! cloned `Arc<Cell>`.

use crate::cell::{Cell, CellPatch};
use crate::registry::ImportedModuleRegistry;
use chrono::{DateTime, Utc};
use rill_core::{
    CellId, CellKind, Compiler, Error, NotebookId, NotebookLoader, NotebookSource, Parser, Result,
};
use rill_engine::{Module, Runtime};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

pub struct Notebook {
    id: NotebookId,
    title: Mutex<String>,
    description: Mutex<String>,
    runtime: Runtime,
    module: Module,
    registry: Arc<ImportedModuleRegistry>,
    parser: Arc<dyn Parser>,
    compiler: Arc<dyn Compiler>,
    cells: Mutex<Vec<Arc<Cell>>>,
    version: AtomicU64,
    updated_at: Mutex<DateTime<Utc>>,
    disposed: AtomicBool,
}

impl Notebook {
    pub fn new(
        id: NotebookId,
        parser: Arc<dyn Parser>,
        compiler: Arc<dyn Compiler>,
        loader: Arc<dyn NotebookLoader>,
    ) -> Self {
        let runtime = Runtime::new();
        let module = runtime.module();
        let registry = Arc::new(ImportedModuleRegistry::new(
            runtime.clone(),
            loader,
            parser.clone(),
            compiler.clone(),
        ));
        Self {
            id,
            title: Mutex::new(String::new()),
            description: Mutex::new(String::new()),
            runtime,
            module,
            registry,
            parser,
            compiler,
            cells: Mutex::new(Vec::new()),
            version: AtomicU64::new(0),
            updated_at: Mutex::new(Utc::now()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Build a notebook from a stored source document and execute every cell
    /// in document order.
    pub async fn from_source(
        id: NotebookId,
        source: NotebookSource,
        parser: Arc<dyn Parser>,
        compiler: Arc<dyn Compiler>,
        loader: Arc<dyn NotebookLoader>,
    ) -> Result<Self> {
        let notebook = Self::new(id, parser, compiler, loader);
        *notebook.title.lock().unwrap() = source.title;
        *notebook.description.lock().unwrap() = source.description;
        for cell in source.cells {
            notebook
                .add_cell(cell.id, cell.kind, cell.value, None, false)
                .await?;
        }
        Ok(notebook)
    }

    pub fn id(&self) -> &NotebookId {
        &self.id
    }

    pub fn title(&self) -> String {
        self.title.lock().unwrap().clone()
    }

    pub fn description(&self) -> String {
        self.description.lock().unwrap().clone()
    }

    /// The shared module notebook cells bind into.
    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn registry(&self) -> &Arc<ImportedModuleRegistry> {
        &self.registry
    }

    /// Monotonic edit counter; bumps on every successful mutation.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        *self.updated_at.lock().unwrap()
    }

    pub fn cells(&self) -> Vec<Arc<Cell>> {
        self.cells.lock().unwrap().clone()
    }

    pub fn cell(&self, id: &CellId) -> Option<Arc<Cell>> {
        self.cells
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id() == id)
            .cloned()
    }

    pub fn focused_cell(&self) -> Option<Arc<Cell>> {
        self.cells
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.is_focused())
            .cloned()
    }

    /// Insert a cell at `position` (clamped to the list bounds, appended when
    /// absent) and execute it. Fails when the id is already taken.
    pub async fn add_cell(
        &self,
        id: CellId,
        kind: CellKind,
        source: impl Into<String>,
        position: Option<usize>,
        focus: bool,
    ) -> Result<Arc<Cell>> {
        self.ensure_live()?;
        let cell = Arc::new(Cell::new(
            id,
            kind,
            source.into(),
            self.module.clone(),
            self.parser.clone(),
            self.compiler.clone(),
            self.registry.clone(),
        ));
        {
            let mut cells = self.cells.lock().unwrap();
            if cells.iter().any(|c| c.id() == cell.id()) {
                return Err(Error::DuplicateCell(cell.id().clone()));
            }
            let index = position.unwrap_or(cells.len()).min(cells.len());
            if focus {
                for existing in cells.iter() {
                    existing.set_focused(false);
                }
                cell.set_focused(true);
            }
            cells.insert(index, cell.clone());
        }
        cell.execute().await;
        self.touch();
        Ok(cell)
    }

    /// Apply a patch to a cell and re-execute it only if something actually
    /// changed. Returns whether it did.
    pub async fn update_cell(&self, id: &CellId, patch: &CellPatch) -> Result<bool> {
        self.ensure_live()?;
        let cell = self.cell(id).ok_or_else(|| Error::CellNotFound(id.clone()))?;
        if !cell.apply_patch(patch) {
            return Ok(false);
        }
        cell.execute().await;
        self.touch();
        Ok(true)
    }

    /// Remove and dispose a cell. Returns false for an unknown id.
    pub fn remove_cell(&self, id: &CellId) -> bool {
        let removed = {
            let mut cells = self.cells.lock().unwrap();
            match cells.iter().position(|c| c.id() == id) {
                Some(index) => Some(cells.remove(index)),
                None => None,
            }
        };
        match removed {
            Some(cell) => {
                cell.dispose();
                self.touch();
                true
            }
            None => false,
        }
    }

    /// Reorder a cell to `new_index`. Order is presentation only; reactive
    /// edges are untouched. Returns false for an unknown id or an index out
    /// of bounds.
    pub fn move_cell(&self, id: &CellId, new_index: usize) -> bool {
        let moved = {
            let mut cells = self.cells.lock().unwrap();
            if new_index >= cells.len() {
                false
            } else {
                match cells.iter().position(|c| c.id() == id) {
                    Some(index) => {
                        let cell = cells.remove(index);
                        cells.insert(new_index, cell);
                        true
                    }
                    None => false,
                }
            }
        };
        if moved {
            self.touch();
        }
        moved
    }

    /// Clone a cell's kind and source under a fresh random id, inserted
    /// directly after the original, and execute it.
    pub async fn duplicate_cell(&self, id: &CellId) -> Result<Arc<Cell>> {
        self.ensure_live()?;
        let (kind, source, position) = {
            let cells = self.cells.lock().unwrap();
            let index = cells
                .iter()
                .position(|c| c.id() == id)
                .ok_or_else(|| Error::CellNotFound(id.clone()))?;
            (cells[index].kind(), cells[index].source(), index + 1)
        };
        self.add_cell(CellId::random(), kind, source, Some(position), false)
            .await
    }

    /// Focus one cell, unfocusing every other. Returns false for an unknown
    /// id.
    pub fn set_focus(&self, id: &CellId) -> bool {
        {
            let cells = self.cells.lock().unwrap();
            if !cells.iter().any(|c| c.id() == id) {
                return false;
            }
            for cell in cells.iter() {
                cell.set_focused(cell.id() == id);
            }
        }
        self.touch();
        true
    }

    pub fn clear_focus(&self) {
        for cell in self.cells.lock().unwrap().iter() {
            cell.set_focused(false);
        }
        self.touch();
    }

    /// Toggle a cell's closed flag, returning the new state.
    pub fn toggle_closed(&self, id: &CellId) -> Option<bool> {
        let closed = self.cell(id).map(|cell| cell.toggle_closed());
        if closed.is_some() {
            self.touch();
        }
        closed
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(Error::Disposed("notebook"));
        }
        Ok(())
    }

    fn touch(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
        *self.updated_at.lock().unwrap() = Utc::now();
    }

    /// Tear down cells, imported modules, then the runtime. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(notebook = %self.id, "disposing notebook");
        let cells: Vec<Arc<Cell>> = self.cells.lock().unwrap().drain(..).collect();
        for cell in cells {
            cell.dispose();
        }
        self.registry.dispose();
        self.runtime.dispose();
    }
}

impl Drop for Notebook {
    fn drop(&mut self) {
        self.dispose();
    }
}
