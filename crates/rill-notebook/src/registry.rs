//! Cross-notebook import resolution.
//!
//! The registry turns notebook ids into live modules: fetch the source,
//! define every named code cell into a fresh module, recurse into that
//! notebook's own imports. Loaded modules are cached so a diamond of imports
//! resolves to one shared module, and an in-flight set catches import cycles
//! before they recurse forever.

use crate::cell::assignment_specs;
use dashmap::{DashMap, DashSet};
use rill_core::{
    CellKind, Compiler, Error, NotebookId, NotebookLoader, ParsedStatement, Parser, Result,
};
use rill_engine::{Module, Runtime};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ImportedModuleRegistry {
    runtime: Runtime,
    loader: Arc<dyn NotebookLoader>,
    parser: Arc<dyn Parser>,
    compiler: Arc<dyn Compiler>,
    cache: DashMap<NotebookId, Module>,
    loading: DashSet<NotebookId>,
}

impl ImportedModuleRegistry {
    pub fn new(
        runtime: Runtime,
        loader: Arc<dyn NotebookLoader>,
        parser: Arc<dyn Parser>,
        compiler: Arc<dyn Compiler>,
    ) -> Self {
        Self {
            runtime,
            loader,
            parser,
            compiler,
            cache: DashMap::new(),
            loading: DashSet::new(),
        }
    }

    /// Resolve a notebook id to its loaded module, loading (and caching) it
    /// on first use. Fails with `CircularImport` when the id is already
    /// being loaded somewhere up the call chain.
    pub async fn get_module(&self, notebook_id: &NotebookId) -> Result<Module> {
        if let Some(module) = self.cache.get(notebook_id) {
            return Ok(module.clone());
        }
        if !self.loading.insert(notebook_id.clone()) {
            return Err(Error::circular_import(notebook_id.clone()));
        }
        let loaded = self.load(notebook_id).await;
        self.loading.remove(notebook_id);
        let module = loaded?;
        self.cache.insert(notebook_id.clone(), module.clone());
        Ok(module)
    }

    pub fn is_cached(&self, notebook_id: &NotebookId) -> bool {
        self.cache.contains_key(notebook_id)
    }

    fn load<'a>(
        &'a self,
        notebook_id: &'a NotebookId,
    ) -> Pin<Box<dyn Future<Output = Result<Module>> + Send + 'a>> {
        Box::pin(async move {
            let source = self
                .loader
                .fetch(notebook_id)
                .await
                .map_err(|e| Error::notebook_load(notebook_id.clone(), e.to_string()))?;
            debug!(notebook = %notebook_id, cells = source.cells.len(), "loading imported notebook");
            let module = self.runtime.module();
            for cell in &source.cells {
                // Only code cells export names; prose cells have nothing to
                // offer an importer.
                if cell.kind != CellKind::Code {
                    continue;
                }
                match self.parser.parse(&cell.value).await {
                    ParsedStatement::Exception { message } => {
                        warn!(notebook = %notebook_id, cell = %cell.id, %message,
                            "skipping unparseable cell in imported notebook");
                    }
                    ParsedStatement::Assignment { name: None, .. } => {
                        debug!(notebook = %notebook_id, cell = %cell.id,
                            "skipping anonymous cell in imported notebook");
                    }
                    ParsedStatement::Assignment {
                        name: name @ Some(_),
                        dependencies,
                        body,
                        viewof,
                    } => {
                        let specs =
                            assignment_specs(name, dependencies, &body, viewof, &self.compiler)
                                .map_err(|e| {
                                    Error::notebook_load(notebook_id.clone(), e.to_string())
                                })?;
                        for spec in specs {
                            let variable = module.variable();
                            variable.define(spec.name.as_deref(), spec.dependencies, spec.body)?;
                        }
                    }
                    ParsedStatement::Import { notebook, names } => {
                        let from = self.get_module(&notebook).await?;
                        for binding in &names {
                            let variable = module.variable();
                            variable.import(&binding.name, Some(binding.local_name()), &from)?;
                        }
                    }
                }
            }
            Ok(module)
        })
    }

    /// Dispose every cached module and forget it. Idempotent.
    pub fn dispose(&self) {
        for entry in self.cache.iter() {
            entry.value().dispose();
        }
        self.cache.clear();
        self.loading.clear();
    }
}
