//! Cell - maps one notebook entry's source text onto reactive variables.
//!
//! A cell owns its parse result, its error state, and the set of variables
//! it currently binds. Re-executing diffs the desired name set against the
//! bound one: stale bindings are disposed before new or changed ones are
//! (re)defined, so no reactive binding survives a cell-shape change.

use crate::bodies::{Combine, InputAdaptor};
use crate::registry::ImportedModuleRegistry;
use crate::template::{self, Marker};
use pulldown_cmark::{html as md_html, Parser as MarkdownParser};
use rill_core::{
    CellId, CellKind, CompiledBody, Compiler, Error, ImportBinding, ParsedStatement, Parser,
    Result,
};
use rill_engine::{Module, ObserverSet, ObserverState, Variable};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Patch applied by `Notebook::update_cell`.
#[derive(Clone, Debug, Default)]
pub struct CellPatch {
    pub kind: Option<CellKind>,
    pub value: Option<String>,
}

/// Canonical output of a cell: the single bound variable's observer set, or
/// a synthetic cell-id-named variable combining all bound names.
#[derive(Clone)]
pub enum CellOutput {
    Single(Arc<ObserverSet>),
    Combined {
        names: Vec<String>,
        observers: Arc<ObserverSet>,
    },
}

impl CellOutput {
    pub fn observers(&self) -> &Arc<ObserverSet> {
        match self {
            Self::Single(observers) => observers,
            Self::Combined { observers, .. } => observers,
        }
    }
}

struct Binding {
    name: Option<String>,
    variable: Variable,
}

struct OutputCache {
    output: CellOutput,
    combined: Option<Variable>,
}

enum BindAction {
    Define {
        dependencies: Vec<String>,
        body: Arc<dyn CompiledBody>,
    },
    Import {
        name: String,
        from: Module,
    },
}

pub(crate) struct AssignSpec {
    pub(crate) name: Option<String>,
    pub(crate) dependencies: Vec<String>,
    pub(crate) body: Arc<dyn CompiledBody>,
}

/// Expand one parsed assignment into variable specs. A `viewof` assignment
/// synthesizes a second implicit variable feeding the visible one through
/// the input adaptor, so displayed and emitted values can differ.
pub(crate) fn assignment_specs(
    name: Option<String>,
    dependencies: Vec<String>,
    body: &str,
    viewof: bool,
    compiler: &Arc<dyn Compiler>,
) -> Result<Vec<AssignSpec>> {
    let compiled = compiler.compile(body, &dependencies)?;
    if !viewof {
        return Ok(vec![AssignSpec {
            name,
            dependencies,
            body: compiled,
        }]);
    }
    let Some(name) = name else {
        return Err(Error::parse("viewof requires a name"));
    };
    let view_name = format!("viewof {name}");
    Ok(vec![
        AssignSpec {
            name: Some(view_name.clone()),
            dependencies,
            body: compiled,
        },
        AssignSpec {
            name: Some(name),
            dependencies: vec![view_name],
            body: Arc::new(InputAdaptor),
        },
    ])
}

pub struct Cell {
    id: CellId,
    kind: Mutex<CellKind>,
    source: Mutex<String>,
    module: Module,
    parser: Arc<dyn Parser>,
    compiler: Arc<dyn Compiler>,
    registry: Arc<ImportedModuleRegistry>,
    parse: Mutex<Option<ParsedStatement>>,
    bindings: Mutex<Vec<Binding>>,
    output: Mutex<Option<OutputCache>>,
    error: Mutex<Option<Arc<Error>>>,
    focused: AtomicBool,
    closed: AtomicBool,
    disposed: AtomicBool,
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Cell {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: CellId,
        kind: CellKind,
        source: String,
        module: Module,
        parser: Arc<dyn Parser>,
        compiler: Arc<dyn Compiler>,
        registry: Arc<ImportedModuleRegistry>,
    ) -> Self {
        Self {
            id,
            kind: Mutex::new(kind),
            source: Mutex::new(source),
            module,
            parser,
            compiler,
            registry,
            parse: Mutex::new(None),
            bindings: Mutex::new(Vec::new()),
            output: Mutex::new(None),
            error: Mutex::new(None),
            focused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &CellId {
        &self.id
    }

    pub fn kind(&self) -> CellKind {
        *self.kind.lock().unwrap()
    }

    pub fn source(&self) -> String {
        self.source.lock().unwrap().clone()
    }

    pub fn parse_result(&self) -> Option<ParsedStatement> {
        self.parse.lock().unwrap().clone()
    }

    pub fn is_focused(&self) -> bool {
        self.focused.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn set_focused(&self, focused: bool) {
        self.focused.store(focused, Ordering::SeqCst);
    }

    /// Flip the UI-visibility flag; orthogonal to execution. Returns the new
    /// state.
    pub(crate) fn toggle_closed(&self) -> bool {
        !self.closed.fetch_xor(true, Ordering::SeqCst)
    }

    pub(crate) fn apply_patch(&self, patch: &CellPatch) -> bool {
        let mut changed = false;
        if let Some(kind) = patch.kind {
            let mut current = self.kind.lock().unwrap();
            if *current != kind {
                *current = kind;
                changed = true;
            }
        }
        if let Some(value) = &patch.value {
            let mut current = self.source.lock().unwrap();
            if *current != *value {
                current.clone_from(value);
                changed = true;
            }
        }
        changed
    }

    /// Names currently bound by this cell, in definition order.
    pub fn bound_names(&self) -> Vec<String> {
        self.bindings
            .lock()
            .unwrap()
            .iter()
            .filter_map(|b| b.name.clone())
            .collect()
    }

    /// (Re)compile the cell from its current source. Errors never escape:
    /// they become the cell's error state.
    pub async fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        *self.error.lock().unwrap() = None;
        let kind = self.kind();
        let source = self.source();
        debug!(cell = %self.id, ?kind, "executing cell");
        match kind {
            CellKind::Code => {
                let parsed = self.parser.parse(&source).await;
                *self.parse.lock().unwrap() = Some(parsed.clone());
                match parsed {
                    ParsedStatement::Exception { message } => {
                        self.clear_bindings();
                        self.set_error(Arc::new(Error::parse(message)));
                    }
                    ParsedStatement::Assignment {
                        name,
                        dependencies,
                        body,
                        viewof,
                    } => match assignment_specs(name, dependencies, &body, viewof, &self.compiler)
                    {
                        Ok(specs) => self.assign_variables(specs),
                        Err(error) => {
                            self.clear_bindings();
                            self.set_error(Arc::new(error));
                        }
                    },
                    ParsedStatement::Import { notebook, names } => {
                        match self.registry.get_module(&notebook).await {
                            Ok(module) => self.import_variables(&names, &module),
                            Err(error) => {
                                self.clear_bindings();
                                self.set_error(Arc::new(error));
                            }
                        }
                    }
                }
            }
            CellKind::Markdown => self.execute_template(&source, Marker::Brace),
            CellKind::Markup => self.execute_template(&source, Marker::DollarBrace),
        }
    }

    fn execute_template(&self, source: &str, marker: Marker) {
        let (dependencies, body) = template::compile(source, marker, &self.compiler);
        *self.parse.lock().unwrap() = Some(ParsedStatement::Assignment {
            name: None,
            dependencies: dependencies.clone(),
            body: source.to_string(),
            viewof: false,
        });
        self.assign_variables(vec![AssignSpec {
            name: None,
            dependencies,
            body,
        }]);
    }

    pub(crate) fn assign_variables(&self, specs: Vec<AssignSpec>) {
        let actions = specs
            .into_iter()
            .map(|spec| {
                (
                    spec.name,
                    BindAction::Define {
                        dependencies: spec.dependencies,
                        body: spec.body,
                    },
                )
            })
            .collect();
        self.rebind(actions);
    }

    pub(crate) fn import_variables(&self, names: &[ImportBinding], from: &Module) {
        let actions = names
            .iter()
            .map(|binding| {
                (
                    Some(binding.local_name().to_string()),
                    BindAction::Import {
                        name: binding.name.clone(),
                        from: from.clone(),
                    },
                )
            })
            .collect();
        self.rebind(actions);
    }

    /// Diff the desired name set against the bound one: dispose removed
    /// names first, then (re)define new and surviving ones in place.
    fn rebind(&self, actions: Vec<(Option<String>, BindAction)>) {
        let before: Vec<Option<String>>;
        let after: Vec<Option<String>>;
        {
            let mut bindings = self.bindings.lock().unwrap();
            before = bindings.iter().map(|b| b.name.clone()).collect();
            let desired: Vec<Option<String>> =
                actions.iter().map(|(name, _)| name.clone()).collect();

            let mut retained = Vec::new();
            for binding in bindings.drain(..) {
                if desired.contains(&binding.name) {
                    retained.push(binding);
                } else {
                    let _ = binding.variable.delete();
                }
            }

            let mut next = Vec::with_capacity(actions.len());
            for (name, action) in actions {
                let variable = match retained.iter().position(|b| b.name == name) {
                    Some(index) => retained.remove(index).variable,
                    None => self.module.variable(),
                };
                let outcome = match action {
                    BindAction::Define { dependencies, body } => {
                        variable.define(name.as_deref(), dependencies, body)
                    }
                    BindAction::Import { name: remote, from } => {
                        variable.import(&remote, name.as_deref(), &from)
                    }
                };
                if let Err(error) = outcome {
                    self.set_error(Arc::new(error));
                }
                next.push(Binding { name, variable });
            }
            *bindings = next;
            after = bindings.iter().map(|b| b.name.clone()).collect();
        }
        if before != after {
            self.invalidate_output();
        }
    }

    fn clear_bindings(&self) {
        let drained: Vec<Binding> = self.bindings.lock().unwrap().drain(..).collect();
        for binding in drained {
            let _ = binding.variable.delete();
        }
        self.invalidate_output();
    }

    fn set_error(&self, error: Arc<Error>) {
        *self.error.lock().unwrap() = Some(error);
    }

    fn invalidate_output(&self) {
        if let Some(cache) = self.output.lock().unwrap().take() {
            if let Some(combined) = cache.combined {
                let _ = combined.delete();
            }
        }
    }

    /// Canonical output, built lazily and cached until the binding set
    /// changes.
    pub fn output(&self) -> Option<CellOutput> {
        let mut cache = self.output.lock().unwrap();
        if cache.is_none() {
            *cache = self.build_output();
        }
        cache.as_ref().map(|c| c.output.clone())
    }

    fn build_output(&self) -> Option<OutputCache> {
        let bindings = self.bindings.lock().unwrap();
        match bindings.len() {
            0 => None,
            1 => bindings[0].variable.observers().map(|observers| OutputCache {
                output: CellOutput::Single(observers),
                combined: None,
            }),
            _ => {
                let names: Vec<String> =
                    bindings.iter().filter_map(|b| b.name.clone()).collect();
                let variable = self.module.variable();
                let defined =
                    variable.define(Some(self.id.as_str()), names.clone(), Arc::new(Combine));
                match (defined, variable.observers()) {
                    (Ok(()), Some(observers)) => Some(OutputCache {
                        output: CellOutput::Combined { names, observers },
                        combined: Some(variable),
                    }),
                    _ => None,
                }
            }
        }
    }

    /// Settled value of the canonical output, if fulfilled.
    pub fn value(&self) -> Option<Value> {
        match self.output()?.observers().state() {
            ObserverState::Fulfilled(value) => Some(value),
            _ => None,
        }
    }

    /// The cell's error state: a parse/load error recorded at execute time,
    /// or the first rejected binding.
    pub fn error(&self) -> Option<Arc<Error>> {
        if let Some(error) = self.error.lock().unwrap().clone() {
            return Some(error);
        }
        let bindings = self.bindings.lock().unwrap();
        for binding in bindings.iter() {
            if let Some(observers) = binding.variable.observers() {
                if let ObserverState::Rejected(error) = observers.state() {
                    return Some(error);
                }
            }
        }
        None
    }

    /// Rendered HTML for markdown cells, the interpolated template for
    /// markup cells, nothing for code cells.
    pub fn html(&self) -> Option<String> {
        match self.kind() {
            CellKind::Code => None,
            CellKind::Markup => match self.value()? {
                Value::String(text) => Some(text),
                _ => None,
            },
            CellKind::Markdown => {
                let value = self.value()?;
                let text = value.as_str()?;
                let mut out = String::new();
                md_html::push_html(&mut out, MarkdownParser::new(text));
                Some(out)
            }
        }
    }

    /// Delete every bound variable and clear observers. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(cell = %self.id, "disposing cell");
        self.clear_bindings();
        *self.parse.lock().unwrap() = None;
        *self.error.lock().unwrap() = None;
    }
}
