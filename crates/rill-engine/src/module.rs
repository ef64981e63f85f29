//! Module - namespace owning reactive variables and driving propagation.
//!
//! Slots are created on first reference, whether that reference is a
//! definition or a dependency. A dependency on a name nobody defines rejects
//! the dependent, but the slot (and its edges) stay alive, so defining the
//! name later re-evaluates and heals every dependent.

use crate::observers::{ObserverCallback, ObserverEvent, ObserverId, ObserverSet, ObserverState};
use crate::variable::Variable;
use rill_core::{CompiledBody, Error, Result, VariableId};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// How a variable is defined: a compiled closure over named dependencies, or
/// a value tracking another module's export.
pub(crate) enum Body {
    Closure(Arc<dyn CompiledBody>),
    Import { from: Module, remote: String },
}

pub(crate) struct Definition {
    pub(crate) dependencies: Vec<String>,
    pub(crate) body: Body,
    /// Edges registered on dependency slots; removed on redefine or delete.
    dep_edges: Vec<(Arc<Slot>, u64)>,
    /// Cross-module subscription held on the exporting observer set.
    import_sub: Option<(Arc<ObserverSet>, ObserverId)>,
}

pub(crate) struct Slot {
    pub(crate) id: VariableId,
    pub(crate) name: Option<String>,
    pub(crate) observers: Arc<ObserverSet>,
    pub(crate) definition: Mutex<Option<Definition>>,
    dependents: Mutex<HashMap<u64, Weak<Slot>>>,
    next_edge: AtomicU64,
}

impl Slot {
    fn new(name: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            id: VariableId::new(),
            name,
            observers: Arc::new(ObserverSet::new()),
            definition: Mutex::new(None),
            dependents: Mutex::new(HashMap::new()),
            next_edge: AtomicU64::new(0),
        })
    }

    fn add_dependent(&self, dependent: &Arc<Slot>) -> u64 {
        let token = self.next_edge.fetch_add(1, Ordering::Relaxed);
        self.dependents
            .lock()
            .unwrap()
            .insert(token, Arc::downgrade(dependent));
        token
    }

    fn remove_dependent(&self, token: u64) {
        self.dependents.lock().unwrap().remove(&token);
    }

    fn dependents(&self) -> Vec<Arc<Slot>> {
        self.dependents
            .lock()
            .unwrap()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub(crate) fn is_defined(&self) -> bool {
        self.definition.lock().unwrap().is_some()
    }
}

enum DepState {
    Ready(Value),
    Blocked,
    Failed(Arc<Error>),
    Undefined,
}

pub(crate) struct ModuleInner {
    slots: Mutex<HashMap<String, Arc<Slot>>>,
    anonymous: Mutex<Vec<Arc<Slot>>>,
    builtins: Arc<HashMap<String, Value>>,
    disposed: AtomicBool,
}

impl ModuleInner {
    pub(crate) fn named_slot(&self, name: &str) -> Arc<Slot> {
        let mut slots = self.slots.lock().unwrap();
        slots
            .entry(name.to_string())
            .or_insert_with(|| Slot::new(Some(name.to_string())))
            .clone()
    }

    pub(crate) fn anonymous_slot(&self) -> Arc<Slot> {
        let slot = Slot::new(None);
        self.anonymous.lock().unwrap().push(slot.clone());
        slot
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn dep_state(&self, name: &str) -> DepState {
        let slot = self.slots.lock().unwrap().get(name).cloned();
        if let Some(slot) = slot {
            if slot.is_defined() {
                return match slot.observers.state() {
                    ObserverState::Fulfilled(value) => DepState::Ready(value),
                    ObserverState::Rejected(error) => DepState::Failed(error),
                    ObserverState::Pending => DepState::Blocked,
                };
            }
        }
        match self.builtins.get(name) {
            Some(value) => DepState::Ready(value.clone()),
            None => DepState::Undefined,
        }
    }

    /// Re-evaluate one slot from its current definition and dependency
    /// states, then notify its observer set of the outcome.
    fn evaluate(&self, slot: &Arc<Slot>) {
        enum Plan {
            Pending,
            Value(Value),
            Reject(Arc<Error>),
            Call(Arc<dyn CompiledBody>, Vec<Value>),
        }

        let plan = {
            let definition = slot.definition.lock().unwrap();
            match definition.as_ref() {
                None => Plan::Pending,
                Some(def) => match &def.body {
                    Body::Closure(body) => {
                        let mut args = Vec::with_capacity(def.dependencies.len());
                        let mut early = None;
                        for dep in &def.dependencies {
                            if slot.name.as_deref() == Some(dep.as_str()) {
                                early = Some(Plan::Reject(Arc::new(Error::CircularDefinition {
                                    name: dep.clone(),
                                })));
                                break;
                            }
                            match self.dep_state(dep) {
                                DepState::Ready(value) => args.push(value),
                                DepState::Blocked => {
                                    early = Some(Plan::Pending);
                                    break;
                                }
                                DepState::Failed(error) => {
                                    early = Some(Plan::Reject(error));
                                    break;
                                }
                                DepState::Undefined => {
                                    early = Some(Plan::Reject(Arc::new(Error::undefined(
                                        dep.clone(),
                                    ))));
                                    break;
                                }
                            }
                        }
                        early.unwrap_or_else(|| Plan::Call(body.clone(), args))
                    }
                    Body::Import { from, remote } => match from.inner.dep_state(remote) {
                        DepState::Ready(value) => Plan::Value(value),
                        DepState::Blocked => Plan::Pending,
                        DepState::Failed(error) => Plan::Reject(error),
                        DepState::Undefined => {
                            Plan::Reject(Arc::new(Error::undefined(remote.clone())))
                        }
                    },
                },
            }
        };

        match plan {
            Plan::Pending => {
                if !slot.observers.state().is_pending() {
                    slot.observers.invalidate();
                }
            }
            Plan::Value(value) => slot.observers.fulfilled(value),
            Plan::Reject(error) => slot.observers.rejected(error),
            Plan::Call(body, args) => match body.call(&args) {
                Ok(value) => slot.observers.fulfilled(value),
                Err(error) => slot.observers.rejected(Arc::new(error)),
            },
        }
    }

    /// Push-based propagation: re-evaluate `start`, then walk dependent
    /// edges breadth-first. Each slot is re-evaluated at most once per pass,
    /// so diamonds converge in one step and definition cycles terminate.
    pub(crate) fn update(&self, start: &Arc<Slot>) {
        let mut visited: HashSet<VariableId> = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start.clone());
        while let Some(slot) = queue.pop_front() {
            if !visited.insert(slot.id) {
                continue;
            }
            self.evaluate(&slot);
            for dependent in slot.dependents() {
                if !visited.contains(&dependent.id) {
                    queue.push_back(dependent);
                }
            }
        }
    }

    /// Replace a slot's definition and propagate the new value.
    pub(crate) fn install(
        self: &Arc<Self>,
        slot: &Arc<Slot>,
        dependencies: Vec<String>,
        body: Body,
    ) {
        if let Some(old) = slot.definition.lock().unwrap().take() {
            self.release_definition(old);
        }

        let mut dep_edges = Vec::with_capacity(dependencies.len());
        for dep in &dependencies {
            let dep_slot = self.named_slot(dep);
            if Arc::ptr_eq(&dep_slot, slot) {
                continue;
            }
            let token = dep_slot.add_dependent(slot);
            dep_edges.push((dep_slot, token));
        }

        let import_target = match &body {
            Body::Import { from, remote } => {
                Some(from.inner.named_slot(remote).observers.clone())
            }
            Body::Closure(_) => None,
        };

        debug!(
            name = slot.name.as_deref().unwrap_or("<anonymous>"),
            deps = dependencies.len(),
            "defining variable"
        );

        *slot.definition.lock().unwrap() = Some(Definition {
            dependencies,
            body,
            dep_edges,
            import_sub: None,
        });

        if let Some(remote_os) = import_target {
            let weak_module = Arc::downgrade(self);
            let weak_slot = Arc::downgrade(slot);
            let sub = remote_os.add_observer(Arc::new(move |_event| {
                if let (Some(module), Some(slot)) = (weak_module.upgrade(), weak_slot.upgrade()) {
                    module.update(&slot);
                }
            }));
            if let Some(def) = slot.definition.lock().unwrap().as_mut() {
                def.import_sub = Some((remote_os, sub));
            }
        }

        self.update(slot);
    }

    /// Release a slot's definition and observers, then re-evaluate
    /// dependents, which now see the name as undefined.
    pub(crate) fn undefine(&self, slot: &Arc<Slot>) {
        if let Some(old) = slot.definition.lock().unwrap().take() {
            self.release_definition(old);
        }
        slot.observers.clear();
        debug!(
            name = slot.name.as_deref().unwrap_or("<anonymous>"),
            "deleted variable"
        );
        self.update(slot);
    }

    fn release_definition(&self, definition: Definition) {
        for (dep_slot, token) in &definition.dep_edges {
            dep_slot.remove_dependent(*token);
        }
        if let Some((remote_os, sub)) = &definition.import_sub {
            remote_os.remove_observer(*sub);
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let named: Vec<Arc<Slot>> = self.slots.lock().unwrap().drain().map(|(_, s)| s).collect();
        let anonymous: Vec<Arc<Slot>> = self.anonymous.lock().unwrap().drain(..).collect();
        for slot in named.into_iter().chain(anonymous) {
            if let Some(old) = slot.definition.lock().unwrap().take() {
                self.release_definition(old);
            }
            slot.observers.clear();
        }
    }
}

/// A namespace of reactive variables. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Module {
    inner: Arc<ModuleInner>,
}

impl Module {
    pub(crate) fn new(builtins: Arc<HashMap<String, Value>>, disposed: bool) -> Self {
        Self {
            inner: Arc::new(ModuleInner {
                slots: Mutex::new(HashMap::new()),
                anonymous: Mutex::new(Vec::new()),
                builtins,
                disposed: AtomicBool::new(disposed),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<ModuleInner> {
        &self.inner
    }

    /// Allocate an unbound variable in this module.
    pub fn variable(&self) -> Variable {
        Variable::new(self.clone(), None)
    }

    /// Allocate a variable with an observer attached on first definition.
    pub fn variable_observed(&self, observer: ObserverCallback) -> Variable {
        Variable::new(self.clone(), Some(observer))
    }

    /// Observer set of a named slot, creating the slot if needed.
    pub fn observers_of(&self, name: &str) -> Arc<ObserverSet> {
        self.inner.named_slot(name).observers.clone()
    }

    /// Resolve a named variable's current value, suspending until fulfilled.
    /// A rejected binding resolves to an evaluation error; disposing the
    /// module wakes every suspended caller with a disposed error.
    pub async fn value(&self, name: &str) -> Result<Value> {
        let slot = self.inner.named_slot(name);
        loop {
            // Disposal clears the observer set, which drops any waiter's
            // callback and resolves its channel; this check turns that
            // wake-up into an error instead of re-subscribing forever.
            if self.is_disposed() {
                return Err(Error::Disposed("module"));
            }
            match slot.observers.state() {
                ObserverState::Fulfilled(value) => return Ok(value),
                ObserverState::Rejected(error) => {
                    return Err(Error::evaluation(error.to_string()))
                }
                ObserverState::Pending => {}
            }
            let (tx, rx) = tokio::sync::oneshot::channel::<()>();
            let tx = Mutex::new(Some(tx));
            let sub = slot.observers.add_observer(Arc::new(move |event| {
                if matches!(
                    event,
                    ObserverEvent::Fulfilled(_) | ObserverEvent::Rejected(_)
                ) {
                    if let Some(tx) = tx.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                }
            }));
            let _ = rx.await;
            slot.observers.remove_observer(sub);
        }
    }

    /// Dispose a named binding. Returns false if the name was never defined.
    pub fn remove_variable(&self, name: &str) -> bool {
        if self.is_disposed() {
            return false;
        }
        let slot = self.inner.slots.lock().unwrap().get(name).cloned();
        match slot {
            Some(slot) if slot.is_defined() => {
                self.inner.undefine(&slot);
                true
            }
            _ => false,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Tear down every binding. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}
