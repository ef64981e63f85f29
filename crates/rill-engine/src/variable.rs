//! Variable - handle to one reactive binding inside a Module.
//!
//! A variable is unbound at allocation. `define` attaches it to a named (or
//! anonymous) slot; redefining in place keeps the same slot, so downstream
//! observers never need to resubscribe. After `delete`, every operation
//! fails with UseAfterDelete.

use crate::module::{Body, Module, Slot};
use crate::observers::{ObserverCallback, ObserverSet};
use rill_core::{CompiledBody, Error, Result, VariableId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub struct Variable {
    id: VariableId,
    module: Module,
    slot: Mutex<Option<Arc<Slot>>>,
    pending_observer: Mutex<Option<ObserverCallback>>,
    deleted: AtomicBool,
}

impl Variable {
    pub(crate) fn new(module: Module, observer: Option<ObserverCallback>) -> Self {
        Self {
            id: VariableId::new(),
            module,
            slot: Mutex::new(None),
            pending_observer: Mutex::new(observer),
            deleted: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> VariableId {
        self.id
    }

    /// Local name the variable is bound under, if any.
    pub fn name(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|slot| slot.name.clone())
    }

    /// (Re)bind the variable to an expression over named dependencies.
    /// The body runs immediately; success fulfills the observer set, a body
    /// error rejects it.
    pub fn define(
        &self,
        name: Option<&str>,
        dependencies: Vec<String>,
        body: Arc<dyn CompiledBody>,
    ) -> Result<()> {
        self.ensure_live()?;
        let slot = self.resolve_slot(name);
        self.module
            .inner()
            .install(&slot, dependencies, Body::Closure(body));
        Ok(())
    }

    /// Track the named export of `from` under `alias` (default: same name).
    /// Re-runs whenever the upstream binding changes.
    pub fn import(&self, name: &str, alias: Option<&str>, from: &Module) -> Result<()> {
        self.ensure_live()?;
        let local = alias.unwrap_or(name);
        let slot = self.resolve_slot(Some(local));
        self.module.inner().install(
            &slot,
            Vec::new(),
            Body::Import {
                from: from.clone(),
                remote: name.to_string(),
            },
        );
        Ok(())
    }

    /// Release the binding: observers are dropped and dependents see the
    /// name as undefined.
    pub fn delete(&self) -> Result<()> {
        self.ensure_live()?;
        self.deleted.store(true, Ordering::SeqCst);
        if let Some(slot) = self.slot.lock().unwrap().take() {
            self.module.inner().undefine(&slot);
        }
        Ok(())
    }

    /// The fan-out observer set, once the variable has been defined.
    pub fn observers(&self) -> Option<Arc<ObserverSet>> {
        self.slot
            .lock()
            .unwrap()
            .as_ref()
            .map(|slot| slot.observers.clone())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_deleted() {
            return Err(Error::UseAfterDelete);
        }
        if self.module.is_disposed() {
            return Err(Error::Disposed("module"));
        }
        Ok(())
    }

    /// Pick the target slot for a (re)definition. Redefining under the same
    /// name reuses the existing slot; changing the name releases the old
    /// binding first.
    fn resolve_slot(&self, name: Option<&str>) -> Arc<Slot> {
        let mut guard = self.slot.lock().unwrap();
        if let Some(current) = guard.as_ref() {
            if current.name.as_deref() == name {
                return current.clone();
            }
        }
        if let Some(old) = guard.take() {
            self.module.inner().undefine(&old);
        }
        let slot = match name {
            Some(name) => self.module.inner().named_slot(name),
            None => self.module.inner().anonymous_slot(),
        };
        if let Some(observer) = self.pending_observer.lock().unwrap().take() {
            slot.observers.add_observer(observer);
        }
        *guard = Some(slot.clone());
        slot
    }
}
