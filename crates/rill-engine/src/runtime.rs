//! Runtime - top-level owner of modules for one notebook instance.

use crate::module::Module;
use crate::stdlib;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    builtins: Arc<HashMap<String, Value>>,
    modules: Mutex<Vec<Module>>,
    disposed: AtomicBool,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_builtins(stdlib::standard_library())
    }

    pub fn with_builtins(builtins: HashMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                builtins: Arc::new(builtins),
                modules: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Create a module sharing this runtime's standard-library bindings.
    /// A module created after dispose is born disposed.
    pub fn module(&self) -> Module {
        let disposed = self.is_disposed();
        let module = Module::new(self.inner.builtins.clone(), disposed);
        if !disposed {
            self.inner.modules.lock().unwrap().push(module.clone());
        }
        module
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Tear down all modules and in-flight evaluations. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let modules: Vec<Module> = self.inner.modules.lock().unwrap().drain(..).collect();
        debug!(count = modules.len(), "disposing runtime");
        for module in modules {
            module.dispose();
        }
    }
}
