//! Standard-library bindings shared by every module of a runtime.
//!
//! Resolved as a fallback when no variable defines the name, which is also
//! the hook reserved pseudo-dependencies use.

use serde_json::{json, Value};
use std::collections::HashMap;

pub fn standard_library() -> HashMap<String, Value> {
    let mut builtins = HashMap::new();
    builtins.insert("PI".to_string(), json!(std::f64::consts::PI));
    builtins.insert("E".to_string(), json!(std::f64::consts::E));
    builtins.insert("TAU".to_string(), json!(std::f64::consts::TAU));
    builtins
}
