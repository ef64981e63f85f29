//! Built-in variable bodies the cell executors install.

use rill_core::{CompiledBody, Result};
use serde_json::Value;

/// Feeds the value side of a `viewof` pair: given the view's current value,
/// yields its `value` field when it is an object, the value itself otherwise.
pub struct InputAdaptor;

impl CompiledBody for InputAdaptor {
    fn call(&self, args: &[Value]) -> Result<Value> {
        let view = args.first().cloned().unwrap_or(Value::Null);
        match view {
            Value::Object(map) => Ok(map
                .get("value")
                .cloned()
                .unwrap_or_else(|| Value::Object(map.clone()))),
            other => Ok(other),
        }
    }
}

/// Combines a multi-output cell's bindings into one array value, backing the
/// synthetic cell-id-named output variable.
pub struct Combine;

impl CompiledBody for Combine {
    fn call(&self, args: &[Value]) -> Result<Value> {
        Ok(Value::Array(args.to_vec()))
    }
}
