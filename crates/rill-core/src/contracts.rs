//! Collaborator traits consumed by the engine.
//!
//! All three are black boxes from the engine's point of view: a statement
//! parser, an expression compiler, and a notebook loader. Swap in real
//! implementations (or mocks in tests) behind `Arc<dyn Trait>`.

use crate::error::Result;
use crate::statement::ParsedStatement;
use crate::types::{NotebookId, NotebookSource};
use serde_json::Value;
use std::sync::Arc;

/// Classifies one cell's source text into a parse descriptor.
///
/// Parse failures are reported in-band as [`ParsedStatement::Exception`],
/// never as an `Err` - a cell with bad source is a cell in error state, not
/// a failed notebook operation.
#[async_trait::async_trait]
pub trait Parser: Send + Sync {
    async fn parse(&self, source: &str) -> ParsedStatement;
}

/// A compiled expression body: a closure over positional arguments that
/// correspond one-to-one with the parameter names it was compiled with.
pub trait CompiledBody: Send + Sync {
    fn call(&self, args: &[Value]) -> Result<Value>;
}

/// Compiles opaque expression bodies once into reusable closures, and
/// reports an expression's free variables (used to derive the dependencies
/// of template cells).
pub trait Compiler: Send + Sync {
    fn compile(&self, body: &str, params: &[String]) -> Result<Arc<dyn CompiledBody>>;

    fn free_variables(&self, body: &str) -> Result<Vec<String>>;
}

/// Fetches another notebook's definition, used only by the import resolver.
#[async_trait::async_trait]
pub trait NotebookLoader: Send + Sync {
    async fn fetch(&self, notebook_id: &NotebookId) -> Result<NotebookSource>;
}
