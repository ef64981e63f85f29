//! Rill Core - Shared types, collaborator traits, and error handling

pub mod contracts;
pub mod error;
pub mod statement;
pub mod types;

pub use contracts::{CompiledBody, Compiler, NotebookLoader, Parser};
pub use error::{Error, Result};
pub use statement::{ImportBinding, ParsedStatement};
pub use types::*;
