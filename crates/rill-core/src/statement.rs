//! Parse descriptors produced by the external statement parser.
//!
//! The engine never looks inside an expression body; it only sees the
//! dependency names and an opaque body string that the [`crate::Compiler`]
//! turns into a callable closure.

use crate::types::NotebookId;
use serde::{Deserialize, Serialize};

/// One imported name, optionally re-bound under a local alias.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportBinding {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ImportBinding {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }

    /// The name the binding is visible under in the importing module.
    pub fn local_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Result of parsing one cell's source text.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParsedStatement {
    /// The source did not parse; the message becomes the cell's error.
    Exception { message: String },

    /// An assignment `name = body` over the named dependencies. `name` is
    /// absent for bare expression cells. `viewof` marks an interactive-input
    /// assignment that synthesizes a second value-carrying variable.
    Assignment {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        dependencies: Vec<String>,
        body: String,
        #[serde(default)]
        viewof: bool,
    },

    /// An import of named exports from another notebook.
    Import {
        notebook: NotebookId,
        names: Vec<ImportBinding>,
    },
}

impl ParsedStatement {
    pub fn exception(message: impl Into<String>) -> Self {
        Self::Exception {
            message: message.into(),
        }
    }
}
