//! Error types for Rill

use crate::types::NotebookId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("circular import detected: {notebook_id}")]
    CircularImport { notebook_id: NotebookId },

    #[error("evaluation failed: {message}")]
    Evaluation { message: String },

    #[error("{name} is not defined")]
    UndefinedVariable { name: String },

    #[error("circular definition: {name}")]
    CircularDefinition { name: String },

    #[error("variable used after delete")]
    UseAfterDelete,

    #[error("{0} has been disposed")]
    Disposed(&'static str),

    #[error("cell not found: {0}")]
    CellNotFound(crate::types::CellId),

    #[error("duplicate cell id: {0}")]
    DuplicateCell(crate::types::CellId),

    #[error("failed to load notebook {notebook_id}: {message}")]
    NotebookLoad {
        notebook_id: NotebookId,
        message: String,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
        }
    }

    pub fn undefined(name: impl Into<String>) -> Self {
        Self::UndefinedVariable { name: name.into() }
    }

    pub fn circular_import(notebook_id: impl Into<NotebookId>) -> Self {
        Self::CircularImport {
            notebook_id: notebook_id.into(),
        }
    }

    pub fn notebook_load(notebook_id: impl Into<NotebookId>, message: impl Into<String>) -> Self {
        Self::NotebookLoad {
            notebook_id: notebook_id.into(),
            message: message.into(),
        }
    }
}
