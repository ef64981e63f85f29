//! Rill Notebook - cells, notebooks, and cross-notebook imports
//!
//! Maps editable cells onto reactive variables in a shared module, keeps
//! bindings in sync with the latest parse result, and resolves imports
//! against other notebooks with cycle detection.

pub mod bodies;
pub mod cell;
pub mod notebook;
pub mod registry;
pub mod template;

pub use cell::{Cell, CellOutput, CellPatch};
pub use notebook::Notebook;
pub use registry::ImportedModuleRegistry;
