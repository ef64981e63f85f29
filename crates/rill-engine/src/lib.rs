//! Rill Engine - the reactive dataflow graph
//!
//! A [`Runtime`] owns [`Module`]s; a Module owns named reactive variables.
//! Redefining a variable pushes the new value through every dependent,
//! synchronously per hop. External consumers subscribe through an
//! [`ObserverSet`], which replays the last fulfilled value to late joiners.

pub mod module;
pub mod observers;
pub mod runtime;
pub mod stdlib;
pub mod variable;

pub use module::Module;
pub use observers::{ObserverCallback, ObserverEvent, ObserverId, ObserverSet, ObserverState};
pub use runtime::Runtime;
pub use variable::Variable;
