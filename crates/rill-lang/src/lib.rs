//! Rill Lang - reference Parser and Compiler implementations
//!
//! A small, sandboxed expression language plus the statement grammar
//! (`let`, `viewof`, `import`, bare expressions) that feeds the notebook
//! engine. The engine itself only sees these through the `rill-core`
//! collaborator traits, so any other parser/compiler pair can stand in.

pub mod expr;
pub mod lexer;
pub mod statement;

pub use expr::ExprCompiler;
pub use statement::StatementParser;
