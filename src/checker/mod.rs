//! Semantic analysis: the namespace tree, the type system, and the
//! two-phase checker (global declarations, then function bodies).

pub mod env;
pub mod global;
pub mod local;
pub mod node;
pub mod types;

pub use env::Environment;
pub use global::GlobalChecker;
pub use local::LocalChecker;

/// Raised when a statement or declaration fails to check; caught at the
/// per-item boundary so the rest of the program is still analyzed. The
/// diagnostic has already been recorded when this is constructed.
pub struct TypeException;
