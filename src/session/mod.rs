// ABOUTME: Session templates on disk and their compilation into tmux operations
// Provides the template store and the session compiler

/// Template to operation compilation.
pub mod compiler;
/// Template files on disk.
pub mod store;

pub use compiler::{BuildContext, SessionCompiler, SessionPlan, WindowGroup};
pub use store::{StoreError, TemplateStore};
