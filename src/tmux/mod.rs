// ABOUTME: tmux integration - the operations a session is built from and the driver that runs them
// tmux is only ever reached through its command line

/// Runs operations through the tmux CLI.
pub mod driver;
/// tmux failures.
pub mod error;
/// The operations a session is built from.
pub mod operation;

pub use driver::TmuxDriver;
pub use error::TmuxError;
pub use operation::{LiveSession, Operation, PaneEnvironment};
