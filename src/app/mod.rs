// ABOUTME: Application layer - command dispatch and the interactive prompt

/// Command dispatch.
pub mod orchestrator;
/// User confirmation and notices.
pub mod prompt;

pub use orchestrator::{Action, EnvironmentFate, Orchestrator, Outcome, COMMANDS};
pub use prompt::{Prompt, TerminalPrompt};
