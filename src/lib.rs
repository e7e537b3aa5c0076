// ABOUTME: Library crate for tenper exposing public API for testing and external use

//! Project-based tmux sessions with optional Python virtualenvs.

/// Command dispatch and user interaction.
pub mod app;
/// Startup configuration.
pub mod config;
/// The crate-wide error type.
pub mod error;
/// Template data model.
pub mod models;
/// External command execution.
pub mod process;
/// Template storage and session compilation.
pub mod session;
/// tmux integration.
pub mod tmux;
/// Virtualenv management.
pub mod virtualenv;
