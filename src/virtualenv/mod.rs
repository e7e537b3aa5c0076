// ABOUTME: Python virtualenv integration - environments are created by the external virtualenv tool

/// Environment lifecycle.
pub mod manager;

pub use manager::{CreateMode, DestroyOutcome, Environment, EnvironmentError, VirtualenvManager};
