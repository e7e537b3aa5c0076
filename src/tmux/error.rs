// ABOUTME: Error types for driving tmux
// Defines error conditions that can occur while querying or building sessions

use crate::process::ProcessError;
use thiserror::Error;

/// Failures while querying tmux or running a plan.
#[derive(Debug, Error)]
pub enum TmuxError {
    /// The tmux process itself failed.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// One operation of a plan failed; the rest were skipped.
    #[error("tmux {operation} failed at step {step} of {total}")]
    OperationFailed {
        /// tmux subcommand of the failed operation.
        operation: &'static str,
        /// 1-based position of the failed operation.
        step: usize,
        /// Number of operations in the run.
        total: usize,
        /// Why it failed.
        #[source]
        source: Box<TmuxError>,
    },

    /// An operation refers to a window or pane that was never created.
    #[error("No tmux target recorded for {0}")]
    UnresolvedTarget(String),

    /// tmux printed something other than the requested format.
    #[error("Unexpected output from `{command}`: {output:?}")]
    UnexpectedOutput {
        /// The full command line.
        command: String,
        /// What tmux printed.
        output: String,
    },
}

impl TmuxError {
    /// The process failure underneath, if there is one.
    pub fn process_error(&self) -> Option<&ProcessError> {
        match self {
            Self::Process(err) => Some(err),
            Self::OperationFailed { source, .. } => source.process_error(),
            _ => None,
        }
    }
}
