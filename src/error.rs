// ABOUTME: Top-level error type returned by the orchestrator
// Groups module errors into the kinds the CLI reports and maps them to exit codes

use crate::models::TemplateError;
use crate::process::ProcessError;
use crate::session::StoreError;
use crate::tmux::TmuxError;
use crate::virtualenv::EnvironmentError;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// What went wrong, independent of which component noticed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A template or a value derived from it is malformed.
    Validation,
    /// The named project has no stored template.
    NotFound,
    /// The target of an explicit create is already on disk.
    AlreadyExists,
    /// tmux, virtualenv or the editor failed.
    ExternalTool,
    /// The user answered no.
    ConfirmationDeclined,
    /// Filesystem access failed.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::ExternalTool => "external tool",
            Self::ConfirmationDeclined => "confirmation declined",
            Self::Io => "io",
        };
        f.write_str(name)
    }
}

/// `err` and each of its sources, joined with `: `. Messages never repeat their source,
/// so every cause appears once.
pub fn report(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Any failure a command can end with.
#[derive(Debug, Error)]
pub enum TenperError {
    /// Invalid template contents or derived value.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Reading or writing the template store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An external program such as the editor failed.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// A tmux query or build step failed.
    #[error(transparent)]
    Tmux(#[from] TmuxError),

    /// Creating or removing a virtualenv failed.
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    /// A file the orchestrator handles directly could not be accessed.
    #[error("IO error at {}", path.display())]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: io::Error,
    },
}

impl TenperError {
    /// Classify the error for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Template(_)
            | Self::Store(StoreError::Template { .. } | StoreError::InvalidName(_)) => {
                ErrorKind::Validation
            }
            Self::Store(StoreError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Store(StoreError::Io { .. })
            | Self::Environment(EnvironmentError::Io { .. })
            | Self::Io { .. } => ErrorKind::Io,
            Self::Environment(EnvironmentError::ConfirmationDeclined(_)) => {
                ErrorKind::ConfirmationDeclined
            }
            Self::Environment(EnvironmentError::AlreadyExists(_)) => ErrorKind::AlreadyExists,
            Self::Process(_) | Self::Tmux(_) | Self::Environment(EnvironmentError::Process(_)) => {
                ErrorKind::ExternalTool
            }
        }
    }

    /// Exit status for the CLI: the failing subprocess's own status when there is one, else 1.
    pub fn exit_code(&self) -> i32 {
        let process = match self {
            Self::Process(err) | Self::Environment(EnvironmentError::Process(err)) => Some(err),
            Self::Tmux(err) => err.process_error(),
            _ => None,
        };
        process
            .and_then(ProcessError::exit_code)
            .filter(|code| *code != 0)
            .unwrap_or(1)
    }

    /// A validation failure on `field` that did not come from template parsing.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Template(TemplateError::validation(field, message))
    }
}
