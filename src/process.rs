// ABOUTME: External command execution used by the tmux driver, the virtualenv manager and the editor
// Everything that shells out goes through CommandRunner so tests can substitute a fake

use std::fmt;
use std::io;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

/// Why an external command did not succeed.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program is not installed or not on `PATH`.
    #[error("Executable not found: {program}")]
    NotFound {
        /// The program that was looked up.
        program: String,
    },

    /// The program ran and exited unsuccessfully.
    #[error("Command `{command}` failed with {}: {stderr}", describe_code(.code))]
    Failed {
        /// The full command line.
        command: String,
        /// `None` when the process was killed by a signal.
        code: Option<i32>,
        /// Captured stderr, trimmed.
        stderr: String,
    },

    /// The program could not be started or waited on.
    #[error("Could not run `{command}`")]
    Io {
        /// The full command line.
        command: String,
        /// The underlying failure.
        #[source]
        source: io::Error,
    },
}

#[allow(clippy::ref_option)]
fn describe_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "a signal".to_string(), |c| format!("exit code {c}"))
}

impl ProcessError {
    /// Exit status of the failed subprocess, when it exited normally.
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { code, .. } => *code,
            _ => None,
        }
    }
}

/// A program plus its arguments, passed to the OS without a shell in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    /// Executable name or path.
    pub program: String,
    /// Arguments, each passed as one argv entry.
    pub args: Vec<String>,
}

impl ExternalCommand {
    /// A command with no arguments yet.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// First argument, which for tmux is the subcommand name.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Exit status and captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// Captured stdout, empty for interactive runs.
    pub stdout: String,
    /// Captured stderr, empty for interactive runs.
    pub stderr: String,
}

impl CommandOutput {
    /// Exit code 0 with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A non-zero exit with the given stderr.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// The process exited with code 0.
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Turn a non-zero exit into `ProcessError::Failed`.
    pub fn check(self, command: &ExternalCommand) -> Result<Self, ProcessError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ProcessError::Failed {
                command: command.to_string(),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs external commands on behalf of the rest of the crate.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    /// Run to completion with stdout and stderr captured.
    /// A non-zero exit is returned as output, not as an error.
    fn output(&self, command: &ExternalCommand) -> Result<CommandOutput, ProcessError>;

    /// Run attached to the user's terminal (editor, `tmux attach`).
    fn interactive(&self, command: &ExternalCommand) -> Result<CommandOutput, ProcessError>;
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    fn spawn_error(command: &ExternalCommand, err: io::Error) -> ProcessError {
        if err.kind() == io::ErrorKind::NotFound {
            ProcessError::NotFound {
                program: command.program.clone(),
            }
        } else {
            ProcessError::Io {
                command: command.to_string(),
                source: err,
            }
        }
    }
}

impl CommandRunner for SystemRunner {
    fn output(&self, command: &ExternalCommand) -> Result<CommandOutput, ProcessError> {
        debug!("Running: {}", command);
        let output = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Self::spawn_error(command, e))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn interactive(&self, command: &ExternalCommand) -> Result<CommandOutput, ProcessError> {
        debug!("Running interactively: {}", command);
        let status = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| Self::spawn_error(command, e))?;

        Ok(CommandOutput {
            code: status.code(),
            ..CommandOutput::default()
        })
    }
}
