// ABOUTME: Main entry point for the tenper command line tool

//! The `tenper` command line interface.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tenper::app::{Action, Orchestrator, TerminalPrompt};
use tenper::config::AppConfig;
use tenper::error::{ErrorKind, TenperError};
use tenper::process::SystemRunner;

/// Project-based tmux sessions with optional virtualenvs.
#[derive(Parser, Debug)]
#[command(name = "tenper")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// The commands tenper understands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List stored projects, one per line
    List,

    /// Create or edit a project template in $EDITOR
    Edit {
        /// Project name
        project: String,
    },

    /// Delete a project template, offering to remove its virtualenv
    Del {
        /// Project name
        project: String,
    },

    /// Delete and recreate a project's virtualenv
    Rebuild {
        /// Project name
        project: String,
    },

    /// Build the project's tmux session if needed and attach to it
    Start {
        /// Project name
        project: String,
    },
}

impl From<Commands> for Action {
    fn from(command: Commands) -> Self {
        match command {
            Commands::List => Self::List,
            Commands::Edit { project } => Self::Edit(project),
            Commands::Del { project } => Self::Delete(project),
            Commands::Rebuild { project } => Self::Rebuild(project),
            Commands::Start { project } => Self::Start(project),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        let failure = err.downcast_ref::<TenperError>();
        let code = failure.map_or(1, TenperError::exit_code);

        eprintln!("tenper: {err:#}");
        match failure.map(TenperError::kind) {
            Some(kind) => {
                tracing::error!(%kind, code, "{:#}", err);
                if let Some(hint) = hint(kind) {
                    eprintln!("{hint}");
                }
            }
            None => tracing::error!(code, "{:#}", err),
        }
        std::process::exit(code);
    }
}

/// A follow-up suggestion for failures the user can fix from the command line.
const fn hint(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::NotFound => {
            Some("Run `tenper list` to see stored projects, or `tenper edit <project>` to create one.")
        }
        ErrorKind::Validation => Some("Run `tenper edit <project>` to fix the template."),
        ErrorKind::AlreadyExists => Some("Run `tenper rebuild <project>` to replace it."),
        ErrorKind::ExternalTool | ErrorKind::ConfirmationDeclined | ErrorKind::Io => None,
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    setup_logging(&config, cli.verbose);

    let action = Action::from(cli.command);
    tracing::info!("Running {:?}", action);

    let orchestrator = Orchestrator::new(config, SystemRunner, TerminalPrompt);
    let outcome = orchestrator.dispatch(action)?;

    let message = outcome.to_string();
    if !message.is_empty() {
        println!("{message}");
    }
    Ok(())
}

fn setup_logging(config: &AppConfig, verbose: bool) {
    use std::fs::OpenOptions;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let default_filter = if verbose { "tenper=debug" } else { "tenper=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // One file per day, appended to by every invocation
    let log_file = config.log_dir.join(format!(
        "tenper-{}.log",
        chrono::Local::now().format("%Y%m%d")
    ));

    let file = std::fs::create_dir_all(&config.log_dir).and_then(|()| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
    });

    match file {
        Ok(file) => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_writer(file)
                        .with_ansi(false),
                )
                .with(filter)
                .init();
        }
        Err(err) => {
            // Without a log file only warnings and errors reach the terminal
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .with(EnvFilter::new("tenper=warn"))
                .init();
            tracing::warn!("Cannot open log file {}: {}", log_file.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subcommands_parse() {
        let cli = Cli::try_parse_from(["tenper", "list"]).unwrap();
        assert_eq!(cli.command, Commands::List);

        let cli = Cli::try_parse_from(["tenper", "start", "demo"]).unwrap();
        assert_eq!(Action::from(cli.command), Action::Start("demo".to_string()));

        let cli = Cli::try_parse_from(["tenper", "del", "demo"]).unwrap();
        assert_eq!(Action::from(cli.command), Action::Delete("demo".to_string()));
    }

    #[test]
    fn test_project_is_required() {
        for command in ["edit", "del", "rebuild", "start"] {
            assert!(Cli::try_parse_from(["tenper", command]).is_err(), "{command}");
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["tenper", "rebuild", "demo", "--config", "/tmp/t.toml", "-v"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/t.toml")));
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_exposes_the_command_set() {
        use clap::CommandFactory;
        let names: Vec<String> = Cli::command()
            .get_subcommands()
            .map(|c| c.get_name().to_string())
            .filter(|name| name != "help")
            .collect();
        assert_eq!(names, tenper::app::COMMANDS);
    }

    #[test]
    fn test_hints_follow_error_kind() {
        assert!(hint(ErrorKind::NotFound).unwrap().contains("tenper edit"));
        assert!(hint(ErrorKind::Validation).unwrap().contains("tenper edit"));
        assert!(hint(ErrorKind::AlreadyExists).unwrap().contains("tenper rebuild"));
        assert_eq!(hint(ErrorKind::ExternalTool), None);
        assert_eq!(hint(ErrorKind::ConfirmationDeclined), None);
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["tenper", "launch", "demo"]).is_err());
    }
}
