// ABOUTME: Multiplexer driver - queries live tmux sessions and executes session plans
// Operations run strictly in order; the first failure stops the run and nothing is rolled back

use super::error::TmuxError;
use super::operation::{LiveSession, Operation, PaneEnvironment};
use crate::error::report;
use crate::process::{CommandOutput, CommandRunner, ExternalCommand};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

const SESSION_FORMAT: &str = "#{session_name}\t#{session_windows}";
const WINDOW_FORMAT: &str = "#{window_id} #{pane_id}";
const PANE_FORMAT: &str = "#{pane_id}";

/// tmux ids (`@3`, `%7`) of the windows and panes created so far, keyed by template position.
#[derive(Debug, Default)]
struct Targets {
    windows: HashMap<usize, String>,
    panes: HashMap<(usize, usize), String>,
}

impl Targets {
    fn window(&self, window: usize) -> Result<&str, TmuxError> {
        self.windows
            .get(&window)
            .map(String::as_str)
            .ok_or_else(|| TmuxError::UnresolvedTarget(format!("window {window}")))
    }

    fn pane(&self, window: usize, pane: usize) -> Result<&str, TmuxError> {
        self.panes
            .get(&(window, pane))
            .map(String::as_str)
            .ok_or_else(|| TmuxError::UnresolvedTarget(format!("pane {pane} of window {window}")))
    }
}

/// Talks to tmux through a [`CommandRunner`].
pub struct TmuxDriver<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    binary: String,
    /// Already inside a tmux client, so attaching means switching.
    nested: bool,
}

impl<'a, R: CommandRunner + ?Sized> TmuxDriver<'a, R> {
    /// A driver running `binary`. `nested` is true when already inside tmux.
    pub fn new(runner: &'a R, binary: impl Into<String>, nested: bool) -> Self {
        Self {
            runner,
            binary: binary.into(),
            nested,
        }
    }

    fn tmux(&self) -> ExternalCommand {
        ExternalCommand::new(&self.binary)
    }

    fn run(&self, command: &ExternalCommand) -> Result<CommandOutput, TmuxError> {
        debug!("tmux: {}", command);
        Ok(self.runner.output(command)?.check(command)?)
    }

    /// Whether `session_name` is running, matched by exact name.
    pub fn query_live_session(&self, session_name: &str) -> Result<LiveSession, TmuxError> {
        let command = self.tmux().args(["list-sessions", "-F", SESSION_FORMAT]);
        let output = self.runner.output(&command)?;

        // tmux exits non-zero when no server is running, which just means no sessions.
        if !output.is_success() {
            debug!("list-sessions failed, treating as no sessions: {}", output.stderr.trim());
            return Ok(LiveSession::absent(session_name));
        }

        let live = parse_list_sessions(&output.stdout)
            .into_iter()
            .find(|(name, _)| name == session_name)
            .map_or_else(
                || LiveSession::absent(session_name),
                |(name, windows)| LiveSession::running(name, windows),
            );

        debug!("Live session {}: {:?}", session_name, live);
        Ok(live)
    }

    /// Run `operations` in order, stopping at the first failure.
    pub fn execute(&self, operations: &[Operation]) -> Result<(), TmuxError> {
        let total = operations.len();
        let mut targets = Targets::default();

        for (index, operation) in operations.iter().enumerate() {
            if let Err(err) = self.execute_one(operation, &mut targets) {
                warn!(
                    "Operation {} of {} ({}) failed, skipping the remaining {}: {}",
                    index + 1,
                    total,
                    operation.label(),
                    total - index - 1,
                    report(&err)
                );
                return Err(TmuxError::OperationFailed {
                    operation: operation.label(),
                    step: index + 1,
                    total,
                    source: Box::new(err),
                });
            }
        }

        Ok(())
    }

    fn execute_one(&self, operation: &Operation, targets: &mut Targets) -> Result<(), TmuxError> {
        match operation {
            Operation::NewSession {
                session,
                window_name,
                cwd,
                environment,
            } => {
                info!("Creating tmux session '{}'", session);
                let command = self
                    .tmux()
                    .args(["new-session", "-d", "-s", session, "-n", window_name])
                    .args(spawn_args(cwd, environment, WINDOW_FORMAT));
                let output = self.run(&command)?;
                let (window_id, pane_id) = parse_window_ids(&command, &output.stdout)?;
                targets.windows.insert(0, window_id);
                targets.panes.insert((0, 0), pane_id);
            }
            Operation::NewWindow {
                window,
                name,
                cwd,
                environment,
            } => {
                let previous = window
                    .checked_sub(1)
                    .ok_or_else(|| TmuxError::UnresolvedTarget("window before window 0".to_string()))?;
                let command = self
                    .tmux()
                    .args(["new-window", "-d", "-a", "-t", targets.window(previous)?, "-n", name])
                    .args(spawn_args(cwd, environment, WINDOW_FORMAT));
                let output = self.run(&command)?;
                let (window_id, pane_id) = parse_window_ids(&command, &output.stdout)?;
                targets.windows.insert(*window, window_id);
                targets.panes.insert((*window, 0), pane_id);
            }
            Operation::SplitWindow {
                window,
                pane,
                cwd,
                environment,
            } => {
                let command = self
                    .tmux()
                    .args(["split-window", "-t", targets.window(*window)?])
                    .args(spawn_args(cwd, environment, PANE_FORMAT));
                let output = self.run(&command)?;
                let pane_id = parse_pane_id(&command, &output.stdout)?;
                targets.panes.insert((*window, *pane), pane_id);
            }
            Operation::SendKeys { window, pane, keys } => {
                // An empty command leaves the pane at its shell prompt.
                if !keys.is_empty() {
                    let target = targets.pane(*window, *pane)?;
                    self.run(&self.tmux().args(["send-keys", "-t", target, "-l", "--", keys]))?;
                    self.run(&self.tmux().args(["send-keys", "-t", target, "Enter"]))?;
                }
            }
            Operation::SelectLayout { window, layout } => {
                self.run(&self.tmux().args([
                    "select-layout",
                    "-t",
                    targets.window(*window)?,
                    layout.as_str(),
                ]))?;
            }
            Operation::SelectPane { window, pane } => {
                self.run(&self.tmux().args(["select-pane", "-t", targets.pane(*window, *pane)?]))?;
            }
            Operation::SelectWindow { window } => {
                self.run(&self.tmux().args(["select-window", "-t", targets.window(*window)?]))?;
            }
            Operation::Attach { session } => self.attach(session)?,
        }

        Ok(())
    }

    fn attach(&self, session: &str) -> Result<(), TmuxError> {
        let target = format!("={session}");
        if self.nested {
            info!("Switching client to tmux session '{}'", session);
            self.run(&self.tmux().args(["switch-client", "-t", &target]))?;
        } else {
            info!("Attaching to tmux session '{}'", session);
            let command = self.tmux().args(["-2", "attach-session", "-t", &target]);
            self.runner.interactive(&command)?.check(&command)?;
        }
        Ok(())
    }
}

/// Options shared by every pane-creating command. The pane's shell command, if any,
/// has to come last because tmux takes everything after the flags as its argv.
fn spawn_args(cwd: &Path, environment: &PaneEnvironment, format: &str) -> Vec<String> {
    let mut args = vec!["-c".to_string(), cwd.to_string_lossy().to_string()];
    for (name, value) in &environment.variables {
        args.push("-e".to_string());
        args.push(format!("{name}={value}"));
    }
    args.extend(["-P".to_string(), "-F".to_string(), format.to_string()]);
    args.extend(environment.shell_command.iter().cloned());
    args
}

/// Parse `list-sessions -F "#{session_name}\t#{session_windows}"` output.
pub(crate) fn parse_list_sessions(output: &str) -> Vec<(String, usize)> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let (name, windows) = line.rsplit_once('\t').unwrap_or((line, "0"));
            (name.to_string(), windows.trim().parse().unwrap_or(0))
        })
        .collect()
}

fn parse_window_ids(command: &ExternalCommand, output: &str) -> Result<(String, String), TmuxError> {
    let mut ids = output.split_whitespace();
    match (ids.next(), ids.next()) {
        (Some(window), Some(pane)) if window.starts_with('@') && pane.starts_with('%') => {
            Ok((window.to_string(), pane.to_string()))
        }
        _ => Err(unexpected(command, output)),
    }
}

fn parse_pane_id(command: &ExternalCommand, output: &str) -> Result<String, TmuxError> {
    match output.trim() {
        pane if pane.starts_with('%') && !pane.contains(char::is_whitespace) => Ok(pane.to_string()),
        _ => Err(unexpected(command, output)),
    }
}

fn unexpected(command: &ExternalCommand, output: &str) -> TmuxError {
    TmuxError::UnexpectedOutput {
        command: command.to_string(),
        output: output.to_string(),
    }
}
