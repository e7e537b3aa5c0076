// ABOUTME: The operations a session plan is made of, plus the live-session query result
// Windows and panes are addressed by their position in the template; the driver maps them to tmux ids

use crate::models::Layout;
use std::path::PathBuf;

/// How a newly spawned pane is prepared before its first command is typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaneEnvironment {
    /// Set on the pane with `-e`, as `(name, value)`.
    pub variables: Vec<(String, String)>,
    /// Argv run in place of the default shell. It must end by exec'ing the user's shell.
    /// Empty means tmux starts the default shell as usual.
    pub shell_command: Vec<String>,
}

/// One tmux step of a session build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Create the detached session; its initial window becomes window 0 with pane 0.
    NewSession {
        /// Session name.
        session: String,
        /// Name of window 0.
        window_name: String,
        /// Working directory of the first pane.
        cwd: PathBuf,
        /// Applied to the first pane.
        environment: PaneEnvironment,
    },
    /// Append a window after the previously created one.
    NewWindow {
        /// Template position of the new window.
        window: usize,
        /// Window name.
        name: String,
        /// Working directory of its first pane.
        cwd: PathBuf,
        /// Applied to its first pane.
        environment: PaneEnvironment,
    },
    /// Split the window, creating pane number `pane`.
    SplitWindow {
        /// Window to split.
        window: usize,
        /// Template position of the new pane.
        pane: usize,
        /// Working directory of the new pane.
        cwd: PathBuf,
        /// Applied to the new pane.
        environment: PaneEnvironment,
    },
    /// Type `keys` literally into the pane, then press Enter.
    SendKeys {
        /// Window of the target pane.
        window: usize,
        /// Target pane.
        pane: usize,
        /// The command line to type.
        keys: String,
    },
    /// Arrange the window's panes.
    SelectLayout {
        /// Window to arrange.
        window: usize,
        /// Preset to apply.
        layout: Layout,
    },
    /// Make a pane the active one.
    SelectPane {
        /// Window of the pane.
        window: usize,
        /// Pane to activate.
        pane: usize,
    },
    /// Make a window the current one.
    SelectWindow {
        /// Window to select.
        window: usize,
    },
    /// Attach the terminal to the session, or switch to it from inside tmux.
    Attach {
        /// Session to attach to.
        session: String,
    },
}

impl Operation {
    /// Short name for log lines.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NewSession { .. } => "new-session",
            Self::NewWindow { .. } => "new-window",
            Self::SplitWindow { .. } => "split-window",
            Self::SendKeys { .. } => "send-keys",
            Self::SelectLayout { .. } => "select-layout",
            Self::SelectPane { .. } => "select-pane",
            Self::SelectWindow { .. } => "select-window",
            Self::Attach { .. } => "attach",
        }
    }
}

/// What tmux reports about a session name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSession {
    /// The name that was looked up.
    pub session_name: String,
    /// A session with exactly this name is running.
    pub exists: bool,
    /// Its window count, 0 when absent.
    pub window_count: usize,
}

impl LiveSession {
    /// No session by that name.
    pub fn absent(session_name: impl Into<String>) -> Self {
        Self {
            session_name: session_name.into(),
            exists: false,
            window_count: 0,
        }
    }

    /// A running session with `window_count` windows.
    pub fn running(session_name: impl Into<String>, window_count: usize) -> Self {
        Self {
            session_name: session_name.into(),
            exists: true,
            window_count,
        }
    }
}
