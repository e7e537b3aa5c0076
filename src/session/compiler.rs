// ABOUTME: Session compiler - turns a project template plus the live tmux state into a plan
// The plan is either a single attach or a complete build; existing sessions are never modified

use crate::models::{ProjectTemplate, WindowSpec};
use crate::tmux::{LiveSession, Operation, PaneEnvironment};
use std::path::PathBuf;

/// Everything the compiler needs beyond the template itself, resolved by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    /// Already expanded and checked to be a directory.
    pub project_root: PathBuf,
    /// Set on every pane so it starts with the virtualenv active. Empty without a virtualenv.
    pub activation: PaneEnvironment,
}

/// The operations that build one template window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowGroup {
    /// The window's template name.
    pub name: String,
    /// Creation, splits, commands and layout, in execution order.
    pub operations: Vec<Operation>,
}

/// What `start` will do with tmux.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPlan {
    /// The session is running; only attach to it.
    Attach {
        /// Session to attach to.
        session: String,
    },
    /// Build the session from scratch, then attach.
    Build {
        /// Session being created.
        session: String,
        /// One group per template window, in order.
        windows: Vec<WindowGroup>,
    },
}

impl SessionPlan {
    /// Name of the session the plan targets.
    pub fn session(&self) -> &str {
        match self {
            Self::Attach { session } | Self::Build { session, .. } => session,
        }
    }

    /// The session already exists and nothing will be built.
    pub const fn is_attach(&self) -> bool {
        matches!(self, Self::Attach { .. })
    }

    /// The plan as one ordered list.
    pub fn operations(&self) -> Vec<Operation> {
        match self {
            Self::Attach { session } => vec![Operation::Attach {
                session: session.clone(),
            }],
            Self::Build { windows, .. } => windows
                .iter()
                .flat_map(|group| group.operations.iter().cloned())
                .collect(),
        }
    }

    /// Run after a successful build: focus the first window and attach the client.
    pub fn finish(&self) -> Vec<Operation> {
        match self {
            Self::Attach { .. } => Vec::new(),
            Self::Build { session, .. } => vec![
                Operation::SelectWindow { window: 0 },
                Operation::Attach {
                    session: session.clone(),
                },
            ],
        }
    }
}

/// Compiles templates against one build context.
pub struct SessionCompiler<'a> {
    context: &'a BuildContext,
}

impl<'a> SessionCompiler<'a> {
    /// A compiler using `context` for every window.
    pub const fn new(context: &'a BuildContext) -> Self {
        Self { context }
    }

    /// Plan an attach when `live` exists, otherwise a full build of `template`.
    pub fn compile(&self, template: &ProjectTemplate, live: &LiveSession) -> SessionPlan {
        let session = template.session_name.clone();

        if live.exists {
            return SessionPlan::Attach { session };
        }

        let windows = template
            .windows
            .iter()
            .enumerate()
            .map(|(index, window)| self.compile_window(&session, index, window))
            .collect();

        SessionPlan::Build { session, windows }
    }

    fn compile_window(&self, session: &str, index: usize, window: &WindowSpec) -> WindowGroup {
        let cwd = self.context.project_root.clone();
        let environment = self.context.activation.clone();
        let mut operations = Vec::with_capacity(window.panes.len() * 2 + 2);

        operations.push(if index == 0 {
            Operation::NewSession {
                session: session.to_string(),
                window_name: window.name.clone(),
                cwd,
                environment,
            }
        } else {
            Operation::NewWindow {
                window: index,
                name: window.name.clone(),
                cwd,
                environment,
            }
        });

        for (pane, command) in window.panes.iter().enumerate() {
            if pane > 0 {
                operations.push(Operation::SplitWindow {
                    window: index,
                    pane,
                    cwd: self.context.project_root.clone(),
                    environment: self.context.activation.clone(),
                });
            }
            operations.push(Operation::SendKeys {
                window: index,
                pane,
                keys: command.clone(),
            });
        }

        if let Some(layout) = window.layout {
            operations.push(Operation::SelectLayout {
                window: index,
                layout,
            });
        }

        if window.panes.len() > 1 {
            operations.push(Operation::SelectPane {
                window: index,
                pane: 0,
            });
        }

        WindowGroup {
            name: window.name.clone(),
            operations,
        }
    }
}
