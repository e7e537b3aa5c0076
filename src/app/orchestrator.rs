// ABOUTME: Orchestrator - the list/edit/del/rebuild/start commands
// The only place where templates, virtualenvs and tmux meet

use super::prompt::Prompt;
use crate::config::AppConfig;
use crate::error::{report, TenperError};
use crate::models::{default_document, ProjectTemplate};
use crate::process::{CommandRunner, ExternalCommand};
use crate::session::{BuildContext, SessionCompiler, StoreError, TemplateStore};
use crate::tmux::{PaneEnvironment, TmuxDriver};
use crate::virtualenv::{CreateMode, DestroyOutcome, Environment, EnvironmentError, VirtualenvManager};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// The fixed command set that shell completion offers next to `list` output.
pub const COMMANDS: [&str; 5] = ["list", "edit", "del", "rebuild", "start"];

/// A command and the project it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Print stored project names.
    List,
    /// Create or edit a template.
    Edit(String),
    /// Remove a template, offering to remove its virtualenv.
    Delete(String),
    /// Recreate a project's virtualenv.
    Rebuild(String),
    /// Build or attach to a project's session.
    Start(String),
}

/// What `del` did with the project's virtualenv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentFate {
    /// Deleted after confirmation.
    Removed(PathBuf),
    /// The user declined to delete it.
    Kept(PathBuf),
    /// The project had no virtualenv on disk.
    NotPresent,
}

/// The successful result of an [`Action`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Stored project names, sorted.
    Listed(Vec<String>),
    /// The template was saved.
    Edited {
        /// Where it was stored.
        path: PathBuf,
        /// The validated contents.
        template: ProjectTemplate,
    },
    /// The template was removed.
    Deleted {
        /// The removed file.
        template: PathBuf,
        /// What happened to the virtualenv.
        environment: EnvironmentFate,
    },
    /// `rebuild` finished.
    Rebuilt {
        /// The project name.
        project: String,
        /// The new environment, `None` when the template has no virtualenv section.
        environment: Option<Environment>,
    },
    /// The terminal was attached to the session and has since detached.
    Started {
        /// The session name.
        session: String,
        /// The session was already running, so nothing was built.
        reattached: bool,
        /// Windows in the session.
        windows: usize,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listed(names) => write!(f, "{}", names.join("\n")),
            Self::Edited { path, .. } => write!(f, "Saved {}.", path.display()),
            Self::Deleted {
                template,
                environment,
            } => {
                match environment {
                    EnvironmentFate::Removed(dir) => writeln!(f, "Deleted {}.", dir.display())?,
                    EnvironmentFate::Kept(dir) => writeln!(f, "Kept virtualenv {}.", dir.display())?,
                    EnvironmentFate::NotPresent => {}
                }
                write!(f, "Removed {}.", template.display())
            }
            Self::Rebuilt {
                project,
                environment: None,
            } => write!(f, "Project '{project}' has no virtualenv section; nothing to rebuild."),
            Self::Rebuilt {
                environment: Some(env),
                ..
            } => write!(f, "Rebuilt virtualenv {}.", env.dir.display()),
            // The attached client has already shown everything there is to see.
            Self::Started { .. } => Ok(()),
        }
    }
}

/// Runs commands against the configured directories and tools.
pub struct Orchestrator<R: CommandRunner, P: Prompt> {
    config: AppConfig,
    runner: R,
    prompt: P,
    store: TemplateStore,
}

impl<R: CommandRunner, P: Prompt> Orchestrator<R, P> {
    /// An orchestrator using `runner` for external programs and `prompt` for questions.
    pub fn new(config: AppConfig, runner: R, prompt: P) -> Self {
        let store = TemplateStore::new(&config.templates_dir);
        Self {
            config,
            runner,
            prompt,
            store,
        }
    }

    /// The configuration commands run with.
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The external command runner.
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// The user prompt.
    pub const fn prompt(&self) -> &P {
        &self.prompt
    }

    /// The template store.
    pub const fn store(&self) -> &TemplateStore {
        &self.store
    }

    fn driver(&self) -> TmuxDriver<'_, R> {
        TmuxDriver::new(&self.runner, &self.config.tmux_binary, self.config.inside_tmux)
    }

    fn virtualenvs(&self) -> VirtualenvManager<'_, R> {
        VirtualenvManager::new(
            &self.runner,
            &self.config.virtualenvs_dir,
            &self.config.virtualenv_binary,
        )
    }

    /// Run one command.
    pub fn dispatch(&self, action: Action) -> Result<Outcome, TenperError> {
        match action {
            Action::List => self.list().map(Outcome::Listed),
            Action::Edit(name) => self.edit(&name),
            Action::Delete(name) => self.delete(&name),
            Action::Rebuild(name) => self.rebuild(&name),
            Action::Start(name) => self.start(&name),
        }
    }

    /// Stored project names, sorted.
    pub fn list(&self) -> Result<Vec<String>, TenperError> {
        Ok(self.store.list()?)
    }

    /// Open the project's template (or a fresh default) in the editor and store it once it validates.
    pub fn edit(&self, name: &str) -> Result<Outcome, TenperError> {
        let original = if self.store.exists(name)? {
            self.store.read(name)?
        } else {
            info!("No template for '{}' yet, starting from the default", name);
            default_document(name)
        };
        let draft = self.store.draft(name, &original)?;

        loop {
            self.open_editor(draft.path())?;
            let text = fs::read_to_string(draft.path()).map_err(|source| TenperError::Io {
                path: draft.path().to_path_buf(),
                source,
            })?;

            match ProjectTemplate::from_yaml(&text) {
                Ok(template) => {
                    let path = self.store.write(name, &text)?;
                    return Ok(Outcome::Edited { path, template });
                }
                Err(err) => {
                    let reason = report(&err);
                    warn!("Edited template for '{}' is invalid: {}", name, reason);
                    let question = format!("{reason}\nRe-open the editor to fix it?");
                    let reopen = self.prompt.confirm(&question).map_err(|source| TenperError::Io {
                        path: draft.path().to_path_buf(),
                        source,
                    })?;
                    if !reopen {
                        return Err(err.into());
                    }
                }
            }
        }
    }

    fn open_editor(&self, path: &Path) -> Result<(), TenperError> {
        let mut words = self.config.editor.split_whitespace();
        let program = words.next().unwrap_or(crate::config::DEFAULT_EDITOR);
        let command = ExternalCommand::new(program)
            .args(words)
            .arg(path.to_string_lossy());

        info!("Opening editor: {}", command);
        self.runner.interactive(&command)?.check(&command)?;
        Ok(())
    }

    /// Remove the project's template, first offering to delete its virtualenv.
    pub fn delete(&self, name: &str) -> Result<Outcome, TenperError> {
        let environment_key = match self.store.load(name) {
            Ok(template) => template.session_name,
            Err(StoreError::Template { source, .. }) => {
                warn!(
                    "Template for '{}' is invalid ({}), using the project name",
                    name,
                    report(&source)
                );
                name.to_string()
            }
            Err(err) => return Err(err.into()),
        };

        let environment = match self.virtualenvs().destroy(&environment_key, &self.prompt) {
            Ok(DestroyOutcome::Removed(dir)) => EnvironmentFate::Removed(dir),
            Ok(DestroyOutcome::Absent) => EnvironmentFate::NotPresent,
            Err(EnvironmentError::ConfirmationDeclined(dir)) => EnvironmentFate::Kept(dir),
            Err(err) => return Err(err.into()),
        };

        let template = self.store.remove(name)?;
        Ok(Outcome::Deleted {
            template,
            environment,
        })
    }

    /// Recreate the project's virtualenv from the template as it is on disk now.
    pub fn rebuild(&self, name: &str) -> Result<Outcome, TenperError> {
        let template = self.store.load(name)?;

        let Some(spec) = &template.virtualenv else {
            info!("Project '{}' has no virtualenv section, nothing to rebuild", name);
            return Ok(Outcome::Rebuilt {
                project: name.to_string(),
                environment: None,
            });
        };

        let environment = self.virtualenvs().rebuild(&template.session_name, spec)?;
        Ok(Outcome::Rebuilt {
            project: name.to_string(),
            environment: Some(environment),
        })
    }

    /// Attach to the project's session, building it first when it is not running.
    pub fn start(&self, name: &str) -> Result<Outcome, TenperError> {
        let template = self.store.load(name)?;
        let project_root = self.resolve_project_root(&template)?;

        let driver = self.driver();
        let live = driver.query_live_session(&template.session_name)?;

        let activation = match (&template.virtualenv, live.exists) {
            (Some(spec), false) => self
                .virtualenvs()
                .create(&template.session_name, spec, CreateMode::Implicit)?
                .activation(),
            _ => PaneEnvironment::default(),
        };

        let context = BuildContext {
            project_root,
            activation,
        };
        let plan = SessionCompiler::new(&context).compile(&template, &live);

        if plan.is_attach() {
            info!("Session '{}' already exists, attaching", plan.session());
            self.prompt.notify("Session already exists: attaching.");
        } else {
            info!(
                "Building session '{}' with {} windows",
                plan.session(),
                template.windows.len()
            );
        }

        if let Err(err) = driver.execute(&plan.operations()) {
            if !plan.is_attach() {
                self.prompt.notify(&format!(
                    "Session '{0}' was left partially built. Inspect it with `tmux attach -t {0}` or remove it with `tmux kill-session -t {0}`.",
                    plan.session()
                ));
            }
            return Err(err.into());
        }
        driver.execute(&plan.finish())?;

        Ok(Outcome::Started {
            session: plan.session().to_string(),
            reattached: plan.is_attach(),
            windows: if live.exists {
                live.window_count
            } else {
                template.windows.len()
            },
        })
    }

    fn resolve_project_root(&self, template: &ProjectTemplate) -> Result<PathBuf, TenperError> {
        let expanded =
            template.expand_project_root(&self.config.home_dir, |name| self.config.variable(name));

        if !expanded.is_dir() {
            return Err(TenperError::validation(
                "project root",
                format!("{} is not an existing directory", expanded.display()),
            ));
        }

        expanded.canonicalize().map_err(|source| TenperError::Io {
            path: expanded.clone(),
            source,
        })
    }
}
