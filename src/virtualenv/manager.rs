// ABOUTME: Virtualenv lifecycle management - create, rebuild and destroy per-project environments
// Environments live in <virtualenvs dir>/<session name>, the virtualenvwrapper layout

use crate::app::Prompt;
use crate::error::report;
use crate::models::VirtualenvSpec;
use crate::process::{CommandRunner, ExternalCommand, ProcessError};
use crate::tmux::PaneEnvironment;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Interpreter for the activation wrapper; `activate` is POSIX shell whatever the user's shell is.
const ACTIVATION_SHELL: &str = "/bin/sh";

/// Failures managing a project's virtualenv.
#[derive(Error, Debug)]
pub enum EnvironmentError {
    /// An explicit create found the directory already there.
    #[error("Virtualenv already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
    /// The user chose to keep the environment.
    #[error("Deleting {} was declined", .0.display())]
    ConfirmationDeclined(PathBuf),
    /// The virtualenv tool could not be run or exited non-zero.
    #[error("Virtualenv tool failed")]
    Process(#[from] ProcessError),
    /// Filesystem access failed.
    #[error("IO error at {}", path.display())]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: io::Error,
    },
}

impl EnvironmentError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// How a create request treats an environment that is already there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Part of `start`: an existing environment is reused.
    Implicit,
    /// Asked for directly: an existing environment is an error.
    Explicit,
}

/// Result of a confirmed or unnecessary destroy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestroyOutcome {
    /// The directory was deleted.
    Removed(PathBuf),
    /// There was nothing to delete.
    Absent,
}

/// A project's virtualenv and the settings it was created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// The session name the environment belongs to.
    pub name: String,
    /// `<virtualenvs dir>/<name>`.
    pub dir: PathBuf,
    /// Interpreter passed with `-p`.
    pub python_binary: String,
    /// Created with `--system-site-packages`.
    pub site_packages: bool,
}

impl Environment {
    /// The environment's `bin` directory.
    pub fn bin_dir(&self) -> PathBuf {
        self.dir.join("bin")
    }

    /// How to start a pane with this environment active.
    ///
    /// A login shell rebuilds `PATH` from the system profile, so exporting `PATH` on the
    /// pane is not enough. Instead the pane runs `activate` first and then execs the
    /// user's shell, which inherits the activated environment.
    pub fn activation(&self) -> PaneEnvironment {
        let activate = self.bin_dir().join("activate");
        PaneEnvironment {
            variables: vec![(
                "VIRTUAL_ENV".to_string(),
                self.dir.to_string_lossy().to_string(),
            )],
            shell_command: vec![
                ACTIVATION_SHELL.to_string(),
                "-c".to_string(),
                format!(
                    ". {}; exec \"${{SHELL:-{ACTIVATION_SHELL}}}\"",
                    shell_quote(&activate.to_string_lossy())
                ),
            ],
        }
    }
}

/// Single-quote `value` for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Creates and removes environments under one base directory.
pub struct VirtualenvManager<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    base_dir: PathBuf,
    tool: String,
}

impl<'a, R: CommandRunner + ?Sized> VirtualenvManager<'a, R> {
    /// A manager for `base_dir`, running `tool` to create environments.
    pub fn new(runner: &'a R, base_dir: impl Into<PathBuf>, tool: impl Into<String>) -> Self {
        Self {
            runner,
            base_dir: base_dir.into(),
            tool: tool.into(),
        }
    }

    /// Directory of the environment called `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    /// Describe the environment `name` would be, without touching disk.
    pub fn environment(&self, name: &str, spec: &VirtualenvSpec) -> Environment {
        Environment {
            name: name.to_string(),
            dir: self.path_for(name),
            python_binary: spec.python_binary.clone(),
            site_packages: spec.site_packages,
        }
    }

    /// Run the virtualenv tool for `name`. `mode` decides what an existing directory means.
    pub fn create(
        &self,
        name: &str,
        spec: &VirtualenvSpec,
        mode: CreateMode,
    ) -> Result<Environment, EnvironmentError> {
        let environment = self.environment(name, spec);

        if environment.dir.exists() {
            return match mode {
                CreateMode::Implicit => {
                    debug!("Reusing virtualenv at {}", environment.dir.display());
                    Ok(environment)
                }
                CreateMode::Explicit => Err(EnvironmentError::AlreadyExists(environment.dir)),
            };
        }

        fs::create_dir_all(&self.base_dir).map_err(EnvironmentError::io(&self.base_dir))?;

        info!(
            "Creating virtualenv {} with {} (site packages: {})",
            environment.dir.display(),
            environment.python_binary,
            environment.site_packages
        );

        let mut command = ExternalCommand::new(&self.tool).args(["-p", &environment.python_binary]);
        if environment.site_packages {
            command = command.arg("--system-site-packages");
        }
        command = command.arg(environment.dir.to_string_lossy());

        let result = self
            .runner
            .output(&command)
            .and_then(|output| output.check(&command));

        match result {
            Ok(output) => {
                debug!("virtualenv output: {}", output.stdout.trim());
                Ok(environment)
            }
            Err(err) => {
                if environment.dir.exists() {
                    warn!("Removing partially created virtualenv {}", environment.dir.display());
                    if let Err(cleanup) = self.remove_dir(&environment.dir) {
                        error!(
                            "Failed to clean up {}: {}",
                            environment.dir.display(),
                            report(&cleanup)
                        );
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Replace whatever is at the environment's path with a fresh environment built from `spec`.
    pub fn rebuild(&self, name: &str, spec: &VirtualenvSpec) -> Result<Environment, EnvironmentError> {
        let dir = self.path_for(name);
        if dir.exists() {
            info!("Removing virtualenv {} before rebuilding", dir.display());
            self.remove_dir(&dir)?;
        }
        self.create(name, spec, CreateMode::Explicit)
    }

    /// Remove the environment once `prompt` confirms. Nothing is asked when it does not exist.
    pub fn destroy<P: Prompt + ?Sized>(
        &self,
        name: &str,
        prompt: &P,
    ) -> Result<DestroyOutcome, EnvironmentError> {
        let dir = self.path_for(name);
        if !dir.exists() {
            return Ok(DestroyOutcome::Absent);
        }

        let question = format!(
            "There's a virtualenv for this project in {}. Do you want to delete it?",
            dir.display()
        );
        if !prompt.confirm(&question).map_err(EnvironmentError::io(&dir))? {
            info!("Keeping virtualenv {}", dir.display());
            return Err(EnvironmentError::ConfirmationDeclined(dir));
        }

        self.remove_dir(&dir)?;
        info!("Deleted virtualenv {}", dir.display());
        Ok(DestroyOutcome::Removed(dir))
    }

    fn remove_dir(&self, dir: &Path) -> Result<(), EnvironmentError> {
        fs::remove_dir_all(dir).map_err(EnvironmentError::io(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::prompt::MockPrompt;
    use crate::process::{CommandOutput, MockCommandRunner};
    use tempfile::TempDir;

    fn spec(site_packages: bool) -> VirtualenvSpec {
        VirtualenvSpec {
            python_binary: "/usr/bin/python3".to_string(),
            site_packages,
        }
    }

    /// A runner that behaves like virtualenv: creates the target directory and exits with `code`.
    fn virtualenv_runner(code: i32) -> MockCommandRunner {
        let mut runner = MockCommandRunner::new();
        runner.expect_output().times(1).returning(move |command| {
            let dir = PathBuf::from(command.args.last().unwrap());
            fs::create_dir_all(dir.join("bin")).unwrap();
            if code == 0 {
                Ok(CommandOutput::success("created virtual environment"))
            } else {
                Ok(CommandOutput::failure(code, "interpreter not found"))
            }
        });
        runner
    }

    #[test]
    fn test_create_invokes_tool() {
        let temp = TempDir::new().unwrap();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_output()
            .times(1)
            .withf(|command| {
                command.program == "virtualenv"
                    && command.args[..3] == ["-p", "/usr/bin/python3", "--system-site-packages"]
            })
            .returning(|command| {
                fs::create_dir_all(command.args.last().unwrap()).unwrap();
                Ok(CommandOutput::success(""))
            });

        let manager = VirtualenvManager::new(&runner, temp.path().join("venvs"), "virtualenv");
        let env = manager.create("demo", &spec(true), CreateMode::Explicit).unwrap();

        assert_eq!(env.dir, temp.path().join("venvs").join("demo"));
        assert!(manager.path_for("demo").is_dir());
    }

    #[test]
    fn test_create_without_site_packages_omits_flag() {
        let temp = TempDir::new().unwrap();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_output()
            .times(1)
            .withf(|command| command.args.len() == 3 && command.args[0] == "-p")
            .returning(|_| Ok(CommandOutput::success("")));

        let manager = VirtualenvManager::new(&runner, temp.path(), "virtualenv");
        manager.create("demo", &spec(false), CreateMode::Explicit).unwrap();
    }

    #[test]
    fn test_implicit_create_reuses_existing() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("demo")).unwrap();
        let mut runner = MockCommandRunner::new();
        runner.expect_output().never();

        let manager = VirtualenvManager::new(&runner, temp.path(), "virtualenv");
        let env = manager.create("demo", &spec(false), CreateMode::Implicit).unwrap();
        assert_eq!(env.dir, temp.path().join("demo"));
    }

    #[test]
    fn test_explicit_create_rejects_existing() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("demo")).unwrap();
        let mut runner = MockCommandRunner::new();
        runner.expect_output().never();

        let manager = VirtualenvManager::new(&runner, temp.path(), "virtualenv");
        let err = manager.create("demo", &spec(false), CreateMode::Explicit).unwrap_err();
        assert!(matches!(err, EnvironmentError::AlreadyExists(_)));
    }

    #[test]
    fn test_failed_create_leaves_nothing_behind() {
        let temp = TempDir::new().unwrap();
        let runner = virtualenv_runner(2);

        let manager = VirtualenvManager::new(&runner, temp.path(), "virtualenv");
        let err = manager.create("demo", &spec(false), CreateMode::Implicit).unwrap_err();

        assert!(!manager.path_for("demo").is_dir());
        match err {
            EnvironmentError::Process(process) => assert_eq!(process.exit_code(), Some(2)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_tool_is_reported() {
        let temp = TempDir::new().unwrap();
        let mut runner = MockCommandRunner::new();
        runner.expect_output().times(1).returning(|command| {
            Err(ProcessError::NotFound {
                program: command.program.clone(),
            })
        });

        let manager = VirtualenvManager::new(&runner, temp.path(), "virtualenv");
        let err = manager.create("demo", &spec(false), CreateMode::Implicit).unwrap_err();
        assert!(matches!(err, EnvironmentError::Process(ProcessError::NotFound { .. })));
    }

    #[test]
    fn test_rebuild_replaces_existing() {
        let temp = TempDir::new().unwrap();
        let old = temp.path().join("demo");
        fs::create_dir_all(&old).unwrap();
        fs::write(old.join("stale-marker"), "old").unwrap();
        let runner = virtualenv_runner(0);

        let manager = VirtualenvManager::new(&runner, temp.path(), "virtualenv");
        manager.rebuild("demo", &spec(true)).unwrap();

        assert!(manager.path_for("demo").is_dir());
        assert!(!old.join("stale-marker").exists());
        assert!(old.join("bin").exists());
    }

    #[test]
    fn test_destroy_absent_asks_nothing() {
        let temp = TempDir::new().unwrap();
        let runner = MockCommandRunner::new();
        let mut prompt = MockPrompt::new();
        prompt.expect_confirm().never();

        let manager = VirtualenvManager::new(&runner, temp.path(), "virtualenv");
        assert_eq!(manager.destroy("demo", &prompt).unwrap(), DestroyOutcome::Absent);
    }

    #[test]
    fn test_destroy_declined_keeps_environment() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("demo")).unwrap();
        let runner = MockCommandRunner::new();
        let mut prompt = MockPrompt::new();
        prompt
            .expect_confirm()
            .times(1)
            .withf(|question| question.contains("demo"))
            .returning(|_| Ok(false));

        let manager = VirtualenvManager::new(&runner, temp.path(), "virtualenv");
        let err = manager.destroy("demo", &prompt).unwrap_err();

        assert!(matches!(err, EnvironmentError::ConfirmationDeclined(_)));
        assert!(manager.path_for("demo").is_dir());
    }

    #[test]
    fn test_destroy_confirmed_removes_environment() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("demo").join("bin")).unwrap();
        let runner = MockCommandRunner::new();
        let mut prompt = MockPrompt::new();
        prompt.expect_confirm().times(1).returning(|_| Ok(true));

        let manager = VirtualenvManager::new(&runner, temp.path(), "virtualenv");
        let outcome = manager.destroy("demo", &prompt).unwrap();

        assert_eq!(outcome, DestroyOutcome::Removed(temp.path().join("demo")));
        assert!(!manager.path_for("demo").is_dir());
    }

    fn demo_environment(dir: PathBuf) -> Environment {
        Environment {
            name: "demo".to_string(),
            dir,
            python_binary: "/usr/bin/python3".to_string(),
            site_packages: false,
        }
    }

    #[test]
    fn test_activation_sources_activate_then_execs_shell() {
        let env = demo_environment(PathBuf::from("/venvs/it's demo"));
        let activation = env.activation();

        assert_eq!(
            activation.variables,
            vec![("VIRTUAL_ENV".to_string(), "/venvs/it's demo".to_string())]
        );
        assert_eq!(
            activation.shell_command,
            vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                r#". '/venvs/it'\''s demo/bin/activate'; exec "${SHELL:-/bin/sh}""#.to_string(),
            ]
        );
    }

    #[test]
    fn test_activated_pane_shell_sees_bin_dir_first_on_path() {
        use std::os::unix::fs::PermissionsExt;
        use std::process::Command;

        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("venvs").join("demo");
        fs::create_dir_all(dir.join("bin")).unwrap();
        fs::write(
            dir.join("bin").join("activate"),
            format!(
                "VIRTUAL_ENV='{}'\nexport VIRTUAL_ENV\nPATH=\"$VIRTUAL_ENV/bin:$PATH\"\nexport PATH\n",
                dir.display()
            ),
        )
        .unwrap();

        // Stands in for the user's interactive shell and reports what it inherited.
        let shell = temp.path().join("report-shell");
        fs::write(&shell, "#!/bin/sh\necho \"$VIRTUAL_ENV|$PATH\"\n").unwrap();
        fs::set_permissions(&shell, fs::Permissions::from_mode(0o755)).unwrap();

        let activation = demo_environment(dir.clone()).activation();
        let output = Command::new(&activation.shell_command[0])
            .args(&activation.shell_command[1..])
            .env_clear()
            .env("PATH", "/usr/local/bin:/usr/bin:/bin")
            .env("SHELL", &shell)
            .output()
            .unwrap();

        assert!(output.status.success());
        assert_eq!(
            String::from_utf8_lossy(&output.stdout),
            format!(
                "{0}|{0}/bin:/usr/local/bin:/usr/bin:/bin\n",
                dir.display()
            )
        );
    }
}
