// ABOUTME: Application configuration - where templates and virtualenvs live and which tools to run
// Built once at startup from an optional TOML file plus the process environment

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Editor used when neither `VISUAL`, `EDITOR` nor the config file names one.
pub const DEFAULT_EDITOR: &str = "vi";
/// tmux executable, looked up on `PATH`.
pub const DEFAULT_TMUX_BINARY: &str = "tmux";
/// virtualenv executable, looked up on `PATH`.
pub const DEFAULT_VIRTUALENV_BINARY: &str = "virtualenv";

/// Optional settings file, `<config dir>/tenper/config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Overrides `~/.tenper`. `TENPER_CONFIGS` still wins.
    pub templates_dir: Option<PathBuf>,
    /// Overrides `~/.virtualenvs`. `WORKON_HOME` still wins.
    pub virtualenvs_dir: Option<PathBuf>,
    /// Used when `VISUAL` and `EDITOR` are unset.
    pub editor: Option<String>,
    /// tmux executable to run instead of `tmux`.
    pub tmux_binary: Option<String>,
    /// virtualenv executable to run instead of `virtualenv`.
    pub virtualenv_binary: Option<String>,
    /// Where the daily log files go.
    pub log_dir: Option<PathBuf>,
}

impl FileConfig {
    /// `<config dir>/tenper/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tenper").join("config.toml"))
    }

    /// Read and parse a TOML settings file. Unknown keys are rejected.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

/// Resolved settings every command runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// The user's home directory, used for `~` expansion.
    pub home_dir: PathBuf,
    /// Directory holding one `<project>.yml` per project.
    pub templates_dir: PathBuf,
    /// Directory holding one virtualenv per project, named after its session.
    pub virtualenvs_dir: PathBuf,
    /// Where the daily log files go.
    pub log_dir: PathBuf,
    /// Editor command line. Split on whitespace, the file path goes last.
    pub editor: String,
    /// tmux executable.
    pub tmux_binary: String,
    /// virtualenv executable.
    pub virtualenv_binary: String,
    /// `$TMUX` was set, so we are running inside a tmux client.
    pub inside_tmux: bool,
    /// Snapshot of the process environment, used to expand `project root`.
    pub variables: BTreeMap<String, String>,
}

impl AppConfig {
    /// Load from `config_file` (or the default location when `None`) and the process environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let home_dir = dirs::home_dir().context("Failed to get home directory")?;

        let file = match config_file {
            Some(path) => FileConfig::load_from(path)?,
            None => match FileConfig::default_path() {
                Some(path) if path.is_file() => FileConfig::load_from(&path)?,
                _ => FileConfig::default(),
            },
        };

        let cache_dir = dirs::cache_dir().unwrap_or_else(|| home_dir.join(".cache"));
        let variables = std::env::vars().collect();
        let config = Self::from_parts(home_dir, &cache_dir, file, variables);
        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Resolve the final settings. Environment variables win over the config file.
    pub fn from_parts(
        home_dir: PathBuf,
        cache_dir: &Path,
        file: FileConfig,
        variables: BTreeMap<String, String>,
    ) -> Self {
        let var = |name: &str| variables.get(name).filter(|v| !v.is_empty()).cloned();

        let templates_dir = var("TENPER_CONFIGS")
            .map(PathBuf::from)
            .or(file.templates_dir)
            .unwrap_or_else(|| home_dir.join(".tenper"));
        let virtualenvs_dir = var("WORKON_HOME")
            .map(PathBuf::from)
            .or(file.virtualenvs_dir)
            .unwrap_or_else(|| home_dir.join(".virtualenvs"));
        let editor = var("VISUAL")
            .or_else(|| var("EDITOR"))
            .or(file.editor)
            .unwrap_or_else(|| DEFAULT_EDITOR.to_string());
        let log_dir = file
            .log_dir
            .unwrap_or_else(|| cache_dir.join("tenper").join("logs"));
        let inside_tmux = var("TMUX").is_some();

        Self {
            home_dir,
            templates_dir,
            virtualenvs_dir,
            log_dir,
            editor,
            tmux_binary: file
                .tmux_binary
                .unwrap_or_else(|| DEFAULT_TMUX_BINARY.to_string()),
            virtualenv_binary: file
                .virtualenv_binary
                .unwrap_or_else(|| DEFAULT_VIRTUALENV_BINARY.to_string()),
            inside_tmux,
            variables,
        }
    }

    /// Value of an environment variable as captured at startup.
    pub fn variable(&self, name: &str) -> Option<String> {
        self.variables.get(name).cloned()
    }
}
