// ABOUTME: Project template model - the validated form of a user's YAML session description
// Parsing goes through a loose serde document first, then every field is checked and converted

use serde::Deserialize;
use serde_yaml::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Interpreter used when the `virtualenv` section omits `python binary`.
pub const DEFAULT_PYTHON_BINARY: &str = "/usr/bin/python";
/// Working directory used when the template omits `project root`.
pub const DEFAULT_PROJECT_ROOT: &str = "$HOME";

/// Why a template was rejected.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// A field is missing or has an unusable value.
    #[error("Invalid template field `{field}`: {message}")]
    Validation {
        /// Path to the field, such as `windows[1].panes[0]`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The text is not YAML of the expected shape.
    #[error("Malformed template")]
    Syntax(#[from] serde_yaml::Error),
}

impl TemplateError {
    /// Build a [`TemplateError::Validation`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// One of tmux's preset pane layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// `even-horizontal`
    EvenHorizontal,
    /// `even-vertical`
    EvenVertical,
    /// `main-horizontal`
    MainHorizontal,
    /// `main-vertical`
    MainVertical,
    /// `tiled`
    Tiled,
}

impl Layout {
    /// Every layout, in the order error messages list them.
    pub const ALL: [Self; 5] = [
        Self::EvenHorizontal,
        Self::EvenVertical,
        Self::MainHorizontal,
        Self::MainVertical,
        Self::Tiled,
    ];

    /// The name tmux's `select-layout` accepts.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EvenHorizontal => "even-horizontal",
            Self::EvenVertical => "even-vertical",
            Self::MainHorizontal => "main-horizontal",
            Self::MainVertical => "main-vertical",
            Self::Tiled => "tiled",
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|layout| layout.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|l| l.as_str()).collect();
                format!("unknown layout '{}', expected one of: {}", s, names.join(", "))
            })
    }
}

/// The template's `virtualenv` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualenvSpec {
    /// Interpreter passed to the virtualenv tool with `-p`.
    pub python_binary: String,
    /// Give the environment access to the system site-packages.
    pub site_packages: bool,
}

impl Default for VirtualenvSpec {
    fn default() -> Self {
        Self {
            python_binary: DEFAULT_PYTHON_BINARY.to_string(),
            site_packages: false,
        }
    }
}

/// One tmux window and the commands for its panes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    /// Window name shown in the tmux status line.
    pub name: String,
    /// Applied once every pane exists. `None` keeps tmux's own arrangement.
    pub layout: Option<Layout>,
    /// Never empty.
    pub panes: Vec<String>,
}

/// A validated project template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectTemplate {
    /// tmux session name, also the name of the project's virtualenv.
    pub session_name: String,
    /// As written in the template; see `expand_project_root`.
    pub project_root: String,
    /// Present when the project wants a virtualenv.
    pub virtualenv: Option<VirtualenvSpec>,
    /// Windows in the order they are created.
    pub windows: Vec<WindowSpec>,
}

// The on-disk shape. Field names follow the documented schema, spaces and all.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateDocument {
    #[serde(rename = "session name")]
    session_name: Option<String>,
    virtualenv: Option<VirtualenvDocument>,
    #[serde(rename = "project root")]
    project_root: Option<String>,
    windows: Option<Vec<WindowDocument>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VirtualenvDocument {
    #[serde(rename = "python binary")]
    python_binary: Option<String>,
    #[serde(rename = "site packages?")]
    site_packages: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WindowDocument {
    name: Option<String>,
    layout: Option<String>,
    // Kept as raw values so numbers and booleans can be rejected instead of coerced.
    panes: Option<Vec<Value>>,
}

impl ProjectTemplate {
    /// Parse and validate a template document.
    pub fn from_yaml(text: &str) -> Result<Self, TemplateError> {
        let document: TemplateDocument = serde_yaml::from_str(text)?;
        Self::from_document(document)
    }

    fn from_document(document: TemplateDocument) -> Result<Self, TemplateError> {
        let session_name = document
            .session_name
            .ok_or_else(|| TemplateError::validation("session name", "is required"))?;
        validate_session_name(&session_name)?;

        let virtualenv = document.virtualenv.map(|venv| VirtualenvSpec {
            python_binary: venv
                .python_binary
                .unwrap_or_else(|| DEFAULT_PYTHON_BINARY.to_string()),
            site_packages: venv.site_packages.unwrap_or(false),
        });
        if let Some(venv) = &virtualenv {
            if venv.python_binary.trim().is_empty() {
                return Err(TemplateError::validation(
                    "virtualenv.python binary",
                    "must not be empty",
                ));
            }
        }

        let project_root = document
            .project_root
            .unwrap_or_else(|| DEFAULT_PROJECT_ROOT.to_string());
        if project_root.trim().is_empty() {
            return Err(TemplateError::validation("project root", "must not be empty"));
        }

        let raw_windows = document
            .windows
            .ok_or_else(|| TemplateError::validation("windows", "is required"))?;
        if raw_windows.is_empty() {
            return Err(TemplateError::validation(
                "windows",
                "must list at least one window",
            ));
        }

        let windows = raw_windows
            .into_iter()
            .enumerate()
            .map(|(index, window)| convert_window(index, window))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            session_name,
            project_root,
            virtualenv,
            windows,
        })
    }

    /// Expand `~`, `$VAR` and `${VAR}` in the project root. Unknown variables are left as written.
    pub fn expand_project_root<F>(&self, home: &Path, lookup: F) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        expand_path(&self.project_root, home, lookup)
    }
}

fn convert_window(index: usize, window: WindowDocument) -> Result<WindowSpec, TemplateError> {
    let field = |name: &str| format!("windows[{index}].{name}");

    let name = window
        .name
        .ok_or_else(|| TemplateError::validation(field("name"), "is required"))?;
    if name.trim().is_empty() {
        return Err(TemplateError::validation(field("name"), "must not be empty"));
    }

    let layout = window
        .layout
        .map(|raw| raw.parse::<Layout>())
        .transpose()
        .map_err(|message| TemplateError::validation(field("layout"), message))?;

    let raw_panes = window
        .panes
        .ok_or_else(|| TemplateError::validation(field("panes"), "is required"))?;
    if raw_panes.is_empty() {
        return Err(TemplateError::validation(
            field("panes"),
            "must list at least one pane command",
        ));
    }

    let panes = raw_panes
        .into_iter()
        .enumerate()
        .map(|(pane, value)| match value {
            Value::String(command) => Ok(command),
            other => Err(TemplateError::validation(
                format!("windows[{index}].panes[{pane}]"),
                format!("expected a command string, found {}", describe_value(&other)),
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(WindowSpec {
        name,
        layout,
        panes,
    })
}

fn describe_value(value: &Value) -> &'static str {
    match value {
        Value::Null => "nothing",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Session names double as tmux targets and as the virtualenv directory name.
pub fn validate_session_name(name: &str) -> Result<(), TemplateError> {
    if name.is_empty() {
        return Err(TemplateError::validation("session name", "must not be empty"));
    }

    let invalid_chars = ['.', ':', '/', '\\'];
    if name.chars().any(|c| c.is_whitespace() || invalid_chars.contains(&c)) {
        return Err(TemplateError::validation(
            "session name",
            format!("'{name}' must not contain whitespace, '.', ':', '/' or '\\'"),
        ));
    }

    Ok(())
}

fn expand_path<F>(raw: &str, home: &Path, lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    let raw = raw.trim();
    let home_str = home.to_string_lossy();
    let tilde_expanded = if raw == "~" {
        home_str.to_string()
    } else if let Some(rest) = raw.strip_prefix("~/") {
        format!("{}/{}", home_str.trim_end_matches('/'), rest)
    } else {
        raw.to_string()
    };

    let resolve = |name: &str| -> Option<String> {
        lookup(name).or_else(|| (name == "HOME").then(|| home_str.to_string()))
    };

    let mut expanded = String::with_capacity(tilde_expanded.len());
    let mut rest = tilde_expanded.as_str();
    while let Some(dollar) = rest.find('$') {
        expanded.push_str(&rest[..dollar]);
        let after = &rest[dollar + 1..];

        let (name, written, remainder) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], &rest[dollar..dollar + end + 3], &braced[end + 1..]),
                None => ("", &rest[dollar..], ""),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], &rest[dollar..=dollar + end], &after[end..])
        };

        match (name.is_empty(), resolve(name)) {
            (false, Some(value)) => expanded.push_str(&value),
            _ => expanded.push_str(written),
        }
        rest = remainder;
    }
    expanded.push_str(rest);

    PathBuf::from(expanded)
}

/// The document written for a project that has never been edited.
pub fn default_document(project: &str) -> String {
    format!(
        r"# Used as the tmux session name (see 'tmux list-sessions') and as the
# name of the virtualenv directory.
session name: {project}

# Optional. When present, a virtualenv is created on first start and every
# pane starts with it activated.
virtualenv:
    python binary: {DEFAULT_PYTHON_BINARY}
    site packages?: false

# Every pane starts in this directory.
project root: {DEFAULT_PROJECT_ROOT}

windows:
  - name: One
    panes:
      - ls -l

  - name: Two
    # Optional: even-horizontal, even-vertical, main-horizontal,
    # main-vertical or tiled.
    layout: main-vertical
    panes:
      - ls
      - vim
      - top
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn field_of(err: TemplateError) -> String {
        match err {
            TemplateError::Validation { field, .. } => field,
            TemplateError::Syntax(e) => panic!("expected a validation error, got: {e}"),
        }
    }

    #[test]
    fn test_default_document_parses() {
        let template = ProjectTemplate::from_yaml(&default_document("demo")).unwrap();

        assert_eq!(template.session_name, "demo");
        assert_eq!(template.project_root, "$HOME");
        assert_eq!(template.virtualenv, Some(VirtualenvSpec::default()));
        assert_eq!(template.windows.len(), 2);
        assert_eq!(template.windows[0].panes, vec!["ls -l".to_string()]);
        assert_eq!(template.windows[1].layout, Some(Layout::MainVertical));
        assert_eq!(template.windows[1].panes.len(), 3);
    }

    #[test]
    fn test_minimal_template_uses_defaults() {
        let template = ProjectTemplate::from_yaml(
            "session name: demo\nwindows:\n  - name: One\n    panes: [\"ls -l\"]\n",
        )
        .unwrap();

        assert_eq!(template.project_root, DEFAULT_PROJECT_ROOT);
        assert!(template.virtualenv.is_none());
        assert_eq!(template.windows[0].layout, None);
    }

    #[test]
    fn test_virtualenv_fields_default_when_omitted() {
        let template = ProjectTemplate::from_yaml(
            "session name: demo\nvirtualenv:\n  site packages?: true\nwindows:\n  - name: One\n    panes: [ls]\n",
        )
        .unwrap();

        let venv = template.virtualenv.unwrap();
        assert_eq!(venv.python_binary, DEFAULT_PYTHON_BINARY);
        assert!(venv.site_packages);
    }

    #[test]
    fn test_missing_session_name_is_rejected() {
        let err = ProjectTemplate::from_yaml("windows:\n  - name: One\n    panes: [ls]\n").unwrap_err();
        assert_eq!(field_of(err), "session name");
    }

    #[test]
    fn test_non_string_pane_is_rejected() {
        let err = ProjectTemplate::from_yaml(
            "session name: demo\nwindows:\n  - name: One\n    panes:\n      - ls\n      - 42\n",
        )
        .unwrap_err();
        assert_eq!(field_of(err), "windows[0].panes[1]");
    }

    #[test]
    fn test_unknown_layout_is_rejected() {
        let err = ProjectTemplate::from_yaml(
            "session name: demo\nwindows:\n  - name: One\n    layout: diagonal\n    panes: [ls]\n",
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("windows[0].layout"));
        assert!(message.contains("diagonal"));
    }

    #[test]
    fn test_window_without_panes_is_rejected() {
        let err = ProjectTemplate::from_yaml(
            "session name: demo\nwindows:\n  - name: One\n  - name: Two\n    panes: []\n",
        )
        .unwrap_err();
        assert_eq!(field_of(err), "windows[0].panes");

        let err = ProjectTemplate::from_yaml(
            "session name: demo\nwindows:\n  - name: Two\n    panes: []\n",
        )
        .unwrap_err();
        assert_eq!(field_of(err), "windows[0].panes");
    }

    #[test]
    fn test_missing_windows_is_rejected() {
        let err = ProjectTemplate::from_yaml("session name: demo\n").unwrap_err();
        assert_eq!(field_of(err), "windows");
    }

    #[test]
    fn test_unknown_field_is_a_syntax_error() {
        let err = ProjectTemplate::from_yaml(
            "session name: demo\nwindow:\n  - name: One\n    panes: [ls]\n",
        )
        .unwrap_err();
        assert!(matches!(err, TemplateError::Syntax(_)));
        assert_eq!(err.to_string(), "Malformed template");
        assert!(crate::error::report(&err).contains("window"));
    }

    #[test]
    fn test_session_name_validation() {
        assert!(validate_session_name("demo-project_2").is_ok());
        assert!(validate_session_name("").is_err());
        assert!(validate_session_name("my project").is_err());
        assert!(validate_session_name("a.b").is_err());
        assert!(validate_session_name("a:b").is_err());
        assert!(validate_session_name("../escape").is_err());
    }

    #[test]
    fn test_pane_commands_are_kept_verbatim() {
        let template = ProjectTemplate::from_yaml(
            "session name: demo\nwindows:\n  - name: One\n    panes:\n      - \"echo '#{pane_id}' ; ls\"\n",
        )
        .unwrap();
        assert_eq!(template.windows[0].panes[0], "echo '#{pane_id}' ; ls");
    }

    #[test]
    fn test_expand_project_root() {
        let home = Path::new("/home/alice");
        let lookup = |name: &str| (name == "CODE").then(|| "/srv/code".to_string());
        let expand = |raw: &str| expand_path(raw, home, lookup);

        assert_eq!(expand("$HOME"), PathBuf::from("/home/alice"));
        assert_eq!(expand("~"), PathBuf::from("/home/alice"));
        assert_eq!(expand("~/src/app"), PathBuf::from("/home/alice/src/app"));
        assert_eq!(expand("$CODE/app"), PathBuf::from("/srv/code/app"));
        assert_eq!(expand("${CODE}app"), PathBuf::from("/srv/codeapp"));
        assert_eq!(expand("/opt/$MISSING/x"), PathBuf::from("/opt/$MISSING/x"));
        assert_eq!(expand("/opt/${broken"), PathBuf::from("/opt/${broken"));
        assert_eq!(expand("/plain/path"), PathBuf::from("/plain/path"));
    }
}
