// ABOUTME: Template store - one YAML file per project in the templates directory
// Writes go through a temp file and a rename, so readers never see a half-written template

use crate::models::{ProjectTemplate, TemplateError};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

/// Extension of stored template files.
pub const TEMPLATE_EXTENSION: &str = "yml";

/// Failures reading or writing stored templates.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No template file exists for the project.
    #[error("No project named '{name}' (checked {})", path.display())]
    NotFound {
        /// The requested project.
        name: String,
        /// Where its template would be.
        path: PathBuf,
    },
    /// The project name cannot be used as a file name.
    #[error("Invalid project name '{0}': must be non-empty, not start with '.', and not contain path separators")]
    InvalidName(String),
    /// The stored file does not validate.
    #[error("Invalid template {}", path.display())]
    Template {
        /// The template file.
        path: PathBuf,
        /// What failed validation.
        #[source]
        source: TemplateError,
    },
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

impl StoreError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The templates directory.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    /// A store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Template file for `name`, after checking the name is usable.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(format!("{name}.{TEMPLATE_EXTENSION}")))
    }

    /// Stored project names, sorted. A missing templates directory holds no projects.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(StoreError::io(&self.dir))? {
            let path = entry.map_err(StoreError::io(&self.dir))?.path();
            if !path.is_file()
                || path.extension().and_then(|s| s.to_str()) != Some(TEMPLATE_EXTENSION)
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                // Dot-files are in-progress edit drafts.
                if !stem.starts_with('.') {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// A template is stored for `name`.
    pub fn exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.path_for(name)?.is_file())
    }

    /// Raw template text, unvalidated.
    pub fn read(&self, name: &str) -> Result<String, StoreError> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Err(StoreError::NotFound {
                name: name.to_string(),
                path,
            });
        }
        fs::read_to_string(&path).map_err(StoreError::io(&path))
    }

    /// Read and validate the template for `name`.
    pub fn load(&self, name: &str) -> Result<ProjectTemplate, StoreError> {
        let text = self.read(name)?;
        let path = self.path_for(name)?;
        debug!("Loading template {}", path.display());
        ProjectTemplate::from_yaml(&text).map_err(|source| StoreError::Template { path, source })
    }

    /// Replace the stored template for `name` with `contents`.
    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf, StoreError> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.dir).map_err(StoreError::io(&self.dir))?;

        let mut file = NamedTempFile::new_in(&self.dir).map_err(StoreError::io(&self.dir))?;
        file.write_all(contents.as_bytes())
            .map_err(StoreError::io(file.path()))?;
        file.persist(&path)
            .map_err(|e| StoreError::Io {
                path: path.clone(),
                source: e.error,
            })?;

        info!("Saved template {}", path.display());
        Ok(path)
    }

    /// A scratch copy to edit; removed when dropped.
    pub fn draft(&self, name: &str, contents: &str) -> Result<NamedTempFile, StoreError> {
        self.path_for(name)?;
        fs::create_dir_all(&self.dir).map_err(StoreError::io(&self.dir))?;

        let mut draft = tempfile::Builder::new()
            .prefix(&format!(".{name}."))
            .suffix(&format!(".{TEMPLATE_EXTENSION}"))
            .tempfile_in(&self.dir)
            .map_err(StoreError::io(&self.dir))?;
        draft
            .write_all(contents.as_bytes())
            .map_err(StoreError::io(draft.path()))?;
        draft.flush().map_err(StoreError::io(draft.path()))?;
        Ok(draft)
    }

    /// Delete the template for `name` and return the removed path.
    pub fn remove(&self, name: &str) -> Result<PathBuf, StoreError> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Err(StoreError::NotFound {
                name: name.to_string(),
                path,
            });
        }
        fs::remove_file(&path).map_err(StoreError::io(&path))?;
        info!("Removed template {}", path.display());
        Ok(path)
    }
}
