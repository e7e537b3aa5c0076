// ABOUTME: Core data models for tenper projects - templates, windows and virtualenv settings

/// Project templates.
pub mod template;

pub use template::{
    default_document, Layout, ProjectTemplate, TemplateError, VirtualenvSpec, WindowSpec,
};
