//! Error types of the build pipeline
//!
//! Every stage of a build reports failures through [`BuildError`]. Variants that
//! carry several violations (validation, enrichment, compatibility) render all of
//! them in their `Display` output, one per line.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A single violated field in an input document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Dotted path of the field, e.g. `clients[2].cfg.filtering.max_prefix.action`
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// A mismatch between the configured policy and what the target daemon supports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// Stable identifier, usable in the ignore list
    pub id: &'static str,
    pub message: String,
}

impl Issue {
    pub fn new(id: &'static str, message: impl Into<String>) -> Self {
        Self {
            id,
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "compatibility issue ID '{}'. {}", self.id, self.message)
    }
}

/// Failures collected by one enrichment stage
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage}: {} item(s) failed{}", .failures.len(), format_list(.failures))]
pub struct EnrichError {
    pub stage: &'static str,
    pub failures: Vec<String>,
}

/// Errors returned by [`crate::ConfigBuilder`] and the components it drives
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("directory not found: {}", .0.display())]
    MissingDir(PathBuf),

    #[error("can't write into cache dir {}: {source}", .path.display())]
    CacheNotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("one or more errors occurred while loading the {document} configuration{}", format_list(.errors))]
    Validation {
        document: &'static str,
        errors: Vec<FieldError>,
    },

    #[error("one or more errors occurred while enriching the configuration{}", format_list(.0))]
    Enrichment(Vec<EnrichError>),

    #[error("one or more compatibility issues have been found{}", format_list(.0))]
    Compatibility(Vec<Issue>),

    #[error("error while rendering template: {message}")]
    Render {
        message: String,
        #[source]
        source: minijinja::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BuildError {
    pub(crate) fn validation(document: &'static str, errors: Vec<FieldError>) -> Self {
        BuildError::Validation { document, errors }
    }

    /// Ids of the issues carried by a compatibility failure
    pub fn issue_ids(&self) -> Vec<&'static str> {
        match self {
            BuildError::Compatibility(issues) => issues.iter().map(|i| i.id).collect(),
            _ => vec![],
        }
    }
}

impl From<minijinja::Error> for BuildError {
    fn from(err: minijinja::Error) -> Self {
        BuildError::Render {
            message: format!("{:#}", err),
            source: err,
        }
    }
}

fn format_list<T: fmt::Display>(items: &[T]) -> String {
    match items {
        [] => String::new(),
        [single] => format!(": {}", single),
        _ => items.iter().map(|i| format!("\n  - {}", i)).collect(),
    }
}
