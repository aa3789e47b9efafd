//! Domain error taxonomy.
//!
//! Failures that reach a caller of the command surface are one of these
//! variants. Batch operations (plugin install, toggle-all) do not use an error
//! variant for partial failure: they return a report with an `errors` list.

use std::path::Path;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required field is missing or a value is out of range.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown job id, missing plugin directory, ...
    #[error("not found: {0}")]
    NotFound(String),

    /// A rename target already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Database(String),

    #[error("archive error: {0}")]
    Archive(String),
}

impl Error {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Shorthand for the common "failed to <verb> <path>" I/O error.
    pub fn io_at(action: &str, path: &Path, source: std::io::Error) -> Self {
        Self::io(format!("Failed to {} {}", action, path.display()), source)
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(source) => Self::io("Archive I/O failed", source),
            other => Self::Archive(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::io(
            "Background task failed",
            std::io::Error::other(e.to_string()),
        )
    }
}
