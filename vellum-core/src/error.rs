//! Error types for vellum-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from configuration and job-record persistence.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse settings at {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A job record on disk could not be decoded.
    #[error("failed to parse job record at {path}: {source}")]
    JobRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization error (write/save path).
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// `dirs::home_dir()` returned `None`; cannot locate `~/.vellum/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// An environment override held a value that does not parse.
    #[error("invalid value '{value}' for setting {key}")]
    InvalidSetting { key: String, value: String },

    /// No job record exists for the identifier.
    #[error("job not found: {id}")]
    JobNotFound { id: String },
}

/// Convenience constructor for [`CoreError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
