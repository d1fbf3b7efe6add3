//! Vellum core library: domain types, changeset model, settings, job records.
//!
//! - [`types`]: preserved objects, containers, binaries, versions
//! - [`changeset`]: the diff / import-job exchange model
//! - [`slug`]: slug-safe path helpers
//! - [`config`]: [`Settings`] load with environment overrides
//! - [`jobs`]: file-backed [`JobRecord`] store
//! - [`error`]: [`CoreError`]

use std::path::PathBuf;

pub mod changeset;
pub mod config;
pub mod error;
pub mod jobs;
pub mod media;
pub mod slug;
pub mod types;

pub use changeset::{
    BinaryFile, Changeset, ContainerDirectory, JobError, JobStatus, SourceTree, StorageKind,
};
pub use config::Settings;
pub use error::CoreError;
pub use jobs::JobRecord;
pub use types::{Binary, Container, JobId, PreservedObject, ResourceKind, VersionDescriptor};

/// The user's home directory, the root of `~/.vellum/`.
pub fn home() -> Result<PathBuf, CoreError> {
    dirs::home_dir().ok_or(CoreError::HomeNotFound)
}
