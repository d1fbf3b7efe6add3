//! Error types for vellum-sync.

use std::path::PathBuf;

use thiserror::Error;

use vellum_core::error::CoreError;

/// All errors that can arise from inspecting, diffing and executing changesets.
#[derive(Debug, Error)]
pub enum SyncError {
    // -- validation ---------------------------------------------------------
    #[error("invalid path '{path}': every segment must survive URL encoding unchanged")]
    InvalidPath { path: String },

    #[error("no SHA-256 checksum recorded for staged object {key}")]
    MissingChecksum { key: String },

    #[error("a new preserved object at {path} needs a display name")]
    MissingName { path: String },

    #[error("binary {path} has no digest")]
    MissingDigest { path: String },

    #[error("changeset for {path} is marked as an update but no preserved object exists there")]
    UpdateNotPermitted { path: String },

    #[error("no version '{selector}' in the history of {path}")]
    UnknownVersion { path: String, selector: String },

    #[error("invalid location '{location}': {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error("checksum '{value}' is not a valid SHA-256 encoding")]
    InvalidChecksum { value: String },

    #[error("staged object {origin} could not be read")]
    SourceObjectMissing { origin: String },

    #[error("no preserved object at {path}")]
    ObjectNotFound { path: String },

    // -- structural ---------------------------------------------------------
    #[error("cannot create {path}: parent {parent} does not exist")]
    NoParent { path: String, parent: String },

    #[error("cannot create {path}: parent {parent} is itself a preserved object")]
    ParentIsArchivalGroup { path: String, parent: String },

    #[error("cannot create {path}: {ancestor} above it is a preserved object")]
    ParentInsideArchivalGroup { path: String, ancestor: String },

    #[error("cannot create {path}: parent {parent} is not a container")]
    ParentNotContainer { path: String, parent: String },

    #[error("a resource already exists at {path}")]
    AlreadyExists { path: String },

    // -- integrity ----------------------------------------------------------
    #[error("{path} is a {actual}, expected a {expected}")]
    WrongResourceKind {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("version histories disagree for {path}: {detail}")]
    VersionHistoryInconsistent { path: String, detail: String },

    #[error("digest mismatch for {path}: expected {expected}, repository reports {actual}")]
    DigestMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("cannot compare {path}: digest missing on the {side} side")]
    MissingDigestInDiff { path: String, side: &'static str },

    #[error("tree below {path} is deeper than {limit} levels")]
    TreeTooDeep { path: String, limit: usize },

    #[error("malformed repository graph for {path}: {reason}")]
    MalformedGraph { path: String, reason: String },

    // -- transactional ------------------------------------------------------
    #[error("transaction {location} has expired")]
    TransactionExpired { location: String },

    #[error("transaction {location} could not commit: conflicting change")]
    CommitConflict { location: String },

    #[error("transaction {location} is unknown to the repository")]
    TransactionNotFound { location: String },

    #[error("no active transaction")]
    TransactionNotActive,

    #[error("{path} changed since the diff: diffed against {expected}, HEAD is now {actual}")]
    StaleDiff {
        path: String,
        expected: String,
        actual: String,
    },

    // -- transport ----------------------------------------------------------
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected HTTP {status} from {method} {url}")]
    Http {
        method: &'static str,
        url: String,
        status: u16,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl SyncError {
    /// The error-taxonomy bucket recorded on a failed job.
    pub fn category(&self) -> &'static str {
        use SyncError::*;
        match self {
            InvalidPath { .. }
            | MissingChecksum { .. }
            | MissingName { .. }
            | MissingDigest { .. }
            | UpdateNotPermitted { .. }
            | UnknownVersion { .. }
            | InvalidLocation { .. }
            | InvalidChecksum { .. }
            | SourceObjectMissing { .. }
            | ObjectNotFound { .. } => "validation",
            NoParent { .. }
            | ParentIsArchivalGroup { .. }
            | ParentInsideArchivalGroup { .. }
            | ParentNotContainer { .. }
            | AlreadyExists { .. } => "structural",
            WrongResourceKind { .. }
            | VersionHistoryInconsistent { .. }
            | DigestMismatch { .. }
            | MissingDigestInDiff { .. }
            | TreeTooDeep { .. }
            | MalformedGraph { .. } => "integrity",
            TransactionExpired { .. }
            | CommitConflict { .. }
            | TransactionNotFound { .. }
            | TransactionNotActive
            | StaleDiff { .. } => "transaction",
            Transport(_) | Http { .. } | Io { .. } | Json(_) | Core(_) => "transport",
        }
    }

    /// The structured form stored in a job's error list.
    pub fn to_job_error(&self) -> vellum_core::JobError {
        vellum_core::JobError {
            category: self.category().to_string(),
            message: self.to_string(),
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_taxonomy() {
        assert_eq!(SyncError::InvalidPath { path: "a b".into() }.category(), "validation");
        assert_eq!(
            SyncError::NoParent {
                path: "a/b".into(),
                parent: "a".into()
            }
            .category(),
            "structural"
        );
        assert_eq!(
            SyncError::VersionHistoryInconsistent {
                path: "obj".into(),
                detail: "2 vs 3".into()
            }
            .category(),
            "integrity"
        );
        assert_eq!(SyncError::TransactionNotActive.category(), "transaction");
        assert_eq!(SyncError::Transport("refused".into()).category(), "transport");
    }

    #[test]
    fn job_error_carries_message() {
        let err = SyncError::MissingName { path: "col/new".into() };
        let job = err.to_job_error();
        assert_eq!(job.category, "validation");
        assert!(job.message.contains("col/new"));
    }
}
