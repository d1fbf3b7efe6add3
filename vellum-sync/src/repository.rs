//! The repository protocol seam.
//!
//! [`Repository`] is the set of verbs the engine needs from a Fedora-style
//! RDF repository. Per-call variations (transaction scope, slug, digest,
//! tombstone overwrite, …) travel in an immutable [`RequestOptions`] built
//! once per call. Paths are repository paths relative to the REST root; the
//! repository root itself is the empty path.

use chrono::{DateTime, Utc};
use serde_json::Value;

use vellum_core::ResourceKind;

use crate::error::SyncError;
use crate::graph;

// ---------------------------------------------------------------------------
// 1. Request options
// ---------------------------------------------------------------------------

/// Options shared by every repository call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Transaction location; sent as the atomic-id header on every call in scope.
    pub transaction: Option<String>,
    /// Desired last path segment for a created resource.
    pub slug: Option<String>,
    /// `dc:title` for a created container.
    pub title: Option<String>,
    /// Create the container as an archival group.
    pub archival_group: bool,
    /// Hex SHA-256 sent with a binary put.
    pub digest: Option<String>,
    pub content_type: Option<String>,
    /// Original file name, sent as a content-disposition hint.
    pub file_name: Option<String>,
    /// Ask for the descriptions of contained resources.
    pub contained_descriptions: bool,
    /// Replace a tombstone left by an earlier delete.
    pub overwrite_tombstone: bool,
    /// Read the resource as it was at this memento.
    pub memento: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_transaction(mut self, location: Option<&str>) -> Self {
        self.transaction = location.map(str::to_string);
        self
    }

    pub fn slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn archival_group(mut self) -> Self {
        self.archival_group = true;
        self
    }

    pub fn digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn contained_descriptions(mut self) -> Self {
        self.contained_descriptions = true;
        self
    }

    pub fn overwrite_tombstone(mut self) -> Self {
        self.overwrite_tombstone = true;
        self
    }

    pub fn at_memento(mut self, memento: Option<&str>) -> Self {
        self.memento = memento.map(str::to_string);
        self
    }
}

// ---------------------------------------------------------------------------
// 2. Replies
// ---------------------------------------------------------------------------

/// Outcome of a binary put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// The path holds a tombstone; retry with [`RequestOptions::overwrite_tombstone`].
    Tombstoned,
}

/// A freshly begun transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionHandle {
    pub location: String,
    /// `None` when the repository did not advertise an expiry.
    pub expires: Option<DateTime<Utc>>,
}

/// The repository's answer to a call on a transaction resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionReply {
    Ok { expires: Option<DateTime<Utc>> },
    Conflict,
    Gone,
    NotFound,
}

// ---------------------------------------------------------------------------
// 3. The trait
// ---------------------------------------------------------------------------

pub trait Repository: Send + Sync {
    /// Absolute URI of the REST root; graph node ids start with it.
    fn base_uri(&self) -> &str;

    /// The advertised kind of `path`, `None` when nothing is there.
    fn kind_of(&self, path: &str, options: &RequestOptions)
        -> Result<Option<ResourceKind>, SyncError>;

    /// JSON-LD description of `path`, `None` when nothing is there.
    fn describe(&self, path: &str, options: &RequestOptions) -> Result<Option<Value>, SyncError>;

    /// Create a container below `parent`; returns the new resource's path.
    fn create_container(&self, parent: &str, options: &RequestOptions)
        -> Result<String, SyncError>;

    /// Create or replace the binary at `path`.
    fn put_binary(
        &self,
        path: &str,
        content: &[u8],
        options: &RequestOptions,
    ) -> Result<PutOutcome, SyncError>;

    /// JSON-LD description of the binary at `path` (its metadata, not its bytes).
    fn describe_binary(&self, path: &str, options: &RequestOptions)
        -> Result<Option<Value>, SyncError>;

    fn delete(&self, path: &str, options: &RequestOptions) -> Result<(), SyncError>;

    /// Memento timestamps of `path`, oldest first.
    fn mementos(&self, path: &str) -> Result<Vec<String>, SyncError>;

    fn begin_transaction(&self) -> Result<TransactionHandle, SyncError>;
    fn renew_transaction(&self, location: &str) -> Result<TransactionReply, SyncError>;
    fn commit_transaction(&self, location: &str) -> Result<TransactionReply, SyncError>;
    fn rollback_transaction(&self, location: &str) -> Result<TransactionReply, SyncError>;

    /// The digest the repository recorded for the binary at `path`.
    fn binary_digest(&self, path: &str, options: &RequestOptions) -> Result<Option<String>, SyncError> {
        let Some(body) = self.describe_binary(path, options)? else {
            return Ok(None);
        };
        let nodes = graph::parse_graph(&body, &self.uri_for(path))?;
        Ok(nodes.into_iter().next().and_then(|n| n.digest))
    }

    /// Absolute URI of a repository path.
    fn uri_for(&self, path: &str) -> String {
        let base = self.base_uri().trim_end_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{}", path.trim_start_matches('/'))
        }
    }

    /// Repository path of an absolute URI, `None` when it lies elsewhere.
    fn path_of(&self, uri: &str) -> Option<String> {
        let base = self.base_uri().trim_end_matches('/');
        let rest = uri.strip_prefix(base)?;
        if !(rest.is_empty() || rest.starts_with('/')) {
            return None;
        }
        Some(rest.trim_matches('/').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_only_requested_options() {
        let opts = RequestOptions::new()
            .in_transaction(Some("http://r/rest/fcr:tx/1"))
            .slug("objects")
            .title("Objects");
        assert_eq!(opts.transaction.as_deref(), Some("http://r/rest/fcr:tx/1"));
        assert_eq!(opts.slug.as_deref(), Some("objects"));
        assert!(!opts.archival_group);
        assert!(opts.digest.is_none());
        assert_eq!(RequestOptions::new().in_transaction(None), RequestOptions::default());
    }
}
