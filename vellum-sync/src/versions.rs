//! Version histories: the storage layer and the reconciler.
//!
//! The repository reports an object's history as memento timestamps; the OCFL
//! storage layer underneath reports it as labelled versions (`v1`, `v2`, …)
//! in the object's `inventory.json`. The two must agree position by position.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use vellum_core::VersionDescriptor;

use crate::error::SyncError;
use crate::store::{Location, ObjectStore};

/// The storage layer's view of preserved objects.
pub trait StorageLayer: Send + Sync {
    /// Labelled versions of the object at `object_path`, oldest first.
    /// Empty when the storage layer holds nothing for it.
    fn versions(&self, object_path: &str) -> Result<Vec<VersionDescriptor>, SyncError>;

    /// Logical path (relative to the object root) → origin locator, for the
    /// content of version `label`.
    fn origins(&self, object_path: &str, label: &str) -> Result<BTreeMap<String, String>, SyncError>;

    /// Locator of the object's root in the storage layer, when it has one.
    fn object_origin(&self, _object_path: &str) -> Option<String> {
        None
    }
}

// ---------------------------------------------------------------------------
// 1. Reconciler
// ---------------------------------------------------------------------------

/// Merge the repository's mementos with the storage layer's versions.
///
/// Counts must be equal and timestamps must agree at every index; the result
/// carries the repository's mementos stamped with the storage labels.
pub fn reconcile(
    object_path: &str,
    mementos: &[String],
    stored: &[VersionDescriptor],
) -> Result<Vec<VersionDescriptor>, SyncError> {
    if mementos.len() != stored.len() {
        return Err(SyncError::VersionHistoryInconsistent {
            path: object_path.to_string(),
            detail: format!(
                "repository reports {} versions, storage layer {}",
                mementos.len(),
                stored.len()
            ),
        });
    }
    let mut out = Vec::with_capacity(mementos.len());
    for (index, (memento, version)) in mementos.iter().zip(stored).enumerate() {
        if *memento != version.memento {
            return Err(SyncError::VersionHistoryInconsistent {
                path: object_path.to_string(),
                detail: format!(
                    "version {} is {} in the repository but {} in the storage layer",
                    index + 1,
                    memento,
                    version.memento
                ),
            });
        }
        out.push(VersionDescriptor {
            memento: memento.clone(),
            created: version.created,
            label: version.label.clone(),
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// 2. OCFL inventory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub id: String,
    pub digest_algorithm: String,
    pub head: String,
    #[serde(default)]
    pub content_directory: Option<String>,
    /// Content digest → content paths.
    pub manifest: HashMap<String, Vec<String>>,
    pub versions: BTreeMap<String, InventoryVersion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryVersion {
    pub created: DateTime<Utc>,
    /// Content digest → logical paths.
    pub state: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Inventory {
    /// Labelled versions ordered by creation time.
    pub fn version_descriptors(&self) -> Vec<VersionDescriptor> {
        let mut versions: Vec<VersionDescriptor> = self
            .versions
            .iter()
            .map(|(label, v)| VersionDescriptor::labelled(label.clone(), v.created))
            .collect();
        versions.sort_by_key(|v| v.created);
        versions
    }

    /// Logical path → content path for version `label`, repository metadata excluded.
    pub fn content_paths(&self, label: &str) -> Option<BTreeMap<String, String>> {
        let version = self.versions.get(label)?;
        let mut out = BTreeMap::new();
        for (digest, logical_paths) in &version.state {
            let Some(content_path) = self.manifest.get(digest).and_then(|p| p.first()) else {
                continue;
            };
            for logical in logical_paths {
                if !is_repository_metadata(logical) {
                    out.insert(logical.clone(), content_path.clone());
                }
            }
        }
        Some(out)
    }
}

/// Files the repository keeps next to content for its own bookkeeping.
pub fn is_repository_metadata(logical_path: &str) -> bool {
    logical_path.starts_with(".fcrepo/")
        || logical_path.ends_with("fcr-container.nt")
        || logical_path.ends_with("~fcr-desc.nt")
        || logical_path.ends_with("~fcr-acl.nt")
}

/// OCFL object root for a repository path: the 3×3 hashed-n-tuple layout over
/// the SHA-256 of `info:fedora/<path>`.
pub fn object_root(object_path: &str) -> String {
    let digest = hex::encode(Sha256::digest(
        format!("info:fedora/{}", object_path.trim_matches('/')).as_bytes(),
    ));
    format!("{}/{}/{}/{}", &digest[0..3], &digest[3..6], &digest[6..9], digest)
}

/// Storage layer backed by an OCFL storage root in an object store.
#[derive(Clone)]
pub struct OcflStorage {
    store: Arc<dyn ObjectStore>,
    root: Location,
}

impl OcflStorage {
    pub fn new(store: Arc<dyn ObjectStore>, root: Location) -> Self {
        Self { store, root }
    }

    fn object_location(&self, object_path: &str) -> Location {
        self.root.child(&object_root(object_path))
    }

    pub fn inventory(&self, object_path: &str) -> Result<Option<Inventory>, SyncError> {
        let location = self.object_location(object_path).child("inventory.json");
        match self.store.get(&location)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl StorageLayer for OcflStorage {
    fn versions(&self, object_path: &str) -> Result<Vec<VersionDescriptor>, SyncError> {
        Ok(self
            .inventory(object_path)?
            .map(|inv| inv.version_descriptors())
            .unwrap_or_default())
    }

    fn origins(&self, object_path: &str, label: &str) -> Result<BTreeMap<String, String>, SyncError> {
        let unknown = || SyncError::UnknownVersion {
            path: object_path.to_string(),
            selector: label.to_string(),
        };
        let inventory = self.inventory(object_path)?.ok_or_else(unknown)?;
        let paths = inventory.content_paths(label).ok_or_else(unknown)?;
        let object = self.object_location(object_path);
        Ok(paths
            .into_iter()
            .map(|(logical, content)| (logical, object.child(&content).to_string()))
            .collect())
    }

    fn object_origin(&self, object_path: &str) -> Option<String> {
        Some(self.object_location(object_path).to_string())
    }
}
