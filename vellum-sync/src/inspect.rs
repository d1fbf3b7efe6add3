//! Source inspector: staged location → [`SourceTree`].
//!
//! Lists every object under the deposit prefix, drops zero-byte directory
//! markers, reads each object's store-side checksum and infers containers
//! from the ancestors of every file path. No bytes are downloaded except the
//! optional metadata document.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use vellum_core::{media, slug, BinaryFile, ContainerDirectory, Settings, SourceTree};

use crate::checksum;
use crate::error::SyncError;
use crate::store::{Location, ObjectStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectOptions {
    /// Fail when a staged object has no checksum.
    pub require_digest: bool,
    pub enrich_from_metadata: bool,
    /// Metadata document name, relative to the deposit root.
    pub metadata_file: String,
}

impl From<&Settings> for InspectOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            require_digest: settings.require_digest,
            enrich_from_metadata: settings.enrich_from_metadata,
            metadata_file: settings.metadata_file.clone(),
        }
    }
}

impl Default for InspectOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

// ---------------------------------------------------------------------------
// Metadata document
// ---------------------------------------------------------------------------

/// Optional `vellum.json` staged alongside the content.
///
/// ```json
/// { "name": "Manuscript 101",
///   "files": { "objects/p1.jpg": { "name": "Page 1", "digest": "ab…" } },
///   "containers": { "objects": { "name": "Page images" } } }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositMetadata {
    pub name: Option<String>,
    #[serde(default)]
    pub files: BTreeMap<String, FileMetadata>,
    #[serde(default)]
    pub containers: BTreeMap<String, ContainerMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub name: Option<String>,
    /// Hex SHA-256.
    pub digest: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerMetadata {
    pub name: Option<String>,
}

/// Read and decode the metadata document, `None` when it is not staged.
pub fn read_metadata(
    store: &dyn ObjectStore,
    source: &Location,
    file_name: &str,
) -> Result<Option<DepositMetadata>, SyncError> {
    let location = source.child(file_name);
    match store.get(&location)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => {
            tracing::debug!("no metadata document at {location}");
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

/// Scan `source` into a tree whose entries are relative to `object_path`.
pub fn inspect(
    store: &dyn ObjectStore,
    source: &Location,
    object_path: &str,
    options: &InspectOptions,
) -> Result<SourceTree, SyncError> {
    let prefix = source.prefix();
    let listing = store.list_all(&source.with_key(prefix.clone()))?;
    tracing::info!("inspecting {source}: {} objects listed", listing.len());

    let mut files = Vec::new();
    for object in listing {
        if object.key.ends_with('/') && object.size == 0 {
            continue;
        }
        let Some(relative) = object.key.strip_prefix(&prefix) else {
            continue;
        };
        if relative.is_empty() {
            continue;
        }
        if !slug::well_formed_path(relative) {
            return Err(SyncError::InvalidPath {
                path: relative.to_string(),
            });
        }
        let location = source.with_key(object.key.clone());
        let digest = match store.checksum(&location)? {
            Some(b64) => Some(checksum::base64_to_hex(&b64)?),
            None => None,
        };
        let name = slug::NameAndParent::split(relative).name.to_string();
        files.push(BinaryFile {
            path: relative.to_string(),
            parent: object_path.to_string(),
            content_type: media::content_type_for(&name).to_string(),
            name,
            digest,
            origin: location.to_string(),
        });
    }

    let mut tree = SourceTree {
        containers: implied_containers(&files, object_path),
        files,
        name: None,
    };

    if options.enrich_from_metadata {
        if let Some(metadata) = read_metadata(store, source, &options.metadata_file)? {
            enrich(&mut tree, &metadata);
        }
    }

    if options.require_digest {
        if let Some(missing) = tree.files.iter().find(|f| f.digest.is_none()) {
            return Err(SyncError::MissingChecksum {
                key: source.child(&missing.path).key,
            });
        }
    }

    tracing::info!(
        "inspected {source}: {} containers, {} files",
        tree.containers.len(),
        tree.files.len()
    );
    Ok(tree)
}

/// Copy every object under `source` to the same relative key under
/// `destination`. Stores that cannot attach a checksum to an existing object
/// record one on the copy. Returns how many objects were copied.
pub fn copy_source(
    store: &dyn ObjectStore,
    source: &Location,
    destination: &Location,
) -> Result<usize, SyncError> {
    let prefix = source.prefix();
    let mut copied = 0;
    for object in store.list_all(&source.with_key(prefix.clone()))? {
        if object.key.ends_with('/') && object.size == 0 {
            continue;
        }
        let Some(relative) = object.key.strip_prefix(&prefix) else {
            continue;
        };
        store.copy(&source.with_key(object.key.clone()), &destination.child(relative))?;
        copied += 1;
    }
    tracing::info!("copied {copied} objects from {source} to {destination}");
    Ok(copied)
}

/// Every ancestor path of every file, parents first.
fn implied_containers(files: &[BinaryFile], object_path: &str) -> Vec<ContainerDirectory> {
    let mut paths = BTreeSet::new();
    for file in files {
        for ancestor in slug::ancestors(&file.path) {
            paths.insert(ancestor.to_string());
        }
    }
    let mut containers: Vec<ContainerDirectory> = paths
        .into_iter()
        .map(|path| ContainerDirectory {
            name: slug::NameAndParent::split(&path).name.to_string(),
            parent: object_path.to_string(),
            path,
        })
        .collect();
    containers.sort_by(|a, b| {
        slug::depth(&a.path)
            .cmp(&slug::depth(&b.path))
            .then_with(|| a.path.cmp(&b.path))
    });
    containers
}

/// Overlay names, digests and content types from the metadata document.
pub fn enrich(tree: &mut SourceTree, metadata: &DepositMetadata) {
    if metadata.name.is_some() {
        tree.name = metadata.name.clone();
    }
    for file in &mut tree.files {
        let Some(meta) = metadata.files.get(&file.path) else {
            continue;
        };
        if let Some(name) = &meta.name {
            file.name = name.clone();
        }
        if let Some(digest) = &meta.digest {
            file.digest = Some(digest.to_ascii_lowercase());
        }
        if let Some(content_type) = &meta.content_type {
            file.content_type = content_type.clone();
        }
    }
    for container in &mut tree.containers {
        if let Some(name) = metadata
            .containers
            .get(&container.path)
            .and_then(|m| m.name.as_ref())
        {
            container.name = name.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryObjectStore;

    fn staged() -> MemoryObjectStore {
        let store = MemoryObjectStore::new();
        store.insert("staging", "dep/mets.xml", b"<mets/>");
        store.insert("staging", "dep/objects/", b"");
        store.insert("staging", "dep/objects/p1.jpg", b"one");
        store.insert("staging", "dep/objects/alto/p1.xml", b"<alto/>");
        store.insert("staging", "other/x.txt", b"x");
        store
    }

    fn source() -> Location {
        Location::parse("s3://staging/dep/").unwrap()
    }

    #[test]
    fn copy_source_keeps_relative_keys() {
        let store = staged();
        let copied = copy_source(
            &store,
            &source(),
            &Location::parse("s3://checked/dep-copy").unwrap(),
        )
        .expect("copy");
        assert_eq!(copied, 3);
        assert_eq!(
            store.keys("checked"),
            vec!["dep-copy/mets.xml", "dep-copy/objects/alto/p1.xml", "dep-copy/objects/p1.jpg"]
        );
    }

    #[test]
    fn builds_tree_with_implied_containers() {
        let store = staged();
        let tree = inspect(&store, &source(), "col/ms", &InspectOptions::default()).expect("inspect");

        let files: Vec<_> = tree.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(files, vec!["mets.xml", "objects/alto/p1.xml", "objects/p1.jpg"]);
        let containers: Vec<_> = tree.containers.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(containers, vec!["objects", "objects/alto"]);

        let jpg = &tree.files[2];
        assert_eq!(jpg.name, "p1.jpg");
        assert_eq!(jpg.parent, "col/ms");
        assert_eq!(jpg.content_type, "image/jpeg");
        assert_eq!(jpg.origin, "s3://staging/dep/objects/p1.jpg");
        assert_eq!(jpg.digest.as_deref(), Some(checksum::sha256_hex(b"one").as_str()));
    }

    #[test]
    fn missing_checksum_fails_when_required() {
        let store = staged();
        store.forget_checksum("staging", "dep/mets.xml");
        let err = inspect(&store, &source(), "col/ms", &InspectOptions::default()).unwrap_err();
        assert!(matches!(err, SyncError::MissingChecksum { ref key } if key == "dep/mets.xml"));

        let lenient = InspectOptions {
            require_digest: false,
            ..InspectOptions::default()
        };
        let tree = inspect(&store, &source(), "col/ms", &lenient).expect("lenient");
        assert!(tree.files[0].digest.is_none());
    }

    #[test]
    fn unsafe_key_is_invalid_path() {
        let store = staged();
        store.insert("staging", "dep/bad name.txt", b"x");
        let err = inspect(&store, &source(), "col/ms", &InspectOptions::default()).unwrap_err();
        assert!(matches!(err, SyncError::InvalidPath { .. }));
    }

    #[test]
    fn metadata_document_overrides_names_and_digests() {
        let store = staged();
        store.forget_checksum("staging", "dep/mets.xml");
        store.insert(
            "staging",
            "dep/vellum.json",
            br#"{"name": "Manuscript", "files": {"mets.xml": {"digest": "ABCD", "name": "METS"}},
                 "containers": {"objects": {"name": "Page images"}}}"#,
        );
        let options = InspectOptions {
            enrich_from_metadata: true,
            ..InspectOptions::default()
        };
        let tree = inspect(&store, &source(), "col/ms", &options).expect("inspect");
        assert_eq!(tree.name.as_deref(), Some("Manuscript"));
        let mets = tree.files.iter().find(|f| f.path == "mets.xml").unwrap();
        assert_eq!(mets.digest.as_deref(), Some("abcd"));
        assert_eq!(mets.name, "METS");
        assert_eq!(tree.containers[0].name, "Page images");
    }
}
