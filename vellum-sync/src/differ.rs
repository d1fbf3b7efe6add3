//! Source tree vs. preserved object → changeset operations.
//!
//! Matching is by exact relative path. A file present on both sides is
//! patched when the digests differ; a missing digest on either side is an
//! error, never a guess.

use std::collections::{BTreeMap, BTreeSet};

use vellum_core::{
    media, slug, BinaryFile, Changeset, ContainerDirectory, PreservedObject, SourceTree,
};

use crate::checksum;
use crate::error::SyncError;

/// Fill the five pending-operation lists of `changeset`.
///
/// With no `existing` object every source entry is an addition. Any lists
/// already on the changeset are replaced.
pub fn diff_into(
    changeset: &mut Changeset,
    source: &SourceTree,
    existing: Option<&PreservedObject>,
) -> Result<(), SyncError> {
    let object_path = changeset.object_path.clone();
    let Some(existing) = existing else {
        changeset.containers_to_add = source.containers.clone();
        changeset.files_to_add = source.files.clone();
        changeset.containers_to_delete.clear();
        changeset.files_to_delete.clear();
        changeset.files_to_patch.clear();
        sort_operations(changeset);
        return Ok(());
    };

    let existing_containers = existing_containers(existing, &object_path);
    let existing_files = existing_files(existing, &object_path);
    let source_containers: BTreeSet<&str> =
        source.containers.iter().map(|c| c.path.as_str()).collect();
    let source_files: BTreeMap<&str, &BinaryFile> =
        source.files.iter().map(|f| (f.path.as_str(), f)).collect();

    changeset.containers_to_add = source
        .containers
        .iter()
        .filter(|c| !existing_containers.contains_key(c.path.as_str()))
        .cloned()
        .collect();
    changeset.containers_to_delete = existing_containers
        .values()
        .filter(|c| !source_containers.contains(c.path.as_str()))
        .cloned()
        .collect();

    changeset.files_to_add.clear();
    changeset.files_to_patch.clear();
    for file in &source.files {
        match existing_files.get(file.path.as_str()) {
            None => changeset.files_to_add.push(file.clone()),
            Some(current) => {
                if differs(file, current)? {
                    changeset.files_to_patch.push(file.clone());
                }
            }
        }
    }
    changeset.files_to_delete = existing_files
        .values()
        .filter(|f| !source_files.contains_key(f.path.as_str()))
        .cloned()
        .collect();

    sort_operations(changeset);
    tracing::info!(
        "diffed {object_path}: +{} -{} ~{} files, +{} -{} containers",
        changeset.files_to_add.len(),
        changeset.files_to_delete.len(),
        changeset.files_to_patch.len(),
        changeset.containers_to_add.len(),
        changeset.containers_to_delete.len()
    );
    Ok(())
}

fn differs(source: &BinaryFile, existing: &BinaryFile) -> Result<bool, SyncError> {
    let missing = |side| SyncError::MissingDigestInDiff {
        path: source.path.clone(),
        side,
    };
    let ours = source.digest.as_deref().ok_or_else(|| missing("source"))?;
    let theirs = existing.digest.as_deref().ok_or_else(|| missing("repository"))?;
    Ok(!checksum::digests_equal(ours, theirs))
}

/// Existing containers keyed by relative path.
pub fn existing_containers(
    object: &PreservedObject,
    object_path: &str,
) -> BTreeMap<String, ContainerDirectory> {
    object
        .root
        .all_containers()
        .into_iter()
        .map(|c| {
            let slug = slug::NameAndParent::split(&c.path).name;
            (
                c.path.clone(),
                ContainerDirectory {
                    path: c.path.clone(),
                    parent: object_path.to_string(),
                    name: c.name.clone().unwrap_or_else(|| slug.to_string()),
                },
            )
        })
        .collect()
}

/// Existing binaries keyed by relative path, as changeset entries.
pub fn existing_files(object: &PreservedObject, object_path: &str) -> BTreeMap<String, BinaryFile> {
    object
        .root
        .all_binaries()
        .into_iter()
        .map(|b| {
            let slug = slug::NameAndParent::split(&b.path).name;
            (
                b.path.clone(),
                BinaryFile {
                    path: b.path.clone(),
                    parent: object_path.to_string(),
                    name: b.name.clone().unwrap_or_else(|| slug.to_string()),
                    content_type: b
                        .content_type
                        .clone()
                        .unwrap_or_else(|| media::OCTET_STREAM.to_string()),
                    digest: b.digest.clone(),
                    origin: b.origin.clone().unwrap_or_else(|| b.location.clone()),
                },
            )
        })
        .collect()
}

/// Containers to add shallowest first, containers to delete deepest first,
/// files by path.
pub fn sort_operations(changeset: &mut Changeset) {
    changeset.containers_to_add.sort_by(|a, b| {
        slug::depth(&a.path)
            .cmp(&slug::depth(&b.path))
            .then_with(|| a.path.cmp(&b.path))
    });
    changeset.containers_to_delete.sort_by(|a, b| {
        slug::depth(&b.path)
            .cmp(&slug::depth(&a.path))
            .then_with(|| a.path.cmp(&b.path))
    });
    changeset.files_to_add.sort_by(|a, b| a.path.cmp(&b.path));
    changeset.files_to_patch.sort_by(|a, b| a.path.cmp(&b.path));
    changeset.files_to_delete.sort_by(|a, b| a.path.cmp(&b.path));
}
