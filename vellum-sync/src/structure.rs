//! Where a preserved object may live.
//!
//! A target is either an existing archival group, or a free path whose
//! parent is a plain container with no archival group anywhere above it.

use vellum_core::{slug, ResourceKind};

use crate::error::SyncError;
use crate::repository::{Repository, RequestOptions};

/// What the repository holds at a valid target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Existing,
    New,
}

pub fn check_target(
    repo: &dyn Repository,
    object_path: &str,
    options: &RequestOptions,
) -> Result<Target, SyncError> {
    if !slug::well_formed_path(object_path) {
        return Err(SyncError::InvalidPath {
            path: object_path.to_string(),
        });
    }
    match repo.kind_of(object_path, options)? {
        Some(ResourceKind::ArchivalGroup) => return Ok(Target::Existing),
        Some(other) => {
            return Err(SyncError::WrongResourceKind {
                path: object_path.to_string(),
                expected: ResourceKind::ArchivalGroup.to_string(),
                actual: other.to_string(),
            })
        }
        None => {}
    }

    let parent = slug::NameAndParent::split(object_path).parent.unwrap_or("");
    if parent.is_empty() {
        return Ok(Target::New);
    }
    let structural = |kind: Option<ResourceKind>| match kind {
        None => Err(SyncError::NoParent {
            path: object_path.to_string(),
            parent: parent.to_string(),
        }),
        Some(ResourceKind::ArchivalGroup) => Err(SyncError::ParentIsArchivalGroup {
            path: object_path.to_string(),
            parent: parent.to_string(),
        }),
        Some(ResourceKind::Binary) => Err(SyncError::ParentNotContainer {
            path: object_path.to_string(),
            parent: parent.to_string(),
        }),
        Some(ResourceKind::Container) => Ok(()),
    };
    structural(repo.kind_of(parent, options)?)?;

    for ancestor in slug::ancestors(parent) {
        if repo.kind_of(ancestor, options)? == Some(ResourceKind::ArchivalGroup) {
            return Err(SyncError::ParentInsideArchivalGroup {
                path: object_path.to_string(),
                ancestor: ancestor.to_string(),
            });
        }
    }
    Ok(Target::New)
}
