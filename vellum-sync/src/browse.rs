//! Direct access to repository resources outside any preserved object.
//!
//! Browsing describes whatever lives at a path, and plain containers can be
//! created above the archival groups so that new objects have a parent.

use serde::Serialize;

use vellum_core::{slug, ResourceKind};

use crate::error::SyncError;
use crate::graph;
use crate::repository::{Repository, RequestOptions};
use crate::structure::{self, Target};

/// One resource and the paths of its direct children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceView {
    /// Repository path; empty for the root.
    pub path: String,
    pub kind: Option<ResourceKind>,
    pub title: Option<String>,
    pub children: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Describe the resource at `path`, `None` when nothing is there.
pub fn browse(repo: &dyn Repository, path: &str) -> Result<Option<ResourceView>, SyncError> {
    let path = path.trim_matches('/');
    let options = RequestOptions::new();
    let body = match repo.kind_of(path, &options)? {
        None => return Ok(None),
        Some(ResourceKind::Binary) => repo.describe_binary(path, &options)?,
        Some(_) => repo.describe(path, &options)?,
    };
    let Some(body) = body else {
        return Ok(None);
    };
    let uri = repo.uri_for(path);
    let node = graph::parse_graph(&body, &uri)?
        .into_iter()
        .next()
        .ok_or_else(|| SyncError::MalformedGraph {
            path: path.to_string(),
            reason: "empty description".into(),
        })?;
    let mut children: Vec<String> = node
        .contains
        .iter()
        .filter_map(|child| repo.path_of(child))
        .collect();
    children.sort();
    Ok(Some(ResourceView {
        path: path.to_string(),
        kind: node.kind,
        title: node.title,
        children,
        digest: node.digest,
        size: node.size,
    }))
}

/// Create a plain container at `path`, outside any transaction.
///
/// The parent must be the root or a plain container with no archival group
/// above it, and nothing may exist at `path` yet.
pub fn create_container(
    repo: &dyn Repository,
    path: &str,
    name: Option<&str>,
) -> Result<String, SyncError> {
    let path = path.trim_matches('/');
    let options = RequestOptions::new();
    if slug::well_formed_path(path) && repo.kind_of(path, &options)?.is_some() {
        return Err(SyncError::AlreadyExists {
            path: path.to_string(),
        });
    }
    match structure::check_target(repo, path, &options)? {
        Target::New => {}
        Target::Existing => {
            return Err(SyncError::AlreadyExists {
                path: path.to_string(),
            })
        }
    }
    let split = slug::NameAndParent::split(path);
    let created = repo.create_container(
        split.parent.unwrap_or(""),
        &options
            .clone()
            .slug(split.name)
            .title(name.unwrap_or(split.name)),
    )?;
    tracing::info!("created container {created}");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRepository;

    fn repo() -> MemoryRepository {
        let repo = MemoryRepository::new();
        let opts = RequestOptions::new();
        repo.create_container("", &opts.clone().slug("col").title("Collection"))
            .unwrap();
        repo.create_container("col", &opts.clone().slug("ms").archival_group())
            .unwrap();
        repo.put_binary("col/ms/f.txt", b"hello", &opts).unwrap();
        repo
    }

    #[test]
    fn browse_describes_containers_and_binaries() {
        let repo = repo();
        let col = browse(&repo, "col").unwrap().expect("col");
        assert_eq!(col.kind, Some(ResourceKind::Container));
        assert_eq!(col.title.as_deref(), Some("Collection"));
        assert_eq!(col.children, vec!["col/ms"]);

        let file = browse(&repo, "/col/ms/f.txt/").unwrap().expect("file");
        assert_eq!(file.kind, Some(ResourceKind::Binary));
        assert_eq!(file.size, Some(5));
        assert_eq!(
            file.digest.as_deref(),
            Some(crate::checksum::sha256_hex(b"hello").as_str())
        );
        assert!(browse(&repo, "col/nothing").unwrap().is_none());
    }

    #[test]
    fn containers_are_created_only_outside_archival_groups() {
        let repo = repo();
        let created = create_container(&repo, "col/sub", Some("Sub collection")).unwrap();
        assert_eq!(created, "col/sub");
        assert_eq!(
            browse(&repo, "col/sub").unwrap().and_then(|v| v.title).as_deref(),
            Some("Sub collection")
        );

        assert!(matches!(
            create_container(&repo, "col/sub", None),
            Err(SyncError::AlreadyExists { .. })
        ));
        assert!(matches!(
            create_container(&repo, "col/ms/inner", None),
            Err(SyncError::ParentIsArchivalGroup { .. })
        ));
        assert!(matches!(
            create_container(&repo, "col/missing/deeper", None),
            Err(SyncError::NoParent { .. })
        ));
        assert!(matches!(
            create_container(&repo, "col/bad name", None),
            Err(SyncError::InvalidPath { .. })
        ));
    }
}
