//! Tree loader: repository graph → [`PreservedObject`].
//!
//! Loading is two passes. The first indexes every node the repository
//! returns by id; the second walks `contains` references from the root and
//! materializes [`Container`]s and [`Binary`]s. A referenced node missing
//! from the index is fetched on demand, so servers that only describe direct
//! children still yield the full tree.

use std::collections::{HashMap, HashSet};

use vellum_core::{Binary, Container, PreservedObject, ResourceKind, VersionDescriptor};

use crate::error::SyncError;
use crate::graph::{self, GraphNode};
use crate::repository::{Repository, RequestOptions};
use crate::versions::{self, StorageLayer};

pub struct TreeLoader<'a> {
    repo: &'a dyn Repository,
    storage: &'a dyn StorageLayer,
    max_depth: usize,
}

impl<'a> TreeLoader<'a> {
    pub fn new(repo: &'a dyn Repository, storage: &'a dyn StorageLayer, max_depth: usize) -> Self {
        Self {
            repo,
            storage,
            max_depth,
        }
    }

    /// The reconciled version history of the object at `path`, oldest first.
    pub fn history(&self, path: &str) -> Result<Vec<VersionDescriptor>, SyncError> {
        let mementos = self.repo.mementos(path)?;
        let stored = self.storage.versions(path)?;
        versions::reconcile(path, &mementos, &stored)
    }

    pub fn head_version(&self, path: &str) -> Result<Option<VersionDescriptor>, SyncError> {
        Ok(self.history(path)?.pop())
    }

    /// Load the preserved object at `path`, at HEAD or at `version` (a
    /// storage label or a memento). `None` when nothing exists at `path`.
    pub fn load(
        &self,
        path: &str,
        version: Option<&str>,
    ) -> Result<Option<PreservedObject>, SyncError> {
        let Some(kind) = self.repo.kind_of(path, &RequestOptions::new())? else {
            return Ok(None);
        };
        if kind != ResourceKind::ArchivalGroup {
            return Err(SyncError::WrongResourceKind {
                path: path.to_string(),
                expected: ResourceKind::ArchivalGroup.to_string(),
                actual: kind.to_string(),
            });
        }

        let history = self.history(path)?;
        let selected = match version {
            None => history.last().cloned(),
            Some(selector) => Some(
                history
                    .iter()
                    .find(|v| v.matches(selector))
                    .cloned()
                    .ok_or_else(|| SyncError::UnknownVersion {
                        path: path.to_string(),
                        selector: selector.to_string(),
                    })?,
            ),
        };
        let at_head = match (&selected, history.last()) {
            (Some(s), Some(h)) => s.memento == h.memento,
            _ => true,
        };
        let memento = if at_head {
            None
        } else {
            selected.as_ref().map(|v| v.memento.clone())
        };

        let mut builder = GraphBuilder {
            repo: self.repo,
            object_path: path.trim_matches('/'),
            max_depth: self.max_depth,
            options: RequestOptions::new()
                .contained_descriptions()
                .at_memento(memento.as_deref()),
            nodes: HashMap::new(),
            expanded: HashSet::new(),
        };
        let mut root = builder.build()?;

        if let Some(label) = selected.as_ref().and_then(|v| v.label.as_deref()) {
            let origins = self.storage.origins(path, label)?;
            root.for_each_binary_mut(&mut |b| b.origin = origins.get(&b.path).cloned());
        }

        tracing::debug!(
            "loaded {path} at {}: {} containers, {} binaries",
            selected.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "HEAD".into()),
            root.all_containers().len(),
            root.all_binaries().len()
        );
        Ok(Some(PreservedObject {
            path: path.trim_matches('/').to_string(),
            name: root.name.clone(),
            version: selected,
            versions: history,
            origin: self.storage.object_origin(path),
            root,
        }))
    }
}

// ---------------------------------------------------------------------------
// Two-pass builder
// ---------------------------------------------------------------------------

struct GraphBuilder<'r> {
    repo: &'r dyn Repository,
    object_path: &'r str,
    max_depth: usize,
    options: RequestOptions,
    /// Pass one: every node seen so far, by id.
    nodes: HashMap<String, GraphNode>,
    /// Ids whose own description (with contained nodes) has been fetched.
    expanded: HashSet<String>,
}

impl GraphBuilder<'_> {
    fn build(&mut self) -> Result<Container, SyncError> {
        let root_uri = self.repo.uri_for(self.object_path);
        self.expand(&root_uri, self.object_path)?;
        let root = self.node(&root_uri, self.object_path)?;
        self.container(&root, String::new(), self.object_path.to_string(), 0)
    }

    /// Fetch `path` with its contained descriptions and index every node.
    fn expand(&mut self, uri: &str, path: &str) -> Result<(), SyncError> {
        let body = self
            .repo
            .describe(path, &self.options)?
            .ok_or_else(|| SyncError::MalformedGraph {
                path: path.to_string(),
                reason: "resource disappeared while loading".into(),
            })?;
        for node in graph::parse_graph(&body, uri)? {
            self.nodes.insert(node.id.clone(), node);
        }
        self.expanded.insert(uri.to_string());
        Ok(())
    }

    fn node(&self, uri: &str, path: &str) -> Result<GraphNode, SyncError> {
        self.nodes
            .get(uri)
            .cloned()
            .ok_or_else(|| SyncError::MalformedGraph {
                path: path.to_string(),
                reason: format!("no description for {uri}"),
            })
    }

    /// Repository path and object-relative path of a child id.
    fn paths_of(&self, uri: &str) -> Result<(String, String), SyncError> {
        let location = self.repo.path_of(uri).ok_or_else(|| SyncError::MalformedGraph {
            path: self.object_path.to_string(),
            reason: format!("{uri} is outside the repository"),
        })?;
        let relative = location
            .strip_prefix(self.object_path)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| SyncError::MalformedGraph {
                path: self.object_path.to_string(),
                reason: format!("{uri} is outside the preserved object"),
            })?
            .to_string();
        Ok((location, relative))
    }

    fn container(
        &mut self,
        node: &GraphNode,
        relative: String,
        location: String,
        depth: usize,
    ) -> Result<Container, SyncError> {
        if depth > self.max_depth {
            return Err(SyncError::TreeTooDeep {
                path: self.object_path.to_string(),
                limit: self.max_depth,
            });
        }
        let mut container = Container {
            path: relative,
            location,
            name: node.title.clone(),
            containers: vec![],
            binaries: vec![],
        };
        for child_uri in &node.contains {
            let (child_location, child_relative) = self.paths_of(child_uri)?;
            let child = self.child_node(child_uri, &child_location)?;
            match self.kind_of(&child, &child_location)? {
                ResourceKind::Binary => {
                    container.binaries.push(binary(&child, child_relative, child_location));
                }
                ResourceKind::Container => {
                    let child = if self.expanded.contains(child_uri) {
                        child
                    } else {
                        self.expand(child_uri, &child_location)?;
                        self.node(child_uri, &child_location)?
                    };
                    container.containers.push(self.container(
                        &child,
                        child_relative,
                        child_location,
                        depth + 1,
                    )?);
                }
                ResourceKind::ArchivalGroup => {
                    return Err(SyncError::WrongResourceKind {
                        path: child_location,
                        expected: ResourceKind::Container.to_string(),
                        actual: ResourceKind::ArchivalGroup.to_string(),
                    });
                }
            }
        }
        container.containers.sort_by(|a, b| a.path.cmp(&b.path));
        container.binaries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(container)
    }

    /// The indexed node for a child, fetching it when the graph left it out.
    fn child_node(&mut self, uri: &str, location: &str) -> Result<GraphNode, SyncError> {
        if let Some(node) = self.nodes.get(uri) {
            return Ok(node.clone());
        }
        match self.repo.kind_of(location, &self.options)? {
            Some(ResourceKind::Binary) => {
                let body = self
                    .repo
                    .describe_binary(location, &self.options)?
                    .ok_or_else(|| SyncError::MalformedGraph {
                        path: location.to_string(),
                        reason: "binary disappeared while loading".into(),
                    })?;
                for node in graph::parse_graph(&body, uri)? {
                    self.nodes.insert(node.id.clone(), node);
                }
            }
            Some(_) => self.expand(uri, location)?,
            None => {
                return Err(SyncError::MalformedGraph {
                    path: location.to_string(),
                    reason: "contained resource does not exist".into(),
                })
            }
        }
        self.node(uri, location)
    }

    fn kind_of(&self, node: &GraphNode, location: &str) -> Result<ResourceKind, SyncError> {
        if let Some(kind) = node.kind {
            return Ok(kind);
        }
        self.repo
            .kind_of(location, &self.options)?
            .ok_or_else(|| SyncError::MalformedGraph {
                path: location.to_string(),
                reason: "contained resource has no type".into(),
            })
    }
}

fn binary(node: &GraphNode, relative: String, location: String) -> Binary {
    Binary {
        path: relative,
        location,
        name: node.title.clone().or_else(|| node.filename.clone()),
        file_name: node.filename.clone(),
        content_type: node.mime_type.clone(),
        size: node.size.unwrap_or(0),
        digest: node.digest.clone(),
        origin: None,
    }
}
