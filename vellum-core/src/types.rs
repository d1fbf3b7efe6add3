//! Domain types for preserved objects.
//!
//! A [`PreservedObject`] is the unit of versioning: a root container plus a
//! tree of child [`Container`]s and [`Binary`]s. Paths on tree nodes are
//! relative to the object root; `location` is the full repository path.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// `strftime` layout of a memento timestamp (`20240103160421`).
pub const MEMENTO_FORMAT: &str = "%Y%m%d%H%M%S";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed identifier for a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// A fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The kind a repository resource advertises about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Container,
    ArchivalGroup,
    Binary,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Container => write!(f, "container"),
            ResourceKind::ArchivalGroup => write!(f, "archival-group"),
            ResourceKind::Binary => write!(f, "binary"),
        }
    }
}

// ---------------------------------------------------------------------------
// Versions
// ---------------------------------------------------------------------------

/// One point in a preserved object's history.
///
/// `memento` is assigned by the repository; `label` (`v1`, `v2`, …) by the
/// storage layer once the two histories have been reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    pub memento: String,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl VersionDescriptor {
    /// Parse a repository memento timestamp.
    pub fn from_memento(memento: &str) -> Result<Self, chrono::ParseError> {
        let naive = NaiveDateTime::parse_from_str(memento, MEMENTO_FORMAT)?;
        Ok(Self {
            memento: memento.to_string(),
            created: Utc.from_utc_datetime(&naive),
            label: None,
        })
    }

    /// A labelled version whose memento is derived from its creation time.
    pub fn labelled(label: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            memento: created.format(MEMENTO_FORMAT).to_string(),
            created,
            label: Some(label.into()),
        }
    }

    /// `true` when `selector` names this version by label or by memento.
    pub fn matches(&self, selector: &str) -> bool {
        self.memento == selector || self.label.as_deref() == Some(selector)
    }
}

impl fmt::Display for VersionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{label} | {}", self.memento),
            None => write!(f, "{}", self.memento),
        }
    }
}

// ---------------------------------------------------------------------------
// Tree nodes
// ---------------------------------------------------------------------------

/// A leaf file node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binary {
    /// Path relative to the preserved object root.
    pub path: String,
    /// Full repository path.
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Original file name recorded from the content-disposition hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: u64,
    /// Lowercase hex SHA-256.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    /// Where the bytes live in the storage layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// A named grouping node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Path relative to the preserved object root (empty for the root).
    pub path: String,
    /// Full repository path.
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub binaries: Vec<Binary>,
}

impl Container {
    /// Every container below this one, depth first, parents before children.
    pub fn all_containers(&self) -> Vec<&Container> {
        let mut out = Vec::new();
        for child in &self.containers {
            out.push(child);
            out.extend(child.all_containers());
        }
        out
    }

    /// Every binary at or below this container.
    pub fn all_binaries(&self) -> Vec<&Binary> {
        let mut out: Vec<&Binary> = self.binaries.iter().collect();
        for child in &self.containers {
            out.extend(child.all_binaries());
        }
        out
    }

    pub fn find_container(&self, path: &str) -> Option<&Container> {
        self.all_containers().into_iter().find(|c| c.path == path)
    }

    pub fn find_binary(&self, path: &str) -> Option<&Binary> {
        self.all_binaries().into_iter().find(|b| b.path == path)
    }

    /// Mutable visit of every binary at or below this container.
    pub fn for_each_binary_mut(&mut self, f: &mut dyn FnMut(&mut Binary)) {
        for binary in &mut self.binaries {
            f(binary);
        }
        for child in &mut self.containers {
            child.for_each_binary_mut(f);
        }
    }
}

/// The top-level versioned unit (an archival group).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreservedObject {
    /// Repository path of the object, e.g. `collections/ms-101`.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The version this tree was loaded at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionDescriptor>,
    /// Full reconciled history, oldest first.
    #[serde(default)]
    pub versions: Vec<VersionDescriptor>,
    /// Storage-layer location of the object's root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    pub root: Container,
}

impl PreservedObject {
    /// The newest version in the history.
    pub fn head(&self) -> Option<&VersionDescriptor> {
        self.versions.last()
    }

    /// `true` when the loaded tree is the newest version.
    pub fn is_at_head(&self) -> bool {
        match (&self.version, self.head()) {
            (Some(current), Some(head)) => current.memento == head.memento,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn binary(path: &str) -> Binary {
        Binary {
            path: path.to_string(),
            location: format!("obj/{path}"),
            name: None,
            file_name: None,
            content_type: None,
            size: 0,
            digest: None,
            origin: None,
        }
    }

    fn tree() -> Container {
        Container {
            path: String::new(),
            location: "obj".into(),
            name: Some("Object".into()),
            binaries: vec![binary("mets.xml")],
            containers: vec![Container {
                path: "objects".into(),
                location: "obj/objects".into(),
                name: Some("objects".into()),
                binaries: vec![binary("objects/p1.jpg")],
                containers: vec![Container {
                    path: "objects/alto".into(),
                    location: "obj/objects/alto".into(),
                    name: None,
                    binaries: vec![binary("objects/alto/p1.xml")],
                    containers: vec![],
                }],
            }],
        }
    }

    #[test]
    fn job_id_display_and_generate() {
        assert_eq!(JobId::from("abc").to_string(), "abc");
        let a = JobId::generate();
        let b = JobId::generate();
        assert_ne!(a, b);
        assert_eq!(a.0.len(), 32);
    }

    #[test]
    fn memento_parses_to_utc() {
        let v = VersionDescriptor::from_memento("20240103160421").expect("parse");
        assert_eq!(v.created.to_rfc3339(), "2024-01-03T16:04:21+00:00");
        assert!(v.label.is_none());
        assert!(VersionDescriptor::from_memento("2024-01-03").is_err());
    }

    #[test]
    fn version_matches_label_or_memento() {
        let created = Utc.with_ymd_and_hms(2024, 1, 3, 16, 4, 21).unwrap();
        let v = VersionDescriptor::labelled("v2", created);
        assert_eq!(v.memento, "20240103160421");
        assert!(v.matches("v2"));
        assert!(v.matches("20240103160421"));
        assert!(!v.matches("v1"));
        assert_eq!(v.to_string(), "v2 | 20240103160421");
    }

    #[test]
    fn walks_containers_parents_first() {
        let root = tree();
        let paths: Vec<_> = root.all_containers().iter().map(|c| c.path.clone()).collect();
        assert_eq!(paths, vec!["objects", "objects/alto"]);
        assert_eq!(root.all_binaries().len(), 3);
        assert!(root.find_binary("objects/alto/p1.xml").is_some());
        assert!(root.find_container("objects/alto").is_some());
        assert!(root.find_container("missing").is_none());
    }

    #[test]
    fn resource_kind_serde_is_kebab_case() {
        let json = serde_json::to_string(&ResourceKind::ArchivalGroup).unwrap();
        assert_eq!(json, "\"archival-group\"");
    }
}
