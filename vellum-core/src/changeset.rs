//! The changeset (import job) exchange model.
//!
//! A [`Changeset`] states what must change to bring a preserved object in
//! line with a staged source: containers and files to add, delete and patch.
//! It is produced by diffing, may be edited by hand, and is filled in with
//! result lists when executed. Field names serialize as camelCase.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::slug;
use crate::types::VersionDescriptor;

/// Where staged content lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StorageKind {
    #[default]
    S3,
    FileSystem,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::S3 => write!(f, "S3"),
            StorageKind::FileSystem => write!(f, "FileSystem"),
        }
    }
}

/// A container to create or delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDirectory {
    /// Path relative to the preserved object root; ends with the slug.
    pub path: String,
    /// Repository path of the preserved object this path is relative to.
    pub parent: String,
    /// Display name (`dc:title`).
    pub name: String,
}

impl ContainerDirectory {
    pub fn slug(&self) -> &str {
        slug::NameAndParent::split(&self.path).name
    }
}

/// A binary to put or delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryFile {
    /// Path relative to the preserved object root; ends with the slug.
    pub path: String,
    /// Repository path of the preserved object this path is relative to.
    pub parent: String,
    /// Display name, usually the original file name.
    pub name: String,
    pub content_type: String,
    /// Lowercase hex SHA-256, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    /// Locator for the bytes (`s3://bucket/key`, `file:///…`).
    pub origin: String,
}

impl BinaryFile {
    pub fn slug(&self) -> &str {
        slug::NameAndParent::split(&self.path).name
    }
}

/// The normalized result of scanning a staged location. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceTree {
    pub containers: Vec<ContainerDirectory>,
    pub files: Vec<BinaryFile>,
    /// Overall display name, when a metadata document supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Lifecycle state of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    #[default]
    Waiting,
    Running,
    Completed,
    CompletedWithErrors,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::CompletedWithErrors)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Waiting => write!(f, "waiting"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::CompletedWithErrors => write!(f, "completed-with-errors"),
        }
    }
}

/// A structured failure recorded against a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    /// One of `validation`, `structural`, `integrity`, `transaction`, `transport`.
    pub category: String,
    pub message: String,
}

/// A set of operations reconciling a staged deposit with a preserved object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Changeset {
    /// Staged location the diff was computed from.
    pub source: String,
    pub storage_kind: StorageKind,
    /// Repository path of the target preserved object.
    pub object_path: String,
    /// Display name; required when creating a new object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
    pub diff_start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_end: Option<DateTime<Utc>>,
    /// HEAD version the diff was computed against (`None` for a new object).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_version: Option<VersionDescriptor>,

    #[serde(default)]
    pub containers_to_add: Vec<ContainerDirectory>,
    #[serde(default)]
    pub containers_to_delete: Vec<ContainerDirectory>,
    #[serde(default)]
    pub files_to_add: Vec<BinaryFile>,
    #[serde(default)]
    pub files_to_delete: Vec<BinaryFile>,
    #[serde(default)]
    pub files_to_patch: Vec<BinaryFile>,

    #[serde(default)]
    pub containers_added: Vec<ContainerDirectory>,
    #[serde(default)]
    pub containers_deleted: Vec<ContainerDirectory>,
    #[serde(default)]
    pub files_added: Vec<BinaryFile>,
    #[serde(default)]
    pub files_deleted: Vec<BinaryFile>,
    #[serde(default)]
    pub files_patched: Vec<BinaryFile>,

    /// Must be explicitly true to modify an existing object.
    #[serde(default)]
    pub is_update: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_version: Option<VersionDescriptor>,
    #[serde(default)]
    pub errors: Vec<JobError>,
}

impl Changeset {
    /// An empty changeset for `object_path`, stamped with `diff_start`.
    pub fn new(
        source: impl Into<String>,
        storage_kind: StorageKind,
        object_path: impl Into<String>,
        diff_start: DateTime<Utc>,
    ) -> Self {
        Self {
            source: source.into(),
            storage_kind,
            object_path: object_path.into(),
            object_name: None,
            diff_start,
            diff_end: None,
            diff_version: None,
            containers_to_add: vec![],
            containers_to_delete: vec![],
            files_to_add: vec![],
            files_to_delete: vec![],
            files_to_patch: vec![],
            containers_added: vec![],
            containers_deleted: vec![],
            files_added: vec![],
            files_deleted: vec![],
            files_patched: vec![],
            is_update: false,
            start: None,
            end: None,
            new_version: None,
            errors: vec![],
        }
    }

    /// Number of pending operations across all five categories.
    pub fn operation_count(&self) -> usize {
        self.containers_to_add.len()
            + self.containers_to_delete.len()
            + self.files_to_add.len()
            + self.files_to_delete.len()
            + self.files_to_patch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operation_count() == 0
    }

    /// Drop any result lists from a previous run.
    pub fn clear_results(&mut self) {
        self.containers_added.clear();
        self.containers_deleted.clear();
        self.files_added.clear();
        self.files_deleted.clear();
        self.files_patched.clear();
        self.errors.clear();
        self.new_version = None;
        self.start = None;
        self.end = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_camel_case_exchange_names() {
        let mut cs = Changeset::new("s3://staging/dep-1", StorageKind::S3, "col/ms-1", Utc::now());
        cs.is_update = true;
        cs.files_to_add.push(BinaryFile {
            path: "objects/p1.jpg".into(),
            parent: "col/ms-1".into(),
            name: "p1.jpg".into(),
            content_type: "image/jpeg".into(),
            digest: Some("ab".into()),
            origin: "s3://staging/dep-1/objects/p1.jpg".into(),
        });
        let json = serde_json::to_value(&cs).expect("serialize");
        assert_eq!(json["isUpdate"], serde_json::json!(true));
        assert_eq!(json["objectPath"], serde_json::json!("col/ms-1"));
        assert_eq!(json["storageKind"], serde_json::json!("S3"));
        assert!(json["filesToAdd"].is_array());
        assert!(json["containersToDelete"].is_array());
        assert_eq!(json["filesToAdd"][0]["contentType"], serde_json::json!("image/jpeg"));
        assert!(json.get("newVersion").is_none());
    }

    #[test]
    fn hand_written_changeset_defaults_missing_lists() {
        let raw = r#"{
            "source": "s3://staging/dep-1",
            "storageKind": "S3",
            "objectPath": "col/ms-1",
            "objectName": "Manuscript 1",
            "diffStart": "2024-04-10T15:49:58Z",
            "containersToAdd": [{"path": "foo", "parent": "col/ms-1", "name": "foo"}]
        }"#;
        let cs: Changeset = serde_json::from_str(raw).expect("parse");
        assert!(!cs.is_update);
        assert_eq!(cs.operation_count(), 1);
        assert_eq!(cs.containers_to_add[0].slug(), "foo");
        assert!(cs.files_patched.is_empty());
    }

    #[test]
    fn job_status_wire_names() {
        let json = serde_json::to_string(&JobStatus::CompletedWithErrors).unwrap();
        assert_eq!(json, "\"completed-with-errors\"");
        assert_eq!(JobStatus::Waiting.to_string(), "waiting");
        assert!(JobStatus::Completed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn clear_results_keeps_pending_operations() {
        let mut cs = Changeset::new("s3://b/k", StorageKind::S3, "obj", Utc::now());
        let dir = ContainerDirectory {
            path: "a".into(),
            parent: "obj".into(),
            name: "a".into(),
        };
        cs.containers_to_add.push(dir.clone());
        cs.containers_added.push(dir);
        cs.errors.push(JobError {
            category: "transport".into(),
            message: "boom".into(),
        });
        cs.clear_results();
        assert!(cs.containers_added.is_empty());
        assert!(cs.errors.is_empty());
        assert_eq!(cs.operation_count(), 1);
    }
}
