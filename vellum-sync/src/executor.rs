//! Job executor: applies one changeset inside one transaction.
//!
//! Order of application:
//!
//! 1. create the archival group (new objects only)
//! 2. create containers, shallowest first
//! 3. put new files
//! 4. put patched files
//! 5. delete files
//! 6. delete containers, deepest first
//!
//! Any failure after the transaction has begun rolls it back before the
//! error is returned. Nothing already applied is undone individually; the
//! repository discards it with the transaction.

use chrono::{Duration, Utc};

use vellum_core::{slug, BinaryFile, Changeset, ContainerDirectory, Settings};

use crate::checksum;
use crate::differ;
use crate::error::SyncError;
use crate::loader::TreeLoader;
use crate::repository::{PutOutcome, Repository, RequestOptions};
use crate::store::{Location, ObjectStore};
use crate::structure::{self, Target};
use crate::transaction::Transaction;
use crate::versions::StorageLayer;

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Renew the lease when less than this remains.
    pub renew_margin: Duration,
    pub max_tree_depth: usize,
    /// Refuse files without a digest instead of hashing the staged bytes.
    pub require_digest: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for ExecutorOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            renew_margin: Duration::seconds(settings.lease_renew_margin_secs),
            max_tree_depth: settings.max_tree_depth,
            require_digest: settings.require_digest,
        }
    }
}

pub struct Executor<'a> {
    repo: &'a dyn Repository,
    store: &'a dyn ObjectStore,
    storage: &'a dyn StorageLayer,
    options: ExecutorOptions,
}

// ---------------------------------------------------------------------------
// 1. Preflight
// ---------------------------------------------------------------------------

/// Validation, structural and safety-gate checks. Runs before any
/// transaction exists and has no side effects.
pub fn preflight(
    repo: &dyn Repository,
    changeset: &Changeset,
    require_digest: bool,
) -> Result<Target, SyncError> {
    let invalid = |path: &str| SyncError::InvalidPath {
        path: path.to_string(),
    };
    let container_paths = changeset
        .containers_to_add
        .iter()
        .chain(&changeset.containers_to_delete)
        .map(|c| c.path.as_str());
    let file_paths = changeset
        .files_to_add
        .iter()
        .chain(&changeset.files_to_patch)
        .chain(&changeset.files_to_delete)
        .map(|f| f.path.as_str());
    if let Some(bad) = container_paths
        .chain(file_paths)
        .find(|p| !slug::well_formed_path(p))
    {
        return Err(invalid(bad));
    }
    if require_digest {
        if let Some(file) = changeset
            .files_to_add
            .iter()
            .chain(&changeset.files_to_patch)
            .find(|f| f.digest.is_none())
        {
            return Err(SyncError::MissingDigest {
                path: file.path.clone(),
            });
        }
    }

    let target = structure::check_target(repo, &changeset.object_path, &RequestOptions::new())?;
    match target {
        Target::Existing if !changeset.is_update => Err(SyncError::AlreadyExists {
            path: changeset.object_path.clone(),
        }),
        Target::New if changeset.is_update => Err(SyncError::UpdateNotPermitted {
            path: changeset.object_path.clone(),
        }),
        Target::New if changeset.object_name.as_deref().map_or(true, str::is_empty) => {
            Err(SyncError::MissingName {
                path: changeset.object_path.clone(),
            })
        }
        target => Ok(target),
    }
}

// ---------------------------------------------------------------------------
// 2. Execution
// ---------------------------------------------------------------------------

impl<'a> Executor<'a> {
    pub fn new(
        repo: &'a dyn Repository,
        store: &'a dyn ObjectStore,
        storage: &'a dyn StorageLayer,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            repo,
            store,
            storage,
            options,
        }
    }

    /// Apply `changeset`, filling in its result lists, timestamps and new
    /// version. Result lists from an earlier run are discarded first.
    pub fn execute(&self, changeset: &mut Changeset) -> Result<(), SyncError> {
        changeset.clear_results();
        changeset.start = Some(Utc::now());
        differ::sort_operations(changeset);

        let outcome = self.execute_checked(changeset);
        changeset.end = Some(Utc::now());
        outcome
    }

    fn execute_checked(&self, changeset: &mut Changeset) -> Result<(), SyncError> {
        let target = preflight(self.repo, changeset, self.options.require_digest)?;
        let object_path = changeset.object_path.clone();
        tracing::info!(
            "executing {} operations against {object_path} ({})",
            changeset.operation_count(),
            if target == Target::New { "new object" } else { "update" }
        );

        let mut tx = Transaction::new(self.repo);
        tx.begin()?;
        if let Err(e) = self.apply(&mut tx, target, changeset) {
            tracing::error!("job on {object_path} failed: {e}");
            if let Err(rollback) = tx.rollback() {
                tracing::error!("rollback of {object_path} failed: {rollback}");
            }
            return Err(e);
        }

        let loader = TreeLoader::new(self.repo, self.storage, self.options.max_tree_depth);
        changeset.new_version = loader.head_version(&object_path)?;
        tracing::info!(
            "{object_path} is now at {}",
            changeset
                .new_version
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "an unversioned state".into())
        );
        Ok(())
    }

    fn apply(
        &self,
        tx: &mut Transaction<'_>,
        target: Target,
        changeset: &mut Changeset,
    ) -> Result<(), SyncError> {
        let margin = self.options.renew_margin;
        let object_path = changeset.object_path.clone();

        match target {
            Target::Existing => self.check_not_stale(changeset)?,
            Target::New => {
                tx.renew_if_needed(margin)?;
                let split = slug::NameAndParent::split(&object_path);
                let mut options = tx
                    .options()
                    .slug(split.name)
                    .archival_group();
                if let Some(name) = &changeset.object_name {
                    options = options.title(name.clone());
                }
                self.repo
                    .create_container(split.parent.unwrap_or(""), &options)?;
                tracing::info!("created archival group {object_path}");
            }
        }

        for container in changeset.containers_to_add.clone() {
            tx.renew_if_needed(margin)?;
            self.create_container(tx, &object_path, &container)?;
            changeset.containers_added.push(container);
        }
        for file in changeset.files_to_add.clone() {
            tx.renew_if_needed(margin)?;
            let stored = self.put_file(tx, &object_path, &file)?;
            changeset.files_added.push(stored);
        }
        for file in changeset.files_to_patch.clone() {
            tx.renew_if_needed(margin)?;
            let stored = self.put_file(tx, &object_path, &file)?;
            changeset.files_patched.push(stored);
        }
        for file in changeset.files_to_delete.clone() {
            tx.renew_if_needed(margin)?;
            let path = slug::join(&object_path, &file.path);
            self.repo.delete(&path, &tx.options())?;
            tracing::info!("deleted binary {path}");
            changeset.files_deleted.push(file);
        }
        for container in changeset.containers_to_delete.clone() {
            tx.renew_if_needed(margin)?;
            let path = slug::join(&object_path, &container.path);
            self.repo.delete(&path, &tx.options())?;
            tracing::info!("deleted container {path}");
            changeset.containers_deleted.push(container);
        }

        tx.renew_if_needed(margin)?;
        tx.commit()
    }

    /// The object's HEAD must still be the version the diff was computed
    /// against.
    fn check_not_stale(&self, changeset: &Changeset) -> Result<(), SyncError> {
        let loader = TreeLoader::new(self.repo, self.storage, self.options.max_tree_depth);
        let head = loader.head_version(&changeset.object_path)?;
        let expected = changeset.diff_version.as_ref().map(|v| v.memento.as_str());
        let actual = head.as_ref().map(|v| v.memento.as_str());
        if expected != actual {
            return Err(SyncError::StaleDiff {
                path: changeset.object_path.clone(),
                expected: changeset
                    .diff_version
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "no version".into()),
                actual: head
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "no version".into()),
            });
        }
        Ok(())
    }

    fn create_container(
        &self,
        tx: &Transaction<'_>,
        object_path: &str,
        container: &ContainerDirectory,
    ) -> Result<(), SyncError> {
        let split = slug::NameAndParent::split(&container.path);
        let parent = slug::join(object_path, split.parent.unwrap_or(""));
        let options = tx.options().slug(split.name).title(container.name.clone());
        let created = self.repo.create_container(&parent, &options)?;
        tracing::info!("created container {created}");
        Ok(())
    }

    /// Put one file from its staged origin and verify the stored digest.
    fn put_file(
        &self,
        tx: &Transaction<'_>,
        object_path: &str,
        file: &BinaryFile,
    ) -> Result<BinaryFile, SyncError> {
        let origin = Location::parse(&file.origin)?;
        let bytes = self
            .store
            .get(&origin)?
            .ok_or_else(|| SyncError::SourceObjectMissing {
                origin: file.origin.clone(),
            })?;
        let actual = checksum::sha256_hex(&bytes);
        let digest = match &file.digest {
            Some(declared) if !checksum::digests_equal(declared, &actual) => {
                return Err(SyncError::DigestMismatch {
                    path: file.path.clone(),
                    expected: declared.clone(),
                    actual,
                })
            }
            Some(declared) => declared.to_ascii_lowercase(),
            None => actual,
        };

        let path = slug::join(object_path, &file.path);
        let options = tx
            .options()
            .digest(digest.clone())
            .content_type(file.content_type.clone())
            .file_name(file.name.clone());
        if self.repo.put_binary(&path, &bytes, &options)? == PutOutcome::Tombstoned {
            tracing::info!("{path} was deleted earlier; overwriting its tombstone");
            if self
                .repo
                .put_binary(&path, &bytes, &options.clone().overwrite_tombstone())?
                == PutOutcome::Tombstoned
            {
                return Err(SyncError::Http {
                    method: "PUT",
                    url: self.repo.uri_for(&path),
                    status: 410,
                });
            }
        }

        let stored = self.repo.binary_digest(&path, &tx.options())?;
        match stored {
            Some(stored) if checksum::digests_equal(&stored, &digest) => {}
            other => {
                return Err(SyncError::DigestMismatch {
                    path: file.path.clone(),
                    expected: digest,
                    actual: other.unwrap_or_else(|| "nothing".into()),
                })
            }
        }
        tracing::info!("put binary {path} ({} bytes)", bytes.len());
        Ok(BinaryFile {
            digest: Some(digest),
            ..file.clone()
        })
    }
}
