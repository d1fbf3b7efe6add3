//! Shared engine entrypoint used by the CLI and the daemon.
//!
//! [`Engine`] owns the three collaborators (repository, object store,
//! storage layer) and the resolved [`Settings`]; every entry point calls
//! the same differ and executor through it.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use vellum_core::config;
use vellum_core::{Changeset, JobRecord, PreservedObject, Settings, SourceTree};

use crate::browse::{self, ResourceView};
use crate::differ;
use crate::error::SyncError;
use crate::executor::{self, Executor, ExecutorOptions};
use crate::export::{self, ExportedFile};
use crate::fedora::FedoraRepository;
use crate::inspect::{self, InspectOptions};
use crate::loader::TreeLoader;
use crate::repository::{Repository, RequestOptions};
use crate::store::{FsObjectStore, Location, ObjectStore};
use crate::structure::{self, Target};
use crate::versions::{OcflStorage, StorageLayer};

#[derive(Clone)]
pub struct Engine {
    repo: Arc<dyn Repository>,
    store: Arc<dyn ObjectStore>,
    storage: Arc<dyn StorageLayer>,
    settings: Settings,
}

impl Engine {
    pub fn new(
        repo: Arc<dyn Repository>,
        store: Arc<dyn ObjectStore>,
        storage: Arc<dyn StorageLayer>,
        settings: Settings,
    ) -> Self {
        Self {
            repo,
            store,
            storage,
            settings,
        }
    }

    /// Fedora over HTTP, the filesystem object store under
    /// `object_store_root`, and the OCFL root at `storage_root`.
    pub fn from_settings(home: &Path, settings: &Settings) -> Result<Self, SyncError> {
        let store: Arc<dyn ObjectStore> =
            Arc::new(FsObjectStore::new(config::object_store_root_at(home, settings)));
        let storage_root = Location::parse(&settings.storage_root)?;
        let storage = Arc::new(OcflStorage::new(store.clone(), storage_root));
        let repo = Arc::new(FedoraRepository::new(&settings.repository_url));
        Ok(Self::new(repo, store, storage, settings.clone()))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn loader(&self) -> TreeLoader<'_> {
        TreeLoader::new(
            self.repo.as_ref(),
            self.storage.as_ref(),
            self.settings.max_tree_depth,
        )
    }

    /// The preserved object at `path`, at HEAD or at `version`.
    pub fn load(&self, path: &str, version: Option<&str>) -> Result<Option<PreservedObject>, SyncError> {
        self.loader().load(path, version)
    }

    pub fn inspect(&self, source: &str, object_path: &str) -> Result<SourceTree, SyncError> {
        let location = Location::parse(source)?;
        inspect::inspect(
            self.store.as_ref(),
            &location,
            object_path,
            &InspectOptions::from(&self.settings),
        )
    }

    /// Copy a deposit to `destination`, recording checksums, and inspect the copy.
    pub fn copy_source(&self, source: &str, destination: &str) -> Result<SourceTree, SyncError> {
        let from = Location::parse(source)?;
        let to = Location::parse(destination)?;
        inspect::copy_source(self.store.as_ref(), &from, &to)?;
        self.inspect(destination, "")
    }

    /// Any repository resource with its direct children.
    pub fn browse(&self, path: &str) -> Result<Option<ResourceView>, SyncError> {
        browse::browse(self.repo.as_ref(), path)
    }

    /// Create a plain container outside any transaction; returns its path.
    pub fn create_container(&self, path: &str, name: Option<&str>) -> Result<String, SyncError> {
        browse::create_container(self.repo.as_ref(), path, name)
    }

    /// Compute the changeset that brings `object_path` in line with `source`.
    /// Read-only.
    pub fn generate_diff(
        &self,
        object_path: &str,
        source: &str,
        name: Option<&str>,
    ) -> Result<Changeset, SyncError> {
        let diff_start = Utc::now();
        let object_path = object_path.trim_matches('/');
        let target = structure::check_target(self.repo.as_ref(), object_path, &RequestOptions::new())?;
        let location = Location::parse(source)?;
        let tree = self.inspect(source, object_path)?;
        let existing = match target {
            Target::Existing => self.load(object_path, None)?,
            Target::New => None,
        };

        let mut changeset = Changeset::new(source, location.kind, object_path, diff_start);
        changeset.object_name = name
            .map(str::to_string)
            .or_else(|| tree.name.clone())
            .or_else(|| existing.as_ref().and_then(|o| o.name.clone()));
        if existing.is_none() && changeset.object_name.is_none() {
            return Err(SyncError::MissingName {
                path: object_path.to_string(),
            });
        }
        changeset.diff_version = existing.as_ref().and_then(|o| o.version.clone());
        changeset.is_update = existing.is_some();
        differ::diff_into(&mut changeset, &tree, existing.as_ref())?;
        changeset.diff_end = Some(Utc::now());
        Ok(changeset)
    }

    /// The synchronous checks a submission must pass before it is queued.
    pub fn validate_for_submit(&self, changeset: &Changeset) -> Result<Target, SyncError> {
        executor::preflight(self.repo.as_ref(), changeset, self.settings.require_digest)
    }

    pub fn execute(&self, changeset: &mut Changeset) -> Result<(), SyncError> {
        Executor::new(
            self.repo.as_ref(),
            self.store.as_ref(),
            self.storage.as_ref(),
            ExecutorOptions::from(&self.settings),
        )
        .execute(changeset)
    }

    /// Execute a job's changeset and move the record to its terminal state.
    /// A failure is recorded on the changeset, never retried.
    pub fn run_job(&self, record: &mut JobRecord) {
        if let Err(e) = self.execute(&mut record.changeset) {
            tracing::error!("job {} failed: {e}", record.id);
            record.changeset.errors.push(e.to_job_error());
        }
        record.finish();
        tracing::info!("job {} {}", record.id, record.status);
    }

    /// Copy the binaries of `object_path` (HEAD or `version`) to `destination`.
    pub fn export(
        &self,
        object_path: &str,
        version: Option<&str>,
        destination: &str,
    ) -> Result<Vec<ExportedFile>, SyncError> {
        let object = self
            .load(object_path, version)?
            .ok_or_else(|| SyncError::ObjectNotFound {
                path: object_path.to_string(),
            })?;
        export::export(self.store.as_ref(), &object, &Location::parse(destination)?)
    }
}
