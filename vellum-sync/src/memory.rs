//! In-memory repository, storage layer and object store.
//!
//! [`MemoryRepository`] behaves like a small Fedora: containers, archival
//! groups and binaries live in a path-keyed map; transactions work on a
//! private copy that replaces the live map on commit; deletes leave
//! tombstones; every change to an archival group outside a transaction, and
//! every commit touching one, records a memento. It doubles as the storage
//! layer, labelling those mementos `v1`, `v2`, … so the two histories agree.
//!
//! Mementos come from a logical clock that advances one second per version,
//! so quick successive commits never share a timestamp.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

use vellum_core::types::MEMENTO_FORMAT;
use vellum_core::{slug, ResourceKind, VersionDescriptor};

use crate::checksum;
use crate::error::SyncError;
use crate::repository::{
    PutOutcome, Repository, RequestOptions, TransactionHandle, TransactionReply,
};
use crate::store::{ListPage, Location, ObjectStore, ObjectSummary, PAGE_SIZE};
use crate::versions::StorageLayer;

pub const MEMORY_BASE_URI: &str = "http://repository.test/rest";

/// A fault the repository raises when the matching call arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    CreateContainer(String),
    PutBinary(String),
    Delete(String),
    /// Answer the next commit with a conflict.
    CommitConflict,
    /// Record a digest other than the content's for this binary.
    CorruptDigest(String),
}

/// How often each transaction verb was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub begin: usize,
    pub renew: usize,
    pub commit: usize,
    pub rollback: usize,
}

#[derive(Debug, Clone)]
struct Resource {
    kind: ResourceKind,
    title: Option<String>,
    size: u64,
    digest: Option<String>,
    content_type: Option<String>,
    file_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    resources: BTreeMap<String, Resource>,
    tombstones: BTreeSet<String>,
}

impl Snapshot {
    fn get(&self, path: &str) -> Option<&Resource> {
        self.resources.get(path)
    }

    fn is_container(&self, path: &str) -> bool {
        path.is_empty()
            || matches!(
                self.get(path).map(|r| r.kind),
                Some(ResourceKind::Container | ResourceKind::ArchivalGroup)
            )
    }

    fn kind(&self, path: &str) -> Option<ResourceKind> {
        if path.is_empty() {
            Some(ResourceKind::Container)
        } else {
            self.get(path).map(|r| r.kind)
        }
    }

    /// The archival group at or above `path`.
    fn archival_group_of(&self, path: &str) -> Option<String> {
        std::iter::once(path)
            .chain(slug::ancestors(path))
            .find(|p| self.kind(p) == Some(ResourceKind::ArchivalGroup))
            .map(str::to_string)
    }

    fn children(&self, path: &str) -> Vec<&str> {
        self.resources
            .keys()
            .filter(|k| slug::NameAndParent::split(k).parent.unwrap_or("") == path && !k.is_empty())
            .map(String::as_str)
            .collect()
    }

    fn subtree(&self, root: &str) -> BTreeMap<String, Resource> {
        self.resources
            .iter()
            .filter(|(k, _)| is_within(k, root))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn is_within(path: &str, root: &str) -> bool {
    path == root || path.starts_with(&format!("{root}/"))
}

#[derive(Debug, Clone)]
struct Version {
    memento: String,
    created: DateTime<Utc>,
    label: String,
    resources: BTreeMap<String, Resource>,
}

#[derive(Debug)]
struct Tx {
    base_generation: u64,
    working: Snapshot,
    expires: DateTime<Utc>,
    touched: BTreeSet<String>,
}

#[derive(Debug)]
struct State {
    live: Snapshot,
    generation: u64,
    transactions: HashMap<String, Tx>,
    ended: BTreeSet<String>,
    next_tx: u64,
    versions: BTreeMap<String, Vec<Version>>,
    clock: DateTime<Utc>,
    lease: Duration,
    advertise_expiry: bool,
    failures: Vec<Failure>,
    calls: CallCounts,
}

pub struct MemoryRepository {
    state: Mutex<State>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn http(method: &'static str, path: &str, status: u16) -> SyncError {
    SyncError::Http {
        method,
        url: format!("{MEMORY_BASE_URI}/{path}"),
        status,
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                live: Snapshot::default(),
                generation: 0,
                transactions: HashMap::new(),
                ended: BTreeSet::new(),
                next_tx: 0,
                versions: BTreeMap::new(),
                clock: Utc
                    .timestamp_opt(1_704_067_200, 0)
                    .single()
                    .unwrap_or_default(),
                lease: Duration::minutes(3),
                advertise_expiry: true,
                failures: vec![],
                calls: CallCounts::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lease granted on begin and renew.
    pub fn set_lease(&self, lease: Duration) {
        self.lock().lease = lease;
    }

    /// When false, begin omits the expiry and the client must renew to learn it.
    pub fn set_advertise_expiry(&self, advertise: bool) {
        self.lock().advertise_expiry = advertise;
    }

    pub fn fail_on(&self, failure: Failure) {
        self.lock().failures.push(failure);
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    /// Number of transactions begun and not yet ended.
    pub fn active_transactions(&self) -> usize {
        self.lock().transactions.len()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lock().live.get(path).is_some()
    }

    fn take_failure(state: &State, failure: &Failure) -> bool {
        state.failures.iter().any(|f| f == failure)
    }

    fn read_view(state: &State, path: &str, options: &RequestOptions) -> Result<Snapshot, SyncError> {
        if let Some(memento) = &options.memento {
            let ag = state
                .live
                .archival_group_of(path)
                .ok_or_else(|| http("GET", path, 404))?;
            let version = state
                .versions
                .get(&ag)
                .and_then(|vs| vs.iter().find(|v| &v.memento == memento))
                .ok_or_else(|| http("GET", path, 404))?;
            return Ok(Snapshot {
                resources: version.resources.clone(),
                tombstones: BTreeSet::new(),
            });
        }
        match &options.transaction {
            Some(location) => {
                let tx = active_tx(state, location)?;
                Ok(tx.working.clone())
            }
            None => Ok(state.live.clone()),
        }
    }

    /// Run a mutation against the transaction copy or, outside a transaction,
    /// against the live tree. `f` returns the path of the archival group it
    /// touched, if any.
    fn write<T>(
        &self,
        options: &RequestOptions,
        f: impl FnOnce(&mut Snapshot) -> Result<(T, Option<String>), SyncError>,
    ) -> Result<T, SyncError> {
        let mut state = self.lock();
        match &options.transaction {
            Some(location) => {
                active_tx(&state, location)?;
                let tx = state
                    .transactions
                    .get_mut(location)
                    .ok_or_else(|| SyncError::TransactionNotFound {
                        location: location.clone(),
                    })?;
                let (value, touched) = f(&mut tx.working)?;
                if let Some(ag) = touched {
                    tx.touched.insert(ag);
                }
                Ok(value)
            }
            None => {
                let (value, touched) = f(&mut state.live)?;
                state.generation += 1;
                if let Some(ag) = touched {
                    record_version(&mut state, &ag);
                }
                Ok(value)
            }
        }
    }

    fn node_json(&self, snapshot: &Snapshot, path: &str, with_contains: bool) -> Value {
        let uri = self.uri_for(path);
        let Some(resource) = snapshot.get(path) else {
            return json!({"@id": uri, "@type": ["fedora:Container", "fedora:RepositoryRoot"]});
        };
        match resource.kind {
            ResourceKind::Binary => {
                let mut node = json!({
                    "@id": uri,
                    "@type": ["fedora:Binary", "fedora:Resource", "ldp:NonRDFSource"],
                    "hasSize": resource.size.to_string(),
                });
                if let Some(d) = &resource.digest {
                    node["hasMessageDigest"] = json!(format!("urn:sha-256:{d}"));
                }
                if let Some(t) = &resource.content_type {
                    node["hasMimeType"] = json!(t);
                }
                if let Some(f) = &resource.file_name {
                    node["filename"] = json!(f);
                }
                if let Some(t) = &resource.title {
                    node["title"] = json!(t);
                }
                node
            }
            kind => {
                let mut types = vec!["fedora:Container", "ldp:BasicContainer"];
                if kind == ResourceKind::ArchivalGroup {
                    types.push("fedora:ArchivalGroup");
                }
                let mut node = json!({"@id": uri, "@type": types});
                if let Some(t) = &resource.title {
                    node["title"] = json!(t);
                }
                if with_contains {
                    let contains: Vec<String> = snapshot
                        .children(path)
                        .into_iter()
                        .map(|c| self.uri_for(c))
                        .collect();
                    node["contains"] = json!(contains);
                }
                node
            }
        }
    }
}

fn active_tx<'s>(state: &'s State, location: &str) -> Result<&'s Tx, SyncError> {
    match state.transactions.get(location) {
        Some(tx) if tx.expires > Utc::now() => Ok(tx),
        Some(_) => Err(SyncError::TransactionExpired {
            location: location.to_string(),
        }),
        None if state.ended.contains(location) => Err(SyncError::TransactionExpired {
            location: location.to_string(),
        }),
        None => Err(SyncError::TransactionNotFound {
            location: location.to_string(),
        }),
    }
}

fn record_version(state: &mut State, ag: &str) {
    if state.live.kind(ag) != Some(ResourceKind::ArchivalGroup) {
        return;
    }
    state.clock += Duration::seconds(1);
    let created = state.clock;
    let resources = state.live.subtree(ag);
    let history = state.versions.entry(ag.to_string()).or_default();
    let label = format!("v{}", history.len() + 1);
    history.push(Version {
        memento: created.format(MEMENTO_FORMAT).to_string(),
        created,
        label,
        resources,
    });
}

impl Repository for MemoryRepository {
    fn base_uri(&self) -> &str {
        MEMORY_BASE_URI
    }

    fn kind_of(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<Option<ResourceKind>, SyncError> {
        let state = self.lock();
        let view = Self::read_view(&state, path, options)?;
        if view.tombstones.contains(path) {
            return Err(http("HEAD", path, 410));
        }
        Ok(view.kind(path))
    }

    fn describe(&self, path: &str, options: &RequestOptions) -> Result<Option<Value>, SyncError> {
        let state = self.lock();
        let view = Self::read_view(&state, path, options)?;
        if view.tombstones.contains(path) {
            return Err(http("GET", path, 410));
        }
        if view.kind(path).is_none() {
            return Ok(None);
        }
        let root = self.node_json(&view, path, true);
        if !options.contained_descriptions {
            return Ok(Some(root));
        }
        let mut graph = vec![root];
        for child in view.children(path) {
            graph.push(self.node_json(&view, child, false));
        }
        Ok(Some(json!({ "@graph": graph })))
    }

    fn create_container(
        &self,
        parent: &str,
        options: &RequestOptions,
    ) -> Result<String, SyncError> {
        let slug = options
            .slug
            .clone()
            .unwrap_or_else(|| vellum_core::JobId::generate().0);
        let path = slug::join(parent, &slug);
        if Self::take_failure(&self.lock(), &Failure::CreateContainer(path.clone())) {
            return Err(http("POST", parent, 500));
        }
        let title = options.title.clone();
        let kind = if options.archival_group {
            ResourceKind::ArchivalGroup
        } else {
            ResourceKind::Container
        };
        self.write(options, |tree| {
            if !tree.is_container(parent) {
                return Err(http("POST", parent, 404));
            }
            if tree.get(&path).is_some() {
                return Err(http("POST", parent, 409));
            }
            if tree.tombstones.contains(&path) {
                return Err(http("POST", parent, 410));
            }
            if kind == ResourceKind::ArchivalGroup && tree.archival_group_of(parent).is_some() {
                return Err(http("POST", parent, 409));
            }
            tree.resources.insert(
                path.clone(),
                Resource {
                    kind,
                    title,
                    size: 0,
                    digest: None,
                    content_type: None,
                    file_name: None,
                },
            );
            let touched = tree.archival_group_of(&path);
            Ok((path.clone(), touched))
        })
    }

    fn put_binary(
        &self,
        path: &str,
        content: &[u8],
        options: &RequestOptions,
    ) -> Result<PutOutcome, SyncError> {
        let (fail, corrupt) = {
            let state = self.lock();
            (
                Self::take_failure(&state, &Failure::PutBinary(path.to_string())),
                Self::take_failure(&state, &Failure::CorruptDigest(path.to_string())),
            )
        };
        if fail {
            return Err(http("PUT", path, 500));
        }
        let actual = checksum::sha256_hex(content);
        if let Some(expected) = &options.digest {
            if !checksum::digests_equal(expected, &actual) {
                return Err(http("PUT", path, 409));
            }
        }
        let recorded = if corrupt {
            checksum::sha256_hex(b"corrupted")
        } else {
            actual
        };
        let size = content.len() as u64;
        self.write(options, |tree| {
            let parent = slug::NameAndParent::split(path).parent.unwrap_or("");
            if !tree.is_container(parent) {
                return Err(http("PUT", path, 409));
            }
            if tree.tombstones.contains(path) {
                if !options.overwrite_tombstone {
                    return Ok((PutOutcome::Tombstoned, None));
                }
                tree.tombstones.remove(path);
            }
            if matches!(tree.kind(path), Some(k) if k != ResourceKind::Binary) {
                return Err(http("PUT", path, 409));
            }
            tree.resources.insert(
                path.to_string(),
                Resource {
                    kind: ResourceKind::Binary,
                    title: options.file_name.clone(),
                    size,
                    digest: Some(recorded),
                    content_type: options.content_type.clone(),
                    file_name: options.file_name.clone(),
                },
            );
            Ok((PutOutcome::Stored, tree.archival_group_of(path)))
        })
    }

    fn describe_binary(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<Option<Value>, SyncError> {
        let state = self.lock();
        let view = Self::read_view(&state, path, options)?;
        match view.kind(path) {
            Some(ResourceKind::Binary) => Ok(Some(self.node_json(&view, path, false))),
            Some(_) => Err(http("GET", path, 404)),
            None => Ok(None),
        }
    }

    fn delete(&self, path: &str, options: &RequestOptions) -> Result<(), SyncError> {
        if Self::take_failure(&self.lock(), &Failure::Delete(path.to_string())) {
            return Err(http("DELETE", path, 500));
        }
        self.write(options, |tree| {
            if tree.get(path).is_none() {
                return Err(http("DELETE", path, 404));
            }
            let touched = tree
                .archival_group_of(path)
                .filter(|ag| ag.as_str() != path);
            tree.resources.retain(|k, _| !is_within(k, path));
            tree.tombstones.insert(path.to_string());
            Ok(((), touched))
        })
    }

    fn mementos(&self, path: &str) -> Result<Vec<String>, SyncError> {
        Ok(self
            .lock()
            .versions
            .get(path.trim_matches('/'))
            .map(|vs| vs.iter().map(|v| v.memento.clone()).collect())
            .unwrap_or_default())
    }

    fn begin_transaction(&self) -> Result<TransactionHandle, SyncError> {
        let mut state = self.lock();
        state.calls.begin += 1;
        state.next_tx += 1;
        let location = format!("{MEMORY_BASE_URI}/fcr:tx/{}", state.next_tx);
        let expires = Utc::now() + state.lease;
        let tx = Tx {
            base_generation: state.generation,
            working: state.live.clone(),
            expires,
            touched: BTreeSet::new(),
        };
        state.transactions.insert(location.clone(), tx);
        Ok(TransactionHandle {
            location,
            expires: state.advertise_expiry.then_some(expires),
        })
    }

    fn renew_transaction(&self, location: &str) -> Result<TransactionReply, SyncError> {
        let mut state = self.lock();
        state.calls.renew += 1;
        let lease = state.lease;
        let ended = state.ended.contains(location);
        match state.transactions.get_mut(location) {
            Some(tx) if tx.expires > Utc::now() => {
                tx.expires = Utc::now() + lease;
                Ok(TransactionReply::Ok {
                    expires: Some(tx.expires),
                })
            }
            Some(_) => {
                state.transactions.remove(location);
                state.ended.insert(location.to_string());
                Ok(TransactionReply::Gone)
            }
            None if ended => Ok(TransactionReply::Gone),
            None => Ok(TransactionReply::NotFound),
        }
    }

    fn commit_transaction(&self, location: &str) -> Result<TransactionReply, SyncError> {
        let mut state = self.lock();
        state.calls.commit += 1;
        let Some(tx) = state.transactions.remove(location) else {
            return Ok(if state.ended.contains(location) {
                TransactionReply::Gone
            } else {
                TransactionReply::NotFound
            });
        };
        state.ended.insert(location.to_string());
        if tx.expires <= Utc::now() {
            return Ok(TransactionReply::Gone);
        }
        if tx.base_generation != state.generation
            || Self::take_failure(&state, &Failure::CommitConflict)
        {
            return Ok(TransactionReply::Conflict);
        }
        state.live = tx.working;
        state.generation += 1;
        for ag in &tx.touched {
            record_version(&mut state, ag);
        }
        Ok(TransactionReply::Ok { expires: None })
    }

    fn rollback_transaction(&self, location: &str) -> Result<TransactionReply, SyncError> {
        let mut state = self.lock();
        state.calls.rollback += 1;
        let ended = state.ended.contains(location);
        match state.transactions.remove(location) {
            Some(_) => {
                state.ended.insert(location.to_string());
                Ok(TransactionReply::Ok { expires: None })
            }
            None if ended => Ok(TransactionReply::Gone),
            None => Ok(TransactionReply::NotFound),
        }
    }
}

impl StorageLayer for MemoryRepository {
    fn versions(&self, object_path: &str) -> Result<Vec<VersionDescriptor>, SyncError> {
        Ok(self
            .lock()
            .versions
            .get(object_path.trim_matches('/'))
            .map(|vs| {
                vs.iter()
                    .map(|v| VersionDescriptor::labelled(v.label.clone(), v.created))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn origins(&self, object_path: &str, label: &str) -> Result<BTreeMap<String, String>, SyncError> {
        let object_path = object_path.trim_matches('/');
        let state = self.lock();
        let version = state
            .versions
            .get(object_path)
            .and_then(|vs| vs.iter().find(|v| v.label == label))
            .ok_or_else(|| SyncError::UnknownVersion {
                path: object_path.to_string(),
                selector: label.to_string(),
            })?;
        Ok(version
            .resources
            .iter()
            .filter(|(_, r)| r.kind == ResourceKind::Binary)
            .filter_map(|(path, _)| {
                let relative = path.strip_prefix(object_path)?.strip_prefix('/')?;
                Some((
                    relative.to_string(),
                    format!("s3://preservation/{object_path}/{label}/content/{relative}"),
                ))
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    checksum: Option<String>,
}

/// Objects keyed by (bucket, key), with store-side SHA-256 checksums.
#[derive(Debug)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    page_size: usize,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size: PAGE_SIZE,
        }
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<(String, String), StoredObject>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store `bytes`, recording their checksum as an upload would.
    pub fn insert(&self, bucket: &str, key: &str, bytes: &[u8]) {
        let checksum = if bytes.is_empty() && key.ends_with('/') {
            None
        } else {
            Some(checksum::sha256_base64(bytes))
        };
        self.lock().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                bytes: bytes.to_vec(),
                checksum,
            },
        );
    }

    /// Drop the recorded checksum, as for an object uploaded without one.
    pub fn forget_checksum(&self, bucket: &str, key: &str) {
        if let Some(object) = self.lock().get_mut(&(bucket.to_string(), key.to_string())) {
            object.checksum = None;
        }
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn list_page(&self, prefix: &Location, token: Option<&str>) -> Result<ListPage, SyncError> {
        let objects = self.lock();
        let mut page: Vec<ObjectSummary> = objects
            .iter()
            .filter(|((bucket, key), _)| {
                *bucket == prefix.bucket
                    && key.starts_with(&prefix.key)
                    && token.map_or(true, |t| key.as_str() > t)
            })
            .map(|((_, key), object)| ObjectSummary {
                key: key.clone(),
                size: object.bytes.len() as u64,
            })
            .take(self.page_size + 1)
            .collect();
        let next = if page.len() > self.page_size {
            page.truncate(self.page_size);
            page.last().map(|o| o.key.clone())
        } else {
            None
        };
        Ok(ListPage {
            objects: page,
            next,
        })
    }

    fn checksum(&self, object: &Location) -> Result<Option<String>, SyncError> {
        Ok(self
            .lock()
            .get(&(object.bucket.clone(), object.key.clone()))
            .and_then(|o| o.checksum.clone()))
    }

    fn get(&self, object: &Location) -> Result<Option<Vec<u8>>, SyncError> {
        Ok(self
            .lock()
            .get(&(object.bucket.clone(), object.key.clone()))
            .map(|o| o.bytes.clone()))
    }

    fn copy(&self, from: &Location, to: &Location) -> Result<(), SyncError> {
        let mut objects = self.lock();
        let object = objects
            .get(&(from.bucket.clone(), from.key.clone()))
            .cloned()
            .ok_or_else(|| SyncError::SourceObjectMissing {
                origin: from.to_string(),
            })?;
        objects.insert((to.bucket.clone(), to.key.clone()), object);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> RequestOptions {
        RequestOptions::new()
    }

    #[test]
    fn object_store_pages_through_prefix() {
        let store = MemoryObjectStore::with_page_size(2);
        for i in 0..5 {
            store.insert("b", &format!("dep/f{i}"), b"x");
        }
        store.insert("b", "elsewhere", b"x");
        let prefix = Location::parse("s3://b/dep/").unwrap();
        let first = store.list_page(&prefix, None).unwrap();
        assert_eq!(first.objects.len(), 2);
        assert!(first.next.is_some());
        assert_eq!(store.list_all(&prefix).unwrap().len(), 5);
    }

    #[test]
    fn transaction_changes_are_invisible_until_commit() {
        let repo = MemoryRepository::new();
        let tx = repo.begin_transaction().unwrap();
        let in_tx = opts().in_transaction(Some(&tx.location));
        repo.create_container("", &in_tx.clone().slug("col")).unwrap();
        assert!(!repo.exists("col"));
        assert_eq!(repo.kind_of("col", &in_tx).unwrap(), Some(ResourceKind::Container));
        assert_eq!(
            repo.commit_transaction(&tx.location).unwrap(),
            TransactionReply::Ok { expires: None }
        );
        assert!(repo.exists("col"));
        assert_eq!(repo.commit_transaction(&tx.location).unwrap(), TransactionReply::Gone);
    }

    #[test]
    fn commits_to_archival_groups_record_versions() {
        let repo = MemoryRepository::new();
        repo.create_container("", &opts().slug("obj").title("Obj").archival_group())
            .unwrap();
        let tx = repo.begin_transaction().unwrap();
        let in_tx = opts().in_transaction(Some(&tx.location));
        repo.put_binary("obj/a.txt", b"a", &in_tx.clone().file_name("a.txt"))
            .unwrap();
        repo.commit_transaction(&tx.location).unwrap();

        let mementos = repo.mementos("obj").unwrap();
        assert_eq!(mementos.len(), 2);
        let labels: Vec<_> = StorageLayer::versions(&repo, "obj")
            .unwrap()
            .into_iter()
            .map(|v| (v.label.unwrap_or_default(), v.memento))
            .collect();
        assert_eq!(labels[0].0, "v1");
        assert_eq!(labels[1].1, mementos[1]);
    }

    #[test]
    fn delete_leaves_tombstone() {
        let repo = MemoryRepository::new();
        repo.create_container("", &opts().slug("obj").archival_group()).unwrap();
        repo.put_binary("obj/a.txt", b"a", &opts()).unwrap();
        repo.delete("obj/a.txt", &opts()).unwrap();
        assert_eq!(repo.put_binary("obj/a.txt", b"b", &opts()).unwrap(), PutOutcome::Tombstoned);
        assert_eq!(
            repo.put_binary("obj/a.txt", b"b", &opts().overwrite_tombstone()).unwrap(),
            PutOutcome::Stored
        );
    }

    #[test]
    fn ended_transactions_answer_gone_and_unknown_ones_not_found() {
        let repo = MemoryRepository::new();
        let tx = repo.begin_transaction().unwrap();
        assert!(matches!(
            repo.renew_transaction(&tx.location).unwrap(),
            TransactionReply::Ok { expires: Some(_) }
        ));
        repo.rollback_transaction(&tx.location).unwrap();
        assert_eq!(repo.renew_transaction(&tx.location).unwrap(), TransactionReply::Gone);
        assert_eq!(repo.rollback_transaction(&tx.location).unwrap(), TransactionReply::Gone);
        assert_eq!(repo.renew_transaction("tx/unknown").unwrap(), TransactionReply::NotFound);
    }

    #[test]
    fn concurrent_commit_conflicts() {
        let repo = MemoryRepository::new();
        let tx = repo.begin_transaction().unwrap();
        repo.create_container("", &opts().slug("other")).unwrap();
        assert_eq!(repo.commit_transaction(&tx.location).unwrap(), TransactionReply::Conflict);
    }

    #[test]
    fn contained_descriptions_list_direct_children() {
        let repo = MemoryRepository::new();
        repo.create_container("", &opts().slug("obj").archival_group()).unwrap();
        repo.create_container("obj", &opts().slug("sub")).unwrap();
        repo.put_binary("obj/sub/a.txt", b"a", &opts()).unwrap();
        let body = repo
            .describe("obj", &opts().contained_descriptions())
            .unwrap()
            .expect("exists");
        let graph = body["@graph"].as_array().unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph[0]["contains"][0], json!(format!("{MEMORY_BASE_URI}/obj/sub")));
    }
}
