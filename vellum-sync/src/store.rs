//! Object-store access.
//!
//! Staged deposits and the OCFL storage root are addressed by [`Location`]s
//! (`s3://bucket/key/prefix`, `file:///abs/path`). The engine reads them
//! through the [`ObjectStore`] trait; [`FsObjectStore`] serves both schemes
//! from the local filesystem, with one directory per bucket. Its checksums
//! live in `<key>.sha256` sidecar files holding the base64 SHA-256, the
//! filesystem stand-in for an object store's checksum metadata.

use std::fmt;
use std::path::{Path, PathBuf};

use vellum_core::StorageKind;

use crate::checksum;
use crate::error::{io_err, SyncError};

/// Keys returned per listing page.
pub const PAGE_SIZE: usize = 1000;

/// Suffix of the checksum sidecar next to each filesystem object.
pub const CHECKSUM_SUFFIX: &str = ".sha256";

// ---------------------------------------------------------------------------
// 1. Locations
// ---------------------------------------------------------------------------

/// A bucket plus key (or key prefix) in an object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub kind: StorageKind,
    /// Empty for `file://` locations.
    pub bucket: String,
    pub key: String,
}

impl Location {
    pub fn parse(uri: &str) -> Result<Self, SyncError> {
        let invalid = |reason: &str| SyncError::InvalidLocation {
            location: uri.to_string(),
            reason: reason.to_string(),
        };
        if let Some(rest) = uri.strip_prefix("s3://") {
            let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
            if bucket.is_empty() {
                return Err(invalid("missing bucket"));
            }
            Ok(Self {
                kind: StorageKind::S3,
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
        } else if let Some(path) = uri.strip_prefix("file://") {
            if !path.starts_with('/') {
                return Err(invalid("file locations must be absolute"));
            }
            Ok(Self {
                kind: StorageKind::FileSystem,
                bucket: String::new(),
                key: path.trim_start_matches('/').to_string(),
            })
        } else {
            Err(invalid("expected an s3:// or file:// location"))
        }
    }

    /// The key as a listing prefix: `"a/b"` → `"a/b/"`, `""` → `""`.
    pub fn prefix(&self) -> String {
        let trimmed = self.key.trim_end_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed}/")
        }
    }

    /// Same bucket, another key.
    pub fn with_key(&self, key: impl Into<String>) -> Self {
        Self {
            kind: self.kind,
            bucket: self.bucket.clone(),
            key: key.into(),
        }
    }

    /// A key below this location's prefix.
    pub fn child(&self, relative: &str) -> Self {
        self.with_key(format!("{}{}", self.prefix(), relative.trim_start_matches('/')))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StorageKind::S3 => write!(f, "s3://{}/{}", self.bucket, self.key),
            StorageKind::FileSystem => write!(f, "file:///{}", self.key),
        }
    }
}

// ---------------------------------------------------------------------------
// 2. The store seam
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    /// Continuation token for the next page, `None` on the last page.
    pub next: Option<String>,
}

pub trait ObjectStore: Send + Sync {
    /// One page of the objects whose keys start with `prefix.key`.
    fn list_page(&self, prefix: &Location, token: Option<&str>) -> Result<ListPage, SyncError>;

    /// The store-recorded SHA-256 of an object, base64-encoded.
    fn checksum(&self, object: &Location) -> Result<Option<String>, SyncError>;

    /// The object's bytes, `None` when absent.
    fn get(&self, object: &Location) -> Result<Option<Vec<u8>>, SyncError>;

    fn copy(&self, from: &Location, to: &Location) -> Result<(), SyncError>;

    /// Every object under `prefix`, following continuation tokens.
    fn list_all(&self, prefix: &Location) -> Result<Vec<ObjectSummary>, SyncError> {
        let mut out = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.list_page(prefix, token.as_deref())?;
            out.extend(page.objects);
            match page.next {
                Some(next) => token = Some(next),
                None => return Ok(out),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Filesystem store
// ---------------------------------------------------------------------------

/// Buckets are directories below `root`; `file://` keys are absolute paths.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        if bucket.is_empty() {
            PathBuf::from("/")
        } else {
            self.root.join(bucket)
        }
    }

    fn resolve(&self, location: &Location) -> PathBuf {
        self.bucket_dir(&location.bucket).join(&location.key)
    }

    fn sidecar(&self, location: &Location) -> PathBuf {
        let mut path = self.resolve(location).into_os_string();
        path.push(CHECKSUM_SUFFIX);
        PathBuf::from(path)
    }

    /// Hash the object's bytes and write its checksum sidecar.
    pub fn record_checksum(&self, object: &Location) -> Result<(), SyncError> {
        let path = self.resolve(object);
        let hex = checksum::sha256_file(&path)?;
        let b64 = checksum::hex_to_base64(&hex)?;
        let sidecar = self.sidecar(object);
        std::fs::write(&sidecar, format!("{b64}\n")).map_err(|e| io_err(&sidecar, e))
    }

    /// Every object under `prefix`, sorted by key, from a single walk.
    fn listing(&self, prefix: &Location) -> Result<Vec<ObjectSummary>, SyncError> {
        let base = self.bucket_dir(&prefix.bucket);
        let start_dir = match prefix.key.rsplit_once('/') {
            Some((dir, _)) => base.join(dir),
            None => base.clone(),
        };
        let mut all = Vec::new();
        walk(&start_dir, &base, &mut all)?;
        all.retain(|o| o.key.starts_with(&prefix.key));
        all.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(all)
    }
}

fn walk(dir: &Path, base: &Path, out: &mut Vec<ObjectSummary>) -> Result<(), SyncError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_err(dir, e)),
    };
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        let meta = entry.metadata().map_err(|e| io_err(&path, e))?;
        if meta.is_dir() {
            walk(&path, base, out)?;
            continue;
        }
        let Ok(relative) = path.strip_prefix(base) else {
            continue;
        };
        let Some(key) = relative.to_str().map(str::to_string) else {
            return Err(SyncError::InvalidPath {
                path: relative.to_string_lossy().into_owned(),
            });
        };
        if key.ends_with(CHECKSUM_SUFFIX) {
            continue;
        }
        out.push(ObjectSummary {
            key,
            size: meta.len(),
        });
    }
    Ok(())
}

/// The page of `all` that follows `token`.
fn page_after(mut all: Vec<ObjectSummary>, token: Option<&str>) -> ListPage {
    if let Some(after) = token {
        all.retain(|o| o.key.as_str() > after);
    }
    let next = if all.len() > PAGE_SIZE {
        all.truncate(PAGE_SIZE);
        all.last().map(|o| o.key.clone())
    } else {
        None
    };
    ListPage { objects: all, next }
}

impl ObjectStore for FsObjectStore {
    fn list_page(&self, prefix: &Location, token: Option<&str>) -> Result<ListPage, SyncError> {
        Ok(page_after(self.listing(prefix)?, token))
    }

    fn list_all(&self, prefix: &Location) -> Result<Vec<ObjectSummary>, SyncError> {
        self.listing(prefix)
    }

    fn checksum(&self, object: &Location) -> Result<Option<String>, SyncError> {
        let sidecar = self.sidecar(object);
        match std::fs::read_to_string(&sidecar) {
            Ok(b64) if !b64.trim().is_empty() => Ok(Some(b64.trim().to_string())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(sidecar, e)),
        }
    }

    fn get(&self, object: &Location) -> Result<Option<Vec<u8>>, SyncError> {
        let path = self.resolve(object);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(path, e)),
        }
    }

    fn copy(&self, from: &Location, to: &Location) -> Result<(), SyncError> {
        let src = self.resolve(from);
        let dst = self.resolve(to);
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        std::fs::copy(&src, &dst).map_err(|e| io_err(&src, e))?;
        self.record_checksum(to)
    }
}
