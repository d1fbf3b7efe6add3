//! File-backed job records.
//!
//! # Storage layout
//!
//! ```text
//! ~/.vellum/
//!   jobs/
//!     <job_id>.json     (one record per submitted changeset: mode 0600)
//! ```
//!
//! Every function takes an explicit `home`; the daemon and the CLI resolve it
//! once at startup. Tests always pass a `TempDir`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::changeset::{Changeset, JobError, JobStatus};
use crate::error::{io_err, CoreError};
use crate::types::JobId;

/// A submitted changeset together with its lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub submitted: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub changeset: Changeset,
}

impl JobRecord {
    /// A fresh record in the `waiting` state.
    pub fn waiting(changeset: Changeset) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::generate(),
            status: JobStatus::Waiting,
            submitted: now,
            updated: now,
            changeset,
        }
    }

    pub fn set_status(&mut self, status: JobStatus) {
        self.status = status;
        self.updated = Utc::now();
    }

    /// Move to the terminal state implied by the changeset's error list.
    pub fn finish(&mut self) {
        let status = if self.changeset.errors.is_empty() {
            JobStatus::Completed
        } else {
            JobStatus::CompletedWithErrors
        };
        self.set_status(status);
    }

    pub fn errors(&self) -> &[JobError] {
        &self.changeset.errors
    }
}

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.vellum/jobs/`
pub fn jobs_dir_at(home: &Path) -> PathBuf {
    home.join(".vellum").join("jobs")
}

/// `<home>/.vellum/jobs/<id>.json`; pure, no I/O.
pub fn job_path_at(home: &Path, id: &JobId) -> PathBuf {
    jobs_dir_at(home).join(format!("{}.json", id.0))
}

// ---------------------------------------------------------------------------
// 2. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically write `record` to `<home>/.vellum/jobs/<id>.json`.
///
/// Write flow: serialize → `.json.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_job_at(home: &Path, record: &JobRecord) -> Result<(), CoreError> {
    let dir = jobs_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    let path = job_path_at(home, &record.id);
    let tmp_path = path.with_file_name(format!("{}.json.tmp", record.id.0));

    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(&tmp_path, json).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

pub fn load_job_at(home: &Path, id: &JobId) -> Result<JobRecord, CoreError> {
    let path = job_path_at(home, id);
    if !path.exists() {
        return Err(CoreError::JobNotFound { id: id.0.clone() });
    }
    read_record(&path)
}

/// Every stored record, oldest submission first.
///
/// Leftover `.tmp` files from an interrupted save are ignored, and a record
/// that cannot be read or parsed is logged and skipped.
pub fn list_jobs_at(home: &Path) -> Result<Vec<JobRecord>, CoreError> {
    let dir = jobs_dir_at(home);
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut records = Vec::new();
    for entry in std::fs::read_dir(&dir).map_err(|e| io_err(&dir, e))? {
        let entry = entry.map_err(|e| io_err(&dir, e))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match read_record(&path) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("skipping unreadable job record: {e}"),
        }
    }
    records.sort_by(|a, b| a.submitted.cmp(&b.submitted).then_with(|| a.id.cmp(&b.id)));
    Ok(records)
}

fn read_record(path: &Path) -> Result<JobRecord, CoreError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_json::from_str(&contents).map_err(|e| CoreError::JobRecord {
        path: path.to_path_buf(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::StorageKind;
    use tempfile::TempDir;

    fn record() -> JobRecord {
        JobRecord::waiting(Changeset::new(
            "s3://staging/dep",
            StorageKind::S3,
            "col/obj",
            Utc::now(),
        ))
    }

    #[test]
    fn save_then_load() {
        let home = TempDir::new().unwrap();
        let rec = record();
        save_job_at(home.path(), &rec).expect("save");
        let loaded = load_job_at(home.path(), &rec.id).expect("load");
        assert_eq!(loaded, rec);
    }

    #[test]
    fn atomic_write_cleans_up_tmp() {
        let home = TempDir::new().unwrap();
        let rec = record();
        save_job_at(home.path(), &rec).expect("save");
        let tmp = job_path_at(home.path(), &rec.id).with_extension("json.tmp");
        assert!(!tmp.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(job_path_at(home.path(), &rec.id))
                .unwrap()
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn missing_job_is_not_found() {
        let home = TempDir::new().unwrap();
        let err = load_job_at(home.path(), &JobId::from("nope")).unwrap_err();
        assert!(matches!(err, CoreError::JobNotFound { .. }));
    }

    #[test]
    fn finish_picks_status_from_errors() {
        let mut ok = record();
        ok.finish();
        assert_eq!(ok.status, JobStatus::Completed);

        let mut failed = record();
        failed.changeset.errors.push(JobError {
            category: "structural".into(),
            message: "no parent".into(),
        });
        failed.finish();
        assert_eq!(failed.status, JobStatus::CompletedWithErrors);
    }

    #[test]
    fn list_ignores_tmp_and_sorts_by_submission() {
        let home = TempDir::new().unwrap();
        let mut first = record();
        first.submitted = Utc::now() - chrono::Duration::seconds(30);
        let second = record();
        save_job_at(home.path(), &second).unwrap();
        save_job_at(home.path(), &first).unwrap();
        std::fs::write(jobs_dir_at(home.path()).join("junk.json.tmp"), "{").unwrap();

        let listed = list_jobs_at(home.path()).expect("list");
        let ids: Vec<_> = listed.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[test]
    fn list_skips_a_corrupt_record() {
        let home = TempDir::new().unwrap();
        let good = record();
        save_job_at(home.path(), &good).unwrap();
        std::fs::write(jobs_dir_at(home.path()).join("broken.json"), "{\"id\": ").unwrap();

        let listed = list_jobs_at(home.path()).expect("list survives a corrupt record");
        assert_eq!(listed, vec![good]);
        assert!(matches!(
            load_job_at(home.path(), &JobId::from("broken")),
            Err(CoreError::JobRecord { .. })
        ));
    }
}
