//! Settings and job-record persistence integration tests.

use assert_fs::prelude::*;
use chrono::Utc;
use predicates::prelude::predicate;
use vellum_core::{
    config, jobs, Changeset, CoreError, JobError, JobRecord, JobStatus, StorageKind,
};

fn changeset() -> Changeset {
    let mut cs = Changeset::new("s3://staging/dep-7", StorageKind::S3, "col/ms-7", Utc::now());
    cs.object_name = Some("Manuscript 7".into());
    cs
}

// ---------------------------------------------------------------------------
// 1. Settings
// ---------------------------------------------------------------------------

#[test]
fn settings_file_in_dot_vellum_is_read() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".vellum/config.yaml")
        .write_str("storage_root: /srv/ocfl\nenrich_from_metadata: true\n")
        .expect("write");

    let settings = config::read_settings_file_at(home.path()).expect("read");
    assert_eq!(settings.storage_root, "/srv/ocfl");
    assert!(settings.enrich_from_metadata);
    assert_eq!(settings.metadata_file, "vellum.json");
}

#[test]
fn wrong_shape_settings_is_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".vellum/config.yaml")
        .write_str("- a list, not a mapping\n")
        .expect("write");

    let err = config::read_settings_file_at(home.path()).unwrap_err();
    assert!(matches!(err, CoreError::Settings { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Job records
// ---------------------------------------------------------------------------

#[test]
fn job_record_lands_under_jobs_dir() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let record = JobRecord::waiting(changeset());
    jobs::save_job_at(home.path(), &record).expect("save");

    home.child(format!(".vellum/jobs/{}.json", record.id))
        .assert(predicate::path::exists());
    home.child(format!(".vellum/jobs/{}.json", record.id))
        .assert(predicate::str::contains("\"status\": \"waiting\""));
}

#[test]
fn status_transitions_survive_reload() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut record = JobRecord::waiting(changeset());
    jobs::save_job_at(home.path(), &record).expect("save waiting");

    record.set_status(JobStatus::Running);
    jobs::save_job_at(home.path(), &record).expect("save running");

    record.changeset.errors.push(JobError {
        category: "integrity".into(),
        message: "digest mismatch".into(),
    });
    record.finish();
    jobs::save_job_at(home.path(), &record).expect("save finished");

    let loaded = jobs::load_job_at(home.path(), &record.id).expect("load");
    assert_eq!(loaded.status, JobStatus::CompletedWithErrors);
    assert_eq!(loaded.errors().len(), 1);
    assert_eq!(loaded.changeset.object_name.as_deref(), Some("Manuscript 7"));
}

#[test]
fn corrupt_job_record_reports_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".vellum/jobs/broken.json")
        .write_str("{ not json")
        .expect("write");

    let err = jobs::list_jobs_at(home.path()).unwrap_err();
    assert!(matches!(err, CoreError::JobRecord { .. }), "got: {err}");
    assert!(err.to_string().contains("broken.json"));
}
