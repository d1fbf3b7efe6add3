use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

use vellum_core::changeset::StorageKind;
use vellum_core::jobs::save_job_at;
use vellum_core::{BinaryFile, Changeset, JobError, JobRecord, JobStatus};

/// Nothing listens on the discard port.
const UNREACHABLE_REPOSITORY: &str = "http://127.0.0.1:9/rest";

fn vellum_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vellum"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("VELLUM_REPOSITORY_URL", UNREACHABLE_REPOSITORY);
    cmd
}

fn sample_changeset() -> Changeset {
    let mut changeset = Changeset::new(
        "s3://staging/dep1/",
        StorageKind::S3,
        "col/ms",
        chrono::Utc::now(),
    );
    changeset.object_name = Some("Manuscript".into());
    changeset.files_to_add.push(BinaryFile {
        path: "a.txt".into(),
        parent: "col/ms".into(),
        name: "a.txt".into(),
        content_type: "text/plain".into(),
        digest: Some("0a1b2c3d4e5f".repeat(5) + "0a1b"),
        origin: "s3://staging/dep1/a.txt".into(),
    });
    changeset
}

#[test]
fn job_list_is_empty_on_a_fresh_home() {
    let home = TempDir::new().expect("home");
    vellum_cmd(home.path())
        .args(["job", "list"])
        .assert()
        .success()
        .stdout(contains("No jobs submitted yet."));
}

#[test]
fn job_show_reads_the_record_when_daemon_is_down() {
    let home = TempDir::new().expect("home");
    let mut record = JobRecord::waiting(sample_changeset());
    record.changeset.errors.push(JobError {
        category: "transaction".into(),
        message: "commit conflict on col/ms".into(),
    });
    record.set_status(JobStatus::CompletedWithErrors);
    save_job_at(home.path(), &record).expect("save");

    vellum_cmd(home.path())
        .args(["job", "show", &record.id.0])
        .assert()
        .success()
        .stdout(contains(record.id.0.as_str()))
        .stdout(contains("completed-with-errors"))
        .stdout(contains("commit conflict on col/ms"));

    let output = vellum_cmd(home.path())
        .args(["job", "list", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let listed: Vec<JobRecord> = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(listed, vec![record]);
}

#[test]
fn job_show_unknown_id_fails() {
    let home = TempDir::new().expect("home");
    vellum_cmd(home.path())
        .args(["job", "show", "does-not-exist"])
        .assert()
        .failure()
        .stderr(contains("job not found: does-not-exist"));
}

#[test]
fn submit_requires_a_running_daemon() {
    let home = TempDir::new().expect("home");
    let file = home.path().join("changeset.json");
    fs::write(&file, serde_json::to_string(&sample_changeset()).expect("encode")).expect("write");

    vellum_cmd(home.path())
        .arg("submit")
        .arg(&file)
        .assert()
        .failure()
        .stderr(contains("daemon is not running"));
}

#[test]
fn submit_rejects_a_file_that_is_not_a_changeset() {
    let home = TempDir::new().expect("home");
    let file = home.path().join("changeset.json");
    fs::write(&file, r#"{"hello":"world"}"#).expect("write");

    vellum_cmd(home.path())
        .arg("submit")
        .arg(&file)
        .assert()
        .failure()
        .stderr(contains("is not a changeset"));
}

#[test]
fn daemon_status_and_stop_when_not_running() {
    let home = TempDir::new().expect("home");
    vellum_cmd(home.path())
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(contains(r#""running": false"#));
    vellum_cmd(home.path())
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(contains("daemon is not running"));
}

#[test]
fn diff_against_unreachable_repository_reports_the_target() {
    let home = TempDir::new().expect("home");
    vellum_cmd(home.path())
        .args(["diff", "col/ms", "--source", "s3://staging/dep1/"])
        .assert()
        .failure()
        .stderr(contains("diff failed for 'col/ms'"));
}

#[test]
fn export_against_unreachable_repository_fails() {
    let home = TempDir::new().expect("home");
    vellum_cmd(home.path())
        .args(["export", "col/ms", "--to", "s3://staging/out/"])
        .assert()
        .failure()
        .stderr(contains("export failed for 'col/ms'"));
}

#[test]
fn malformed_config_is_reported_with_its_path() {
    let home = TempDir::new().expect("home");
    fs::create_dir_all(home.path().join(".vellum")).expect("mkdir");
    fs::write(home.path().join(".vellum").join("config.yaml"), "queue_capacity: [nope").expect("write");

    vellum_cmd(home.path())
        .args(["show", "col/ms"])
        .assert()
        .failure()
        .stderr(contains("config.yaml"));
}

#[test]
fn run_needs_a_source_or_a_changeset() {
    let home = TempDir::new().expect("home");
    vellum_cmd(home.path()).arg("run").assert().failure();
}

fn file_location(dir: &Path) -> String {
    format!("file://{}/", dir.display())
}

#[test]
fn source_without_checksums_is_rejected_until_copied() {
    let home = TempDir::new().expect("home");
    let deposit = home.path().join("deposit");
    fs::create_dir_all(deposit.join("sub")).expect("mkdir");
    fs::write(deposit.join("a.txt"), b"ay").expect("write");
    fs::write(deposit.join("sub").join("b.txt"), b"bee").expect("write");

    vellum_cmd(home.path())
        .args(["source", &file_location(&deposit)])
        .assert()
        .failure()
        .stderr(contains("no SHA-256 checksum recorded"));

    let checked = home.path().join("checked");
    vellum_cmd(home.path())
        .args(["source", &file_location(&deposit), "--copy-to", &file_location(&checked)])
        .assert()
        .success()
        .stdout(contains("2 file(s) in 1 container(s)"));
    assert!(checked.join("sub").join("b.txt.sha256").exists());

    let output = vellum_cmd(home.path())
        .args(["source", &file_location(&checked), "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let tree: vellum_core::SourceTree = serde_json::from_slice(&output.stdout).expect("json");
    let files: Vec<_> = tree.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(files, vec!["a.txt", "sub/b.txt"]);
    assert!(tree.files.iter().all(|f| f.digest.as_ref().map(String::len) == Some(64)));
}

#[test]
fn container_create_checks_the_path_before_calling_the_repository() {
    let home = TempDir::new().expect("home");
    vellum_cmd(home.path())
        .args(["container", "create", "col/bad name"])
        .assert()
        .failure()
        .stderr(contains("invalid path 'col/bad name'"));
}

#[test]
fn container_commands_report_an_unreachable_repository() {
    let home = TempDir::new().expect("home");
    vellum_cmd(home.path())
        .args(["container", "create", "col/sub", "--name", "Sub collection"])
        .assert()
        .failure()
        .stderr(contains("failed to create container 'col/sub'"));
    vellum_cmd(home.path())
        .args(["container", "show", "col"])
        .assert()
        .failure()
        .stderr(contains("failed to browse 'col'"));
}
