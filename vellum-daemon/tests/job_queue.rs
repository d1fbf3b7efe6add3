//! The daemon over a real socket, backed by the in-memory repository.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use vellum_core::jobs::save_job_at;
use vellum_core::{JobRecord, JobStatus, Settings};
use vellum_daemon::paths::socket_path;
use vellum_daemon::{
    request_diff, request_poll, request_status, request_stop, request_submit, run, DaemonError,
};
use vellum_sync::memory::{MemoryObjectStore, MemoryRepository};
use vellum_sync::{Engine, Repository, RequestOptions};

struct Running {
    home: TempDir,
    repo: Arc<MemoryRepository>,
    store: Arc<MemoryObjectStore>,
    daemon: tokio::task::JoinHandle<Result<(), DaemonError>>,
}

async fn start_daemon() -> Running {
    start_daemon_with(Settings::default(), |_, _, _| {}).await
}

/// Start a daemon after `prepare` has staged content or saved job records.
async fn start_daemon_with<F>(settings: Settings, prepare: F) -> Running
where
    F: FnOnce(&Path, &MemoryObjectStore, &Engine),
{
    let home = TempDir::new().expect("home");
    let repo = Arc::new(MemoryRepository::new());
    repo.create_container("", &RequestOptions::new().slug("col").title("Collection"))
        .expect("collection");
    let store = Arc::new(MemoryObjectStore::new());
    let engine = Engine::new(repo.clone(), store.clone(), repo.clone(), settings);
    prepare(home.path(), &store, &engine);

    let daemon = tokio::spawn(run(home.path().to_path_buf(), engine));
    let socket = socket_path(home.path());
    for _ in 0..100 {
        if socket.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(socket.exists(), "daemon socket never appeared");
    Running {
        home,
        repo,
        store,
        daemon,
    }
}

/// Run a blocking client call off the runtime threads.
async fn client<T, F>(home: &Path, call: F) -> T
where
    T: Send + 'static,
    F: FnOnce(PathBuf) -> T + Send + 'static,
{
    let home = home.to_path_buf();
    tokio::task::spawn_blocking(move || call(home))
        .await
        .expect("client task")
}

async fn wait_for_terminal(home: &Path, job_id: &str) -> JobRecord {
    for _ in 0..200 {
        let id = job_id.to_string();
        let record = client(home, move |h| request_poll(&h, &id))
            .await
            .expect("poll");
        if record.status.is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {job_id} never finished");
}

async fn shut_down(running: Running) {
    client(running.home.path(), |h| request_stop(&h))
        .await
        .expect("stop");
    running
        .daemon
        .await
        .expect("daemon task")
        .expect("daemon exits cleanly");
    assert!(!socket_path(running.home.path()).exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn diff_submit_and_poll_to_completion() {
    let running = start_daemon().await;
    running.store.insert("staging", "dep1/a.txt", b"ay");
    running.store.insert("staging", "dep1/sub/b.txt", b"bee");

    let changeset = client(running.home.path(), |h| {
        request_diff(&h, "col/ms", "s3://staging/dep1/", Some("Manuscript"))
    })
    .await
    .expect("diff");
    assert_eq!(changeset.files_to_add.len(), 2);
    assert!(!running.repo.exists("col/ms"), "diff must not mutate");

    let handle = client(running.home.path(), move |h| request_submit(&h, changeset))
        .await
        .expect("submit");
    assert_eq!(handle["status"], "waiting");
    let job_id = handle["job_id"].as_str().expect("job id").to_string();

    let record = wait_for_terminal(running.home.path(), &job_id).await;
    assert_eq!(record.status, JobStatus::Completed);
    assert!(record.errors().is_empty());
    assert_eq!(record.changeset.files_added.len(), 2);
    assert_eq!(
        record
            .changeset
            .new_version
            .as_ref()
            .and_then(|v| v.label.as_deref()),
        Some("v1")
    );
    assert!(running.repo.exists("col/ms/sub/b.txt"));

    // The record is saved before the worker's counters move.
    let mut status = serde_json::Value::Null;
    for _ in 0..100 {
        status = client(running.home.path(), |h| request_status(&h))
            .await
            .expect("status");
        if status["processed"] == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status["running"], true);
    assert_eq!(status["processed"], 1);
    assert_eq!(status["failed"], 0);

    shut_down(running).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_submission_is_rejected_without_queueing() {
    let running = start_daemon().await;
    running.store.insert("staging", "dep1/a.txt", b"ay");

    let mut changeset = client(running.home.path(), |h| {
        request_diff(&h, "col/ms", "s3://staging/dep1/", Some("Manuscript"))
    })
    .await
    .expect("diff");
    changeset.object_name = None;

    let err = client(running.home.path(), move |h| request_submit(&h, changeset))
        .await
        .expect_err("missing name is rejected");
    assert!(err.to_string().contains("validation"), "{err}");

    let jobs = vellum_core::jobs::list_jobs_at(running.home.path()).expect("list");
    assert!(jobs.is_empty(), "nothing persisted for a rejected submission");

    shut_down(running).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_job_is_recorded_with_errors() {
    let running = start_daemon().await;
    running.store.insert("staging", "dep1/a.txt", b"ay");

    let mut changeset = client(running.home.path(), |h| {
        request_diff(&h, "col/ms", "s3://staging/dep1/", Some("Manuscript"))
    })
    .await
    .expect("diff");
    // Points at content that is not in the store.
    changeset.files_to_add[0].origin = "s3://staging/dep1/gone.txt".into();

    let handle = client(running.home.path(), move |h| request_submit(&h, changeset))
        .await
        .expect("submit");
    let job_id = handle["job_id"].as_str().expect("job id").to_string();

    let record = wait_for_terminal(running.home.path(), &job_id).await;
    assert_eq!(record.status, JobStatus::CompletedWithErrors);
    assert_eq!(record.errors().len(), 1);
    assert!(!running.repo.exists("col/ms"), "failed job leaves no object");
    assert_eq!(running.repo.active_transactions(), 0);

    shut_down(running).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_job_and_unknown_command_are_errors() {
    let running = start_daemon().await;

    let err = client(running.home.path(), |h| request_poll(&h, "nope"))
        .await
        .expect_err("unknown job");
    assert!(err.to_string().contains("nope"), "{err}");

    let response = client(running.home.path(), |h| {
        vellum_daemon::send_request(&h, &vellum_daemon::DaemonRequest::new("frobnicate"))
    })
    .await
    .expect("response");
    assert!(!response.ok);
    assert!(response
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("unknown command"));

    shut_down(running).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn waiting_backlog_larger_than_the_queue_all_runs_on_startup() {
    let settings = Settings {
        queue_capacity: 1,
        ..Settings::default()
    };
    let mut ids = Vec::new();
    let running = start_daemon_with(settings, |home, store, engine| {
        for slug in ["a", "b", "c"] {
            store.insert("staging", &format!("{slug}/file.txt"), slug.as_bytes());
            let changeset = engine
                .generate_diff(
                    &format!("col/{slug}"),
                    &format!("s3://staging/{slug}/"),
                    Some("Object"),
                )
                .expect("diff");
            let record = JobRecord::waiting(changeset);
            save_job_at(home, &record).expect("save");
            ids.push(record.id.0.clone());
        }
    })
    .await;

    for id in &ids {
        let record = wait_for_terminal(running.home.path(), id).await;
        assert_eq!(record.status, JobStatus::Completed, "{id}");
    }
    for slug in ["a", "b", "c"] {
        assert!(running.repo.exists(&format!("col/{slug}/file.txt")));
    }

    shut_down(running).await;
}
