use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::Instant;

use vellum_core::changeset::{JobError, JobStatus};
use vellum_core::jobs::{list_jobs_at, load_job_at, save_job_at};
use vellum_core::{config, JobId, JobRecord};
use vellum_sync::Engine;

use crate::error::{io_err, DaemonError};
use crate::paths::{jobs_dir, socket_path, vellum_root};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Counters reported by `status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStats {
    pub processed: u64,
    pub failed: u64,
    pub current: Option<String>,
    pub last_finished_at_unix: u64,
}

/// Everything a socket client handler needs.
#[derive(Clone)]
struct SocketContext {
    home: PathBuf,
    engine: Engine,
    queue: mpsc::Sender<JobId>,
    capacity: usize,
    stats: Arc<RwLock<WorkerStats>>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
}

/// Start the daemon runtime and block the current thread until it exits.
///
/// Settings are resolved once here and handed to the engine.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let settings = config::load_settings_at(home)?;
    let engine = Engine::from_settings(home, &settings)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), engine))
}

/// Run the daemon runtime: one worker draining a bounded queue, plus the
/// socket server and the ctrl-c handler.
pub async fn run(home: PathBuf, engine: Engine) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let capacity = engine.settings().queue_capacity.max(1);
    let (queue_tx, queue_rx) = mpsc::channel::<JobId>(capacity);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let stats = Arc::new(RwLock::new(WorkerStats::default()));
    let started_at_unix = unix_seconds_now();

    let recovered = recover_jobs(&home)?;
    if !recovered.is_empty() {
        tracing::info!(jobs = recovered.len(), "re-enqueueing waiting jobs");
    }
    let feeder_handle = {
        let queue = queue_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(feed_recovered(queue, recovered, shutdown_rx))
    };

    let worker_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let engine = engine.clone();
        let stats = stats.clone();
        tokio::spawn(async move {
            let result = worker_task(home, engine, stats, queue_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let context = SocketContext {
            home: home.clone(),
            engine,
            queue: queue_tx,
            capacity,
            stats,
            shutdown_tx: shutdown.clone(),
            started_at_unix,
        };
        tokio::spawn(async move {
            let result = socket_server_task(context, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (worker_result, socket_result, signal_result, feeder_result) =
        tokio::join!(worker_handle, socket_handle, signal_handle, feeder_handle);

    handle_join("worker", worker_result)?;
    handle_join("recovery_feeder", feeder_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// 1. Worker
// ---------------------------------------------------------------------------

/// The single consumer. A dequeued job always runs to completion; shutdown
/// only abandons jobs still waiting in the queue (they stay `waiting` on disk
/// and are picked up again on the next start).
async fn worker_task(
    home: PathBuf,
    engine: Engine,
    stats: Arc<RwLock<WorkerStats>>,
    mut queue_rx: mpsc::Receiver<JobId>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_id = queue_rx.recv() => {
                let Some(id) = maybe_id else { break };
                process_job(&home, &engine, &stats, id).await?;
            }
        }
    }
    Ok(())
}

async fn process_job(
    home: &Path,
    engine: &Engine,
    stats: &Arc<RwLock<WorkerStats>>,
    id: JobId,
) -> Result<(), DaemonError> {
    stats.write().await.current = Some(id.0.clone());
    let started = Instant::now();

    let outcome = {
        let home = home.to_path_buf();
        let engine = engine.clone();
        let id = id.clone();
        tokio::task::spawn_blocking(move || execute_job_blocking(&home, &engine, &id))
            .await
            .map_err(|err| DaemonError::Protocol(format!("job task join error: {err}")))?
    };

    let mut stats = stats.write().await;
    stats.current = None;
    stats.last_finished_at_unix = unix_seconds_now();
    match outcome {
        Ok(record) => {
            stats.processed += 1;
            if record.status == JobStatus::CompletedWithErrors {
                stats.failed += 1;
            }
            tracing::info!(
                job_id = %record.id,
                status = %record.status,
                errors = record.errors().len(),
                duration_ms = started.elapsed().as_millis() as u64,
                "job finished",
            );
        }
        // A broken job record must not stop the queue.
        Err(err) => {
            stats.failed += 1;
            tracing::error!(job_id = %id, error = %err, "job could not be processed");
        }
    }
    Ok(())
}

fn execute_job_blocking(home: &Path, engine: &Engine, id: &JobId) -> Result<JobRecord, DaemonError> {
    let mut record = load_job_at(home, id)?;
    if record.status != JobStatus::Waiting {
        tracing::warn!(job_id = %id, status = %record.status, "skipping job that is not waiting");
        return Ok(record);
    }
    record.set_status(JobStatus::Running);
    save_job_at(home, &record)?;

    engine.run_job(&mut record);
    save_job_at(home, &record)?;
    Ok(record)
}

/// Close out jobs a previous process left `running` and return the ids of
/// persisted `waiting` jobs, oldest first.
fn recover_jobs(home: &Path) -> Result<Vec<JobId>, DaemonError> {
    let mut waiting = Vec::new();
    for mut record in list_jobs_at(home)? {
        match record.status {
            JobStatus::Waiting => waiting.push(record.id.clone()),
            JobStatus::Running => {
                tracing::warn!(job_id = %record.id, "job was interrupted while running");
                record.changeset.errors.push(JobError {
                    category: "transaction".to_string(),
                    message: "interrupted by daemon shutdown; the transaction was not committed"
                        .to_string(),
                });
                record.finish();
                save_job_at(home, &record)?;
            }
            JobStatus::Completed | JobStatus::CompletedWithErrors => {}
        }
    }
    Ok(waiting)
}

/// Push recovered jobs onto the queue, waiting for a free slot each time,
/// so a backlog larger than the queue still drains in this process.
async fn feed_recovered(
    queue: mpsc::Sender<JobId>,
    ids: Vec<JobId>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    for id in ids {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            sent = queue.send(id) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 2. Socket server
// ---------------------------------------------------------------------------

async fn socket_server_task(
    context: SocketContext,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&context.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "daemon listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let context = context.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, context).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(stream: UnixStream, context: SocketContext) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let cmd = request.cmd.clone();
        let response = match cmd.as_str() {
            "status" => DaemonResponse::ok(build_status_payload(&context).await),
            "diff" => handle_diff(&context, request).await?,
            "submit" => handle_submit(&context, request).await?,
            "poll" => handle_poll(&context, request),
            "stop" => {
                let _ = context.shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn handle_diff(
    context: &SocketContext,
    request: DaemonRequest,
) -> Result<DaemonResponse, DaemonError> {
    let (Some(target), Some(source)) = (request.target, request.source) else {
        return Ok(DaemonResponse::error("diff requires 'target' and 'source'"));
    };
    let engine = context.engine.clone();
    let name = request.name;
    let result = tokio::task::spawn_blocking(move || {
        engine.generate_diff(&target, &source, name.as_deref())
    })
    .await
    .map_err(|err| DaemonError::Protocol(format!("diff task join error: {err}")))?;

    Ok(match result {
        Ok(changeset) => DaemonResponse::ok(serde_json::to_value(&changeset)?),
        Err(err) => DaemonResponse::failure(&err),
    })
}

/// Validate, persist as `waiting`, then enqueue. A rejected submission
/// leaves nothing on disk and nothing in the queue.
async fn handle_submit(
    context: &SocketContext,
    request: DaemonRequest,
) -> Result<DaemonResponse, DaemonError> {
    let Some(changeset) = request.changeset else {
        return Ok(DaemonResponse::error("submit requires 'changeset'"));
    };
    let mut changeset = *changeset;

    let engine = context.engine.clone();
    let (checked, validation) = tokio::task::spawn_blocking(move || {
        let validation = engine.validate_for_submit(&changeset);
        (changeset, validation)
    })
    .await
    .map_err(|err| DaemonError::Protocol(format!("submit task join error: {err}")))?;
    changeset = checked;
    if let Err(err) = validation {
        tracing::warn!(path = %changeset.object_path, error = %err, "submission rejected");
        return Ok(DaemonResponse::failure(&err));
    }

    let permit = match context.queue.try_reserve() {
        Ok(permit) => permit,
        Err(TrySendError::Full(())) => {
            let err = DaemonError::QueueFull {
                capacity: context.capacity,
            };
            return Ok(DaemonResponse::error(err.to_string()));
        }
        Err(TrySendError::Closed(())) => return Err(DaemonError::ChannelClosed("job queue")),
    };

    changeset.clear_results();
    let record = JobRecord::waiting(changeset);
    save_job_at(&context.home, &record)?;
    permit.send(record.id.clone());
    tracing::info!(
        job_id = %record.id,
        path = %record.changeset.object_path,
        operations = record.changeset.operation_count(),
        "job submitted",
    );

    Ok(DaemonResponse::ok(json!({
        "job_id": record.id.0,
        "status": record.status.to_string(),
    })))
}

fn handle_poll(context: &SocketContext, request: DaemonRequest) -> DaemonResponse {
    let Some(job_id) = request.job_id else {
        return DaemonResponse::error("poll requires 'job_id'");
    };
    match load_job_at(&context.home, &JobId::from(job_id)) {
        Ok(record) => match serde_json::to_value(&record) {
            Ok(value) => DaemonResponse::ok(value),
            Err(err) => DaemonResponse::error(err.to_string()),
        },
        Err(err) => DaemonResponse::error(err.to_string()),
    }
}

async fn build_status_payload(context: &SocketContext) -> Value {
    let stats = context.stats.read().await.clone();
    let queued = context.capacity.saturating_sub(context.queue.capacity());

    json!({
        "running": true,
        "started_at_unix": context.started_at_unix,
        "queue_capacity": context.capacity,
        "queued": queued,
        "current_job": stats.current,
        "processed": stats.processed,
        "failed": stats.failed,
        "last_finished_at_unix": stats.last_finished_at_unix,
        "repository_url": context.engine.settings().repository_url,
        "socket": socket_path(&context.home).display().to_string(),
        "jobs_dir": jobs_dir(&context.home).display().to_string(),
    })
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [vellum_root(home), jobs_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
