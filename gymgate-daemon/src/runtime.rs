use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};

use gymgate_core::{FileRegistry, GymgateConfig, OriginRegistry, ProxyConfig};
use gymgate_sync::{ReconcileOutcome, ReconcileSnapshot, Reconciler};

use crate::error::{io_err, DaemonError};
use crate::paths::{run_dir, socket_path};
use crate::protocol::{DaemonRequest, DaemonResponse, CMD_RECONCILE, CMD_STATUS, CMD_STOP};

/// Everything [`run_with`] needs; [`run`] builds it from `<home>/.gymgate`.
pub struct DaemonOptions<R> {
    pub home: PathBuf,
    pub registry: Arc<R>,
    pub proxy: ProxyConfig,
    /// In-process nudges from a supervisor sharing this runtime.
    pub change_feed: Option<mpsc::Receiver<()>>,
}

struct ReconcileJob {
    respond_to: oneshot::Sender<Result<ReconcileOutcome, String>>,
}

/// Static facts reported by `status`.
#[derive(Debug, Clone, Serialize)]
struct DaemonInfo {
    pid: u32,
    started_at_unix: u64,
    config_path: PathBuf,
    poll_interval_secs: u64,
    socket: PathBuf,
}

/// Start the daemon and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run against the file registry and config under `home`.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    let config = GymgateConfig::load_at(&home)?;
    let registry = Arc::new(FileRegistry::new(&home));
    run_with(DaemonOptions {
        home,
        registry,
        proxy: config.proxy,
        change_feed: None,
    })
    .await
}

pub async fn run_with<R>(options: DaemonOptions<R>) -> Result<(), DaemonError>
where
    R: OriginRegistry + Send + Sync + 'static,
{
    let DaemonOptions {
        home,
        registry,
        proxy,
        change_feed,
    } = options;
    ensure_runtime_dirs(&home)?;

    let reconciler = Reconciler::new(registry, &proxy)?;
    let snapshots = reconciler.subscribe();
    let info = DaemonInfo {
        pid: std::process::id(),
        started_at_unix: unix_seconds_now(),
        config_path: proxy.config_path.clone(),
        poll_interval_secs: proxy.poll_interval().as_secs(),
        socket: socket_path(&home),
    };
    tracing::info!(
        config = %info.config_path.display(),
        poll_secs = info.poll_interval_secs,
        socket = %info.socket.display(),
        "gymgate daemon starting"
    );

    let (job_tx, job_rx) = mpsc::channel::<ReconcileJob>(16);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let reconcile_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        let poll = proxy.poll_interval();
        tokio::spawn(async move {
            let result = reconcile_task(reconciler, poll, change_feed, job_rx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        let home = home.clone();
        tokio::spawn(async move {
            let result =
                socket_server_task(home, snapshots, info, job_tx, shutdown.clone(), shutdown_rx)
                    .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        tracing::info!("received ctrl-c, shutting down daemon");
                        let _ = shutdown.send(());
                        Ok(())
                    }
                    Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                },
            }
        })
    };

    let (reconcile_result, socket_result, signal_result) =
        tokio::join!(reconcile_handle, socket_handle, signal_handle);

    handle_join("reconciler", reconcile_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("gymgate daemon stopped");
    Ok(())
}

/// Startup resync, then poll ticks, change-feed nudges and socket requests.
///
/// Only this task touches the reconciler, so runs never overlap and a
/// shutdown waits for the run in flight.
async fn reconcile_task<R>(
    mut reconciler: Reconciler<R>,
    poll: Duration,
    mut change_feed: Option<mpsc::Receiver<()>>,
    mut jobs: mpsc::Receiver<ReconcileJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError>
where
    R: OriginRegistry + Send + Sync + 'static,
{
    if let Ok(outcome) = reconciler.resync().await {
        tracing::info!(?outcome, "startup resync complete");
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + poll, poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                // Failures are logged by the reconciler; the next tick retries.
                let _ = reconciler.reconcile().await;
            }
            nudge = next_nudge(&mut change_feed) => match nudge {
                Some(()) => {
                    tracing::debug!("change feed nudge");
                    let _ = reconciler.reconcile().await;
                }
                None => {
                    tracing::debug!("change feed closed; polling only");
                    change_feed = None;
                }
            },
            maybe_job = jobs.recv() => {
                let Some(job) = maybe_job else { break };
                let result = reconciler.resync().await.map_err(|err| err.to_string());
                let _ = job.respond_to.send(result);
            }
        }
    }

    Ok(())
}

async fn next_nudge(feed: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
    match feed {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn socket_server_task(
    home: PathBuf,
    snapshots: watch::Receiver<ReconcileSnapshot>,
    info: DaemonInfo,
    job_tx: mpsc::Sender<ReconcileJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let snapshots = snapshots.clone();
                let info = info.clone();
                let job_tx = job_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) =
                        handle_socket_client(stream, snapshots, info, job_tx, shutdown_tx).await
                    {
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

async fn handle_socket_client(
    stream: UnixStream,
    snapshots: watch::Receiver<ReconcileSnapshot>,
    info: DaemonInfo,
    job_tx: mpsc::Sender<ReconcileJob>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
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

        let response = match request.cmd.as_str() {
            CMD_STATUS => {
                let snapshot = snapshots.borrow().clone();
                DaemonResponse::ok(status_payload(&info, &snapshot))
            }
            CMD_RECONCILE => match request_resync(&job_tx).await {
                Ok(outcome) => DaemonResponse::ok(json!(outcome)),
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            CMD_STOP => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == CMD_STOP {
            break;
        }
    }

    Ok(())
}

fn status_payload(info: &DaemonInfo, snapshot: &ReconcileSnapshot) -> Value {
    json!({
        "running": true,
        "pid": info.pid,
        "started_at_unix": info.started_at_unix,
        "config_path": info.config_path,
        "poll_interval_secs": info.poll_interval_secs,
        "socket": info.socket,
        "reconciler": snapshot,
    })
}

async fn request_resync(job_tx: &mpsc::Sender<ReconcileJob>) -> Result<ReconcileOutcome, DaemonError> {
    let (respond_to, response) = oneshot::channel();
    job_tx
        .send(ReconcileJob { respond_to })
        .await
        .map_err(|_| DaemonError::ChannelClosed("reconcile queue"))?;
    response
        .await
        .map_err(|_| DaemonError::ChannelClosed("reconcile response"))?
        .map_err(DaemonError::Protocol)
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
    let run = run_dir(home);
    fs::create_dir_all(&run).map_err(|e| io_err(&run, e))
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let mut payload = serde_json::to_string(response)?;
    payload.push('\n');
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))
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

/// Install the fmt subscriber. `RUST_LOG` filters (default `info`);
/// `GYMGATE_LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("GYMGATE_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let _ = if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
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
