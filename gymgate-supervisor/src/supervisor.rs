//! Tenant process lifecycle.
//!
//! `start`, `stop` and `teardown` run their steps strictly in order under a
//! per-tenant lock. Registry reads and writes run on the blocking pool.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;

use gymgate_core::{
    GymgateConfig, OriginEntry, OriginRegistry, RegistryError, TenantId, TenantState,
    TenantStatus, TenantStore,
};

use crate::error::SupervisorError;
use crate::launcher::{self, LaunchCommand};
use crate::locks::TenantLocks;
use crate::pid::{self, PidRecordError};
use crate::ports;
use crate::signal;

// ---------------------------------------------------------------------------
// Settings and outcomes
// ---------------------------------------------------------------------------

/// Launcher and PID settings resolved from [`GymgateConfig`].
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub interpreter: PathBuf,
    pub launch_script: PathBuf,
    pub project_root: PathBuf,
    pub pid_dir: PathBuf,
    pub launch_timeout: Duration,
}

impl From<&GymgateConfig> for SupervisorSettings {
    fn from(config: &GymgateConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            launch_script: config.launch_script_path(),
            project_root: config.project_root.clone(),
            pid_dir: config.pid_dir_path(),
            launch_timeout: config.launch_timeout(),
        }
    }
}

impl SupervisorSettings {
    /// Resolve relative script, root and PID paths against the current
    /// directory; the launcher runs from the script's own directory.
    pub fn anchored(self) -> Self {
        Self {
            launch_script: anchor(self.launch_script),
            project_root: anchor(self.project_root),
            pid_dir: anchor(self.pid_dir),
            ..self
        }
    }
}

fn anchor(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "cannot resolve relative path");
            path
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartOutcome {
    pub tenant: TenantId,
    pub port: u16,
    pub status: TenantStatus,
    pub pid_file: PathBuf,
    /// Pid read back from the record, if the launcher wrote one.
    pub pid: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopOutcome {
    pub tenant: TenantId,
    pub status: TenantStatus,
    pub pid_file: PathBuf,
    /// Pid that SIGTERM was delivered to.
    pub signalled: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownOutcome {
    pub tenant: TenantId,
    /// A stop sequence ran because the tenant was running.
    pub stopped: bool,
    pub origin_removed: bool,
    pub state_removed: bool,
}

/// What the PID record says about a tenant's process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "pid", rename_all = "lowercase")]
pub enum ProcessProbe {
    Alive(i32),
    /// Record exists but no such process.
    Stale(i32),
    Missing,
    Unreadable,
    /// No port recorded, nothing to probe.
    Unassigned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantReport {
    pub state: TenantState,
    pub origin: Option<OriginEntry>,
    pub process: ProcessProbe,
}

/// Result of the best-effort termination sequence.
struct Termination {
    pid_file: PathBuf,
    signalled: Option<i32>,
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Starts and stops one backend process per tenant.
///
/// The supervisor never talks to the proxy sync daemon; the daemon observes
/// the origin registry. An optional change feed may nudge an in-process
/// daemon after origin mutations.
pub struct Supervisor<R> {
    registry: Arc<R>,
    settings: SupervisorSettings,
    locks: TenantLocks,
    change_feed: Option<mpsc::Sender<()>>,
}

impl<R> Supervisor<R>
where
    R: OriginRegistry + TenantStore + Send + Sync + 'static,
{
    pub fn new(registry: Arc<R>, settings: SupervisorSettings) -> Self {
        Self {
            registry,
            settings: settings.anchored(),
            locks: TenantLocks::new(),
            change_feed: None,
        }
    }

    /// Send a nudge on `tx` after every origin insert or delete.
    pub fn with_change_feed(mut self, tx: mpsc::Sender<()>) -> Self {
        self.change_feed = Some(tx);
        self
    }

    /// Launch the tenant's process and mark it running.
    ///
    /// Port precedence: `requested_port`, then the port already recorded for
    /// the tenant, then a random free-looking port. Starting a tenant that is
    /// already running is not rejected; callers check state first.
    pub async fn start(
        &self,
        tenant: &TenantId,
        requested_port: Option<u16>,
    ) -> Result<StartOutcome, SupervisorError> {
        ensure_not_reserved(tenant)?;
        if let Some(port) = requested_port.filter(|p| !ports::in_range(*p)) {
            return Err(SupervisorError::InvalidPort(port));
        }
        let _guard = self.locks.acquire(tenant).await;

        let id = tenant.clone();
        let existing = self.blocking(move |r| r.load_tenant(&id)).await?;
        let port = match requested_port.or_else(|| existing.as_ref().and_then(|s| s.port)) {
            Some(port) => port,
            None => self.allocate_port(tenant).await?,
        };

        let script = &self.settings.launch_script;
        if !script.is_file() {
            tracing::error!(tenant = %tenant, script = %script.display(), "launch script not found");
            return Err(SupervisorError::LaunchTargetMissing {
                path: script.clone(),
            });
        }

        let pid_dir = &self.settings.pid_dir;
        if let Err(err) = tokio::fs::create_dir_all(pid_dir).await {
            tracing::warn!(pid_dir = %pid_dir.display(), error = %err, "could not create PID directory");
        }

        tracing::info!(tenant = %tenant, port, script = %script.display(), "launching tenant process");
        launcher::run(&LaunchCommand {
            interpreter: &self.settings.interpreter,
            script,
            port,
            project_root: &self.settings.project_root,
            timeout: self.settings.launch_timeout,
        })
        .await
        .inspect_err(|err| tracing::error!(tenant = %tenant, port, error = %err, "launch failed"))?;

        let pid_file = pid::pid_file_path(pid_dir, port);
        let pid = match pid::read_record(pid_dir, port).await {
            Ok(record) => {
                tracing::info!(tenant = %tenant, port, pid = record.pid, "tenant process started");
                Some(record.pid)
            }
            Err(err) => {
                tracing::warn!(tenant = %tenant, port, error = %err, "launcher succeeded but PID record is unreadable");
                None
            }
        };

        let mut state = existing.unwrap_or_else(|| TenantState::new(tenant.clone()));
        state.status = TenantStatus::Running;
        state.port = Some(port);
        state.updated_at = Utc::now();
        // Origin first: a failed upsert must not leave the tenant marked running.
        self.blocking(move |r| {
            let mut entry = OriginEntry::for_port(state.id.clone(), port);
            if let Some(previous) = r.get_origin(&state.id)? {
                entry.created_at = previous.created_at;
            }
            r.upsert_origin(&entry)?;
            r.save_tenant(&state)
        })
        .await?;
        self.notify();

        Ok(StartOutcome {
            tenant: tenant.clone(),
            port,
            status: TenantStatus::Running,
            pid_file,
            pid,
        })
    }

    /// Terminate the tenant's process and mark it stopped.
    ///
    /// Only a missing port fails; unreadable PID records and failed signals
    /// are logged and the tenant still ends up `stopped`. The origin entry is
    /// kept since the tenant restarts on the same port.
    pub async fn stop(&self, tenant: &TenantId) -> Result<StopOutcome, SupervisorError> {
        ensure_not_reserved(tenant)?;
        let _guard = self.locks.acquire(tenant).await;

        let id = tenant.clone();
        let state = self.blocking(move |r| r.load_tenant(&id)).await?;
        let Some((mut state, port)) = state.and_then(|s| s.port.map(|p| (s, p))) else {
            return Err(SupervisorError::NotRunning(tenant.clone()));
        };

        let termination = self.terminate(tenant, port).await;

        state.status = TenantStatus::Stopped;
        state.updated_at = Utc::now();
        self.blocking(move |r| r.save_tenant(&state)).await?;
        tracing::info!(tenant = %tenant, port, "tenant stopped");

        Ok(StopOutcome {
            tenant: tenant.clone(),
            status: TenantStatus::Stopped,
            pid_file: termination.pid_file,
            signalled: termination.signalled,
        })
    }

    /// Remove a tenant entirely, stopping its process first if it is running.
    ///
    /// Origin and state removal proceed whatever the stop sequence did.
    pub async fn teardown(&self, tenant: &TenantId) -> Result<TeardownOutcome, SupervisorError> {
        ensure_not_reserved(tenant)?;
        let _guard = self.locks.acquire(tenant).await;

        let id = tenant.clone();
        let state = self.blocking(move |r| r.load_tenant(&id)).await?;
        let running_port = state
            .as_ref()
            .filter(|s| s.is_running())
            .and_then(|s| s.port);

        if let Some(port) = running_port {
            self.terminate(tenant, port).await;
        }

        let id = tenant.clone();
        let (origin_removed, state_removed) = self
            .blocking(move |r| Ok((r.delete_origin(&id)?, r.delete_tenant(&id)?)))
            .await?;
        if origin_removed {
            self.notify();
        }
        tracing::info!(tenant = %tenant, origin_removed, state_removed, "tenant torn down");

        Ok(TeardownOutcome {
            tenant: tenant.clone(),
            stopped: running_port.is_some(),
            origin_removed,
            state_removed,
        })
    }

    /// State, origin and process probe for one tenant.
    pub async fn describe(&self, tenant: &TenantId) -> Result<Option<TenantReport>, SupervisorError> {
        let id = tenant.clone();
        let found = self
            .blocking(move |r| Ok((r.load_tenant(&id)?, r.get_origin(&id)?)))
            .await?;
        match found {
            (Some(state), origin) => Ok(Some(self.report(state, origin).await)),
            (None, _) => Ok(None),
        }
    }

    /// Reports for every tenant with recorded state.
    pub async fn list(&self) -> Result<Vec<TenantReport>, SupervisorError> {
        let (states, origins) = self
            .blocking(|r| Ok((r.list_tenants()?, r.list_origins()?)))
            .await?;
        let mut reports = Vec::with_capacity(states.len());
        for state in states {
            let origin = origins.iter().find(|o| o.tenant_id == state.id).cloned();
            reports.push(self.report(state, origin).await);
        }
        Ok(reports)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Read PID record → SIGTERM → remove record. Every failure is a warning.
    ///
    /// An unreadable record is left in place for inspection.
    async fn terminate(&self, tenant: &TenantId, port: u16) -> Termination {
        let pid_dir = &self.settings.pid_dir;
        let pid_file = pid::pid_file_path(pid_dir, port);

        let record = match pid::read_record(pid_dir, port).await {
            Ok(record) => record,
            Err(err) => {
                match &err {
                    PidRecordError::Missing { .. } => {
                        tracing::warn!(tenant = %tenant, port, "no PID record; treating process as gone")
                    }
                    _ => {
                        tracing::warn!(tenant = %tenant, port, error = %err, "PID record unreadable; leaving it in place")
                    }
                }
                return Termination {
                    pid_file,
                    signalled: None,
                };
            }
        };

        let signalled = match signal::terminate(record.pid) {
            Ok(()) => {
                tracing::info!(tenant = %tenant, pid = record.pid, "sent SIGTERM");
                Some(record.pid)
            }
            Err(err) => {
                tracing::warn!(tenant = %tenant, pid = record.pid, error = %err, "could not signal process");
                None
            }
        };

        match pid::remove_record(pid_dir, port).await {
            Ok(_) => tracing::debug!(path = %pid_file.display(), "removed PID record"),
            Err(err) => {
                tracing::warn!(path = %pid_file.display(), error = %err, "could not remove PID record")
            }
        }

        Termination {
            pid_file,
            signalled,
        }
    }

    async fn allocate_port(&self, tenant: &TenantId) -> Result<u16, SupervisorError> {
        let id = tenant.clone();
        let taken: HashSet<u16> = self
            .blocking(move |r| {
                Ok(r.list_origins()?
                    .into_iter()
                    .filter(|o| o.tenant_id != id)
                    .filter_map(|o| o.upstream_port())
                    .collect())
            })
            .await?;
        let port = ports::allocate(&taken, &mut rand::thread_rng());
        tracing::debug!(tenant = %tenant, port, "allocated port");
        Ok(port)
    }

    async fn report(&self, state: TenantState, origin: Option<OriginEntry>) -> TenantReport {
        let process = match state.port {
            None => ProcessProbe::Unassigned,
            Some(port) => probe(&self.settings.pid_dir, port).await,
        };
        TenantReport {
            state,
            origin,
            process,
        }
    }

    fn notify(&self) {
        if let Some(tx) = &self.change_feed {
            // A full channel already holds a pending nudge.
            let _ = tx.try_send(());
        }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, SupervisorError>
    where
        F: FnOnce(&R) -> Result<T, RegistryError> + Send + 'static,
        T: Send + 'static,
    {
        let registry = Arc::clone(&self.registry);
        tokio::task::spawn_blocking(move || f(&registry))
            .await
            .map_err(|err| SupervisorError::Join(err.to_string()))?
            .map_err(SupervisorError::from)
    }
}

async fn probe(pid_dir: &Path, port: u16) -> ProcessProbe {
    match pid::read_record(pid_dir, port).await {
        Ok(record) if signal::is_alive(record.pid) => ProcessProbe::Alive(record.pid),
        Ok(record) => ProcessProbe::Stale(record.pid),
        Err(PidRecordError::Missing { .. }) => ProcessProbe::Missing,
        Err(_) => ProcessProbe::Unreadable,
    }
}

fn ensure_not_reserved(tenant: &TenantId) -> Result<(), SupervisorError> {
    if tenant.is_reserved() {
        return Err(SupervisorError::ReservedTenant(tenant.clone()));
    }
    Ok(())
}
