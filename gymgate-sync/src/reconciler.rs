//! Registry → nginx config reconciliation.
//!
//! Change detection is coarse: only the number of origins is compared with
//! the last applied count. A swap that keeps the count equal is not noticed
//! until the next forced [`Reconciler::resync`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use gymgate_core::{OriginRegistry, ProxyConfig};
use gymgate_renderer::Renderer;

use crate::{reload, writer, SyncError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileState {
    #[default]
    Idle,
    Reconciling,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "diagnostic", rename_all = "lowercase")]
pub enum ReloadStatus {
    Reloaded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ReconcileOutcome {
    /// Origin count matches the last applied count; nothing written.
    Unchanged { count: usize },
    /// Config rewritten and a reload attempted.
    Applied {
        count: usize,
        path: PathBuf,
        reload: ReloadStatus,
    },
}

impl ReconcileOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ReconcileOutcome::Applied { .. })
    }
}

/// Observable reconciler state, published on every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSnapshot {
    pub state: ReconcileState,
    pub last_seen_count: Option<usize>,
    pub last_applied_at: Option<DateTime<Utc>>,
    pub last_reload: Option<ReloadStatus>,
    pub last_error: Option<String>,
}

pub struct Reconciler<R: ?Sized> {
    registry: Arc<R>,
    renderer: Renderer,
    reload_argv: Vec<String>,
    reload_timeout: Duration,
    last_seen: Option<usize>,
    snapshot: watch::Sender<ReconcileSnapshot>,
}

impl<R> Reconciler<R>
where
    R: OriginRegistry + Send + Sync + ?Sized + 'static,
{
    pub fn new(registry: Arc<R>, proxy: &ProxyConfig) -> Result<Self, SyncError> {
        Ok(Self {
            registry,
            renderer: Renderer::new(proxy)?,
            reload_argv: proxy.reload_argv(),
            reload_timeout: proxy.reload_timeout(),
            last_seen: None,
            snapshot: watch::channel(ReconcileSnapshot::default()).0,
        })
    }

    /// Receiver that always holds the latest [`ReconcileSnapshot`].
    pub fn subscribe(&self) -> watch::Receiver<ReconcileSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> ReconcileSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn last_seen_count(&self) -> Option<usize> {
        self.last_seen
    }

    pub fn config_path(&self) -> PathBuf {
        self.renderer.output_path().to_path_buf()
    }

    /// Regenerate and reload only if the origin count changed.
    pub async fn reconcile(&mut self) -> Result<ReconcileOutcome, SyncError> {
        self.run(false).await
    }

    /// Regenerate and reload unconditionally.
    pub async fn resync(&mut self) -> Result<ReconcileOutcome, SyncError> {
        self.run(true).await
    }

    async fn run(&mut self, force: bool) -> Result<ReconcileOutcome, SyncError> {
        self.snapshot
            .send_modify(|s| s.state = ReconcileState::Reconciling);
        let result = self.apply(force).await;

        let last_seen = self.last_seen;
        self.snapshot.send_modify(|s| {
            s.state = ReconcileState::Idle;
            s.last_seen_count = last_seen;
            match &result {
                Ok(ReconcileOutcome::Applied { reload, .. }) => {
                    s.last_applied_at = Some(Utc::now());
                    s.last_reload = Some(reload.clone());
                    s.last_error = None;
                }
                Ok(ReconcileOutcome::Unchanged { .. }) => s.last_error = None,
                Err(err) => s.last_error = Some(err.to_string()),
            }
        });

        if let Err(err) = &result {
            tracing::error!(error = %err, "reconcile failed");
        }
        result
    }

    async fn apply(&mut self, force: bool) -> Result<ReconcileOutcome, SyncError> {
        let registry = Arc::clone(&self.registry);
        let origins = tokio::task::spawn_blocking(move || registry.list_origins()).await??;
        let count = origins.len();

        if !force && self.last_seen == Some(count) {
            tracing::debug!(count, "origin count unchanged");
            return Ok(ReconcileOutcome::Unchanged { count });
        }
        tracing::info!(count, previous = ?self.last_seen, force, "regenerating proxy config");

        let rendered = self.renderer.render(&origins)?;
        let path = self.config_path();
        let target = path.clone();
        tokio::task::spawn_blocking(move || writer::write_atomic(&target, &rendered)).await??;
        self.last_seen = Some(count);
        tracing::info!(path = %path.display(), "proxy config written");

        let reload = match reload::run(&self.reload_argv, self.reload_timeout).await {
            Ok(()) => {
                tracing::info!("proxy reloaded");
                ReloadStatus::Reloaded
            }
            Err(err) => {
                tracing::warn!(error = %err, "proxy reload failed; config left in place");
                ReloadStatus::Failed(err.to_string())
            }
        };

        Ok(ReconcileOutcome::Applied {
            count,
            path,
            reload,
        })
    }
}
