use std::path::PathBuf;

use thiserror::Error;

use gymgate_core::{RegistryError, TenantId};

/// Hard failures of supervisor operations.
///
/// Problems that occur after the goal state is reached (unreadable PID
/// record, failed signal, failed PID file removal) are logged and never
/// surface here.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("launch script not found at {path}")]
    LaunchTargetMissing { path: PathBuf },

    #[error("launcher failed: {diagnostic}")]
    LaunchFailed { diagnostic: String },

    #[error("tenant '{0}' has no recorded port; it was never started")]
    NotRunning(TenantId),

    #[error("tenant '{0}' is reserved and cannot be started, stopped or removed")]
    ReservedTenant(TenantId),

    #[error("port {0} is outside the allowed range 1024-65535")]
    InvalidPort(u16),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("blocking task failed: {0}")]
    Join(String),
}

pub(crate) fn launch_failed(diagnostic: impl Into<String>) -> SupervisorError {
    SupervisorError::LaunchFailed {
        diagnostic: diagnostic.into(),
    }
}
