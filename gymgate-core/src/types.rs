//! Domain types shared by the supervisor and the proxy sync daemon.
//!
//! All types are serializable/deserializable via serde + serde_yaml.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lowest port a tenant process may be launched on.
pub const MIN_PORT: u16 = 1024;
/// Highest port a tenant process may be launched on.
pub const MAX_PORT: u16 = 65535;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque identifier of a tenant ("gym").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    /// Id of the static allow-list origin seeded by `gymgate init`.
    pub const FRONTEND: &'static str = "frontend";

    pub fn frontend() -> Self {
        Self(Self::FRONTEND.to_owned())
    }

    /// The reserved `frontend` entry never takes part in start/stop/teardown.
    pub fn is_reserved(&self) -> bool {
        self.0 == Self::FRONTEND
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Logical process status attached to a tenant.
///
/// A label updated after a start/stop attempt; it is not proof that the OS
/// process is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    #[default]
    Stopped,
    Running,
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantStatus::Stopped => write!(f, "stopped"),
            TenantStatus::Running => write!(f, "running"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// Externally reachable address of one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginEntry {
    pub tenant_id: TenantId,
    /// `None` (or `0`) for allow-list entries that have no backend process.
    #[serde(default)]
    pub port: Option<u16>,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl OriginEntry {
    /// Entry for a tenant listening on `port`, with the derived localhost URL.
    pub fn for_port(tenant_id: TenantId, port: u16) -> Self {
        Self {
            tenant_id,
            port: Some(port),
            url: local_url(port),
            created_at: Utc::now(),
        }
    }

    /// Port usable as an upstream server, if any.
    pub fn upstream_port(&self) -> Option<u16> {
        self.port.filter(|p| *p != 0)
    }
}

/// `http://localhost:{port}`
pub fn local_url(port: u16) -> String {
    format!("http://localhost:{port}")
}

/// Process status and port the supervisor owns on a tenant's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantState {
    pub id: TenantId,
    #[serde(default)]
    pub status: TenantStatus,
    #[serde(default)]
    pub port: Option<u16>,
    pub updated_at: DateTime<Utc>,
}

impl TenantState {
    pub fn new(id: TenantId) -> Self {
        Self {
            id,
            status: TenantStatus::Stopped,
            port: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TenantStatus::Running
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
