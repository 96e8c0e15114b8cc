//! gymgate core library: domain types, the origin and tenant registry, configuration.
//!
//! - [`types`]: newtypes and domain structs
//! - [`error`]: [`RegistryError`], [`ConfigError`]
//! - [`registry`]: file-backed origin registry and tenant state store
//! - [`config`]: `~/.gymgate/config.yaml`

pub mod config;
pub mod error;
pub mod registry;
pub mod types;

pub use config::{GymgateConfig, ProxyConfig};
pub use error::{ConfigError, RegistryError};
pub use registry::{FileRegistry, OriginRegistry, TenantStore};
pub use types::{OriginEntry, TenantId, TenantState, TenantStatus};
