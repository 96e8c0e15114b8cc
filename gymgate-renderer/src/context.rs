//! Template context: serializable rendering payload built from origin entries.

use serde::{Deserialize, Serialize};

use gymgate_core::{OriginEntry, ProxyConfig};

use crate::error::RenderError;

/// Everything `nginx.conf.tera` needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyContext {
    pub upstream_name: String,
    pub listen: u16,
    pub server_name: String,
    /// One entry per distinct upstream port, in registry read order.
    pub ports: Vec<u16>,
}

impl ProxyContext {
    /// Build the context from an origin scan.
    ///
    /// Entries with no port (or port `0`) are dropped; a port shared by
    /// several entries appears once, at its first position.
    pub fn from_origins(proxy: &ProxyConfig, origins: &[OriginEntry]) -> Self {
        let mut ports: Vec<u16> = Vec::with_capacity(origins.len());
        for port in origins.iter().filter_map(OriginEntry::upstream_port) {
            if !ports.contains(&port) {
                ports.push(port);
            }
        }
        Self {
            upstream_name: proxy.upstream_name.clone(),
            listen: proxy.listen,
            server_name: proxy.server_name.clone(),
            ports,
        }
    }

    /// Convert to a [`tera::Context`] for rendering.
    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::from)
    }
}
