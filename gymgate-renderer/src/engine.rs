//! Tera rendering engine for the reverse-proxy configuration.
//!
//! The embedded `nginx.conf.tera` is baked into the binary; a directory
//! configured as `proxy.template_dir` may provide an `nginx.conf.tera` that
//! replaces it.

use std::path::{Path, PathBuf};

use tera::Tera;

use gymgate_core::{OriginEntry, ProxyConfig};

use crate::context::ProxyContext;
use crate::error::RenderError;

/// Template name used for both the embedded default and user overrides.
pub const NGINX_TEMPLATE: &str = "nginx.conf.tera";

const EMBEDDED: &str = include_str!("templates/nginx.conf.tera");

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io { path: path.into(), source }
}

fn load_override(dir: &Path) -> Result<Option<String>, RenderError> {
    let path = dir.join(NGINX_TEMPLATE);
    if !path.is_file() {
        return Ok(None);
    }
    std::fs::read_to_string(&path)
        .map(Some)
        .map_err(|e| io_err(&path, e))
}

fn build_tera(template_dir: Option<&Path>) -> Result<Tera, RenderError> {
    let source = match template_dir {
        Some(dir) => load_override(dir)?.unwrap_or_else(|| EMBEDDED.to_owned()),
        None => EMBEDDED.to_owned(),
    };
    let mut tera = Tera::default();
    tera.add_raw_template(NGINX_TEMPLATE, &source)?;
    Ok(tera)
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Renders the proxy config for an origin set.
///
/// Output is a pure function of the origin list and the proxy settings, so
/// the same input always produces byte-identical text.
pub struct Renderer {
    tera: Tera,
    proxy: ProxyConfig,
}

impl Renderer {
    /// Construct a [`Renderer`], honouring `proxy.template_dir` if set.
    pub fn new(proxy: &ProxyConfig) -> Result<Self, RenderError> {
        let tera = build_tera(proxy.template_dir.as_deref())?;
        Ok(Renderer {
            tera,
            proxy: proxy.clone(),
        })
    }

    /// Render the config file contents for `origins`, in their given order.
    pub fn render(&self, origins: &[OriginEntry]) -> Result<String, RenderError> {
        let ctx = ProxyContext::from_origins(&self.proxy, origins);
        self.render_with_context(&ctx)
    }

    /// Render using a caller-provided [`ProxyContext`].
    pub fn render_with_context(&self, ctx: &ProxyContext) -> Result<String, RenderError> {
        let rendered = self.tera.render(NGINX_TEMPLATE, &ctx.to_tera_context()?)?;
        Ok(rendered.replace("\r\n", "\n"))
    }

    /// Target path of the rendered file.
    pub fn output_path(&self) -> &Path {
        &self.proxy.config_path
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use gymgate_core::TenantId;

    fn origins(ports: &[u16]) -> Vec<OriginEntry> {
        ports
            .iter()
            .enumerate()
            .map(|(i, p)| OriginEntry::for_port(TenantId::from(format!("t{i}")), *p))
            .collect()
    }

    #[test]
    fn renderer_new_succeeds() {
        Renderer::new(&ProxyConfig::default()).expect("embedded template must parse");
    }

    #[test]
    fn renders_one_server_line_per_port() {
        let renderer = Renderer::new(&ProxyConfig::default()).unwrap();
        let conf = renderer.render(&origins(&[3001, 3002])).unwrap();
        assert_eq!(conf.matches("server localhost:3001;").count(), 1);
        assert_eq!(conf.matches("server localhost:3002;").count(), 1);
        assert!(conf.contains("upstream gym_services {"));
        assert!(conf.contains("proxy_pass http://gym_services;"));
    }

    #[test]
    fn empty_origin_set_renders_empty_upstream() {
        let renderer = Renderer::new(&ProxyConfig::default()).unwrap();
        let conf = renderer.render(&[]).unwrap();
        assert!(conf.contains("upstream gym_services {\n    }"), "got:\n{conf}");
        assert!(!conf.contains("server localhost:"));
    }

    #[test]
    fn keeps_nginx_variables_verbatim() {
        let renderer = Renderer::new(&ProxyConfig::default()).unwrap();
        let conf = renderer.render(&[]).unwrap();
        assert!(conf.contains("proxy_set_header Host $host;"));
        assert!(conf.contains("location ~ ^/gym/(?<gym_id>[^/]+)/ {"));
        assert!(conf.contains("proxy_pass http://localhost:$gym_id;"));
    }

    #[test]
    fn proxy_settings_flow_into_output() {
        let proxy = ProxyConfig {
            upstream_name: "tenants".to_owned(),
            listen: 8080,
            server_name: "example.test".to_owned(),
            ..ProxyConfig::default()
        };
        let conf = Renderer::new(&proxy).unwrap().render(&origins(&[4000])).unwrap();
        assert!(conf.contains("upstream tenants {"));
        assert!(conf.contains("listen 8080;"));
        assert!(conf.contains("server_name example.test;"));
    }

    #[test]
    fn missing_override_falls_back_to_embedded() {
        let dir = tempfile::TempDir::new().unwrap();
        let proxy = ProxyConfig {
            template_dir: Some(dir.path().to_path_buf()),
            ..ProxyConfig::default()
        };
        let conf = Renderer::new(&proxy).unwrap().render(&[]).unwrap();
        assert!(conf.contains("worker_connections 1024;"));
    }
}
