//! # gymgate-renderer
//!
//! Tera-based renderer that turns the origin registry into an nginx
//! configuration file.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gymgate_core::{OriginEntry, ProxyConfig};
//! use gymgate_renderer::Renderer;
//!
//! fn render(origins: &[OriginEntry]) {
//!     if let Ok(renderer) = Renderer::new(&ProxyConfig::default()) {
//!         if let Ok(conf) = renderer.render(origins) {
//!             println!("{conf}");
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::ProxyContext;
pub use engine::{Renderer, NGINX_TEMPLATE};
pub use error::RenderError;
