//! # gymgate-sync
//!
//! Keeps the nginx configuration in step with the origin registry.
//!
//! [`Reconciler`] reads every origin, renders the config, writes it
//! atomically and asks nginx to reload. [`diff::diff_config`] previews the
//! same render against what is on disk without writing anything.

pub mod diff;
pub mod error;
pub mod reconciler;
pub mod reload;
pub mod writer;

pub use diff::{diff_config, render_current, ConfigDiff};
pub use error::SyncError;
pub use reconciler::{ReconcileOutcome, ReconcileSnapshot, ReconcileState, Reconciler, ReloadStatus};
