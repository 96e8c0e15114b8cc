//! Proxy sync daemon: startup resync, poll loop and control socket.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_reconcile, request_status, request_stop, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{init_tracing, run, run_with, start_blocking, DaemonOptions};
