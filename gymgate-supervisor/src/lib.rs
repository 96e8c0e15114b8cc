//! Tenant process supervisor: start, stop and PID-track one backend process
//! per tenant, keeping tenant state and the origin registry in step.

mod error;
mod launcher;
pub mod locks;
pub mod pid;
pub mod ports;
pub mod signal;
mod supervisor;

pub use error::SupervisorError;
pub use pid::{PidRecordError, ProcessRecord};
pub use supervisor::{
    ProcessProbe, StartOutcome, StopOutcome, Supervisor, SupervisorSettings, TeardownOutcome,
    TenantReport,
};
