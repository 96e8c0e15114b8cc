//! `gymgate daemon start|stop|status|reconcile`

use anyhow::{Context, Result};
use clap::Subcommand;

use gymgate_daemon::paths::socket_path;
use gymgate_daemon::{request_reconcile, request_status, request_stop, start_blocking, DaemonError};

use super::home_dir;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the sync daemon in the foreground.
    Start,
    /// Request graceful shutdown over the control socket.
    Stop,
    /// Query daemon status over the control socket.
    Status,
    /// Force a config regeneration and reload.
    Reconcile,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = home_dir()?;

    match command {
        DaemonCommand::Start => {
            start_blocking(&home).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => {
            let payload = match request_status(&home) {
                Ok(status) => status,
                Err(DaemonError::DaemonNotRunning { .. }) => serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                }),
                Err(err) => return Err(err).context("failed to query daemon status"),
            };
            print_json(&payload)?;
        }
        DaemonCommand::Reconcile => {
            let outcome = request_reconcile(&home).context("reconcile request failed")?;
            print_json(&outcome)?;
        }
    }

    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render daemon JSON")?
    );
    Ok(())
}
