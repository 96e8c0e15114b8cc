//! Runs the proxy reload command.
//!
//! A non-zero exit is the only failure signal; stdout is ignored and stderr
//! becomes the diagnostic.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::SyncError;

/// Run `argv` to completion within `timeout`.
pub async fn run(argv: &[String], timeout: Duration) -> Result<(), SyncError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(SyncError::ReloadFailed {
            diagnostic: "reload command is empty".to_owned(),
        });
    };

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| SyncError::ReloadFailed {
            diagnostic: format!("failed to spawn {program}: {err}"),
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            return Err(SyncError::ReloadFailed {
                diagnostic: format!("failed waiting for {program}: {err}"),
            })
        }
        Err(_) => {
            return Err(SyncError::ReloadFailed {
                diagnostic: format!("{program} did not exit within {}s", timeout.as_secs_f64()),
            })
        }
    };

    if output.status.success() {
        tracing::debug!(command = %argv.join(" "), "reload command succeeded");
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
    Err(SyncError::ReloadFailed {
        diagnostic: if stderr.is_empty() {
            format!("{program} exited with {}", output.status)
        } else {
            stderr
        },
    })
}
