//! Runs the tenant launch script: `{interpreter} {script} {port} {project_root}`.
//!
//! Only the launcher's own exit is awaited. The script is expected to
//! background the tenant process and write its PID record before exiting.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::error::{launch_failed, SupervisorError};

/// How long to keep draining stderr after the launcher exited. A detached
/// grandchild that inherited the pipe would otherwise hold it open.
const STDERR_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub(crate) struct LaunchCommand<'a> {
    pub interpreter: &'a Path,
    pub script: &'a Path,
    pub port: u16,
    pub project_root: &'a Path,
    pub timeout: Duration,
}

impl LaunchCommand<'_> {
    fn working_dir(&self) -> PathBuf {
        self.script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Run the launcher to completion (or timeout).
///
/// Non-zero exit, spawn failure and timeout all map to
/// [`SupervisorError::LaunchFailed`] carrying the captured stderr.
pub(crate) async fn run(launch: &LaunchCommand<'_>) -> Result<(), SupervisorError> {
    let mut cmd = Command::new(launch.interpreter);
    cmd.arg(launch.script)
        .arg(launch.port.to_string())
        .arg(launch.project_root)
        .current_dir(launch.working_dir())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|err| {
        launch_failed(format!(
            "failed to spawn {} {}: {err}",
            launch.interpreter.display(),
            launch.script.display()
        ))
    })?;

    let stderr = child.stderr.take();
    let mut reader = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_end(&mut buf).await;
        }
        buf
    });

    let status = match tokio::time::timeout(launch.timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(err)) => {
            reader.abort();
            return Err(launch_failed(format!("failed waiting for launcher: {err}")));
        }
        Err(_) => {
            let _ = child.start_kill();
            reader.abort();
            return Err(launch_failed(format!(
                "launcher did not exit within {}s",
                launch.timeout.as_secs_f64()
            )));
        }
    };

    let diagnostic = match tokio::time::timeout(STDERR_GRACE, &mut reader).await {
        Ok(Ok(buf)) => String::from_utf8_lossy(&buf).trim().to_owned(),
        _ => {
            reader.abort();
            String::new()
        }
    };

    if status.success() {
        if !diagnostic.is_empty() {
            tracing::debug!(port = launch.port, stderr = %diagnostic, "launcher stderr");
        }
        return Ok(());
    }

    Err(launch_failed(if diagnostic.is_empty() {
        format!("launcher exited with {status}")
    } else {
        diagnostic
    }))
}
