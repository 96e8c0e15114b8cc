//! On-disk PID records: `{pid_dir}/gym_service_{port}.pid`, decimal pid text.
//!
//! The launch script writes the record; the supervisor only reads and
//! removes it. Each file is owned by the port it names.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

pub const PID_FILE_PREFIX: &str = "gym_service_";

/// A parsed PID record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessRecord {
    pub pid: i32,
    pub port: u16,
}

#[derive(Debug, Error)]
pub enum PidRecordError {
    #[error("PID record missing at {path}")]
    Missing { path: PathBuf },

    #[error("cannot read PID record at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("PID record at {path} holds '{contents}', not a positive process id")]
    Invalid { path: PathBuf, contents: String },
}

/// `{pid_dir}/gym_service_{port}.pid`
pub fn pid_file_path(pid_dir: &Path, port: u16) -> PathBuf {
    pid_dir.join(format!("{PID_FILE_PREFIX}{port}.pid"))
}

/// Parse pid text. Values `<= 0` would address process groups when
/// signalled, so they are rejected.
pub fn parse_pid(contents: &str) -> Option<i32> {
    contents.trim().parse::<i32>().ok().filter(|pid| *pid > 0)
}

pub async fn read_record(pid_dir: &Path, port: u16) -> Result<ProcessRecord, PidRecordError> {
    let path = pid_file_path(pid_dir, port);
    let contents = match tokio::fs::read_to_string(&path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(PidRecordError::Missing { path });
        }
        Err(source) => return Err(PidRecordError::Io { path, source }),
    };
    match parse_pid(&contents) {
        Some(pid) => Ok(ProcessRecord { pid, port }),
        None => Err(PidRecordError::Invalid {
            path,
            contents: contents.trim().to_owned(),
        }),
    }
}

/// Write a record the way launch scripts do. Used by tooling and tests.
pub async fn write_record(pid_dir: &Path, record: ProcessRecord) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(pid_dir).await?;
    let path = pid_file_path(pid_dir, record.port);
    tokio::fs::write(&path, format!("{}\n", record.pid)).await?;
    Ok(path)
}

/// Remove the record for `port`. `Ok(false)` if it was already gone.
pub async fn remove_record(pid_dir: &Path, port: u16) -> std::io::Result<bool> {
    match tokio::fs::remove_file(pid_file_path(pid_dir, port)).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}
