//! Graceful termination and liveness probing of recorded process ids.

use std::io;

/// Send SIGTERM to `pid`. No escalation to SIGKILL.
#[cfg(unix)]
pub fn terminate(pid: i32) -> io::Result<()> {
    send(pid, libc::SIGTERM)
}

/// Whether a process with this id currently exists.
#[cfg(unix)]
pub fn is_alive(pid: i32) -> bool {
    match send(pid, 0) {
        Ok(()) => true,
        // Exists but owned by another user.
        Err(err) => err.raw_os_error() == Some(libc::EPERM),
    }
}

#[cfg(unix)]
fn send(pid: i32, signal: libc::c_int) -> io::Result<()> {
    if pid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to signal pid {pid}"),
        ));
    }
    // SAFETY: kill(2) takes plain integers; pid > 0 addresses a single process.
    let rc = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub fn terminate(pid: i32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot signal pid {pid} on this platform"),
    ))
}

#[cfg(not(unix))]
pub fn is_alive(_pid: i32) -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn refuses_group_addressing_pids() {
        assert_eq!(
            terminate(0).unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
        assert_eq!(
            terminate(-1).unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
        assert!(!is_alive(0));
    }

    #[test]
    fn current_process_is_alive() {
        assert!(is_alive(std::process::id() as i32));
    }

    #[test]
    fn terminate_stops_a_child() {
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("spawn sleep");
        terminate(child.id() as i32).expect("sigterm");
        let status = child.wait().expect("wait");
        assert!(!status.success());
    }

    #[test]
    fn terminate_reaped_child_fails() {
        let mut child = std::process::Command::new("true").spawn().expect("spawn");
        let pid = child.id() as i32;
        child.wait().expect("wait");
        assert!(terminate(pid).is_err());
    }
}
