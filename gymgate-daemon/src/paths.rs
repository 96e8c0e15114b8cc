use std::path::{Path, PathBuf};

use gymgate_core::registry::gymgate_root;

pub const DAEMON_SOCKET: &str = "daemon.sock";

/// `<home>/.gymgate/run/`
pub fn run_dir(home: &Path) -> PathBuf {
    gymgate_root(home).join("run")
}

/// `<home>/.gymgate/run/daemon.sock`
pub fn socket_path(home: &Path) -> PathBuf {
    run_dir(home).join(DAEMON_SOCKET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_lives_in_run_dir() {
        let home = Path::new("/home/op");
        assert_eq!(
            socket_path(home),
            PathBuf::from("/home/op/.gymgate/run/daemon.sock")
        );
    }
}
