//! `~/.gymgate/config.yaml`: launcher, PID and proxy settings.
//!
//! Every field is optional; a missing file yields [`GymgateConfig::default`].
//! Relative `launch_script` and `pid_dir` paths resolve against `project_root`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::registry::gymgate_root;

pub const CONFIG_FILE: &str = "config.yaml";

/// Top-level configuration shared by the supervisor, daemon and CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GymgateConfig {
    /// Passed to the launch script as its second positional argument.
    pub project_root: PathBuf,
    pub launch_script: PathBuf,
    pub interpreter: PathBuf,
    pub pid_dir: PathBuf,
    pub launch_timeout_secs: u64,
    /// URL of the reserved `frontend` allow-list origin.
    pub frontend_origin: String,
    pub proxy: ProxyConfig,
}

/// Reverse-proxy rendering and reload settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub config_path: PathBuf,
    /// Full argv; `None` means `sudo nginx -c <config_path> -s reload`.
    pub reload_command: Option<Vec<String>>,
    pub reload_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub upstream_name: String,
    pub listen: u16,
    pub server_name: String,
    /// Directory holding an `nginx.conf.tera` override.
    pub template_dir: Option<PathBuf>,
}

impl Default for GymgateConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            launch_script: PathBuf::from("gym-service").join("start.sh"),
            interpreter: PathBuf::from("/bin/bash"),
            pid_dir: PathBuf::from("gym-service").join("pids"),
            launch_timeout_secs: 10,
            frontend_origin: "http://localhost:5180".to_owned(),
            proxy: ProxyConfig::default(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("/opt/homebrew/etc/nginx/nginx.conf"),
            reload_command: None,
            reload_timeout_secs: 10,
            poll_interval_secs: 5,
            upstream_name: "gym_services".to_owned(),
            listen: 80,
            server_name: "gyms.local".to_owned(),
            template_dir: None,
        }
    }
}

impl GymgateConfig {
    /// `<home>/.gymgate/config.yaml`
    pub fn path_at(home: &Path) -> PathBuf {
        gymgate_root(home).join(CONFIG_FILE)
    }

    /// Load from `<home>/.gymgate/config.yaml`, falling back to defaults when absent.
    pub fn load_at(home: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_at(home);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_at(&dirs::home_dir().ok_or(ConfigError::HomeNotFound)?)
    }

    /// Write the config unless a file already exists. Returns `true` if written.
    pub fn write_default_at(&self, home: &Path) -> Result<bool, ConfigError> {
        let path = Self::path_at(home);
        if path.exists() {
            return Ok(false);
        }
        let io = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ConfigError::Io { path, source }
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(io(dir))?;
        }
        let tmp = path.with_extension("yaml.tmp");
        std::fs::write(&tmp, serde_yaml::to_string(self)?).map_err(io(&tmp))?;
        std::fs::rename(&tmp, &path).map_err(io(&path))?;
        Ok(true)
    }

    pub fn launch_script_path(&self) -> PathBuf {
        self.project_root.join(&self.launch_script)
    }

    pub fn pid_dir_path(&self) -> PathBuf {
        self.project_root.join(&self.pid_dir)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs.max(1))
    }
}

impl ProxyConfig {
    /// argv of the reload command, with the default derived from `config_path`.
    pub fn reload_argv(&self) -> Vec<String> {
        match &self.reload_command {
            Some(argv) => argv.clone(),
            None => vec![
                "sudo".to_owned(),
                "nginx".to_owned(),
                "-c".to_owned(),
                self.config_path.display().to_string(),
                "-s".to_owned(),
                "reload".to_owned(),
            ],
        }
    }

    pub fn reload_timeout(&self) -> Duration {
        Duration::from_secs(self.reload_timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let home = TempDir::new().unwrap();
        let cfg = GymgateConfig::load_at(home.path()).expect("load");
        assert_eq!(cfg, GymgateConfig::default());
        assert_eq!(cfg.proxy.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let home = TempDir::new().unwrap();
        let path = GymgateConfig::path_at(home.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "project_root: /srv/gyms\nproxy:\n  listen: 8080\n").unwrap();

        let cfg = GymgateConfig::load_at(home.path()).expect("load");
        assert_eq!(cfg.project_root, PathBuf::from("/srv/gyms"));
        assert_eq!(cfg.proxy.listen, 8080);
        assert_eq!(cfg.proxy.upstream_name, "gym_services");
        assert_eq!(
            cfg.launch_script_path(),
            PathBuf::from("/srv/gyms/gym-service/start.sh")
        );
        assert_eq!(cfg.pid_dir_path(), PathBuf::from("/srv/gyms/gym-service/pids"));
    }

    #[test]
    fn malformed_file_reports_path() {
        let home = TempDir::new().unwrap();
        let path = GymgateConfig::path_at(home.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "proxy: [not, a, mapping").unwrap();

        let err = GymgateConfig::load_at(home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.yaml"));
    }

    #[test]
    fn default_reload_command_targets_config_path() {
        let proxy = ProxyConfig {
            config_path: PathBuf::from("/etc/nginx/nginx.conf"),
            ..ProxyConfig::default()
        };
        assert_eq!(
            proxy.reload_argv(),
            ["sudo", "nginx", "-c", "/etc/nginx/nginx.conf", "-s", "reload"]
        );
    }

    #[test]
    fn zero_second_durations_are_clamped() {
        let cfg = GymgateConfig {
            launch_timeout_secs: 0,
            proxy: ProxyConfig {
                reload_timeout_secs: 0,
                poll_interval_secs: 0,
                ..ProxyConfig::default()
            },
            ..GymgateConfig::default()
        };
        assert_eq!(cfg.launch_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.proxy.reload_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.proxy.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let home = TempDir::new().unwrap();
        let cfg = GymgateConfig::default();
        assert!(cfg.write_default_at(home.path()).expect("first write"));
        assert!(!cfg.write_default_at(home.path()).expect("second write"));
        assert_eq!(GymgateConfig::load_at(home.path()).unwrap(), cfg);
    }
}
