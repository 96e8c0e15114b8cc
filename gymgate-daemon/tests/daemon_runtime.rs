#![cfg(unix)]
//! Runs the daemon in-process and drives it over its control socket.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gymgate_core::{FileRegistry, OriginEntry, OriginRegistry, ProxyConfig, TenantId};
use gymgate_daemon::{
    paths::socket_path, request_reconcile, request_status, request_stop, run_with, DaemonError,
    DaemonOptions,
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Running {
    home: TempDir,
    registry: Arc<FileRegistry>,
    handle: JoinHandle<Result<(), DaemonError>>,
    nudge: mpsc::Sender<()>,
}

impl Running {
    fn config_path(&self) -> PathBuf {
        self.home.path().join("nginx/nginx.conf")
    }

    fn reload_count(&self) -> usize {
        fs::read_to_string(self.home.path().join("reloads.log"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    async fn status(&self) -> Value {
        let home = self.home.path().to_path_buf();
        tokio::task::spawn_blocking(move || request_status(&home))
            .await
            .unwrap()
            .expect("status")
    }
}

async fn start_daemon(poll_interval_secs: u64) -> Running {
    let home = TempDir::new().expect("home");
    let registry = Arc::new(FileRegistry::new(home.path()));
    let log = home.path().join("reloads.log");
    let proxy = ProxyConfig {
        config_path: home.path().join("nginx/nginx.conf"),
        reload_command: Some(vec![
            "/bin/sh".into(),
            "-c".into(),
            format!("echo reload >> '{}'", log.display()),
        ]),
        poll_interval_secs,
        ..ProxyConfig::default()
    };
    let (nudge, feed) = mpsc::channel(1);

    let handle = tokio::spawn(run_with(DaemonOptions {
        home: home.path().to_path_buf(),
        registry: Arc::clone(&registry),
        proxy,
        change_feed: Some(feed),
    }));
    wait_for(|| socket_path(home.path()).exists()).await;

    Running {
        home,
        registry,
        handle,
        nudge,
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition within 5s");
}

fn config_contains(path: &Path, needle: &str) -> bool {
    fs::read_to_string(path)
        .map(|c| c.contains(needle))
        .unwrap_or(false)
}

#[tokio::test(flavor = "multi_thread")]
async fn startup_resync_then_status_and_stop() {
    let daemon = start_daemon(60).await;
    wait_for(|| daemon.reload_count() == 1).await;
    assert!(config_contains(&daemon.config_path(), "upstream gym_services {"));

    // The snapshot is published just after the reload command returns.
    let mut status = daemon.status().await;
    for _ in 0..50 {
        if status["reconciler"]["last_seen_count"] == Value::from(0) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        status = daemon.status().await;
    }
    assert_eq!(status["running"], Value::Bool(true));
    assert_eq!(status["reconciler"]["last_seen_count"], Value::from(0));
    assert_eq!(status["poll_interval_secs"], Value::from(60));

    let home = daemon.home.path().to_path_buf();
    tokio::task::spawn_blocking(move || request_stop(&home))
        .await
        .unwrap()
        .expect("stop");
    daemon.handle.await.unwrap().expect("clean exit");
    assert!(!socket_path(daemon.home.path()).exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn change_feed_nudge_applies_new_origin() {
    let daemon = start_daemon(60).await;
    wait_for(|| daemon.reload_count() == 1).await;

    daemon
        .registry
        .upsert_origin(&OriginEntry::for_port(TenantId::from("gymA"), 4100))
        .unwrap();
    daemon.nudge.send(()).await.unwrap();

    let path = daemon.config_path();
    wait_for(|| config_contains(&path, "server localhost:4100;")).await;
    wait_for(|| daemon.reload_count() == 2).await;

    let home = daemon.home.path().to_path_buf();
    tokio::task::spawn_blocking(move || request_stop(&home))
        .await
        .unwrap()
        .expect("stop");
    daemon.handle.await.unwrap().expect("clean exit");
}

#[tokio::test(flavor = "multi_thread")]
async fn poll_tick_picks_up_registry_changes() {
    let daemon = start_daemon(1).await;
    wait_for(|| daemon.reload_count() == 1).await;

    daemon
        .registry
        .upsert_origin(&OriginEntry::for_port(TenantId::from("gymB"), 4200))
        .unwrap();
    let path = daemon.config_path();
    wait_for(|| config_contains(&path, "server localhost:4200;")).await;

    let home = daemon.home.path().to_path_buf();
    tokio::task::spawn_blocking(move || request_stop(&home))
        .await
        .unwrap()
        .expect("stop");
    daemon.handle.await.unwrap().expect("clean exit");
}

#[tokio::test(flavor = "multi_thread")]
async fn reconcile_request_forces_regeneration() {
    let daemon = start_daemon(60).await;
    wait_for(|| daemon.reload_count() == 1).await;

    let home = daemon.home.path().to_path_buf();
    let outcome = tokio::task::spawn_blocking(move || request_reconcile(&home))
        .await
        .unwrap()
        .expect("reconcile");
    assert_eq!(outcome["outcome"], Value::from("applied"));
    assert_eq!(outcome["reload"]["result"], Value::from("reloaded"));
    assert_eq!(daemon.reload_count(), 2, "forced even without a count change");

    let home = daemon.home.path().to_path_buf();
    tokio::task::spawn_blocking(move || request_stop(&home))
        .await
        .unwrap()
        .expect("stop");
    daemon.handle.await.unwrap().expect("clean exit");
}
