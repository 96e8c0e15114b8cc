//! `gymgate gym start|stop|teardown|status`

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use gymgate_core::{FileRegistry, GymgateConfig, TenantId, TenantStatus};
use gymgate_supervisor::{ProcessProbe, Supervisor, SupervisorSettings, TenantReport};

use super::init_cli_tracing;

#[derive(Subcommand, Debug)]
pub enum GymCommand {
    /// Launch a tenant's backend and register its origin.
    Start(StartArgs),
    /// Send SIGTERM to a tenant's backend and mark it stopped.
    Stop(TenantArg),
    /// Stop a tenant if running, then remove its origin and state.
    Teardown(TenantArg),
    /// Show tenant state with a PID liveness probe.
    Status(StatusArgs),
}

#[derive(Args, Debug)]
pub struct StartArgs {
    pub tenant: String,

    /// Port to bind. Defaults to the tenant's last port, else a random one.
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Args, Debug)]
pub struct TenantArg {
    pub tenant: String,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Limit output to one tenant.
    pub tenant: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct TenantRow {
    #[tabled(rename = "tenant")]
    tenant: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "port")]
    port: String,
    #[tabled(rename = "process")]
    process: String,
    #[tabled(rename = "updated")]
    updated: String,
}

pub fn run(command: GymCommand) -> Result<()> {
    init_cli_tracing();
    let config = GymgateConfig::load().context("failed to load gymgate config")?;
    let registry = FileRegistry::from_home().context("failed to locate origin registry")?;
    let supervisor = Supervisor::new(Arc::new(registry), SupervisorSettings::from(&config));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        match command {
            GymCommand::Start(args) => {
                let tenant = TenantId::from(args.tenant);
                let out = supervisor
                    .start(&tenant, args.port)
                    .await
                    .with_context(|| format!("failed to start '{tenant}'"))?;
                println!(
                    "{} '{}' {} on port {}",
                    "✓".green(),
                    out.tenant,
                    out.status,
                    out.port
                );
                match out.pid {
                    Some(pid) => println!("  pid {pid} ({})", out.pid_file.display()),
                    None => println!("  no PID record at {}", out.pid_file.display()),
                }
            }
            GymCommand::Stop(args) => {
                let tenant = TenantId::from(args.tenant);
                let out = supervisor
                    .stop(&tenant)
                    .await
                    .with_context(|| format!("failed to stop '{tenant}'"))?;
                println!("{} '{}' {}", "✓".green(), out.tenant, out.status);
                if let Some(pid) = out.signalled {
                    println!("  sent SIGTERM to pid {pid}");
                }
            }
            GymCommand::Teardown(args) => {
                let tenant = TenantId::from(args.tenant);
                let out = supervisor
                    .teardown(&tenant)
                    .await
                    .with_context(|| format!("failed to tear down '{tenant}'"))?;
                println!(
                    "{} '{}' removed (origin: {}, state: {})",
                    "✓".green(),
                    out.tenant,
                    yes_no(out.origin_removed),
                    yes_no(out.state_removed)
                );
            }
            GymCommand::Status(args) => {
                let reports = match args.tenant {
                    Some(tenant) => {
                        let tenant = TenantId::from(tenant);
                        let report = supervisor
                            .describe(&tenant)
                            .await
                            .context("failed to read tenant state")?
                            .with_context(|| format!("no state recorded for '{tenant}'"))?;
                        vec![report]
                    }
                    None => supervisor.list().await.context("failed to list tenants")?,
                };
                if args.json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&reports)
                            .context("failed to serialize tenant status JSON")?
                    );
                } else {
                    print_table(reports);
                }
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}

fn print_table(reports: Vec<TenantReport>) {
    if reports.is_empty() {
        println!("No tenants recorded.");
        println!("Run: gymgate gym start <tenant>");
        return;
    }
    let rows: Vec<TenantRow> = reports
        .into_iter()
        .map(|r| TenantRow {
            tenant: r.state.id.to_string(),
            status: status_label(r.state.status),
            port: r.state.port.map_or_else(|| "-".to_string(), |p| p.to_string()),
            process: probe_label(r.process),
            updated: r.state.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn status_label(status: TenantStatus) -> String {
    match status {
        TenantStatus::Running => "running".green().bold().to_string(),
        TenantStatus::Stopped => "stopped".bright_black().to_string(),
    }
}

fn probe_label(probe: ProcessProbe) -> String {
    match probe {
        ProcessProbe::Alive(pid) => format!("alive ({pid})"),
        ProcessProbe::Stale(pid) => format!("stale ({pid})").yellow().to_string(),
        ProcessProbe::Missing => "no PID record".to_string(),
        ProcessProbe::Unreadable => "unreadable PID record".red().to_string(),
        ProcessProbe::Unassigned => "-".to_string(),
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
