//! gymgate: tenant process supervisor and nginx sync CLI.
//!
//! # Usage
//!
//! ```text
//! gymgate init [--project-root <path>]
//! gymgate gym start <tenant> [--port N]
//! gymgate gym stop|teardown <tenant>
//! gymgate gym status [<tenant>] [--json]
//! gymgate origins list [--json]
//! gymgate proxy render|diff
//! gymgate daemon start|stop|status|reconcile
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, gym::GymCommand, init::InitArgs, origins::OriginsCommand,
    proxy::ProxyCommand,
};

#[derive(Parser, Debug)]
#[command(
    name = "gymgate",
    version,
    about = "Run per-tenant gym backends behind a generated nginx config",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the default config and seed the frontend origin.
    Init(InitArgs),

    /// Start, stop and inspect tenant backend processes.
    Gym {
        #[command(subcommand)]
        command: GymCommand,
    },

    /// Inspect the origin registry.
    Origins {
        #[command(subcommand)]
        command: OriginsCommand,
    },

    /// Preview the generated nginx config.
    Proxy {
        #[command(subcommand)]
        command: ProxyCommand,
    },

    /// Run or talk to the proxy sync daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Gym { command } => commands::gym::run(command),
        Commands::Origins { command } => commands::origins::run(command),
        Commands::Proxy { command } => commands::proxy::run(command),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
