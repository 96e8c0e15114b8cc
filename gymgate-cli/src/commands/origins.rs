//! `gymgate origins list [--json]`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use gymgate_core::registry;

#[derive(Subcommand, Debug)]
pub enum OriginsCommand {
    /// List registered origins in registry read order.
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct OriginRow {
    #[tabled(rename = "tenant")]
    tenant: String,
    #[tabled(rename = "port")]
    port: String,
    #[tabled(rename = "url")]
    url: String,
    #[tabled(rename = "created")]
    created: String,
}

pub fn run(command: OriginsCommand) -> Result<()> {
    match command {
        OriginsCommand::List(args) => list(args),
    }
}

fn list(args: ListArgs) -> Result<()> {
    let origins = registry::list_origins().context("failed to read origin registry")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&origins).context("failed to serialize origins JSON")?
        );
        return Ok(());
    }

    if origins.is_empty() {
        println!("No origins registered.");
        println!("Run: gymgate init");
        return Ok(());
    }

    let rows: Vec<OriginRow> = origins
        .into_iter()
        .map(|o| OriginRow {
            port: o
                .upstream_port()
                .map_or_else(|| "-".to_string(), |p| p.to_string()),
            tenant: o.tenant_id.to_string(),
            url: o.url,
            created: o.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}
