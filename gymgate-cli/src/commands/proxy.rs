//! `gymgate proxy render|diff`: preview without writing or reloading.

use anyhow::{Context, Result};
use clap::Subcommand;

use gymgate_core::{FileRegistry, GymgateConfig};
use gymgate_renderer::Renderer;
use gymgate_sync::{diff_config, render_current};

#[derive(Subcommand, Debug)]
pub enum ProxyCommand {
    /// Print the nginx config generated from the current registry.
    Render,
    /// Show a unified diff against the config file on disk.
    Diff,
}

pub fn run(command: ProxyCommand) -> Result<()> {
    let config = GymgateConfig::load().context("failed to load gymgate config")?;
    let registry = FileRegistry::from_home().context("failed to locate origin registry")?;
    let renderer = Renderer::new(&config.proxy).context("failed to load nginx template")?;

    match command {
        ProxyCommand::Render => {
            let rendered =
                render_current(&registry, &renderer).context("failed to render nginx config")?;
            print!("{rendered}");
        }
        ProxyCommand::Diff => {
            let diff = diff_config(&registry, &renderer).context("failed to diff nginx config")?;
            match diff.unified_diff {
                None => println!("No differences for {}.", diff.path.display()),
                Some(unified) => {
                    print!("{unified}");
                    if !unified.ends_with('\n') {
                        println!();
                    }
                }
            }
        }
    }
    Ok(())
}
