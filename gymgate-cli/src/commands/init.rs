//! `gymgate init [--project-root <path>]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use gymgate_core::{registry, GymgateConfig};

use super::home_dir;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory holding `gym-service/`. Defaults to the current directory.
    #[arg(long)]
    pub project_root: Option<PathBuf>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let root = self.project_root.unwrap_or_else(|| PathBuf::from("."));
        let project_root = root
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", root.display()))?;

        let config = GymgateConfig {
            project_root,
            ..GymgateConfig::default()
        };
        let config_path = GymgateConfig::path_at(&home);
        if config
            .write_default_at(&home)
            .with_context(|| format!("failed to write {}", config_path.display()))?
        {
            println!("✓ Wrote {}", config_path.display());
        } else {
            println!("  Keeping existing {}", config_path.display());
        }

        // The seeded URL follows whatever config is now on disk.
        let effective = GymgateConfig::load_at(&home)
            .with_context(|| format!("failed to load {}", config_path.display()))?;
        if registry::seed_frontend_at(&home, &effective.frontend_origin)
            .context("failed to seed frontend origin")?
        {
            println!("✓ Seeded frontend origin {}", effective.frontend_origin);
        } else {
            println!("  Frontend origin already registered");
        }
        Ok(())
    }
}
