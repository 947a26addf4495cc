//! Config file commands

use anyhow::{bail, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use studio_common::GatewayConfig;

use crate::output::{print_success, render_structured, OutputFormat};

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective config, env overrides applied
    Show,

    /// Write the default config to disk
    Init {
        /// Destination; defaults to the global --config path
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Check that every proxy rule resolves to a valid upstream
    Validate,
}

pub fn execute(
    cmd: ConfigCommands,
    config_path: &Path,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let config = super::load_config(config_path)?;
            println!("{}", render_config(&config, format)?);
        }
        ConfigCommands::Init { path, force } => {
            let path = path.unwrap_or_else(|| config_path.to_path_buf());
            init(&path, force)?;
            print_success(&format!("Wrote default config to {}", path.display()));
        }
        ConfigCommands::Validate => {
            let config = super::load_config(config_path)?;
            config.validate()?;
            print_success(&validation_summary(&config));
        }
    }
    Ok(())
}

fn validation_summary(config: &GatewayConfig) -> String {
    format!(
        "{} proxy rules, {} upstreams, {} {} routes",
        config.proxy.len(),
        config.upstreams.len(),
        config.route_table().len(),
        config.router.scheme
    )
}

fn render_config(config: &GatewayConfig, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json | OutputFormat::Yaml => render_structured(config, format),
        OutputFormat::Table | OutputFormat::Plain => Ok(config.to_toml_string()?),
    }
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    GatewayConfig::default().save(path)?;
    Ok(())
}
