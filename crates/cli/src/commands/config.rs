//! Configuration commands

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use fixclaim_common::FixclaimConfig;
use serde::Serialize;
use std::path::Path;

use crate::output::{self, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show policy flags after environment overrides
    Policy,
}

/// Policy flag display
#[derive(Serialize)]
pub struct FlagDisplay {
    pub flag: String,
    pub enabled: bool,
}

impl TableDisplay for FlagDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Flag", "Enabled"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.flag.clone(), self.enabled.to_string()]
    }
}

fn render_config(config: &FixclaimConfig, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(config)?,
        OutputFormat::Yaml => serde_yaml::to_string(config)?,
        OutputFormat::Table | OutputFormat::Plain => {
            toml::to_string_pretty(config).context("rendering configuration")?
        }
    })
}

pub fn execute(
    cmd: ConfigCommands,
    config: &FixclaimConfig,
    path: &Path,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            println!("{}", render_config(config, format)?);
        }

        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists; pass --force to overwrite", path.display());
            }
            FixclaimConfig::default()
                .save(path)
                .with_context(|| format!("writing {}", path.display()))?;
            output::print_success(&format!("Wrote {}", path.display()));
        }

        ConfigCommands::Policy => {
            let flags: Vec<FlagDisplay> = config
                .policy_set()?
                .flags()
                .iter()
                .map(|(flag, enabled)| FlagDisplay {
                    flag: flag.clone(),
                    enabled: *enabled,
                })
                .collect();
            output::print_list(&flags, format);
        }
    }

    Ok(())
}
