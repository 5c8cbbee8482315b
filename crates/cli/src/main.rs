//! fixclaim CLI - Main Entry Point
//!
//! Operational tooling for the shared claim registry: inspect and release
//! claims, sweep claims of crashed workers, deal with a stale lock.

use anyhow::Result;
use clap::{Parser, Subcommand};
use fixclaim_common::{FixclaimConfig, RegistryBackend, REGISTRY_DIR_ENV};
use serde::Serialize;
use std::path::PathBuf;

use fixclaim_cli::client::RegistryClient;
use fixclaim_cli::commands::{claims, config, lock};
use fixclaim_cli::output::{self, OutputFormat, TableDisplay};

/// fixclaim CLI - shared test fixture claims
#[derive(Parser)]
#[command(name = "fixclaim")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "FIXCLAIM_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Registry directory, overrides the configuration file
    #[arg(long, env = REGISTRY_DIR_ENV, global = true)]
    registry_dir: Option<PathBuf>,

    /// Registry backend (file or sqlite), overrides the configuration file
    #[arg(long, global = true)]
    backend: Option<RegistryBackend>,

    /// Lock wait timeout in milliseconds
    #[arg(long, global = true)]
    lock_timeout_ms: Option<u64>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and release claims
    #[command(subcommand)]
    Claims(claims::ClaimCommands),

    /// Inspect or break the registry lock
    #[command(subcommand)]
    Lock(lock::LockCommands),

    /// Manage configuration
    #[command(subcommand)]
    Config(config::ConfigCommands),

    /// Summarise registry state
    Status,

    /// Show version information
    Version,
}

/// Registry summary
#[derive(Serialize)]
struct StatusDisplay {
    registry: String,
    backend: String,
    locked: bool,
    claims: usize,
    workers: usize,
    leaked: usize,
}

impl TableDisplay for StatusDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Registry", "Backend", "Locked", "Claims", "Workers", "Leaked"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.registry.clone(),
            self.backend.clone(),
            self.locked.to_string(),
            self.claims.to_string(),
            self.workers.to_string(),
            self.leaked.to_string(),
        ]
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<(FixclaimConfig, PathBuf)> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(fixclaim_common::default_config_path);
    let mut config = FixclaimConfig::load(&path)?;

    if let Some(dir) = &cli.registry_dir {
        config.registry.dir = dir.clone();
    }
    if let Some(backend) = cli.backend {
        config.registry.backend = backend;
    }
    if let Some(timeout) = cli.lock_timeout_ms {
        config.lock.timeout_ms = timeout;
    }
    tracing::debug!("Using configuration {:?}: {:?}", path, config);
    Ok((config, path))
}

fn run(cli: Cli) -> Result<()> {
    let (settings, settings_path) = load_config(&cli)?;

    match cli.command {
        Commands::Claims(cmd) => claims::execute(cmd, RegistryClient::open(&settings)?, cli.format)?,
        Commands::Lock(cmd) => lock::execute(cmd, RegistryClient::open(&settings)?, cli.format)?,
        Commands::Config(cmd) => config::execute(cmd, &settings, &settings_path, cli.format)?,
        Commands::Status => {
            let client = RegistryClient::open(&settings)?;
            let by_worker = client.claims_by_worker()?;
            let status = StatusDisplay {
                registry: client.dir().display().to_string(),
                backend: format!("{:?}", settings.registry.backend).to_lowercase(),
                locked: client.is_locked(),
                claims: by_worker.values().map(Vec::len).sum(),
                workers: by_worker.len(),
                leaked: client.leaked_claims()?.len(),
            };
            output::print_item(&status, cli.format);
        }
        Commands::Version => {
            println!("fixclaim CLI v{}", fixclaim_common::VERSION);
        }
    }

    Ok(())
}
