//! Claim commands

use anyhow::{bail, Result};
use clap::Subcommand;
use fixclaim_common::{Liveness, ResourceCategory, ResourceClaim, WorkerIdentity};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::client::RegistryClient;
use crate::output::{self, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum ClaimCommands {
    /// List recorded claims
    List {
        /// Only claims of this worker
        #[arg(long)]
        worker: Option<WorkerIdentity>,

        /// Only claims in this category
        #[arg(long)]
        category: Option<ResourceCategory>,
    },

    /// Summarise claims per worker
    Workers,

    /// Release a worker's claims
    Release {
        /// Worker identity token
        worker: WorkerIdentity,

        /// Only release this category
        #[arg(long)]
        category: Option<ResourceCategory>,
    },

    /// List claims held by workers that are no longer running
    Leaked,

    /// Remove leaked claims
    Sweep {
        /// Remove every claim, not just leaked ones
        #[arg(long)]
        all: bool,

        /// Confirm `--all`
        #[arg(long)]
        yes: bool,

        /// Show what would be removed
        #[arg(long)]
        dry_run: bool,
    },
}

/// Claim display
#[derive(Serialize)]
pub struct ClaimDisplay {
    pub worker: String,
    pub category: String,
    pub id: String,
    pub claimed_at: String,
    pub status: String,
}

impl ClaimDisplay {
    fn new(claim: &ResourceClaim, status: Liveness) -> Self {
        Self {
            worker: claim.worker.to_string(),
            category: claim.category.to_string(),
            id: claim.id.to_string(),
            claimed_at: format_timestamp(claim.claimed_at),
            status: status.to_string(),
        }
    }
}

impl TableDisplay for ClaimDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Worker", "Category", "Resource", "Claimed", "Status"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.worker.clone(),
            self.category.clone(),
            self.id.clone(),
            self.claimed_at.clone(),
            self.status.clone(),
        ]
    }
}

/// Per-worker summary
#[derive(Serialize)]
pub struct WorkerDisplay {
    pub worker: String,
    pub claims: usize,
    pub categories: Vec<String>,
    pub status: String,
}

impl WorkerDisplay {
    fn new(worker: &WorkerIdentity, claims: &[ResourceClaim], status: Liveness) -> Self {
        let categories: BTreeSet<String> = claims.iter().map(|c| c.category.to_string()).collect();
        Self {
            worker: worker.to_string(),
            claims: claims.len(),
            categories: categories.into_iter().collect(),
            status: status.to_string(),
        }
    }
}

impl TableDisplay for WorkerDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Worker", "Claims", "Categories", "Status"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.worker.clone(),
            self.claims.to_string(),
            self.categories.join(", "),
            self.status.clone(),
        ]
    }
}

fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn display(client: &RegistryClient, claims: &[ResourceClaim]) -> Vec<ClaimDisplay> {
    claims
        .iter()
        .map(|c| ClaimDisplay::new(c, client.probe(&c.worker)))
        .collect()
}

pub fn execute(cmd: ClaimCommands, client: RegistryClient, format: OutputFormat) -> Result<()> {
    match cmd {
        ClaimCommands::List { worker, category } => {
            let claims = client.list_claims(worker.as_ref(), category.as_ref())?;
            output::print_list(&display(&client, &claims), format);
        }

        ClaimCommands::Workers => {
            let rows: Vec<WorkerDisplay> = client
                .claims_by_worker()?
                .iter()
                .map(|(worker, claims)| WorkerDisplay::new(worker, claims, client.probe(worker)))
                .collect();
            output::print_list(&rows, format);
        }

        ClaimCommands::Release { worker, category } => {
            let released = client.release(&worker, category.as_ref())?;
            if released.is_empty() {
                output::print_warning(&format!("{} holds no matching claims", worker));
            } else {
                output::print_success(&format!(
                    "Released {} claims of {}",
                    released.len(),
                    worker
                ));
            }
        }

        ClaimCommands::Leaked => {
            let leaked = client.leaked_claims()?;
            output::print_list(&display(&client, &leaked), format);
        }

        ClaimCommands::Sweep { all, yes, dry_run } => {
            if all && !yes && !dry_run {
                bail!("sweeping every claim breaks running workers; pass --yes to confirm");
            }

            if dry_run {
                let doomed = if all {
                    client.list_claims(None, None)?
                } else {
                    client.leaked_claims()?
                };
                output::print_list(&display(&client, &doomed), format);
                output::print_message(
                    &format!("{} claims would be removed", doomed.len()),
                    format,
                );
                return Ok(());
            }

            let swept = if all {
                client.sweep_all()?
            } else {
                client.sweep_leaked()?
            };
            output::print_success(&format!(
                "Swept {} claims from {}",
                swept.len(),
                client.dir().display()
            ));
        }
    }

    Ok(())
}
