//! Registry lock commands

use anyhow::{bail, Result};
use clap::Subcommand;
use fixclaim_common::{Liveness, LockHolder};
use serde::Serialize;

use crate::client::RegistryClient;
use crate::output::{self, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum LockCommands {
    /// Show who holds the registry lock
    Status,

    /// Remove a lock left behind by a crashed holder
    Break {
        /// Break even if the holder still looks alive
        #[arg(long)]
        force: bool,
    },
}

/// Lock holder display
#[derive(Serialize)]
pub struct HolderDisplay {
    pub worker: String,
    pub host: String,
    pub pid: u32,
    pub acquired_at: String,
    pub held_for: String,
    pub status: String,
}

impl HolderDisplay {
    fn new(holder: &LockHolder, status: Liveness) -> Self {
        let held = chrono::Utc::now() - holder.acquired_at;
        Self {
            worker: holder.worker.to_string(),
            host: holder.host.clone(),
            pid: holder.pid,
            acquired_at: holder.acquired_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            held_for: format!("{}s", held.num_seconds().max(0)),
            status: status.to_string(),
        }
    }
}

impl TableDisplay for HolderDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Worker", "Host", "PID", "Acquired", "Held", "Status"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.worker.clone(),
            self.host.clone(),
            self.pid.to_string(),
            self.acquired_at.clone(),
            self.held_for.clone(),
            self.status.clone(),
        ]
    }
}

pub fn execute(cmd: LockCommands, client: RegistryClient, format: OutputFormat) -> Result<()> {
    match cmd {
        LockCommands::Status => match client.lock_holder()? {
            Some(holder) => {
                let status = client.probe(&holder.worker);
                output::print_item(&HolderDisplay::new(&holder, status), format);
            }
            None if client.is_locked() => {
                output::print_warning(&format!(
                    "Registry lock {} is held but its holder record is unreadable",
                    client.lock_path().display()
                ));
            }
            None => {
                output::print_message(
                    &format!("Registry lock {} is free", client.lock_path().display()),
                    format,
                );
            }
        },

        LockCommands::Break { force } => match client.lock_holder()? {
            None if !client.is_locked() => {
                output::print_message("Registry lock was not held", format);
            }
            None => {
                // The holder may be between creating the file and writing its record.
                if !force {
                    bail!(
                        "holder record in {} is unreadable and may still be in progress; \
                         pass --force to break anyway",
                        client.lock_path().display()
                    );
                }
                client.force_break_lock()?;
                output::print_success("Broke lock with unreadable holder record");
            }
            Some(holder) => {
                if client.probe(&holder.worker) == Liveness::Alive && !force {
                    bail!(
                        "lock holder {} (pid {}) is still running; pass --force to break anyway",
                        holder.worker,
                        holder.pid
                    );
                }
                if !client.break_lock(&holder)? {
                    bail!(
                        "registry lock changed hands since {} was inspected; check `lock status` again",
                        holder.worker
                    );
                }
                output::print_success(&format!("Broke lock held by {}", holder.worker));
            }
        },
    }

    Ok(())
}
