//! Liveness probes for finding leaked claims

use crate::types::{local_host, WorkerIdentity};
use serde::{Deserialize, Serialize};

/// Whether the worker behind a claim is still running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Alive,
    Dead,
    /// Cannot be determined from here; such claims are never swept
    Unknown,
}

impl std::fmt::Display for Liveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Liveness::Alive => write!(f, "alive"),
            Liveness::Dead => write!(f, "dead"),
            Liveness::Unknown => write!(f, "unknown"),
        }
    }
}

/// Decides whether a worker is still running
pub trait WorkerLiveness {
    fn probe(&self, worker: &WorkerIdentity) -> Liveness;
}

/// Probes the process a worker identity originated from.
///
/// Only identities created on this host with a `host:pid:thread` token can
/// be judged. A live process counts as alive even if the thread that made
/// the claim has finished.
#[derive(Debug, Clone)]
pub struct ProcessLiveness {
    host: String,
}

impl ProcessLiveness {
    pub fn new() -> Self {
        Self { host: local_host() }
    }

    /// Probe as if running on `host`
    pub fn for_host(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

impl Default for ProcessLiveness {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerLiveness for ProcessLiveness {
    fn probe(&self, worker: &WorkerIdentity) -> Liveness {
        match worker.origin() {
            Some((host, pid)) if host == self.host => process_liveness(pid),
            _ => Liveness::Unknown,
        }
    }
}

#[cfg(unix)]
fn process_liveness(pid: u32) -> Liveness {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return Liveness::Unknown;
    };
    if raw <= 0 {
        return Liveness::Unknown;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => Liveness::Alive,
        // Exists but belongs to someone else
        Err(Errno::EPERM) => Liveness::Alive,
        Err(Errno::ESRCH) => Liveness::Dead,
        Err(_) => Liveness::Unknown,
    }
}

#[cfg(not(unix))]
fn process_liveness(_pid: u32) -> Liveness {
    Liveness::Unknown
}
