//! Error types for fixclaim

use crate::types::{ResourceCategory, ResourceId, WorkerIdentity};
use crate::registry::LockHolder;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using fixclaim Error
pub type Result<T> = std::result::Result<T, Error>;

/// fixclaim error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Registry lock {path:?} not acquired within {waited:?} (holder: {})", describe_holder(.holder))]
    LockTimeout {
        path: PathBuf,
        waited: Duration,
        holder: Option<LockHolder>,
    },

    #[error("Registry lock {path:?} taken over while held by {worker} (now: {})", describe_holder(.current))]
    LockLost {
        path: PathBuf,
        worker: WorkerIdentity,
        current: Option<LockHolder>,
    },

    #[error("Registry corrupted at {path:?}: {reason}")]
    RegistryCorrupted { path: PathBuf, reason: String },

    #[error("{tier} tier denied by policy flag '{flag}' for category {category}")]
    PolicyDenied {
        tier: &'static str,
        flag: &'static str,
        category: ResourceCategory,
    },

    #[error("Insufficient {category}: requested {requested}, found {found} (filter: {filter})")]
    InsufficientResources {
        category: ResourceCategory,
        filter: String,
        requested: usize,
        found: usize,
    },

    #[error("{category} {id} is already claimed by {holder}")]
    ClaimConflict {
        category: ResourceCategory,
        id: ResourceId,
        holder: WorkerIdentity,
    },

    #[error("Exclusive section belongs to a different registry")]
    ForeignSection,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Backing store error: {0}")]
    BackingStore(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Failures of the coordination medium itself. Never retried by the core.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Error::LockTimeout { .. }
                | Error::LockLost { .. }
                | Error::RegistryCorrupted { .. }
                | Error::Io(_)
                | Error::Database(_)
                | Error::Serialization(_)
        )
    }

    /// Failures the caller may answer by retrying with a different request.
    pub fn is_request_level(&self) -> bool {
        matches!(
            self,
            Error::PolicyDenied { .. } | Error::InsufficientResources { .. }
        )
    }
}

fn describe_holder(holder: &Option<LockHolder>) -> String {
    match holder {
        Some(h) => format!("{} pid {} on {} since {}", h.worker, h.pid, h.host, h.acquired_at),
        None => "unknown".to_string(),
    }
}
