//! Sentinel lock file guarding the registry

use crate::types::{local_host, WorkerIdentity};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

static ACQUISITIONS: AtomicU64 = AtomicU64::new(0);

/// Who holds the registry lock, written into the lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    pub worker: WorkerIdentity,
    pub pid: u32,
    pub host: String,
    pub acquired_at: DateTime<Utc>,
    /// Unique per acquisition attempt; tells two holders with the same worker apart
    #[serde(default)]
    pub token: String,
}

impl LockHolder {
    pub fn for_worker(worker: &WorkerIdentity) -> Self {
        let acquired_at = Utc::now();
        let pid = std::process::id();
        let host = local_host();
        let token = format!(
            "{}:{}:{}:{}",
            host,
            pid,
            acquired_at.timestamp_nanos_opt().unwrap_or_default(),
            ACQUISITIONS.fetch_add(1, Ordering::Relaxed)
        );
        Self {
            worker: worker.clone(),
            pid,
            host,
            acquired_at,
            token,
        }
    }

    /// Whether `other` records the same acquisition
    pub fn same_acquisition(&self, other: &LockHolder) -> bool {
        !self.token.is_empty() && self.token == other.token
    }
}

/// Advisory lock realised as an exclusively-created file.
///
/// The file never expires on its own. A crashed holder leaves it behind and
/// it has to be removed out-of-band.
#[derive(Debug)]
pub(crate) struct LockFile {
    path: PathBuf,
}

impl LockFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Single non-blocking attempt. `Ok(false)` when someone else holds it.
    pub(crate) fn try_acquire(&self, holder: &LockHolder) -> Result<bool> {
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        // The file's existence is the lock; its content is only diagnostic.
        let written = serde_json::to_vec(holder)
            .map_err(crate::Error::from)
            .and_then(|bytes| {
                file.write_all(&bytes)?;
                file.sync_all()?;
                Ok(())
            });
        if let Err(e) = written {
            warn!("Failed to record lock holder in {:?}: {}", self.path, e);
            self.remove()?;
            return Err(e);
        }

        debug!("Acquired registry lock {:?}", self.path);
        Ok(true)
    }

    /// Current holder, if the lock is held and the holder record is readable
    pub(crate) fn holder(&self) -> Result<Option<LockHolder>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(holder) => Ok(Some(holder)),
            Err(e) => {
                // Holder may still be writing its record.
                debug!("Unreadable lock holder record in {:?}: {}", self.path, e);
                Ok(None)
            }
        }
    }

    pub(crate) fn is_held(&self) -> bool {
        self.path.exists()
    }

    /// Remove the lock file only if its record is still `expected`'s acquisition.
    ///
    /// `Ok(false)` when the file is gone, unreadable or belongs to someone else.
    pub(crate) fn remove_if_held_by(&self, expected: &LockHolder) -> Result<bool> {
        match self.holder()? {
            Some(current) if current.same_acquisition(expected) => self.remove(),
            current => {
                debug!(
                    "Lock {:?} not removed: expected {}, found {:?}",
                    self.path, expected.token, current
                );
                Ok(false)
            }
        }
    }

    /// Remove the lock file. `Ok(false)` if it was already gone.
    pub(crate) fn remove(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Released registry lock {:?}", self.path);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
