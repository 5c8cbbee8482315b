//! Claim table kept in a single checksummed JSON file
//!
//! Every write replaces the whole file atomically (temp file + rename), so a
//! reader sees either the previous or the next table, never a mix. Anything
//! that does not parse or whose checksum disagrees with its rows is reported
//! as corruption instead of being reset.

use super::ClaimStore;
use crate::types::{ResourceCategory, ResourceClaim, ResourceId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const FORMAT_VERSION: u32 = 1;

/// On-disk document
#[derive(Debug, Serialize, Deserialize)]
struct ClaimDocument {
    version: u32,
    checksum: String,
    claims: Vec<ResourceClaim>,
}

/// File-backed claim store. Callers serialize access through the registry lock.
#[derive(Debug)]
pub struct FileClaimStore {
    path: PathBuf,
}

impl FileClaimStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn checksum(claims: &[ResourceClaim]) -> Result<String> {
        let bytes = serde_json::to_vec(claims)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }

    fn corrupted(&self, reason: impl Into<String>) -> Error {
        Error::RegistryCorrupted {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn read(&self) -> Result<Vec<ResourceClaim>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let doc: ClaimDocument = serde_json::from_slice(&bytes)
            .map_err(|e| self.corrupted(format!("unparseable claim table: {}", e)))?;

        if doc.version != FORMAT_VERSION {
            return Err(self.corrupted(format!("unsupported format version {}", doc.version)));
        }

        let actual = Self::checksum(&doc.claims)?;
        if actual != doc.checksum {
            return Err(self.corrupted(format!(
                "checksum mismatch: expected {}, got {}",
                doc.checksum, actual
            )));
        }

        let mut seen = BTreeSet::new();
        for claim in &doc.claims {
            if !seen.insert((&claim.category, &claim.id)) {
                return Err(self.corrupted(format!(
                    "{} {} is recorded more than once",
                    claim.category, claim.id
                )));
            }
        }

        Ok(doc.claims)
    }

    fn write(&self, mut claims: Vec<ResourceClaim>) -> Result<()> {
        claims.sort_by(|a, b| {
            (&a.worker, &a.category, &a.id).cmp(&(&b.worker, &b.category, &b.id))
        });
        let doc = ClaimDocument {
            version: FORMAT_VERSION,
            checksum: Self::checksum(&claims)?,
            claims,
        };

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &doc)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        debug!("Wrote {} claims to {:?}", doc.claims.len(), self.path);
        Ok(())
    }
}

impl ClaimStore for FileClaimStore {
    fn location(&self) -> &Path {
        &self.path
    }

    fn list(&self) -> Result<Vec<ResourceClaim>> {
        self.read()
    }

    fn claimed_ids(&self, category: &ResourceCategory) -> Result<BTreeSet<ResourceId>> {
        Ok(self
            .read()?
            .into_iter()
            .filter(|c| &c.category == category)
            .map(|c| c.id)
            .collect())
    }

    fn insert(&self, claims: &[ResourceClaim]) -> Result<()> {
        if claims.is_empty() {
            return Ok(());
        }
        let mut all = self.read()?;
        all.extend(claims.iter().cloned());
        self.write(all)
    }

    fn remove(&self, claims: &[ResourceClaim]) -> Result<usize> {
        if claims.is_empty() {
            return Ok(0);
        }
        let all = self.read()?;
        let before = all.len();
        let kept: Vec<_> = all
            .into_iter()
            .filter(|c| {
                !claims
                    .iter()
                    .any(|r| r.worker == c.worker && r.category == c.category && r.id == c.id)
            })
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.write(kept)?;
        }
        Ok(removed)
    }
}
