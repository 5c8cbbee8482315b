//! SQLite-backed claim table

use super::ClaimStore;
use crate::types::{ResourceCategory, ResourceClaim, ResourceId, WorkerIdentity};
use crate::{Error, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Claim store in a SQLite database.
///
/// The primary key on `(category, resource_id)` backs up the one-holder
/// invariant at the storage level.
#[derive(Clone)]
pub struct SqliteClaimStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteClaimStore {
    /// Open or create the claim database at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path).map_err(|e| classify(&path, e))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| classify(&path, e))?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")
            .map_err(|e| classify(&path, e))?;

        let store = Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        };
        store.check_integrity()?;
        store.init_schema()?;

        info!("Opened claim database at {:?}", store.path);
        Ok(store)
    }

    /// Run `PRAGMA quick_check`; anything but "ok" is corruption
    fn check_integrity(&self) -> Result<()> {
        let conn = self.conn.lock();
        let verdict: String = conn
            .query_row("PRAGMA quick_check", [], |row| row.get(0))
            .map_err(|e| classify(&self.path, e))?;
        if verdict != "ok" {
            return Err(Error::RegistryCorrupted {
                path: self.path.clone(),
                reason: format!("quick_check reported: {}", verdict),
            });
        }
        Ok(())
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS claims (
                category TEXT NOT NULL,
                resource_id TEXT NOT NULL,
                worker TEXT NOT NULL,
                claimed_at INTEGER NOT NULL,
                PRIMARY KEY (category, resource_id)
            );
            CREATE INDEX IF NOT EXISTS idx_claims_worker ON claims(worker);
            "#,
        )
        .map_err(|e| classify(&self.path, e))?;

        debug!("Claim schema initialized");
        Ok(())
    }

    fn parse_row(&self, raw: RawClaim) -> Result<ResourceClaim> {
        let category = raw.category.parse().map_err(|_| Error::RegistryCorrupted {
            path: self.path.clone(),
            reason: format!("invalid category '{}' in claims table", raw.category),
        })?;
        Ok(ResourceClaim {
            worker: WorkerIdentity::named(raw.worker),
            category,
            id: ResourceId::new(raw.resource_id),
            claimed_at: raw.claimed_at,
        })
    }
}

impl ClaimStore for SqliteClaimStore {
    fn location(&self) -> &Path {
        &self.path
    }

    fn list(&self) -> Result<Vec<ResourceClaim>> {
        let raws = {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare(
                    "SELECT category, resource_id, worker, claimed_at FROM claims
                     ORDER BY worker, category, resource_id",
                )
                .map_err(|e| classify(&self.path, e))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(RawClaim {
                        category: row.get(0)?,
                        resource_id: row.get(1)?,
                        worker: row.get(2)?,
                        claimed_at: row.get(3)?,
                    })
                })
                .map_err(|e| classify(&self.path, e))?;

            let mut raws = Vec::new();
            for row in rows {
                raws.push(row.map_err(|e| classify(&self.path, e))?);
            }
            raws
        };

        raws.into_iter().map(|raw| self.parse_row(raw)).collect()
    }

    fn claimed_ids(&self, category: &ResourceCategory) -> Result<BTreeSet<ResourceId>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT resource_id FROM claims WHERE category = ?1")
            .map_err(|e| classify(&self.path, e))?;
        let rows = stmt
            .query_map(params![category.as_str()], |row| row.get::<_, String>(0))
            .map_err(|e| classify(&self.path, e))?;

        let mut ids = BTreeSet::new();
        for row in rows {
            ids.insert(ResourceId::new(row.map_err(|e| classify(&self.path, e))?));
        }
        Ok(ids)
    }

    fn insert(&self, claims: &[ResourceClaim]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(|e| classify(&self.path, e))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO claims (category, resource_id, worker, claimed_at)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(|e| classify(&self.path, e))?;
            for claim in claims {
                stmt.execute(params![
                    claim.category.as_str(),
                    claim.id.as_str(),
                    claim.worker.as_str(),
                    claim.claimed_at,
                ])
                .map_err(|e| classify(&self.path, e))?;
            }
        }
        tx.commit().map_err(|e| classify(&self.path, e))?;

        debug!("Inserted {} claims", claims.len());
        Ok(())
    }

    fn remove(&self, claims: &[ResourceClaim]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(|e| classify(&self.path, e))?;
        let mut removed = 0;
        {
            let mut stmt = tx
                .prepare(
                    "DELETE FROM claims WHERE category = ?1 AND resource_id = ?2 AND worker = ?3",
                )
                .map_err(|e| classify(&self.path, e))?;
            for claim in claims {
                removed += stmt
                    .execute(params![
                        claim.category.as_str(),
                        claim.id.as_str(),
                        claim.worker.as_str(),
                    ])
                    .map_err(|e| classify(&self.path, e))?;
            }
        }
        tx.commit().map_err(|e| classify(&self.path, e))?;

        debug!("Removed {} claims", removed);
        Ok(removed)
    }
}

/// Raw database row before parsing
struct RawClaim {
    category: String,
    resource_id: String,
    worker: String,
    claimed_at: i64,
}

/// Map SQLite corruption codes to `RegistryCorrupted`, everything else to `Database`
fn classify(path: &Path, err: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(ref failure, ref message) = err {
        if matches!(
            failure.code,
            ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase
        ) {
            return Error::RegistryCorrupted {
                path: path.to_path_buf(),
                reason: message.clone().unwrap_or_else(|| failure.to_string()),
            };
        }
    }
    Error::Database(err)
}
