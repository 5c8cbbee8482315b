//! Shared-state registry
//!
//! Durable record of which resource ids are claimed by which worker, shared by
//! every thread and process pointed at the same registry directory. All
//! mutation happens inside an [`ExclusiveSection`], which is backed by a
//! sentinel lock file in that directory.
//!
//! The lock never expires by itself: a holder that crashes leaves the file
//! behind and [`SharedStateRegistry::break_lock`] is the out-of-band remedy.
//! Releasing a section only ever removes the lock file of its own acquisition.
//! Likewise claims are never expired; leaked claims are surfaced through
//! [`SharedStateRegistry::leaked_claims`] and removed by an explicit sweep.

mod file_store;
mod lock;
mod sqlite_store;

pub use file_store::FileClaimStore;
pub use lock::LockHolder;
pub use sqlite_store::SqliteClaimStore;

use crate::liveness::{Liveness, WorkerLiveness};
use crate::retry::{Clock, RetryPolicy, SystemClock};
use crate::types::{ResourceCategory, ResourceClaim, ResourceId, WorkerIdentity};
use crate::{Error, Result};
use lock::LockFile;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Name of the sentinel lock file inside the registry directory
pub const LOCK_FILE_NAME: &str = "registry.lock";

/// Persistence of claim rows.
///
/// Implementations assume the caller already holds the registry lock for
/// anything that writes; they do not coordinate among themselves.
pub trait ClaimStore: Send + Sync {
    /// Where the claims live, for diagnostics
    fn location(&self) -> &Path;

    /// Every recorded claim
    fn list(&self) -> Result<Vec<ResourceClaim>>;

    /// Ids claimed by any worker in `category`
    fn claimed_ids(&self, category: &ResourceCategory) -> Result<BTreeSet<ResourceId>>;

    /// Record new claims. Callers guarantee none of them exist yet.
    fn insert(&self, claims: &[ResourceClaim]) -> Result<()>;

    /// Delete exactly these claims, returning how many were present
    fn remove(&self, claims: &[ResourceClaim]) -> Result<usize>;
}

/// Storage backend for claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryBackend {
    /// `claims.json`, rewritten atomically on every change
    #[default]
    File,
    /// `claims.db`, a SQLite database in WAL mode
    Sqlite,
}

impl RegistryBackend {
    pub fn file_name(&self) -> &'static str {
        match self {
            RegistryBackend::File => "claims.json",
            RegistryBackend::Sqlite => "claims.db",
        }
    }
}

impl std::str::FromStr for RegistryBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "json" => Ok(RegistryBackend::File),
            "sqlite" => Ok(RegistryBackend::Sqlite),
            other => Err(Error::InvalidConfig(format!(
                "unknown registry backend '{}'",
                other
            ))),
        }
    }
}

/// Cross-process registry of resource claims
pub struct SharedStateRegistry {
    dir: PathBuf,
    lock: LockFile,
    store: Box<dyn ClaimStore>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SharedStateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStateRegistry")
            .field("dir", &self.dir)
            .field("store", &self.store.location())
            .field("retry", &self.retry)
            .finish()
    }
}

impl SharedStateRegistry {
    /// Open the registry in `dir` with the given backend
    pub fn open(dir: impl AsRef<Path>, backend: RegistryBackend, retry: RetryPolicy) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let store_path = dir.join(backend.file_name());
        let store: Box<dyn ClaimStore> = match backend {
            RegistryBackend::File => Box::new(FileClaimStore::new(store_path)),
            RegistryBackend::Sqlite => Box::new(SqliteClaimStore::open(store_path)?),
        };

        info!("Opened {:?} registry at {:?}", backend, dir);
        Ok(Self::with_store(dir, store, retry))
    }

    /// Registry over an existing claim store
    pub fn with_store(dir: impl Into<PathBuf>, store: Box<dyn ClaimStore>, retry: RetryPolicy) -> Self {
        let dir = dir.into();
        Self {
            lock: LockFile::new(dir.join(LOCK_FILE_NAME)),
            dir,
            store,
            retry,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for lock waits
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lock_path(&self) -> &Path {
        self.lock.path()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    // ========================================================================
    // Exclusive section
    // ========================================================================

    /// Block until the registry lock is held by the calling thread's identity
    pub fn acquire_exclusive_section(&self) -> Result<ExclusiveSection<'_>> {
        self.acquire_exclusive_section_as(&WorkerIdentity::current())
    }

    /// Block until the registry lock is held on behalf of `worker`.
    ///
    /// Retries with the configured backoff and fails with
    /// [`Error::LockTimeout`] once the timeout elapses. The lock is released
    /// when the returned section is dropped.
    pub fn acquire_exclusive_section_as(&self, worker: &WorkerIdentity) -> Result<ExclusiveSection<'_>> {
        let holder = LockHolder::for_worker(worker);
        let started = self.clock.now();
        let deadline = started + self.retry.timeout;
        let mut attempt = 0u32;

        loop {
            if self.lock.try_acquire(&holder)? {
                let waited = self.clock.now().saturating_duration_since(started);
                debug!("{} entered exclusive section after {:?}", worker, waited);
                return Ok(ExclusiveSection {
                    registry: self,
                    holder,
                    acquired: self.clock.now(),
                    released: false,
                });
            }

            match self.retry.next_delay(attempt, self.clock.now(), deadline) {
                Some(delay) => self.clock.sleep(delay),
                None => {
                    let holder = self.lock.holder().unwrap_or(None);
                    warn!(
                        "{} timed out after {:?} waiting for {:?} (holder: {:?})",
                        worker, self.retry.timeout, self.lock.path(), holder
                    );
                    return Err(Error::LockTimeout {
                        path: self.lock.path().to_path_buf(),
                        waited: self.clock.now().saturating_duration_since(started),
                        holder,
                    });
                }
            }
            attempt = attempt.saturating_add(1);
        }
    }

    fn check_section(&self, section: &ExclusiveSection<'_>) -> Result<()> {
        if std::ptr::eq(section.registry, self) && !section.released {
            Ok(())
        } else {
            Err(Error::ForeignSection)
        }
    }

    // ========================================================================
    // Claims
    // ========================================================================

    /// Ids claimed by any worker in `category`
    pub fn read_claims(
        &self,
        section: &ExclusiveSection<'_>,
        category: &ResourceCategory,
    ) -> Result<BTreeSet<ResourceId>> {
        self.check_section(section)?;
        self.store.claimed_ids(category)
    }

    /// Add `ids` to `worker`'s claims in `category`.
    ///
    /// Ids the worker already holds are skipped. An id held by a different
    /// worker fails the whole call with [`Error::ClaimConflict`] and nothing is
    /// written. Returns the number of newly recorded claims.
    pub fn append_claims(
        &self,
        section: &ExclusiveSection<'_>,
        worker: &WorkerIdentity,
        category: &ResourceCategory,
        ids: &[ResourceId],
    ) -> Result<usize> {
        self.check_section(section)?;

        let holders: HashMap<ResourceId, WorkerIdentity> = self
            .store
            .list()?
            .into_iter()
            .filter(|c| &c.category == category)
            .map(|c| (c.id, c.worker))
            .collect();

        let now = chrono::Utc::now().timestamp();
        let mut seen = BTreeSet::new();
        let mut fresh = Vec::new();
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            match holders.get(id) {
                Some(holder) if holder == worker => {}
                Some(holder) => {
                    return Err(Error::ClaimConflict {
                        category: category.clone(),
                        id: id.clone(),
                        holder: holder.clone(),
                    })
                }
                None => fresh.push(ResourceClaim {
                    worker: worker.clone(),
                    category: category.clone(),
                    id: id.clone(),
                    claimed_at: now,
                }),
            }
        }

        self.store.insert(&fresh)?;
        debug!("{} claimed {} new {} ({} requested)", worker, fresh.len(), category, ids.len());
        Ok(fresh.len())
    }

    /// Release `worker`'s claims in `category`, or in every category when `None`.
    /// Takes the exclusive section itself.
    pub fn clear_claims(
        &self,
        worker: &WorkerIdentity,
        category: Option<&ResourceCategory>,
    ) -> Result<Vec<ResourceClaim>> {
        let section = self.acquire_exclusive_section_as(worker)?;
        let released = self.clear_claims_in(&section, worker, category)?;
        section.release()?;
        Ok(released)
    }

    /// [`clear_claims`](Self::clear_claims) for a caller already inside the section
    pub fn clear_claims_in(
        &self,
        section: &ExclusiveSection<'_>,
        worker: &WorkerIdentity,
        category: Option<&ResourceCategory>,
    ) -> Result<Vec<ResourceClaim>> {
        self.check_section(section)?;

        let doomed: Vec<ResourceClaim> = self
            .store
            .list()?
            .into_iter()
            .filter(|c| &c.worker == worker && category.map_or(true, |cat| &c.category == cat))
            .collect();
        self.store.remove(&doomed)?;

        info!(
            "Released {} claims of {} ({})",
            doomed.len(),
            worker,
            category.map_or_else(|| "all categories".to_string(), ToString::to_string)
        );
        Ok(doomed)
    }

    // ========================================================================
    // Operational tooling
    // ========================================================================

    /// Snapshot of recorded claims, optionally narrowed to a worker and/or category.
    ///
    /// Reads without the lock so it keeps working while a crashed holder
    /// still owns it; the result may be stale as soon as it is returned.
    pub fn claims(
        &self,
        worker: Option<&WorkerIdentity>,
        category: Option<&ResourceCategory>,
    ) -> Result<Vec<ResourceClaim>> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|c| worker.map_or(true, |w| &c.worker == w))
            .filter(|c| category.map_or(true, |cat| &c.category == cat))
            .collect())
    }

    /// Claims grouped by worker
    pub fn claims_by_worker(&self) -> Result<BTreeMap<WorkerIdentity, Vec<ResourceClaim>>> {
        let mut grouped: BTreeMap<WorkerIdentity, Vec<ResourceClaim>> = BTreeMap::new();
        for claim in self.store.list()? {
            grouped.entry(claim.worker.clone()).or_default().push(claim);
        }
        Ok(grouped)
    }

    /// Current lock holder, if the lock is held
    pub fn lock_holder(&self) -> Result<Option<LockHolder>> {
        self.lock.holder()
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_held()
    }

    /// Remove the lock file left behind by a crashed holder.
    ///
    /// Only safe once `expected` is known to be gone. The file is removed only
    /// while it still records that same acquisition, so a lock that changed
    /// hands since `expected` was read is left alone and `Ok(false)` returned.
    pub fn break_lock(&self, expected: &LockHolder) -> Result<bool> {
        let broken = self.lock.remove_if_held_by(expected)?;
        if broken {
            warn!("Broke registry lock {:?} (holder: {:?})", self.lock.path(), expected);
        }
        Ok(broken)
    }

    /// Remove the lock file whatever it records, including a holder record
    /// that is not written yet. Returns the record found, if any.
    pub fn force_break_lock(&self) -> Result<Option<LockHolder>> {
        let holder = self.lock.holder()?;
        if self.lock.remove()? {
            warn!("Force-broke registry lock {:?} (holder: {:?})", self.lock.path(), holder);
        }
        Ok(holder)
    }

    /// Claims whose worker the probe reports as dead
    pub fn leaked_claims(&self, liveness: &dyn WorkerLiveness) -> Result<Vec<ResourceClaim>> {
        let claims = self.store.list()?;
        Ok(filter_dead(claims, liveness))
    }

    /// Remove the claims of workers the probe reports as dead.
    /// Workers whose liveness is unknown keep their claims.
    pub fn sweep_leaked(&self, liveness: &dyn WorkerLiveness) -> Result<Vec<ResourceClaim>> {
        let section = self.acquire_exclusive_section()?;
        let dead = filter_dead(self.store.list()?, liveness);
        self.store.remove(&dead)?;
        section.release()?;

        info!("Swept {} leaked claims", dead.len());
        Ok(dead)
    }

    /// Remove every claim. Only for use when no worker is running.
    pub fn sweep_all(&self) -> Result<Vec<ResourceClaim>> {
        let section = self.acquire_exclusive_section()?;
        let all = self.store.list()?;
        self.store.remove(&all)?;
        section.release()?;

        warn!("Swept all {} claims", all.len());
        Ok(all)
    }
}

fn filter_dead(claims: Vec<ResourceClaim>, liveness: &dyn WorkerLiveness) -> Vec<ResourceClaim> {
    let mut verdicts: HashMap<WorkerIdentity, Liveness> = HashMap::new();
    claims
        .into_iter()
        .filter(|c| {
            let verdict = *verdicts
                .entry(c.worker.clone())
                .or_insert_with(|| liveness.probe(&c.worker));
            verdict == Liveness::Dead
        })
        .collect()
}

/// Proof that the registry lock is held.
///
/// Dropping the section releases the lock on every exit path, including
/// early returns and unwinding. [`ExclusiveSection::release`] does the same
/// but reports failures to remove the lock file.
#[must_use = "the registry lock is released as soon as the section is dropped"]
pub struct ExclusiveSection<'a> {
    registry: &'a SharedStateRegistry,
    holder: LockHolder,
    acquired: Instant,
    released: bool,
}

impl<'a> ExclusiveSection<'a> {
    pub fn worker(&self) -> &WorkerIdentity {
        &self.holder.worker
    }

    /// Record written into the lock file for this acquisition
    pub fn holder(&self) -> &LockHolder {
        &self.holder
    }

    /// Release the lock, surfacing any error removing the lock file.
    ///
    /// Fails with [`Error::LockLost`] when the lock file no longer records
    /// this acquisition; the file is then left to its current holder.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        let held = self.registry.clock.now().saturating_duration_since(self.acquired);
        debug!("{} leaving exclusive section after {:?}", self.holder.worker, held);
        self.unlock()
    }

    fn unlock(&self) -> Result<()> {
        let lock = &self.registry.lock;
        if lock.remove_if_held_by(&self.holder)? {
            return Ok(());
        }
        let current = lock.holder()?;
        warn!(
            "{} lost registry lock {:?} while inside the section (now: {:?})",
            self.holder.worker,
            lock.path(),
            current
        );
        Err(Error::LockLost {
            path: lock.path().to_path_buf(),
            worker: self.holder.worker.clone(),
            current,
        })
    }
}

impl Drop for ExclusiveSection<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.unlock() {
            warn!("Failed to release registry lock {:?}: {}", self.registry.lock.path(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(150),
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
            multiplier: 2.0,
        }
    }

    fn ids(names: &[&str]) -> Vec<ResourceId> {
        names.iter().map(|n| ResourceId::from(*n)).collect()
    }

    fn open(tmp: &TempDir, backend: RegistryBackend) -> SharedStateRegistry {
        SharedStateRegistry::open(tmp.path(), backend, quick_retry()).unwrap()
    }

    #[test]
    fn test_section_releases_on_drop() {
        let tmp = TempDir::new().unwrap();
        let registry = open(&tmp, RegistryBackend::File);
        {
            let _section = registry.acquire_exclusive_section().unwrap();
            assert!(registry.is_locked());
        }
        assert!(!registry.is_locked());
    }

    #[test]
    fn test_second_acquire_times_out() {
        let tmp = TempDir::new().unwrap();
        let registry = open(&tmp, RegistryBackend::File);
        let w1 = WorkerIdentity::named("w1");

        let section = registry.acquire_exclusive_section_as(&w1).unwrap();
        match registry.acquire_exclusive_section_as(&WorkerIdentity::named("w2")) {
            Err(Error::LockTimeout { holder, waited, .. }) => {
                assert_eq!(holder.unwrap().worker, w1);
                assert!(waited >= Duration::from_millis(150));
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("lock acquired twice"),
        }
        section.release().unwrap();
        assert!(registry.acquire_exclusive_section().is_ok());
    }

    #[test]
    fn test_append_is_idempotent() {
        for backend in [RegistryBackend::File, RegistryBackend::Sqlite] {
            let tmp = TempDir::new().unwrap();
            let registry = open(&tmp, backend);
            let w1 = WorkerIdentity::named("w1");
            let cat = ResourceCategory::Locations;

            let section = registry.acquire_exclusive_section_as(&w1).unwrap();
            assert_eq!(
                registry
                    .append_claims(&section, &w1, &cat, &ids(&["A-1", "A-2", "A-1"]))
                    .unwrap(),
                2
            );
            assert_eq!(
                registry
                    .append_claims(&section, &w1, &cat, &ids(&["A-2"]))
                    .unwrap(),
                0
            );
            let claimed = registry.read_claims(&section, &cat).unwrap();
            assert_eq!(claimed, ids(&["A-1", "A-2"]).into_iter().collect());
        }
    }

    #[test]
    fn test_conflicting_append_writes_nothing() {
        for backend in [RegistryBackend::File, RegistryBackend::Sqlite] {
            let tmp = TempDir::new().unwrap();
            let registry = open(&tmp, backend);
            let w1 = WorkerIdentity::named("w1");
            let w2 = WorkerIdentity::named("w2");
            let cat = ResourceCategory::Containers;

            let section = registry.acquire_exclusive_section().unwrap();
            registry
                .append_claims(&section, &w1, &cat, &ids(&["LPN-1"]))
                .unwrap();
            let err = registry
                .append_claims(&section, &w2, &cat, &ids(&["LPN-2", "LPN-1"]))
                .unwrap_err();
            assert!(matches!(err, Error::ClaimConflict { ref holder, .. } if *holder == w1));
            drop(section);

            assert!(registry.claims(Some(&w2), None).unwrap().is_empty());
        }
    }

    #[test]
    fn test_categories_do_not_exclude_each_other() {
        let tmp = TempDir::new().unwrap();
        let registry = open(&tmp, RegistryBackend::File);
        let w1 = WorkerIdentity::named("w1");
        let w2 = WorkerIdentity::named("w2");

        let section = registry.acquire_exclusive_section().unwrap();
        registry
            .append_claims(&section, &w1, &ResourceCategory::Locations, &ids(&["X"]))
            .unwrap();
        registry
            .append_claims(&section, &w2, &ResourceCategory::Items, &ids(&["X"]))
            .unwrap();
        assert_eq!(
            registry
                .read_claims(&section, &ResourceCategory::Items)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_section_from_other_registry_rejected() {
        let tmp_a = TempDir::new().unwrap();
        let tmp_b = TempDir::new().unwrap();
        let a = open(&tmp_a, RegistryBackend::File);
        let b = open(&tmp_b, RegistryBackend::File);

        let section = a.acquire_exclusive_section().unwrap();
        assert!(matches!(
            b.read_claims(&section, &ResourceCategory::Items),
            Err(Error::ForeignSection)
        ));
    }

    #[test]
    fn test_clear_claims_by_category() {
        for backend in [RegistryBackend::File, RegistryBackend::Sqlite] {
            let tmp = TempDir::new().unwrap();
            let registry = open(&tmp, backend);
            let w1 = WorkerIdentity::named("w1");
            let w2 = WorkerIdentity::named("w2");

            {
                let section = registry.acquire_exclusive_section().unwrap();
                registry
                    .append_claims(&section, &w1, &ResourceCategory::Locations, &ids(&["L1"]))
                    .unwrap();
                registry
                    .append_claims(&section, &w1, &ResourceCategory::DockDoors, &ids(&["D1"]))
                    .unwrap();
                registry
                    .append_claims(&section, &w2, &ResourceCategory::Locations, &ids(&["L2"]))
                    .unwrap();
            }

            let released = registry
                .clear_claims(&w1, Some(&ResourceCategory::Locations))
                .unwrap();
            assert_eq!(released.len(), 1);
            assert_eq!(registry.claims(Some(&w1), None).unwrap().len(), 1);

            registry.clear_claims(&w1, None).unwrap();
            assert!(registry.claims(Some(&w1), None).unwrap().is_empty());
            assert_eq!(registry.claims(Some(&w2), None).unwrap().len(), 1);
            assert!(!registry.is_locked());
        }
    }

    #[test]
    fn test_break_stale_lock() {
        let tmp = TempDir::new().unwrap();
        let registry = open(&tmp, RegistryBackend::File);
        let crashed = WorkerIdentity::named("crashed");

        let section = registry.acquire_exclusive_section_as(&crashed).unwrap();
        std::mem::forget(section);

        assert_eq!(registry.lock_holder().unwrap().unwrap().worker, crashed);
        assert!(registry.acquire_exclusive_section().is_err());

        let holder = registry.lock_holder().unwrap().unwrap();
        assert!(registry.break_lock(&holder).unwrap());
        assert!(registry.acquire_exclusive_section().is_ok());
    }

    #[test]
    fn test_break_lock_leaves_a_newer_holder_alone() {
        let tmp = TempDir::new().unwrap();
        let registry = open(&tmp, RegistryBackend::File);

        let stale = registry
            .acquire_exclusive_section_as(&WorkerIdentity::named("slow"))
            .unwrap();
        let judged = stale.holder().clone();
        std::mem::forget(stale);
        assert!(registry.break_lock(&judged).unwrap());

        let current = registry
            .acquire_exclusive_section_as(&WorkerIdentity::named("w2"))
            .unwrap();
        assert!(!registry.break_lock(&judged).unwrap());
        assert!(registry.is_locked());
        current.release().unwrap();
    }

    #[test]
    fn test_stale_section_does_not_release_its_successor() {
        let tmp = TempDir::new().unwrap();
        let registry = open(&tmp, RegistryBackend::File);

        let slow = registry
            .acquire_exclusive_section_as(&WorkerIdentity::named("slow"))
            .unwrap();
        assert!(registry.force_break_lock().unwrap().is_some());
        let w2 = registry
            .acquire_exclusive_section_as(&WorkerIdentity::named("w2"))
            .unwrap();

        // Dropping the stale section must not free the lock w2 holds
        drop(slow);
        assert_eq!(registry.lock_holder().unwrap().unwrap().worker.as_str(), "w2");
        assert!(matches!(
            registry.acquire_exclusive_section_as(&WorkerIdentity::named("w3")),
            Err(Error::LockTimeout { .. })
        ));

        w2.release().unwrap();
        assert!(!registry.is_locked());
    }

    #[test]
    fn test_release_reports_lost_lock() {
        let tmp = TempDir::new().unwrap();
        let registry = open(&tmp, RegistryBackend::Sqlite);

        let slow = registry
            .acquire_exclusive_section_as(&WorkerIdentity::named("slow"))
            .unwrap();
        registry.force_break_lock().unwrap();
        let w2 = registry
            .acquire_exclusive_section_as(&WorkerIdentity::named("w2"))
            .unwrap();

        match slow.release() {
            Err(Error::LockLost { worker, current, .. }) => {
                assert_eq!(worker.as_str(), "slow");
                assert_eq!(current.unwrap().worker.as_str(), "w2");
            }
            other => panic!("expected LockLost, got {:?}", other),
        }
        assert!(registry.is_locked());
        w2.release().unwrap();
    }

    struct Verdicts(HashMap<String, Liveness>);

    impl WorkerLiveness for Verdicts {
        fn probe(&self, worker: &WorkerIdentity) -> Liveness {
            self.0.get(worker.as_str()).copied().unwrap_or(Liveness::Unknown)
        }
    }

    #[test]
    fn test_sweep_leaked_only_removes_dead_workers() {
        let tmp = TempDir::new().unwrap();
        let registry = open(&tmp, RegistryBackend::Sqlite);
        let cat = ResourceCategory::Items;

        {
            let section = registry.acquire_exclusive_section().unwrap();
            for (worker, id) in [("alive", "I1"), ("dead", "I2"), ("dead", "I3"), ("mystery", "I4")] {
                registry
                    .append_claims(&section, &WorkerIdentity::named(worker), &cat, &ids(&[id]))
                    .unwrap();
            }
        }

        let probe = Verdicts(HashMap::from([
            ("alive".to_string(), Liveness::Alive),
            ("dead".to_string(), Liveness::Dead),
        ]));

        assert_eq!(registry.leaked_claims(&probe).unwrap().len(), 2);
        let swept = registry.sweep_leaked(&probe).unwrap();
        assert_eq!(swept.len(), 2);
        assert!(swept.iter().all(|c| c.worker.as_str() == "dead"));

        let left: BTreeSet<_> = registry
            .claims(None, None)
            .unwrap()
            .into_iter()
            .map(|c| c.worker.as_str().to_string())
            .collect();
        assert_eq!(left, BTreeSet::from(["alive".to_string(), "mystery".to_string()]));

        assert_eq!(registry.sweep_all().unwrap().len(), 2);
        assert!(registry.claims(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_corrupted_claim_file_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let registry = open(&tmp, RegistryBackend::File);
        std::fs::write(tmp.path().join("claims.json"), b"{\"version\":1,").unwrap();

        let section = registry.acquire_exclusive_section().unwrap();
        assert!(matches!(
            registry.read_claims(&section, &ResourceCategory::Locations),
            Err(Error::RegistryCorrupted { .. })
        ));
        drop(section);
        assert!(!registry.is_locked());
    }
}
