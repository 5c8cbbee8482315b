//! Registry client used by the commands

use anyhow::{Context, Result};
use fixclaim_common::{
    FixclaimConfig, Liveness, LockHolder, ProcessLiveness, ResourceCategory, ResourceClaim,
    SharedStateRegistry, WorkerIdentity, WorkerLiveness,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Handle on the registry directory named by the configuration
pub struct RegistryClient {
    registry: SharedStateRegistry,
    liveness: Box<dyn WorkerLiveness>,
}

impl RegistryClient {
    /// Open the registry the configuration points at
    pub fn open(config: &FixclaimConfig) -> Result<Self> {
        let registry = config.open_registry().with_context(|| {
            format!("opening registry at {}", config.registry.dir.display())
        })?;
        Ok(Self {
            registry,
            liveness: Box::new(ProcessLiveness::new()),
        })
    }

    /// Replace the liveness probe
    pub fn with_liveness(mut self, liveness: Box<dyn WorkerLiveness>) -> Self {
        self.liveness = liveness;
        self
    }

    pub fn dir(&self) -> &Path {
        self.registry.dir()
    }

    pub fn lock_path(&self) -> &Path {
        self.registry.lock_path()
    }

    pub fn probe(&self, worker: &WorkerIdentity) -> Liveness {
        self.liveness.probe(worker)
    }

    // Claim operations

    pub fn list_claims(
        &self,
        worker: Option<&WorkerIdentity>,
        category: Option<&ResourceCategory>,
    ) -> Result<Vec<ResourceClaim>> {
        Ok(self.registry.claims(worker, category)?)
    }

    pub fn claims_by_worker(&self) -> Result<BTreeMap<WorkerIdentity, Vec<ResourceClaim>>> {
        Ok(self.registry.claims_by_worker()?)
    }

    pub fn release(
        &self,
        worker: &WorkerIdentity,
        category: Option<&ResourceCategory>,
    ) -> Result<Vec<ResourceClaim>> {
        Ok(self.registry.clear_claims(worker, category)?)
    }

    pub fn leaked_claims(&self) -> Result<Vec<ResourceClaim>> {
        Ok(self.registry.leaked_claims(self.liveness.as_ref())?)
    }

    pub fn sweep_leaked(&self) -> Result<Vec<ResourceClaim>> {
        Ok(self.registry.sweep_leaked(self.liveness.as_ref())?)
    }

    pub fn sweep_all(&self) -> Result<Vec<ResourceClaim>> {
        Ok(self.registry.sweep_all()?)
    }

    // Lock operations

    pub fn lock_holder(&self) -> Result<Option<LockHolder>> {
        Ok(self.registry.lock_holder()?)
    }

    pub fn is_locked(&self) -> bool {
        self.registry.is_locked()
    }

    /// Remove the lock only while it still records `expected`
    pub fn break_lock(&self, expected: &LockHolder) -> Result<bool> {
        Ok(self.registry.break_lock(expected)?)
    }

    pub fn force_break_lock(&self) -> Result<Option<LockHolder>> {
        Ok(self.registry.force_break_lock()?)
    }
}
