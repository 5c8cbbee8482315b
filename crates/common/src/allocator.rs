//! Tiered resource allocation
//!
//! A request for N resources is resolved in one critical section:
//!
//! 1. **find**: matching, available resources nobody has claimed
//! 2. **repurpose**: matching but occupied resources, reset to the desired
//!    state (needs `allow-clear`)
//! 3. **fabricate**: brand-new resources (needs `allow-create`)
//!
//! Tiers accumulate towards N. Side effects on the backing store only happen
//! once the whole plan is known to reach N, and the ids are claimed before the
//! lock is released. Either exactly N ids are claimed and returned or nothing
//! is claimed.

use crate::policy::{PolicySource, ALLOW_CLEAR, ALLOW_CREATE};
use crate::registry::{ExclusiveSection, SharedStateRegistry};
use crate::store::{Availability, BackingStore};
use crate::types::{ResourceCategory, ResourceClaim, ResourceId, ResourceRequest, Tier, WorkerIdentity};
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Outcome of a successful allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Claimed ids in tier order: found, then repurposed, then fabricated
    pub ids: Vec<ResourceId>,
    pub found: usize,
    pub repurposed: usize,
    pub fabricated: usize,
    /// Set when the claims were committed but the registry lock could not be
    /// released cleanly afterwards, e.g. because it was broken and taken over
    pub release_error: Option<String>,
}

impl Allocation {
    /// Last tier that contributed
    pub fn deepest_tier(&self) -> Tier {
        if self.fabricated > 0 {
            Tier::Fabricate
        } else if self.repurposed > 0 {
            Tier::Repurpose
        } else {
            Tier::Find
        }
    }
}

/// Allocator acting on behalf of one worker
pub struct ResourceAllocator<S, P> {
    worker: WorkerIdentity,
    registry: Arc<SharedStateRegistry>,
    store: Arc<S>,
    policy: Arc<P>,
}

impl<S, P> Clone for ResourceAllocator<S, P> {
    fn clone(&self) -> Self {
        Self {
            worker: self.worker.clone(),
            registry: Arc::clone(&self.registry),
            store: Arc::clone(&self.store),
            policy: Arc::clone(&self.policy),
        }
    }
}

impl<S: BackingStore, P: PolicySource> ResourceAllocator<S, P> {
    pub fn new(
        worker: WorkerIdentity,
        registry: Arc<SharedStateRegistry>,
        store: Arc<S>,
        policy: Arc<P>,
    ) -> Self {
        Self {
            worker,
            registry,
            store,
            policy,
        }
    }

    /// Same registry, store and policy on behalf of another worker
    pub fn for_worker(&self, worker: WorkerIdentity) -> Self {
        Self {
            worker,
            ..self.clone()
        }
    }

    pub fn worker(&self) -> &WorkerIdentity {
        &self.worker
    }

    pub fn registry(&self) -> &SharedStateRegistry {
        &self.registry
    }

    /// Resolve `request` into exactly `request.count` claimed ids.
    ///
    /// A lock that could not be released after the claims were committed is
    /// logged; use [`allocate_detailed`](Self::allocate_detailed) to inspect it.
    pub fn allocate(&self, request: &ResourceRequest<S::Filter>) -> Result<Vec<ResourceId>> {
        self.allocate_detailed(request).map(|a| a.ids)
    }

    /// [`allocate`](Self::allocate), also reporting which tiers contributed
    pub fn allocate_detailed(&self, request: &ResourceRequest<S::Filter>) -> Result<Allocation> {
        if request.count == 0 {
            return Err(Error::InvalidRequest(format!(
                "requested zero {}",
                request.category
            )));
        }

        let section = self.registry.acquire_exclusive_section_as(&self.worker)?;
        let mut allocation = self.resolve(&section, request)?;

        // Claims are committed at this point, so the ids are still returned.
        if let Err(e) = section.release() {
            error!("{} could not release the registry lock: {}", self.worker, e);
            allocation.release_error = Some(e.to_string());
        }

        info!(
            "{} allocated {} {} (find {}, repurpose {}, fabricate {})",
            self.worker,
            allocation.ids.len(),
            request.category,
            allocation.found,
            allocation.repurposed,
            allocation.fabricated
        );
        Ok(allocation)
    }

    /// Release this worker's claims in `category`, or all categories
    pub fn release(&self, category: Option<&ResourceCategory>) -> Result<Vec<ResourceClaim>> {
        self.registry.clear_claims(&self.worker, category)
    }

    /// Claims currently held by this worker
    pub fn held(&self, category: Option<&ResourceCategory>) -> Result<Vec<ResourceClaim>> {
        self.registry.claims(Some(&self.worker), category)
    }

    fn resolve(
        &self,
        section: &ExclusiveSection<'_>,
        request: &ResourceRequest<S::Filter>,
    ) -> Result<Allocation> {
        let category = &request.category;
        let wanted = request.count;
        let mut excluding = self.registry.read_claims(section, category)?;
        debug!(
            "{} resolving {} {} with {} excluded",
            self.worker,
            wanted,
            category,
            excluding.len()
        );

        // find
        let found = self.query(request, Availability::Available, &excluding, wanted)?;
        if found.len() == wanted {
            return self.commit(section, request, found, Vec::new(), Vec::new());
        }
        excluding.extend(found.iter().cloned());
        debug!("find tier short by {}", wanted - found.len());

        // repurpose
        let mut repurpose = Vec::new();
        if request.tiers.repurpose {
            self.require(ALLOW_CLEAR, Tier::Repurpose, category)?;
            repurpose = self.query(
                request,
                Availability::Occupied,
                &excluding,
                wanted - found.len(),
            )?;
            excluding.extend(repurpose.iter().cloned());
        }

        // fabricate
        let shortfall = wanted - found.len() - repurpose.len();
        if shortfall > 0 {
            if !request.tiers.fabricate {
                return Err(Error::InsufficientResources {
                    category: category.clone(),
                    filter: format!("{:?}", request.filter),
                    requested: wanted,
                    found: found.len() + repurpose.len(),
                });
            }
            self.require(ALLOW_CREATE, Tier::Fabricate, category)?;
        }

        // The plan reaches N; only now touch the backing store.
        if !repurpose.is_empty() {
            self.store.mutate(category, &repurpose, &request.filter)?;
        }
        let created = if shortfall > 0 {
            let created = self.store.create(category, &request.filter, shortfall)?;
            check_created(&created, shortfall, &excluding)?;
            created
        } else {
            Vec::new()
        };

        self.commit(section, request, found, repurpose, created)
    }

    fn query(
        &self,
        request: &ResourceRequest<S::Filter>,
        availability: Availability,
        excluding: &BTreeSet<ResourceId>,
        limit: usize,
    ) -> Result<Vec<ResourceId>> {
        let mut ids = self.store.query(
            &request.category,
            &request.filter,
            availability,
            excluding,
            limit,
        )?;
        ids.truncate(limit);

        let mut seen = BTreeSet::new();
        for id in &ids {
            if excluding.contains(id) || !seen.insert(id) {
                return Err(Error::BackingStore(format!(
                    "{:?} query for {} returned excluded or duplicate id {}",
                    availability, request.category, id
                )));
            }
        }
        Ok(ids)
    }

    fn require(&self, flag: &'static str, tier: Tier, category: &ResourceCategory) -> Result<()> {
        if self.policy.get(flag) {
            return Ok(());
        }
        info!("{} tier for {} denied: {} is off", tier, category, flag);
        Err(Error::PolicyDenied {
            tier: tier.as_str(),
            flag,
            category: category.clone(),
        })
    }

    fn commit(
        &self,
        section: &ExclusiveSection<'_>,
        request: &ResourceRequest<S::Filter>,
        found: Vec<ResourceId>,
        repurposed: Vec<ResourceId>,
        fabricated: Vec<ResourceId>,
    ) -> Result<Allocation> {
        let allocation = Allocation {
            found: found.len(),
            repurposed: repurposed.len(),
            fabricated: fabricated.len(),
            ids: found
                .into_iter()
                .chain(repurposed)
                .chain(fabricated)
                .collect(),
            release_error: None,
        };
        debug_assert_eq!(allocation.ids.len(), request.count);

        self.registry
            .append_claims(section, &self.worker, &request.category, &allocation.ids)?;
        Ok(allocation)
    }
}

fn check_created(
    created: &[ResourceId],
    expected: usize,
    excluding: &BTreeSet<ResourceId>,
) -> Result<()> {
    if created.len() != expected {
        return Err(Error::BackingStore(format!(
            "asked to create {} resources, got {}",
            expected,
            created.len()
        )));
    }
    let mut seen = BTreeSet::new();
    for id in created {
        if excluding.contains(id) || !seen.insert(id) {
            return Err(Error::BackingStore(format!(
                "created id {} collides with an existing claim or candidate",
                id
            )));
        }
    }
    Ok(())
}
