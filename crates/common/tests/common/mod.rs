//! Shared helpers for registry and allocator integration tests.

#![allow(dead_code)]

use fixclaim_common::{
    Availability, BackingStore, PolicySet, RegistryBackend, ResourceAllocator, ResourceCategory,
    ResourceId, Result, RetryPolicy, SharedStateRegistry, WorkerIdentity,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Zone predicate understood by [`WarehouseStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone(pub &'static str);

#[derive(Debug, Clone)]
struct Slot {
    category: ResourceCategory,
    id: ResourceId,
    zone: &'static str,
    occupied: bool,
}

/// In-memory backing store that counts calls to each hook
#[derive(Debug, Default)]
pub struct WarehouseStore {
    slots: Mutex<Vec<Slot>>,
    next_created: AtomicUsize,
    pub queries: AtomicUsize,
    pub mutations: AtomicUsize,
    pub creations: AtomicUsize,
}

impl WarehouseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` slots named `{prefix}-{n:03}`
    pub fn stock(
        &self,
        category: ResourceCategory,
        zone: &'static str,
        prefix: &str,
        count: usize,
        occupied: bool,
    ) -> Vec<ResourceId> {
        let mut slots = self.slots.lock();
        (0..count)
            .map(|n| {
                let id = ResourceId::new(format!("{}-{:03}", prefix, n));
                slots.push(Slot {
                    category: category.clone(),
                    id: id.clone(),
                    zone,
                    occupied,
                });
                id
            })
            .collect()
    }

    pub fn is_occupied(&self, id: &ResourceId) -> Option<bool> {
        self.slots
            .lock()
            .iter()
            .find(|s| &s.id == id)
            .map(|s| s.occupied)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn creation_count(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }

    /// Any call that changes data
    pub fn side_effects(&self) -> usize {
        self.mutation_count() + self.creation_count()
    }
}

impl BackingStore for WarehouseStore {
    type Filter = Zone;

    fn query(
        &self,
        category: &ResourceCategory,
        filter: &Zone,
        availability: Availability,
        excluding: &BTreeSet<ResourceId>,
        limit: usize,
    ) -> Result<Vec<ResourceId>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let want_occupied = availability == Availability::Occupied;
        Ok(self
            .slots
            .lock()
            .iter()
            .filter(|s| &s.category == category && s.zone == filter.0)
            .filter(|s| s.occupied == want_occupied)
            .filter(|s| !excluding.contains(&s.id))
            .take(limit)
            .map(|s| s.id.clone())
            .collect())
    }

    fn mutate(&self, category: &ResourceCategory, ids: &[ResourceId], target: &Zone) -> Result<()> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            if &slot.category == category && ids.contains(&slot.id) {
                slot.occupied = false;
                slot.zone = target.0;
            }
        }
        Ok(())
    }

    fn create(&self, category: &ResourceCategory, spec: &Zone, count: usize) -> Result<Vec<ResourceId>> {
        self.creations.fetch_add(1, Ordering::SeqCst);
        let mut slots = self.slots.lock();
        Ok((0..count)
            .map(|_| {
                let n = self.next_created.fetch_add(1, Ordering::SeqCst);
                let id = ResourceId::new(format!("NEW-{}-{:04}", spec.0, n));
                slots.push(Slot {
                    category: category.clone(),
                    id: id.clone(),
                    zone: spec.0,
                    occupied: false,
                });
                id
            })
            .collect())
    }
}

pub fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_millis(200),
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(25),
        multiplier: 2.0,
    }
}

pub fn patient_retry() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_secs(30),
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(10),
        multiplier: 2.0,
    }
}

pub fn open_registry(dir: &Path, backend: RegistryBackend, retry: RetryPolicy) -> Arc<SharedStateRegistry> {
    Arc::new(SharedStateRegistry::open(dir, backend, retry).unwrap())
}

pub fn allocator(
    worker: &str,
    registry: &Arc<SharedStateRegistry>,
    store: &Arc<WarehouseStore>,
    policy: PolicySet,
) -> ResourceAllocator<WarehouseStore, PolicySet> {
    ResourceAllocator::new(
        WorkerIdentity::named(worker),
        Arc::clone(registry),
        Arc::clone(store),
        Arc::new(policy),
    )
}
