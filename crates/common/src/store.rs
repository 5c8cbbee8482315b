//! Interface to the system of record holding the actual resources

use crate::types::{ResourceCategory, ResourceId};
use crate::Result;
use std::collections::BTreeSet;
use std::fmt::Debug;

/// Which resources a query may return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Matching and already in the desired state
    Available,
    /// Matching apart from being occupied or otherwise not in the default
    /// state; candidates for the repurpose tier
    Occupied,
}

/// Business data the allocator draws resources from.
///
/// The store knows nothing about claims. It is only called from inside the
/// registry's exclusive section, and every call is synchronous.
pub trait BackingStore: Send + Sync {
    /// Opaque predicate selecting resources. Also describes the target state
    /// for [`mutate`](Self::mutate) and [`create`](Self::create).
    type Filter: Debug + Send + Sync;

    /// Up to `limit` ids matching `filter` in the given availability, none of
    /// them in `excluding`. The order returned is the order they are taken in.
    fn query(
        &self,
        category: &ResourceCategory,
        filter: &Self::Filter,
        availability: Availability,
        excluding: &BTreeSet<ResourceId>,
        limit: usize,
    ) -> Result<Vec<ResourceId>>;

    /// Reset existing resources to the state `target` describes
    fn mutate(
        &self,
        category: &ResourceCategory,
        ids: &[ResourceId],
        target: &Self::Filter,
    ) -> Result<()>;

    /// Synthesize exactly `count` new resources in the state `spec` describes
    fn create(
        &self,
        category: &ResourceCategory,
        spec: &Self::Filter,
        count: usize,
    ) -> Result<Vec<ResourceId>>;
}
