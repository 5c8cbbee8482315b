//! Core types for fixclaim

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of one concurrent worker (a thread or a process).
///
/// The token is opaque to the registry. Tokens built by [`WorkerIdentity::current`]
/// have the shape `host:pid:thread`, which lets liveness probes recover the
/// originating process.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerIdentity(String);

impl WorkerIdentity {
    /// Wrap a caller-chosen token
    pub fn named(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Identity of the calling thread in the current process
    pub fn current() -> Self {
        let host = local_host();
        let pid = std::process::id();
        let thread = std::thread::current();
        let number = thread_number(thread.id());
        let tag = match thread.name() {
            Some(name) => format!("{}-{}", number, name),
            None => number,
        };
        Self(format!("{}:{}:{}", host, pid, tag))
    }

    /// Token as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host and pid this identity was created in, when the token carries them
    pub fn origin(&self) -> Option<(&str, u32)> {
        let mut parts = self.0.splitn(3, ':');
        let host = parts.next()?;
        let pid = parts.next()?.parse().ok()?;
        parts.next()?;
        if host.is_empty() {
            return None;
        }
        Some((host, pid))
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorkerIdentity {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(crate::Error::InvalidRequest(
                "worker identity must not be empty".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }
}

/// Host name of this machine, `localhost` when it cannot be determined
pub fn local_host() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

// ThreadId has no stable numeric accessor; its Debug form is `ThreadId(N)`.
fn thread_number(id: std::thread::ThreadId) -> String {
    let raw = format!("{:?}", id);
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    format!("t{}", digits)
}

/// Partition of the claim space. Claims in different categories never
/// exclude each other.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ResourceCategory {
    Locations,
    Items,
    Containers,
    DockDoors,
    ConsolidationLocations,
    Other(String),
}

impl ResourceCategory {
    pub fn as_str(&self) -> &str {
        match self {
            ResourceCategory::Locations => "locations",
            ResourceCategory::Items => "items",
            ResourceCategory::Containers => "containers",
            ResourceCategory::DockDoors => "dock-doors",
            ResourceCategory::ConsolidationLocations => "consolidation-locations",
            ResourceCategory::Other(name) => name,
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceCategory {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Ok(match normalized.as_str() {
            "" => {
                return Err(crate::Error::InvalidRequest(
                    "resource category must not be empty".to_string(),
                ))
            }
            "locations" => ResourceCategory::Locations,
            "items" => ResourceCategory::Items,
            "containers" => ResourceCategory::Containers,
            "dock-doors" => ResourceCategory::DockDoors,
            "consolidation-locations" => ResourceCategory::ConsolidationLocations,
            _ => ResourceCategory::Other(normalized),
        })
    }
}

impl From<ResourceCategory> for String {
    fn from(category: ResourceCategory) -> Self {
        category.as_str().to_string()
    }
}

impl TryFrom<String> for ResourceCategory {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Identifier of one resource in the backing store
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A recorded claim of one resource by one worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceClaim {
    pub worker: WorkerIdentity,
    pub category: ResourceCategory,
    pub id: ResourceId,
    /// Unix timestamp (seconds) of the claim
    pub claimed_at: i64,
}

/// Fallback tier of an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Find,
    Repurpose,
    Fabricate,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Find => "find",
            Tier::Repurpose => "repurpose",
            Tier::Fabricate => "fabricate",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fallback tiers that apply to a request. FIND always runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPlan {
    pub repurpose: bool,
    pub fabricate: bool,
}

impl TierPlan {
    /// FIND, then REPURPOSE, then FABRICATE
    pub const FULL: TierPlan = TierPlan {
        repurpose: true,
        fabricate: true,
    };

    /// FIND only; a shortfall is reported as insufficient resources
    pub const FIND_ONLY: TierPlan = TierPlan {
        repurpose: false,
        fabricate: false,
    };

    pub fn includes(&self, tier: Tier) -> bool {
        match tier {
            Tier::Find => true,
            Tier::Repurpose => self.repurpose,
            Tier::Fabricate => self.fabricate,
        }
    }
}

impl Default for TierPlan {
    fn default() -> Self {
        Self::FULL
    }
}

/// Declarative request for `count` resources of one category.
///
/// `filter` is opaque to the allocator. It is handed to the backing store
/// unchanged and doubles as the description of the desired state for the
/// repurpose and fabricate tiers.
#[derive(Debug, Clone)]
pub struct ResourceRequest<F> {
    pub count: usize,
    pub category: ResourceCategory,
    pub filter: F,
    pub tiers: TierPlan,
}

impl<F> ResourceRequest<F> {
    pub fn new(category: ResourceCategory, count: usize, filter: F) -> Self {
        Self {
            count,
            category,
            filter,
            tiers: TierPlan::default(),
        }
    }

    pub fn with_tiers(mut self, tiers: TierPlan) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn find_only(self) -> Self {
        self.with_tiers(TierPlan::FIND_ONLY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip() {
        for name in [
            "locations",
            "items",
            "containers",
            "dock-doors",
            "consolidation-locations",
        ] {
            let category: ResourceCategory = name.parse().unwrap();
            assert_eq!(category.to_string(), name);
            assert!(!matches!(category, ResourceCategory::Other(_)));
        }

        let other: ResourceCategory = "Pallet_Jacks".parse().unwrap();
        assert_eq!(other, ResourceCategory::Other("pallet-jacks".to_string()));
        assert!("  ".parse::<ResourceCategory>().is_err());
    }

    #[test]
    fn test_category_serde_as_string() {
        let json = serde_json::to_string(&ResourceCategory::DockDoors).unwrap();
        assert_eq!(json, "\"dock-doors\"");
        let back: ResourceCategory = serde_json::from_str("\"dock_doors\"").unwrap();
        assert_eq!(back, ResourceCategory::DockDoors);
    }

    #[test]
    fn test_current_worker_has_origin() {
        let worker = WorkerIdentity::current();
        let (host, pid) = worker.origin().unwrap();
        assert!(!host.is_empty());
        assert_eq!(pid, std::process::id());
    }

    #[test]
    fn test_named_worker_has_no_origin() {
        assert_eq!(WorkerIdentity::named("w1").origin(), None);
        assert_eq!(WorkerIdentity::named("host:notapid:t1").origin(), None);
        assert_eq!(
            WorkerIdentity::named("rf-gun-3:4242:picker").origin(),
            Some(("rf-gun-3", 4242))
        );
    }

    #[test]
    fn test_threads_get_distinct_identities() {
        let main = WorkerIdentity::current();
        let other = std::thread::spawn(WorkerIdentity::current).join().unwrap();
        assert_ne!(main, other);
    }

    #[test]
    fn test_tier_plan() {
        assert!(TierPlan::FIND_ONLY.includes(Tier::Find));
        assert!(!TierPlan::FIND_ONLY.includes(Tier::Repurpose));
        assert!(TierPlan::default().includes(Tier::Fabricate));

        let request = ResourceRequest::new(ResourceCategory::Items, 2, ()).find_only();
        assert_eq!(request.tiers, TierPlan::FIND_ONLY);
    }
}
