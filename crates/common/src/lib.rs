//! fixclaim Common Library
//!
//! Cross-process reservation of shared test fixtures: a durable registry of
//! claims guarded by a lock file, and an allocator that resolves declarative
//! requests through find / repurpose / fabricate tiers without handing the
//! same resource to two workers.

pub mod allocator;
pub mod config;
pub mod error;
pub mod liveness;
pub mod policy;
pub mod registry;
pub mod retry;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use allocator::{Allocation, ResourceAllocator};
pub use config::FixclaimConfig;
pub use error::{Error, Result};
pub use liveness::{Liveness, ProcessLiveness, WorkerLiveness};
pub use policy::{PolicySet, PolicySource};
pub use registry::{ExclusiveSection, LockHolder, RegistryBackend, SharedStateRegistry};
pub use retry::{Clock, RetryPolicy, SystemClock};
pub use store::{Availability, BackingStore};
pub use types::*;

/// fixclaim version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable overriding the registry directory
pub const REGISTRY_DIR_ENV: &str = "FIXCLAIM_REGISTRY_DIR";

/// Default base directory
pub fn default_base_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".fixclaim")
}

/// Default registry directory, honouring `FIXCLAIM_REGISTRY_DIR`
pub fn default_registry_dir() -> std::path::PathBuf {
    std::env::var_os(REGISTRY_DIR_ENV)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| default_base_path().join("registry"))
}

/// Default configuration file path
pub fn default_config_path() -> std::path::PathBuf {
    default_base_path().join("config.toml")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
