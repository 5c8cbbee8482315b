//! fixclaim configuration

use crate::policy::{PolicySet, ALLOW_CLEAR, ALLOW_CREATE};
use crate::registry::{RegistryBackend, SharedStateRegistry};
use crate::retry::RetryPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration, read from `config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixclaimConfig {
    /// Registry location and backend
    pub registry: RegistryConfig,

    /// Lock wait bounds
    pub lock: LockConfig,

    /// Policy flags, e.g. `allow-clear = true`
    pub policy: BTreeMap<String, bool>,
}

impl Default for FixclaimConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            lock: LockConfig::default(),
            policy: BTreeMap::from([
                (ALLOW_CLEAR.to_string(), false),
                (ALLOW_CREATE.to_string(), false),
            ]),
        }
    }
}

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Directory shared by every worker
    pub dir: PathBuf,

    /// Claim storage backend
    pub backend: RegistryBackend,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            dir: crate::default_registry_dir(),
            backend: RegistryBackend::default(),
        }
    }
}

/// Lock wait configuration, all values in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub timeout_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for LockConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            timeout_ms: retry.timeout.as_millis() as u64,
            initial_backoff_ms: retry.initial_backoff.as_millis() as u64,
            max_backoff_ms: retry.max_backoff.as_millis() as u64,
            multiplier: retry.multiplier,
        }
    }
}

impl LockConfig {
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        if self.timeout_ms == 0 {
            return Err(Error::InvalidConfig("lock.timeout_ms must be positive".to_string()));
        }
        if self.initial_backoff_ms == 0 || self.max_backoff_ms < self.initial_backoff_ms {
            return Err(Error::InvalidConfig(format!(
                "lock backoff must satisfy 0 < initial_backoff_ms ({}) <= max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "lock.multiplier must be at least 1.0, got {}",
                self.multiplier
            )));
        }
        Ok(RetryPolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.multiplier,
        })
    }
}

impl FixclaimConfig {
    /// Load configuration from file, defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Policy flags from the file, overlaid with `FIXCLAIM_POLICY_*` variables
    pub fn policy_set(&self) -> Result<PolicySet> {
        PolicySet::new(self.policy.clone()).with_env_overrides()
    }

    /// Open the registry this configuration points at
    pub fn open_registry(&self) -> Result<SharedStateRegistry> {
        SharedStateRegistry::open(
            &self.registry.dir,
            self.registry.backend,
            self.lock.retry_policy()?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicySource;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = FixclaimConfig::load(&tmp.path().join("nope.toml")).unwrap();
        assert_eq!(config, FixclaimConfig::default());
        assert!(!PolicySet::new(config.policy).get(ALLOW_CLEAR));
    }

    #[test]
    fn test_partial_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [registry]
            dir = "/srv/fixtures/registry"
            backend = "sqlite"

            [lock]
            timeout_ms = 2500

            [policy]
            allow-clear = true
            "#,
        )
        .unwrap();

        let config = FixclaimConfig::load(&path).unwrap();
        assert_eq!(config.registry.dir, PathBuf::from("/srv/fixtures/registry"));
        assert_eq!(config.registry.backend, RegistryBackend::Sqlite);

        let retry = config.lock.retry_policy().unwrap();
        assert_eq!(retry.timeout, Duration::from_millis(2500));
        assert_eq!(retry.initial_backoff, RetryPolicy::default().initial_backoff);

        let policy = PolicySet::new(config.policy);
        assert!(policy.get(ALLOW_CLEAR));
        assert!(!policy.get(ALLOW_CREATE));
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        let mut config = FixclaimConfig::default();
        config.registry.dir = tmp.path().join("registry");
        config.policy.insert(ALLOW_CREATE.to_string(), true);

        config.save(&path).unwrap();
        assert_eq!(FixclaimConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_lock_config() {
        let lock = LockConfig {
            timeout_ms: 0,
            ..LockConfig::default()
        };
        assert!(matches!(lock.retry_policy(), Err(Error::InvalidConfig(_))));

        let lock = LockConfig {
            multiplier: 0.5,
            ..LockConfig::default()
        };
        assert!(lock.retry_policy().is_err());
    }

    #[test]
    fn test_malformed_file_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[lock]\ntimeout_ms = \"soon\"\n").unwrap();
        assert!(matches!(
            FixclaimConfig::load(&path),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_open_registry() {
        let tmp = TempDir::new().unwrap();
        let mut config = FixclaimConfig::default();
        config.registry.dir = tmp.path().join("registry");
        let registry = config.open_registry().unwrap();
        assert_eq!(registry.dir(), config.registry.dir.as_path());
        assert!(!registry.is_locked());
    }
}
