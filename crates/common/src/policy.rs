//! Policy flags gating the repurpose and fabricate tiers

use std::collections::BTreeMap;
use tracing::debug;

/// Flag gating the repurpose tier
pub const ALLOW_CLEAR: &str = "allow-clear";

/// Flag gating the fabricate tier
pub const ALLOW_CREATE: &str = "allow-create";

/// Prefix for environment overrides, e.g. `FIXCLAIM_POLICY_ALLOW_CLEAR=true`
pub const ENV_PREFIX: &str = "FIXCLAIM_POLICY_";

/// Read-only source of named boolean flags
pub trait PolicySource: Send + Sync {
    /// Value of `flag`; unknown flags are `false`
    fn get(&self, flag: &str) -> bool;
}

/// Immutable set of policy flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySet {
    flags: BTreeMap<String, bool>,
}

impl PolicySet {
    pub fn new<I, K>(flags: I) -> Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: Into<String>,
    {
        Self {
            flags: flags
                .into_iter()
                .map(|(k, v)| (normalize_flag(&k.into()), v))
                .collect(),
        }
    }

    /// Everything allowed
    pub fn permissive() -> Self {
        Self::new([(ALLOW_CLEAR, true), (ALLOW_CREATE, true)])
    }

    /// Only the find tier allowed
    pub fn find_only() -> Self {
        Self::new([(ALLOW_CLEAR, false), (ALLOW_CREATE, false)])
    }

    /// Overlay `FIXCLAIM_POLICY_*` variables from the process environment
    pub fn with_env_overrides(self) -> crate::Result<Self> {
        self.with_overrides(std::env::vars())
    }

    /// Overlay `FIXCLAIM_POLICY_*` entries from `vars`
    pub fn with_overrides<I>(mut self, vars: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let flag = normalize_flag(name);
            let enabled = parse_bool(&value).ok_or_else(|| {
                crate::Error::InvalidConfig(format!("{} must be a boolean, got '{}'", key, value))
            })?;
            debug!("Policy override {} = {}", flag, enabled);
            self.flags.insert(flag, enabled);
        }
        Ok(self)
    }

    pub fn flags(&self) -> &BTreeMap<String, bool> {
        &self.flags
    }
}

impl PolicySource for PolicySet {
    fn get(&self, flag: &str) -> bool {
        self.flags
            .get(&normalize_flag(flag))
            .copied()
            .unwrap_or(false)
    }
}

fn normalize_flag(flag: &str) -> String {
    flag.trim().to_ascii_lowercase().replace('_', "-")
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
