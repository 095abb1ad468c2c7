//! Configuration values consumed by the engine.
//!
//! These are plain serde structs; how they are loaded (files, env, DI) is
//! up to the host application. Every value is validated when the cache it
//! configures is created, never at first use.

use crate::codec::validate_cache_name;
use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Which tiers back a named cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TierMode {
    Local,
    Remote,
    #[default]
    MultiLevel,
}

/// What the coordinator does when the remote store cannot be reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RemoteFailurePolicy {
    /// Surface `CacheError::RemoteUnavailable` to the caller.
    #[default]
    Fail,
    /// Answer reads by calling the loader directly and log a warning.
    DegradeToLocal,
}

/// Behavior of breakdown protection when the per-key lock wait times out
/// and the cache is still empty after one re-check.
///
/// Has no default. Enabling breakdown protection without choosing one is a
/// configuration error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockTimeoutPolicy {
    /// Fail open: invoke the loader without holding the lock.
    LoadWithoutLock,
    /// Return this value (`None` = absent) without loading.
    Fallback(Option<Vec<u8>>),
    /// Surface `CacheError::LockTimeout`.
    Fail,
}

/// Stampede protection settings for one cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    pub penetration_enabled: bool,
    pub penetration_tombstone_ttl: Duration,
    pub breakdown_enabled: bool,
    pub breakdown_lock_wait_timeout: Duration,
    pub breakdown_lock_lease: Duration,
    pub lock_timeout_policy: Option<LockTimeoutPolicy>,
    pub avalanche_enabled: bool,
    pub avalanche_jitter_percent: u8,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            penetration_enabled: false,
            penetration_tombstone_ttl: Duration::from_secs(120),
            breakdown_enabled: false,
            breakdown_lock_wait_timeout: Duration::from_secs(3),
            breakdown_lock_lease: Duration::from_secs(30),
            lock_timeout_policy: None,
            avalanche_enabled: false,
            avalanche_jitter_percent: 10,
        }
    }
}

impl ProtectionConfig {
    /// All strategies off.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_penetration(mut self, tombstone_ttl: Duration) -> Self {
        self.penetration_enabled = true;
        self.penetration_tombstone_ttl = tombstone_ttl;
        self
    }

    pub fn with_breakdown(mut self, wait_timeout: Duration, policy: LockTimeoutPolicy) -> Self {
        self.breakdown_enabled = true;
        self.breakdown_lock_wait_timeout = wait_timeout;
        self.lock_timeout_policy = Some(policy);
        self
    }

    pub fn with_lock_lease(mut self, lease: Duration) -> Self {
        self.breakdown_lock_lease = lease;
        self
    }

    pub fn with_avalanche(mut self, jitter_percent: u8) -> Self {
        self.avalanche_enabled = true;
        self.avalanche_jitter_percent = jitter_percent;
        self
    }

    pub fn flags(&self) -> ProtectionFlags {
        ProtectionFlags {
            penetration: self.penetration_enabled,
            breakdown: self.breakdown_enabled,
            avalanche: self.avalanche_enabled,
        }
    }

    pub fn validate(&self, cache: &str) -> CacheResult<()> {
        if self.avalanche_jitter_percent > 100 {
            return Err(CacheError::configuration(
                cache,
                format!(
                    "avalanche_jitter_percent must be within 0..=100, got {}",
                    self.avalanche_jitter_percent
                ),
            ));
        }
        if self.penetration_enabled && self.penetration_tombstone_ttl.is_zero() {
            return Err(CacheError::configuration(
                cache,
                "penetration_tombstone_ttl must be greater than zero",
            ));
        }
        if self.breakdown_enabled {
            self.validate_breakdown(cache)?;
        }
        Ok(())
    }

    pub(crate) fn validate_breakdown(&self, cache: &str) -> CacheResult<()> {
        if self.lock_timeout_policy.is_none() {
            return Err(CacheError::configuration(
                cache,
                "breakdown protection requires an explicit lock_timeout_policy",
            ));
        }
        if self.breakdown_lock_wait_timeout.is_zero() {
            return Err(CacheError::configuration(
                cache,
                "breakdown_lock_wait_timeout must be greater than zero",
            ));
        }
        if self.breakdown_lock_lease.is_zero() {
            return Err(CacheError::configuration(
                cache,
                "breakdown_lock_lease must be finite and greater than zero",
            ));
        }
        Ok(())
    }
}

/// Per-call switches for the three strategies. Parameters (TTLs, wait
/// times) always come from the cache's [`ProtectionConfig`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProtectionFlags {
    pub penetration: bool,
    pub breakdown: bool,
    pub avalanche: bool,
}

impl ProtectionFlags {
    pub const NONE: ProtectionFlags = ProtectionFlags {
        penetration: false,
        breakdown: false,
        avalanche: false,
    };

    pub const ALL: ProtectionFlags = ProtectionFlags {
        penetration: true,
        breakdown: true,
        avalanche: true,
    };
}

/// Full configuration of one named cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub mode: TierMode,
    /// TTL for writes that do not specify one. `None` means no expiry.
    pub default_ttl: Option<Duration>,
    /// Write TTL of the local tier. Required (finite) for multi-level caches.
    pub local_ttl: Option<Duration>,
    /// Optional idle expiry of local entries.
    pub local_access_ttl: Option<Duration>,
    pub local_max_entries: usize,
    /// Prefix prepended to every remote key.
    pub key_prefix: String,
    pub remote_failure: RemoteFailurePolicy,
    pub protection: ProtectionConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mode: TierMode::MultiLevel,
            default_ttl: Some(Duration::from_secs(30 * 60)),
            local_ttl: Some(Duration::from_secs(60)),
            local_access_ttl: None,
            local_max_entries: 10_000,
            key_prefix: String::new(),
            remote_failure: RemoteFailurePolicy::Fail,
            protection: ProtectionConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self, cache: &str) -> CacheResult<()> {
        validate_cache_name(cache, &self.key_prefix)?;
        if self.mode != TierMode::Remote && self.local_max_entries == 0 {
            return Err(CacheError::configuration(
                cache,
                "local_max_entries must be greater than zero",
            ));
        }
        if self.default_ttl.map(|t| t.is_zero()).unwrap_or(false) {
            return Err(CacheError::configuration(
                cache,
                "default_ttl of zero is ambiguous; use None for no expiry",
            ));
        }
        if self.mode == TierMode::MultiLevel {
            match self.local_ttl {
                Some(ttl) if !ttl.is_zero() => {}
                _ => {
                    return Err(CacheError::configuration(
                        cache,
                        "multi-level caches require a finite, non-zero local_ttl",
                    ))
                }
            }
        }
        self.protection.validate(cache)
    }
}

/// Optional per-cache overrides applied on top of [`CacheSettings::defaults`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOverrides {
    pub mode: Option<TierMode>,
    pub default_ttl: Option<Duration>,
    pub local_ttl: Option<Duration>,
    pub local_access_ttl: Option<Duration>,
    pub local_max_entries: Option<usize>,
    pub key_prefix: Option<String>,
    pub remote_failure: Option<RemoteFailurePolicy>,
    pub protection: Option<ProtectionConfig>,
}

impl CacheOverrides {
    pub fn apply(&self, base: &CacheConfig) -> CacheConfig {
        let mut config = base.clone();
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(ttl) = self.default_ttl {
            config.default_ttl = Some(ttl);
        }
        if let Some(ttl) = self.local_ttl {
            config.local_ttl = Some(ttl);
        }
        if let Some(ttl) = self.local_access_ttl {
            config.local_access_ttl = Some(ttl);
        }
        if let Some(max) = self.local_max_entries {
            config.local_max_entries = max;
        }
        if let Some(prefix) = &self.key_prefix {
            config.key_prefix = prefix.clone();
        }
        if let Some(policy) = self.remote_failure {
            config.remote_failure = policy;
        }
        if let Some(protection) = &self.protection {
            config.protection = protection.clone();
        }
        config
    }
}

/// Global defaults plus per-name overrides.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub defaults: CacheConfig,
    pub caches: HashMap<String, CacheOverrides>,
}

impl CacheSettings {
    pub fn new(defaults: CacheConfig) -> Self {
        Self {
            defaults,
            caches: HashMap::new(),
        }
    }

    /// Replaces the overrides for `name`.
    pub fn with_cache(mut self, name: &str, overrides: CacheOverrides) -> Self {
        self.caches.insert(name.to_string(), overrides);
        self
    }

    pub fn resolve(&self, name: &str) -> CacheConfig {
        match self.caches.get(name) {
            Some(overrides) => overrides.apply(&self.defaults),
            None => self.defaults.clone(),
        }
    }
}

/// Settings of the distributed lock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lease used when the caller does not pass one. Always finite.
    pub default_lease: Duration,
    /// Pause between acquisition attempts while waiting.
    pub retry_interval: Duration,
    pub key_prefix: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_lease: Duration::from_secs(30),
            retry_interval: Duration::from_millis(10),
            key_prefix: String::new(),
        }
    }
}

impl LockConfig {
    pub fn validate(&self) -> CacheResult<()> {
        if self.default_lease.is_zero() {
            return Err(CacheError::configuration(
                "<lock>",
                "default_lease must be finite and greater than zero",
            ));
        }
        if self.retry_interval.is_zero() {
            return Err(CacheError::configuration(
                "<lock>",
                "retry_interval must be greater than zero",
            ));
        }
        Ok(())
    }
}
