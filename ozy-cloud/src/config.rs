//! Sync engine configuration.

use crate::error::{CloudError, CloudResult};
use ozy_crypto::KdfParams;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// What happens to remembered `revision -> password` pairs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustCachePolicy {
    /// Entries survive sign-out for the lifetime of the process.
    #[default]
    RetainAcrossSignOut,
    /// Entries are dropped on sign-out.
    ClearOnSignOut,
    /// Nothing is remembered; every unlock needs the password.
    Disabled,
}

/// Configuration for the session and the sync scheduler.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the document host (e.g., "https://docs.ozy.app").
    pub api_base_url: String,

    /// Period of the refresh/save timer (seconds).
    pub tick_interval_secs: u64,

    /// Quiet period after a local edit before a save may start (milliseconds).
    pub save_grace_millis: u64,

    /// PBKDF2 iterations used for newly written documents. The legacy value
    /// (100) keeps the original wire shape.
    pub kdf_iterations: u32,

    pub trust_cache_policy: TrustCachePolicy,

    /// Scopes a bearer credential must grant.
    pub required_scopes: Vec<String>,

    /// Credentials expiring within this margin are treated as expired (seconds).
    pub credential_refresh_margin_secs: i64,

    /// HTTP request timeout (seconds).
    pub request_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://docs.ozy.app".to_string(),
            tick_interval_secs: 5,
            save_grace_millis: 2_000,
            kdf_iterations: ozy_crypto::LEGACY_ITERATIONS,
            trust_cache_policy: TrustCachePolicy::default(),
            required_scopes: vec!["documents".to_string(), "drive".to_string()],
            credential_refresh_margin_secs: 60,
            request_timeout_secs: 30,
        }
    }
}

impl SyncConfig {
    /// Parses a JSON config; missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> CloudResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> CloudResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CloudError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> CloudResult<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(CloudError::Config("api_base_url is empty".to_string()));
        }
        if self.tick_interval_secs == 0 {
            return Err(CloudError::Config(
                "tick_interval_secs must be positive".to_string(),
            ));
        }
        KdfParams::new(self.kdf_iterations)
            .map_err(|e| CloudError::Config(e.to_string()))?;
        if self.credential_refresh_margin_secs < 0 {
            return Err(CloudError::Config(
                "credential_refresh_margin_secs must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn save_grace(&self) -> Duration {
        Duration::from_millis(self.save_grace_millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            iterations: self.kdf_iterations,
        }
    }

    /// Creates a config for tests against a local mock server.
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            api_base_url: "http://localhost:3002".to_string(),
            tick_interval_secs: 1,
            save_grace_millis: 100,
            ..Self::default()
        }
    }
}
