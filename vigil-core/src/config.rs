//! Registry tuning consumed by the core. Loading it from disk is the
//! embedding application's job.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use time::Duration;

/// Upper bound for `stale_after_secs`: one year.
pub const MAX_STALE_AFTER_SECS: u64 = 366 * 24 * 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Online/idle resources not seen for this long are swept to offline.
    pub stale_after_secs: u64,
    /// Period of the background stale sweep.
    pub sweep_interval_secs: u64,
    pub search_default_limit: usize,
    pub search_max_limit: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 300,
            sweep_interval_secs: 60,
            search_default_limit: 50,
            search_max_limit: 1000,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stale_after_secs == 0 {
            return Err(ConfigError::Invalid("stale_after_secs must be > 0".into()));
        }
        if self.stale_after_secs > MAX_STALE_AFTER_SECS {
            return Err(ConfigError::Invalid(format!("stale_after_secs must be <= {MAX_STALE_AFTER_SECS}")));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid("sweep_interval_secs must be > 0".into()));
        }
        if self.search_default_limit == 0 || self.search_default_limit > self.search_max_limit {
            return Err(ConfigError::Invalid(format!(
                "search_default_limit must be within 1..={}",
                self.search_max_limit
            )));
        }
        Ok(())
    }

    pub fn stale_after(&self) -> Duration {
        Duration::seconds(self.stale_after_secs.min(i64::MAX as u64) as i64)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}
