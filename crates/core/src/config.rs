//! Pool configuration, typically parsed from TOML.

use serde::{Deserialize, Serialize};

/// Pool configuration.
///
/// The concurrency bound itself is a capability of the deployment target;
/// `max_concurrency` here only overrides it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Upper bound on concurrently dispatched units. 0 = use the
    /// capability provider's value.
    #[serde(default)]
    pub max_concurrency: usize,
    /// Spawn the full persistent pool at construction instead of on
    /// first dispatch.
    #[serde(default = "default_warm_start")]
    pub warm_start: bool,
    /// Maximum number of queued work items waiting for an idle unit.
    /// 0 = unbounded.
    #[serde(default)]
    pub pending_capacity: usize,
}

fn default_warm_start() -> bool {
    true
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 0,
            warm_start: default_warm_start(),
            pending_capacity: 0,
        }
    }
}

impl PoolConfig {
    /// Resolve the concurrency bound against the capability provider's
    /// value. Always at least 1.
    pub fn resolved_max_concurrency(&self, provider_max: usize) -> usize {
        if self.max_concurrency == 0 {
            provider_max.max(1)
        } else {
            self.max_concurrency
        }
    }
}
