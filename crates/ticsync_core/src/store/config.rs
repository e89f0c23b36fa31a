//! Store and coordinator tuning knobs.
//!
//! Durations are kept as whole seconds so hosts can pass the config as JSON.
//! Values outside the `TimeDelta` range saturate instead of panicking.

use crate::model::record::Record;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

const DEFAULT_CACHE_TTL_SECS: i64 = 30 * 60;
const DEFAULT_GENERATION_COOLDOWN_SECS: i64 = 60 * 60;
const DEFAULT_DERIVATION_WINDOW_SECS: i64 = 7 * 24 * 60 * 60;
const STORAGE_KEY_PREFIX: &str = "ticsync";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Persistence key of the durable snapshot.
    pub storage_key: String,
    /// Maximum age of a cached range read.
    pub cache_ttl_secs: i64,
    /// Minimum interval between derived generations for one subject.
    pub generation_cooldown_secs: i64,
    /// Width of the recent window read as generation context.
    pub derivation_window_secs: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_key: format!("{STORAGE_KEY_PREFIX}.snapshot"),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            generation_cooldown_secs: DEFAULT_GENERATION_COOLDOWN_SECS,
            derivation_window_secs: DEFAULT_DERIVATION_WINDOW_SECS,
        }
    }
}

impl StoreConfig {
    /// Default config with a storage key named after the record kind.
    pub fn for_record<R: Record>() -> Self {
        Self {
            storage_key: format!("{STORAGE_KEY_PREFIX}.{}", R::KIND),
            ..Self::default()
        }
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: TimeDelta) -> Self {
        self.cache_ttl_secs = ttl.num_seconds();
        self
    }

    pub fn with_generation_cooldown(mut self, cooldown: TimeDelta) -> Self {
        self.generation_cooldown_secs = cooldown.num_seconds();
        self
    }

    pub fn with_derivation_window(mut self, window: TimeDelta) -> Self {
        self.derivation_window_secs = window.num_seconds();
        self
    }

    pub fn cache_ttl(&self) -> TimeDelta {
        saturating_secs(self.cache_ttl_secs)
    }

    pub fn generation_cooldown(&self) -> TimeDelta {
        saturating_secs(self.generation_cooldown_secs)
    }

    pub fn derivation_window(&self) -> TimeDelta {
        saturating_secs(self.derivation_window_secs)
    }
}

fn saturating_secs(secs: i64) -> TimeDelta {
    TimeDelta::try_seconds(secs).unwrap_or(if secs < 0 {
        TimeDelta::MIN
    } else {
        TimeDelta::MAX
    })
}
