//! Construction-time configuration for [`SkipList`](crate::SkipList).

use std::env;

use crate::tracing_helpers::warn_log;

/// Default cap on the number of index levels.
pub const DEFAULT_MAX_LEVEL: usize = 32;

/// Hard upper bound accepted by [`SkipListConfig::with_max_level`].
///
/// Highest level the generator can produce: 64 random bits allow at most 32
/// climbs at probability 1/4.
pub const MAX_SUPPORTED_LEVEL: usize = 33;

/// Environment variable read by [`SkipListConfig::from_env`].
pub const MAX_LEVEL_ENV: &str = "SKIPLIST_MAX_LEVEL";

/// Tunables fixed when a skip list is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipListConfig {
    /// Maximum height a node's index column may reach.
    pub max_level: usize,
}

impl Default for SkipListConfig {
    fn default() -> Self {
        Self {
            max_level: DEFAULT_MAX_LEVEL,
        }
    }
}

impl SkipListConfig {
    /// Create a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum index height, clamped to `1..=MAX_SUPPORTED_LEVEL`.
    #[must_use]
    pub fn with_max_level(mut self, max_level: usize) -> Self {
        self.max_level = max_level.clamp(1, MAX_SUPPORTED_LEVEL);
        self
    }

    /// Create config from environment variables.
    ///
    /// Unset or unparsable values fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let config = Self::default();

        let Ok(raw) = env::var(MAX_LEVEL_ENV) else {
            return config;
        };

        match raw.trim().parse::<usize>() {
            Ok(max_level) => config.with_max_level(max_level),
            Err(_) => {
                warn_log!(value = %raw, "ignoring unparsable {}", MAX_LEVEL_ENV);
                config
            }
        }
    }
}
