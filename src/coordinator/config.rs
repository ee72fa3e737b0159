//! Engine configuration

use std::collections::HashSet;
use std::time::Duration;

use super::encoding::PartnerRules;

/// Runtime configuration of the rotation engine and its watchers
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Wheel tick interval
    pub tick_interval: Duration,

    /// Number of wheel slots
    pub wheel_buckets: usize,

    /// Catch-up poll interval for newly created groups
    pub refresh_interval: Duration,

    /// Spawn watchers and the catch-up task on start
    pub start_watchers: bool,

    /// Outbound URL rewriting
    pub partners: PartnerRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(500),
            wheel_buckets: 120,
            refresh_interval: Duration::from_secs(30),
            start_watchers: true,
            partners: PartnerRules::default(),
        }
    }
}

impl EngineConfig {
    /// Create a new config builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "tick_interval".to_string(),
                reason: "Must be greater than zero".to_string(),
            });
        }

        if self.wheel_buckets == 0 {
            return Err(ConfigError::InvalidValue {
                field: "wheel_buckets".to_string(),
                reason: "Wheel needs at least 1 slot".to_string(),
            });
        }

        if self.refresh_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "refresh_interval".to_string(),
                reason: "Must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Time between two firings of the same watcher
    pub fn watcher_period(&self) -> Duration {
        self.tick_interval * self.wheel_buckets as u32
    }
}

/// Builder for EngineConfig
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    tick_interval: Option<Duration>,
    wheel_buckets: Option<usize>,
    refresh_interval: Option<Duration>,
    start_watchers: Option<bool>,
    url_encoding: Option<bool>,
    baidu_groups: HashSet<i64>,
    zhihu_groups: HashSet<i64>,
}

impl EngineConfigBuilder {
    /// Set wheel tick interval
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    /// Set wheel slot count
    pub fn wheel_buckets(mut self, buckets: usize) -> Self {
        self.wheel_buckets = Some(buckets);
        self
    }

    /// Set catch-up poll interval
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    /// Enable/disable watchers and catch-up
    pub fn start_watchers(mut self, enable: bool) -> Self {
        self.start_watchers = Some(enable);
        self
    }

    /// Enable/disable partner URL rewriting
    pub fn url_encoding(mut self, enable: bool) -> Self {
        self.url_encoding = Some(enable);
        self
    }

    /// Domain groups whose URLs go through the Baidu wrapper
    pub fn baidu_groups(mut self, groups: impl IntoIterator<Item = i64>) -> Self {
        self.baidu_groups.extend(groups);
        self
    }

    /// Domain groups whose URLs go through the Zhihu wrapper
    pub fn zhihu_groups(mut self, groups: impl IntoIterator<Item = i64>) -> Self {
        self.zhihu_groups.extend(groups);
        self
    }

    /// Build the config
    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        let defaults = EngineConfig::default();
        let config = EngineConfig {
            tick_interval: self.tick_interval.unwrap_or(defaults.tick_interval),
            wheel_buckets: self.wheel_buckets.unwrap_or(defaults.wheel_buckets),
            refresh_interval: self.refresh_interval.unwrap_or(defaults.refresh_interval),
            start_watchers: self.start_watchers.unwrap_or(defaults.start_watchers),
            partners: PartnerRules::new(
                self.url_encoding.unwrap_or(false),
                self.baidu_groups,
                self.zhihu_groups,
            ),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
