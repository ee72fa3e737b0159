//! Configuration management for rotor
//!
//! This module handles loading and validating configuration from a TOML file
//! with environment variable overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::coordinator::config::EngineConfig;
use crate::storage::S3ObjectStoreConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Wheel, watcher and catch-up timing
    pub engine: EngineSettings,

    /// Health probe configuration
    pub probe: ProbeConfig,

    /// Partner URL rewriting
    pub partners: PartnerConfig,

    /// Bundle object storage
    pub object_store: ObjectStoreConfig,

    /// Geo filter configuration
    pub geo: GeoConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Enable permissive CORS on the API
    pub enable_cors: bool,

    /// Enable request tracing
    pub enable_request_logging: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Engine timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Wheel tick interval in milliseconds
    pub tick_interval_ms: u64,

    /// Number of wheel slots
    pub wheel_buckets: usize,

    /// Catch-up poll interval in seconds
    pub refresh_interval_secs: u64,

    /// Run watchers and catch-up
    pub start_watchers: bool,
}

/// Health probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Probe endpoints, used round-robin (bare hosts get `http://`)
    pub endpoints: Vec<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Partner URL rewriting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PartnerConfig {
    /// Enable rewriting
    pub url_encoding: bool,

    /// Domain groups wrapped for Baidu
    pub baidu_groups: Vec<i64>,

    /// Domain groups wrapped for Zhihu
    pub zhihu_groups: Vec<i64>,
}

/// Bundle object storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    /// Endpoint URL
    pub endpoint: String,

    /// Signing region
    pub region: String,

    /// Bucket name
    pub bucket: String,

    /// Public base URL for uploaded keys
    pub public_url: String,

    /// Static access key id (falls back to the AWS credential chain)
    pub access_key_id: Option<String>,

    /// Static secret access key
    pub secret_access_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Attempts per request, including the first
    pub max_attempts: u32,
}

/// Geo filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// MaxMind `.mmdb` city database, or an IP range table file
    pub ip_db: Option<PathBuf>,

    /// Language city names are read in from a MaxMind database
    pub language: String,

    /// Cities whose clients never get forced sharing
    pub filter_locations: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 7878)),
            enable_cors: true,
            enable_request_logging: true,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/rotor.db"),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            wheel_buckets: 120,
            refresh_interval_secs: 30,
            start_watchers: true,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            timeout_secs: 10,
        }
    }
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("http://localhost:9000"),
            region: String::from("us-east-1"),
            bucket: String::from("rotor"),
            public_url: String::from("http://localhost:9000/rotor/"),
            access_key_id: None,
            secret_access_key: None,
            timeout_secs: 30,
            max_attempts: 3,
        }
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            ip_db: None,
            language: String::from("en"),
            filter_locations: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}

impl Config {
    /// Load configuration from environment variables over the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Override individual settings from `ROTOR_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Some(addr) = env_parse::<SocketAddr>("ROTOR_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }
        if let Ok(path) = std::env::var("ROTOR_SQLITE_PATH") {
            self.database.sqlite_path = path.into();
        }
        if let Some(v) = env_parse("ROTOR_TICK_INTERVAL_MS") {
            self.engine.tick_interval_ms = v;
        }
        if let Some(v) = env_parse("ROTOR_WHEEL_BUCKETS") {
            self.engine.wheel_buckets = v;
        }
        if let Some(v) = env_parse("ROTOR_REFRESH_INTERVAL_SECS") {
            self.engine.refresh_interval_secs = v;
        }
        if let Some(v) = env_parse("ROTOR_START_WATCHERS") {
            self.engine.start_watchers = v;
        }
        if let Some(list) = env_list("ROTOR_PROBE_ENDPOINTS") {
            self.probe.endpoints = list;
        }
        if let Ok(endpoint) = std::env::var("ROTOR_OBJECT_STORE_ENDPOINT") {
            self.object_store.endpoint = endpoint;
        }
        if let Ok(region) = std::env::var("ROTOR_OBJECT_STORE_REGION") {
            self.object_store.region = region;
        }
        if let Ok(key_id) = std::env::var("ROTOR_OBJECT_STORE_ACCESS_KEY_ID") {
            self.object_store.access_key_id = Some(key_id);
        }
        if let Ok(secret) = std::env::var("ROTOR_OBJECT_STORE_SECRET_ACCESS_KEY") {
            self.object_store.secret_access_key = Some(secret);
        }
        if let Ok(bucket) = std::env::var("ROTOR_OBJECT_STORE_BUCKET") {
            self.object_store.bucket = bucket;
        }
        if let Ok(url) = std::env::var("ROTOR_OBJECT_STORE_PUBLIC_URL") {
            self.object_store.public_url = url;
        }
        if let Ok(path) = std::env::var("ROTOR_IP_DB") {
            self.geo.ip_db = Some(path.into());
        }
        if let Ok(level) = std::env::var("ROTOR_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("ROTOR_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.engine.tick_interval_ms == 0 {
            anyhow::bail!("tick_interval_ms must be greater than 0");
        }

        if self.engine.wheel_buckets == 0 {
            anyhow::bail!("wheel_buckets must be greater than 0");
        }

        if self.engine.refresh_interval_secs == 0 {
            anyhow::bail!("refresh_interval_secs must be greater than 0");
        }

        if self.probe.timeout_secs == 0 || self.object_store.timeout_secs == 0 {
            anyhow::bail!("timeouts must be greater than 0");
        }

        if self.object_store.bucket.is_empty() {
            anyhow::bail!("object_store.bucket must not be empty");
        }

        if self.object_store.max_attempts == 0 {
            anyhow::bail!("object_store.max_attempts must be greater than 0");
        }

        if self.object_store.access_key_id.is_some() != self.object_store.secret_access_key.is_some() {
            anyhow::bail!("object_store.access_key_id and secret_access_key must be set together");
        }

        url::Url::parse(&self.object_store.endpoint)
            .with_context(|| format!("Invalid object store endpoint: {}", self.object_store.endpoint))?;

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be 'text' or 'json'");
        }

        Ok(())
    }

    /// Engine runtime configuration
    pub fn engine_config(&self) -> Result<EngineConfig> {
        EngineConfig::builder()
            .tick_interval(Duration::from_millis(self.engine.tick_interval_ms))
            .wheel_buckets(self.engine.wheel_buckets)
            .refresh_interval(Duration::from_secs(self.engine.refresh_interval_secs))
            .start_watchers(self.engine.start_watchers)
            .url_encoding(self.partners.url_encoding)
            .baidu_groups(self.partners.baidu_groups.iter().copied())
            .zhihu_groups(self.partners.zhihu_groups.iter().copied())
            .build()
            .context("Invalid engine configuration")
    }

    /// Object store client configuration
    pub fn object_store_config(&self) -> S3ObjectStoreConfig {
        S3ObjectStoreConfig {
            endpoint: self.object_store.endpoint.clone(),
            region: self.object_store.region.clone(),
            bucket: self.object_store.bucket.clone(),
            public_url: self.object_store.public_url.clone(),
            access_key_id: self.object_store.access_key_id.clone(),
            secret_access_key: self.object_store.secret_access_key.clone(),
            timeout_secs: self.object_store.timeout_secs,
            max_attempts: self.object_store.max_attempts,
        }
    }

    /// Probe request timeout as Duration
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe.timeout_secs)
    }
}
