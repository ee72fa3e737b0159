//! rotor - domain rotation and content publishing engine
//!
//! Serves rotating domains out of named groups and rotating content bundles
//! out of content groups, while background watchers keep the groups fresh:
//! a health monitor demotes domains a probe backend flags, and a publisher
//! uploads each content group as one JSON document to object storage.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`coordinator`] - Rotation engine, lifecycle controller and HTTP surface
//! - [`watcher`] - Per-group health monitor and content publisher tasks
//! - [`scheduler`] - Shared timing wheel the watchers wake on
//! - [`detector`] - Client location filters for forced sharing
//! - [`storage`] - SQLite rows, typed repository and object storage
//! - [`models`] - Core data structures and types
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rotor::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let repo = ControlRepository::new(Arc::new(SqliteRowStore::new(&config.database.sqlite_path)?));
//!     let engine_config = config.engine_config()?;
//!     let engine = Arc::new(RotationEngine::new(engine_config.partners.clone(), GeoDetector::new()));
//!     let oracle = Arc::new(ProbeOracle::new(config.probe.endpoints.clone(), config.probe_timeout())?);
//!     let store = Arc::new(S3ObjectStore::connect(config.object_store_config()).await?);
//!
//!     let controller = Controller::start(engine_config, repo, engine.clone(), oracle, store).await?;
//!     let domain = engine.select_domain(0, GroupKind::Show)?;
//!     println!("{}", domain.domain);
//!     controller.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod error;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod storage;
pub mod utils;
pub mod watcher;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::coordinator::{Controller, EngineConfig, RotationEngine};
    pub use crate::detector::GeoDetector;
    pub use crate::error::{Error, ErrorCategory, Result, RotorErrorTrait};
    pub use crate::models::{
        ContentGroup, Domain, DomainGroup, DomainStatus, GroupKind, GroupStatus, SelectedContent,
        SelectedDomain,
    };
    pub use crate::storage::{ControlRepository, S3ObjectStore, SqliteRowStore};
    pub use crate::watcher::ProbeOracle;
}

// Direct re-exports for convenience
pub use models::{DomainGroup, GroupKind, SelectedContent, SelectedDomain};
