//! Rotation coordinator
//!
//! Holds the in-memory mirror of every group, answers selection requests
//! from it and runs the background machinery that keeps it fresh.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │                 Controller                 │
//! │  startup load · catch-up · shutdown        │
//! │                                            │
//! │  TimingWheel ──► HealthMonitor (per group) │
//! │             └──► ContentPublisher (group)  │
//! │                         │                  │
//! │                         ▼ GroupSink        │
//! │  ┌──────────────────────────────────────┐  │
//! │  │           RotationEngine             │  │
//! │  │  select_domain · select_content      │  │
//! │  └──────────────────────────────────────┘  │
//! │                         ▲                  │
//! │  REST API  POST /domain/get_url            │
//! │            POST /domain/get_data  ...      │
//! └────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use rotor::coordinator::{Controller, RotationEngine};
//!
//! let engine = Arc::new(RotationEngine::new(config.partners.clone(), detector));
//! let controller = Controller::start(config, repo, engine.clone(), oracle, store).await?;
//! let domain = engine.select_domain(0, GroupKind::Show)?;
//! controller.shutdown().await;
//! ```

pub mod api;
pub mod config;
pub mod controller;
pub mod encoding;
pub mod engine;
pub mod server;

// Re-export main types
pub use api::{ApiResponse, ClientIp};
pub use config::{ConfigError, EngineConfig, EngineConfigBuilder};
pub use controller::{Controller, RefreshReport};
pub use encoding::{baidu_encoding, zhihu_encoding, PartnerRules};
pub use engine::{EngineCounts, RotationEngine};
pub use server::{AppState, RotorServer, ServerError};
