//! Per-domain-group health monitor
//!
//! On every firing the monitor reloads its group, probes each live domain
//! through the [`HealthOracle`] and demotes the ones flagged unhealthy.
//! Demotion is a one-way latch: the monitor never sets a domain back to OK.
//! Recovery goes through an explicit status write on the admin surface.
//!
//! A group that is not OK is not probed at all; its domains keep whatever
//! status they had until the group is re-enabled.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RotorErrorTrait;
use crate::metrics;
use crate::models::{DomainGroup, DomainStatus};
use crate::storage::ControlRepository;
use crate::utils::error::StorageError;

use super::oracle::HealthOracle;
use super::{GroupSink, Watcher};

/// What one cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthOutcome {
    /// Group was not OK, nothing probed
    pub skipped: bool,
    /// Domains probed
    pub probed: usize,
    /// Domains demoted to DOWN
    pub demoted: usize,
    /// Whether the engine was sent an update
    pub reported: bool,
}

pub struct HealthMonitor {
    group: DomainGroup,
    update_time: i64,
    repo: ControlRepository,
    oracle: Arc<dyn HealthOracle>,
    sink: Arc<dyn GroupSink>,
}

impl HealthMonitor {
    pub fn new(
        group: DomainGroup,
        repo: ControlRepository,
        oracle: Arc<dyn HealthOracle>,
        sink: Arc<dyn GroupSink>,
    ) -> Self {
        Self {
            group,
            update_time: 0,
            repo,
            oracle,
            sink,
        }
    }

    /// Start from a list timestamp the engine has already seen
    pub fn with_watermark(mut self, update_time: i64) -> Self {
        self.update_time = update_time;
        self
    }

    pub fn group_id(&self) -> i64 {
        self.group.id
    }

    pub fn watermark(&self) -> i64 {
        self.update_time
    }

    /// Run one health cycle
    ///
    /// # Errors
    ///
    /// Fails if the group or its domains cannot be read. Nothing is
    /// reported in that case.
    pub async fn check_once(&mut self) -> Result<HealthOutcome, StorageError> {
        let group_id = self.group.id;
        let group = self.repo.domain_group(group_id)?;
        let group_changed = group != self.group;
        let mut outcome = HealthOutcome::default();

        if !group.is_ok() {
            outcome.skipped = true;
            if group_changed {
                tracing::info!(group_id, status = ?group.status, "domain group not OK, selection paused");
                self.sink.update_domain_group(group.clone(), None);
                outcome.reported = true;
            }
            self.group = group;
            return Ok(outcome);
        }

        let mut list = self.repo.domain_list(group_id)?;

        for domain in list.domains.iter_mut().filter(|d| d.status != DomainStatus::Down) {
            outcome.probed += 1;
            if self.oracle.probe(&domain.domain).await.is_healthy() {
                continue;
            }

            domain.status = DomainStatus::Down;
            outcome.demoted += 1;
            metrics::record_demotion();
            tracing::warn!(group_id, domain = %domain.domain, "domain demoted to DOWN");

            if let Err(e) = self.repo.update_domain_status(domain.id, DomainStatus::Down) {
                tracing::error!(group_id, domain = %domain.domain, error = %e, "failed to persist demotion");
            }
        }

        if outcome.demoted > 0 || list.update_time > self.update_time || group_changed {
            self.update_time = self.update_time.max(list.update_time);
            self.sink.update_domain_group(group.clone(), Some(list));
            outcome.reported = true;
        }

        self.group = group;
        Ok(outcome)
    }
}

#[async_trait]
impl Watcher for HealthMonitor {
    fn slot_id(&self) -> i64 {
        self.group.id
    }

    fn label(&self) -> String {
        format!("health:{}", self.group.id)
    }

    async fn on_fire(&mut self) {
        match self.check_once().await {
            Ok(outcome) if outcome.demoted > 0 => {
                tracing::info!(
                    group_id = self.group.id,
                    probed = outcome.probed,
                    demoted = outcome.demoted,
                    "health cycle finished"
                );
            }
            Ok(_) => {}
            Err(e) if e.is_recoverable() => {
                tracing::warn!(group_id = self.group.id, error = %e, "health cycle aborted, retrying next cycle");
            }
            Err(e) => {
                tracing::error!(group_id = self.group.id, error = %e, "health cycle aborted");
            }
        }
    }
}
