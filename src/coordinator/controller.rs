//! Engine lifecycle: startup load, catch-up and shutdown
//!
//! The [`Controller`] owns everything that runs in the background around a
//! [`RotationEngine`]: the timing wheel, one watcher task per group and the
//! catch-up task that picks up groups created after startup. It keeps a
//! handle to every task it spawns and stops all of them on
//! [`Controller::shutdown`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::{Result, RotorErrorTrait};
use crate::metrics;
use crate::models::{ContentGroup, DomainGroup, DomainList};
use crate::scheduler::TimingWheel;
use crate::storage::{ControlRepository, SharedObjectStore};
use crate::watcher::{self, ContentPublisher, HealthMonitor, HealthOracle, WatcherHandle};

use super::config::EngineConfig;
use super::engine::RotationEngine;

/// Groups picked up by one catch-up pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub domain_groups: usize,
    pub content_groups: usize,
}

struct CatchUpTask {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct Controller {
    config: EngineConfig,
    repo: ControlRepository,
    engine: Arc<RotationEngine>,
    oracle: Arc<dyn HealthOracle>,
    store: SharedObjectStore,
    wheel: Arc<TimingWheel>,
    watchers: Mutex<Vec<WatcherHandle>>,
    domain_max_id: AtomicI64,
    content_max_id: AtomicI64,
    catch_up: Mutex<Option<CatchUpTask>>,
}

impl Controller {
    /// Load every group, spawn its watcher and start the catch-up task.
    ///
    /// With `start_watchers` off only the initial snapshot is loaded.
    ///
    /// # Errors
    ///
    /// Any storage failure during the initial load, or a bucket that
    /// refuses the CORS policy.
    pub async fn start(
        config: EngineConfig,
        repo: ControlRepository,
        engine: Arc<RotationEngine>,
        oracle: Arc<dyn HealthOracle>,
        store: SharedObjectStore,
    ) -> Result<Arc<Self>> {
        let wheel = Arc::new(TimingWheel::start(config.tick_interval, config.wheel_buckets));

        let controller = Arc::new(Self {
            config,
            repo,
            engine,
            oracle,
            store,
            wheel,
            watchers: Mutex::new(Vec::new()),
            domain_max_id: AtomicI64::new(0),
            content_max_id: AtomicI64::new(0),
            catch_up: Mutex::new(None),
        });

        controller.load().await?;

        if controller.config.start_watchers {
            let task = controller.clone().spawn_catch_up();
            *controller.lock_catch_up() = Some(task);
        }

        let counts = controller.engine.counts();
        tracing::info!(
            show_groups = counts.show_groups,
            jump_groups = counts.jump_groups,
            content_groups = counts.content_groups,
            watchers = controller.watcher_count(),
            "controller started"
        );

        Ok(controller)
    }

    pub fn engine(&self) -> &Arc<RotationEngine> {
        &self.engine
    }

    pub fn repository(&self) -> &ControlRepository {
        &self.repo
    }

    /// Running watcher tasks
    pub fn watcher_count(&self) -> usize {
        self.lock_watchers().iter().filter(|w| w.is_running()).count()
    }

    /// Highest (domain, content) group ids seen so far
    pub fn max_ids(&self) -> (i64, i64) {
        (
            self.domain_max_id.load(Ordering::SeqCst),
            self.content_max_id.load(Ordering::SeqCst),
        )
    }

    fn lock_watchers(&self) -> std::sync::MutexGuard<'_, Vec<WatcherHandle>> {
        self.watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_catch_up(&self) -> std::sync::MutexGuard<'_, Option<CatchUpTask>> {
        self.catch_up
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn load(&self) -> Result<()> {
        let (groups, max_id) = self.repo.domain_groups_after(0)?;
        for group in groups {
            let list = self.repo.domain_list(group.id)?;
            self.track_domain_group(group, Some(list));
        }
        self.domain_max_id.store(max_id, Ordering::SeqCst);

        let (groups, max_id) = self.repo.content_groups_after(0)?;
        for group in groups {
            self.track_content_group(group).await?;
        }
        self.content_max_id.store(max_id, Ordering::SeqCst);

        Ok(())
    }

    /// Pick up groups created since the last pass.
    ///
    /// A group whose publisher cannot be set up is still served, without
    /// a publisher.
    ///
    /// # Errors
    ///
    /// Fails if a group listing cannot be read; the max ids only advance
    /// past listings that were read.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();

        let (groups, max_id) = self
            .repo
            .domain_groups_after(self.domain_max_id.load(Ordering::SeqCst))?;
        self.domain_max_id.store(max_id, Ordering::SeqCst);
        for group in groups {
            let list = match self.repo.domain_list(group.id) {
                Ok(list) => Some(list),
                Err(e) => {
                    tracing::warn!(group_id = group.id, error = %e, "new domain group without list, monitor will fill it");
                    None
                }
            };
            self.track_domain_group(group, list);
            report.domain_groups += 1;
        }

        let (groups, max_id) = self
            .repo
            .content_groups_after(self.content_max_id.load(Ordering::SeqCst))?;
        self.content_max_id.store(max_id, Ordering::SeqCst);
        for group in groups {
            let group_id = group.id;
            match self.track_content_group(group).await {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(group_id, error = %e, category = e.category().as_str(), "publisher setup failed, serving group without publisher");
                }
                Err(e) => {
                    tracing::error!(group_id, error = %e, category = e.category().as_str(), "publisher setup failed, serving group without publisher");
                }
            }
            report.content_groups += 1;
        }

        metrics::record_discovery("domain", report.domain_groups);
        metrics::record_discovery("content", report.content_groups);
        if report != RefreshReport::default() {
            tracing::info!(
                domain_groups = report.domain_groups,
                content_groups = report.content_groups,
                "catch-up found new groups"
            );
        }

        Ok(report)
    }

    fn track_domain_group(&self, group: DomainGroup, list: Option<DomainList>) {
        let watermark = list.as_ref().map_or(0, |l| l.update_time);
        self.engine.update_domain_group(group.clone(), list);

        if self.config.start_watchers {
            let monitor = HealthMonitor::new(
                group,
                self.repo.clone(),
                self.oracle.clone(),
                self.engine.clone(),
            )
            .with_watermark(watermark);
            let handle = watcher::spawn(monitor, self.wheel.clone());
            self.lock_watchers().push(handle);
        }
    }

    async fn track_content_group(&self, group: ContentGroup) -> Result<()> {
        self.engine.update_content_group(group.clone());

        if self.config.start_watchers {
            let publisher = ContentPublisher::create(
                group,
                self.repo.clone(),
                self.store.clone(),
                self.engine.clone(),
            )
            .await?;
            let handle = watcher::spawn(publisher, self.wheel.clone());
            self.lock_watchers().push(handle);
        }
        Ok(())
    }

    fn spawn_catch_up(self: Arc<Self>) -> CatchUpTask {
        let (stop, mut stop_rx) = watch::channel(false);
        let period = self.config.refresh_interval;

        let task = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticks.tick() => {
                        match self.refresh().await {
                            Ok(_) => {}
                            Err(e) if e.is_recoverable() => {
                                tracing::warn!(error = %e, "catch-up pass failed, retrying next tick");
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "catch-up pass failed");
                            }
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            tracing::debug!("catch-up task stopped");
        });

        CatchUpTask { stop, task }
    }

    /// Stop the catch-up task, every watcher and the wheel
    pub async fn shutdown(&self) {
        let catch_up = self.lock_catch_up().take();
        if let Some(CatchUpTask { stop, task }) = catch_up {
            let _ = stop.send(true);
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "catch-up task ended abnormally");
            }
        }

        let watchers = std::mem::take(&mut *self.lock_watchers());
        let stopped = watchers.len();
        futures::future::join_all(watchers.into_iter().map(WatcherHandle::stop)).await;

        self.wheel.stop();
        tracing::info!(watchers = stopped, "controller stopped");
    }
}
