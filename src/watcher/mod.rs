//! Per-group background watchers
//!
//! Every domain group gets a [`health::HealthMonitor`] and every content
//! group a [`publish::ContentPublisher`]. A watcher owns no timer: it runs as
//! its own task, parks on the wheel slot its group id maps to, and does one
//! cycle of work each time the slot fires. Results flow back to the engine
//! through a [`GroupSink`].
//!
//! Each task is paired with a stop channel. [`WatcherHandle::stop`] closes it
//! and waits for the task to finish, so a coordinator that keeps its handles
//! can shut every watcher down explicitly.

pub mod health;
pub mod oracle;
pub mod publish;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::{ContentGroup, DomainGroup, DomainList};
use crate::scheduler::TimingWheel;

pub use health::{HealthMonitor, HealthOutcome};
pub use oracle::{HealthOracle, ProbeOracle, ProbeVerdict};
pub use publish::{build_bundle, ContentPublisher, PublishOutcome};

/// Receiver of refreshed group state
pub trait GroupSink: Send + Sync {
    /// Merge a refreshed domain group. `list` is `None` when only the group
    /// row changed.
    fn update_domain_group(&self, group: DomainGroup, list: Option<DomainList>);

    /// Merge a refreshed content group
    fn update_content_group(&self, group: ContentGroup);
}

/// One unit of periodic per-group work
#[async_trait]
pub trait Watcher: Send + 'static {
    /// Id used to pick the wheel slot
    fn slot_id(&self) -> i64;

    /// Short name for logs
    fn label(&self) -> String;

    /// Run one cycle
    async fn on_fire(&mut self);
}

/// Handle to a running watcher task
pub struct WatcherHandle {
    label: String,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the task to stop and wait for it to finish
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(watcher = %self.label, error = %e, "watcher task ended abnormally");
        }
    }
}

/// Run `watcher` on its own task, firing once per pass of its wheel slot
pub fn spawn<W: Watcher>(mut watcher: W, wheel: Arc<TimingWheel>) -> WatcherHandle {
    let label = watcher.label();
    let (stop, mut stop_rx) = watch::channel(false);
    let task_label = label.clone();

    let task = tokio::spawn(async move {
        tracing::debug!(watcher = %task_label, slot = wheel.slot_of(watcher.slot_id()), "watcher started");
        loop {
            let signal = wheel.check(watcher.slot_id());
            tokio::select! {
                _ = signal.fired() => watcher.on_fire().await,
                _ = stop_rx.changed() => break,
            }
        }
        tracing::debug!(watcher = %task_label, "watcher stopped");
    });

    WatcherHandle { label, stop, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counting {
        id: i64,
        fired: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Watcher for Counting {
        fn slot_id(&self) -> i64 {
            self.id
        }

        fn label(&self) -> String {
            format!("counting:{}", self.id)
        }

        async fn on_fire(&mut self) {
            self.fired.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_fires_each_revolution() {
        let wheel = Arc::new(TimingWheel::start(Duration::from_millis(10), 2));
        let fired = Arc::new(AtomicUsize::new(0));
        let handle = spawn(
            Counting {
                id: 0,
                fired: fired.clone(),
            },
            wheel.clone(),
        );
        assert_eq!(handle.label(), "counting:0");

        // slot 0 fires at 10ms, 30ms, 50ms
        tokio::time::sleep(Duration::from_millis(55)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);

        handle.stop().await;
        wheel.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchers_sharing_a_slot_fire_together() {
        let wheel = Arc::new(TimingWheel::start(Duration::from_millis(10), 4));
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let handles = vec![
            spawn(Counting { id: 1, fired: a.clone() }, wheel.clone()),
            spawn(Counting { id: 5, fired: b.clone() }, wheel.clone()),
        ];

        // slot 1 fires at 20ms and 60ms
        tokio::time::sleep(Duration::from_millis(95)).await;
        assert_eq!(a.load(Ordering::SeqCst), 2);
        assert_eq!(b.load(Ordering::SeqCst), 2);

        futures::future::join_all(handles.into_iter().map(WatcherHandle::stop)).await;
        wheel.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_task_without_wheel() {
        let wheel = Arc::new(TimingWheel::start(Duration::from_secs(3600), 4));
        let fired = Arc::new(AtomicUsize::new(0));
        let handle = spawn(
            Counting {
                id: 3,
                fired: fired.clone(),
            },
            wheel.clone(),
        );
        tokio::task::yield_now().await;
        assert!(handle.is_running());

        handle.stop().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        wheel.stop();
    }
}
