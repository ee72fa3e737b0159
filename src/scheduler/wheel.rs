//! Timing wheel
//!
//! A fixed ring of broadcast slots advanced by one ticker task. Any integer
//! id maps onto slot `id mod buckets`, so every watcher gets a periodic
//! wake-up without owning a timer of its own. Watchers sharing a slot always
//! fire on the same tick.
//!
//! Each slot is a `watch` channel carrying a generation counter. Firing a
//! slot bumps its generation, which wakes every receiver subscribed before
//! the bump exactly once. A fresh [`TimingWheel::check`] after that waits for
//! the next bump, one full revolution later.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Fixed-size periodic broadcast scheduler
pub struct TimingWheel {
    interval: Duration,
    slots: Arc<Vec<watch::Sender<u64>>>,
    stop: watch::Sender<bool>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

/// Wait-handle for one firing of a wheel slot
pub struct WheelSignal {
    slot: usize,
    rx: watch::Receiver<u64>,
}

impl WheelSignal {
    /// Slot this handle is tied to
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Resolve on the next firing of the slot.
    ///
    /// After the wheel is stopped and dropped this never resolves; callers
    /// must race it against their own stop signal.
    pub async fn fired(mut self) {
        if self.rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl TimingWheel {
    /// Start a wheel with `buckets` slots, advancing one slot per `interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(interval: Duration, buckets: usize) -> Self {
        let buckets = buckets.max(1);
        let slots: Arc<Vec<watch::Sender<u64>>> =
            Arc::new((0..buckets).map(|_| watch::channel(0u64).0).collect());
        let (stop, mut stop_rx) = watch::channel(false);

        let ring = slots.clone();
        let ticker = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + interval, interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut pos = 0usize;

            loop {
                tokio::select! {
                    _ = ticks.tick() => {
                        ring[pos].send_modify(|generation| *generation = generation.wrapping_add(1));
                        pos = (pos + 1) % ring.len();
                    }
                    _ = stop_rx.changed() => {
                        tracing::debug!("timing wheel stopped");
                        break;
                    }
                }
            }
        });

        tracing::info!(
            interval_ms = interval.as_millis() as u64,
            buckets,
            "timing wheel started"
        );

        Self {
            interval,
            slots,
            stop,
            ticker: Mutex::new(Some(ticker)),
        }
    }

    /// Number of slots in the ring
    pub fn buckets(&self) -> usize {
        self.slots.len()
    }

    /// Tick interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time for the wheel to come back around to the same slot
    pub fn revolution(&self) -> Duration {
        self.interval * self.slots.len() as u32
    }

    /// Slot an id maps onto
    pub fn slot_of(&self, id: i64) -> usize {
        id.rem_euclid(self.slots.len() as i64) as usize
    }

    /// Get a wait-handle for the next firing of the slot `id` maps onto
    pub fn check(&self, id: i64) -> WheelSignal {
        let slot = self.slot_of(id);
        WheelSignal {
            slot,
            rx: self.slots[slot].subscribe(),
        }
    }

    /// Halt the ticker. Outstanding handles are not signaled.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
        let handle = self
            .ticker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    /// Whether the ticker task is still running
    pub fn is_running(&self) -> bool {
        self.ticker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TimingWheel {
    fn drop(&mut self) {
        self.stop();
    }
}
