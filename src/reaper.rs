//! Idle room reaper
//!
//! Background task that periodically drops rooms nobody has touched for
//! the configured TTL. A failed sweep is logged and the next tick runs as
//! usual; only cancellation stops the task.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::store::RoomStore;

/// Shortest period accepted; `tokio::time::interval` rejects zero
const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Anything holding state that goes stale after a period of inactivity
pub trait IdleSweep: Send + Sync {
    /// Drop whatever has been idle as of `now`, returning how many were removed
    fn sweep_expired(&self, now: Instant) -> usize;
}

impl IdleSweep for RoomStore {
    fn sweep_expired(&self, now: Instant) -> usize {
        RoomStore::sweep_expired(self, now)
    }
}

pub struct IdleRoomReaper<S: IdleSweep = RoomStore> {
    store: Arc<S>,
    period: Duration,
}

impl<S: IdleSweep> IdleRoomReaper<S> {
    pub fn new(store: Arc<S>, period: Duration) -> Self {
        Self {
            store,
            period: period.max(MIN_PERIOD),
        }
    }

    /// Sweep now, then every period, until `cancel` fires
    ///
    /// Cancellation interrupts the wait between sweeps, never a sweep.
    pub async fn run(self, cancel: CancellationToken) {
        info!("Idle room reaper started, period {:?}", self.period);

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }

        info!("Idle room reaper stopped");
    }

    /// Run one sweep, returning the rooms removed or `None` if it failed
    pub fn tick(&self) -> Option<usize> {
        let now = Instant::now();
        match panic::catch_unwind(AssertUnwindSafe(|| self.store.sweep_expired(now))) {
            Ok(0) => {
                debug!("Idle room sweep: nothing to remove");
                Some(0)
            }
            Ok(removed) => {
                info!("Idle room sweep: removed {} inactive rooms", removed);
                Some(removed)
            }
            Err(_) => {
                error!("Idle room sweep failed; retrying next period");
                None
            }
        }
    }
}
