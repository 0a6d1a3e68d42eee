//! Heartbeat supervision.
//!
//! The server promises a change message (possibly an empty heartbeat) at
//! least every `heartbeatMs`. The monitor arms a dead-man timer at that
//! interval plus a fixed grace; every inbound line refreshes it. If the
//! timer expires the attack callback fires once and the monitor stops
//! beating - policy on what to do about it (log, restart) belongs to the
//! embedder.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Grace added on top of the server's send interval.
const GRACE: Duration = Duration::from_millis(2000);

type AttackCallback = Arc<dyn Fn() + Send + Sync>;

struct Inner {
    beating: bool,
    interval: Duration,
    deadline: Instant,
    /// Bumped on every start/stop so a stale watchdog task retires instead
    /// of firing against a newer timer.
    generation: u64,
}

/// Dead-man timer with `refresh()` semantics.
pub struct HeartbeatMonitor {
    inner: Arc<Mutex<Inner>>,
    on_attack: AttackCallback,
}

impl HeartbeatMonitor {
    /// Create a monitor that invokes `on_attack` when the grace period
    /// expires without a refresh.
    pub fn new(on_attack: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                beating: false,
                interval: Duration::ZERO,
                deadline: Instant::now(),
                generation: 0,
            })),
            on_attack: Arc::new(on_attack),
        }
    }

    /// Arm the timer at `interval + grace`. A no-op when already beating.
    pub fn start(&self, interval: Duration) {
        let generation = {
            let mut inner = self.inner.lock();
            if inner.beating {
                debug!("heartbeat monitor already beating");
                return;
            }
            inner.beating = true;
            inner.interval = interval;
            inner.generation += 1;
            inner.deadline = Instant::now() + interval + GRACE;
            inner.generation
        };
        let state = Arc::clone(&self.inner);
        let on_attack = Arc::clone(&self.on_attack);
        tokio::spawn(watchdog(state, on_attack, generation));
    }

    /// Push the deadline out by another interval + grace.
    pub fn refresh(&self) {
        let mut inner = self.inner.lock();
        if !inner.beating {
            warn!("heartbeat refresh while not beating");
            return;
        }
        inner.deadline = Instant::now() + inner.interval + GRACE;
    }

    /// Cancel the timer.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.beating = false;
        inner.generation += 1;
    }

    /// Restart with a new interval if currently beating.
    pub fn update_interval(&self, interval: Duration) {
        if self.is_beating() {
            self.stop();
            self.start(interval);
        }
    }

    #[must_use]
    pub fn is_beating(&self) -> bool {
        self.inner.lock().beating
    }
}

async fn watchdog(state: Arc<Mutex<Inner>>, on_attack: AttackCallback, generation: u64) {
    loop {
        let deadline = {
            let inner = state.lock();
            if !inner.beating || inner.generation != generation {
                return;
            }
            inner.deadline
        };
        tokio::time::sleep_until(deadline).await;

        let expired = {
            let mut inner = state.lock();
            if !inner.beating || inner.generation != generation {
                return;
            }
            if Instant::now() >= inner.deadline {
                inner.beating = false;
                true
            } else {
                // refreshed while sleeping; go around with the new deadline
                false
            }
        };
        if expired {
            warn!("heartbeat missed: no inbound traffic within grace period");
            on_attack();
            return;
        }
    }
}
