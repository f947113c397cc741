use std::sync::atomic::{AtomicI64, Ordering};

use crate::model::Ms;

/// Source of timestamps for reservation and notification records.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Ms;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Ms {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as Ms)
            .unwrap_or(0)
    }
}

/// Settable clock. Every read advances it by `step` so consecutive records get
/// distinct, increasing timestamps.
pub struct ManualClock {
    now: AtomicI64,
    step: Ms,
}

impl ManualClock {
    pub fn new(start: Ms) -> Self {
        Self::with_step(start, 1)
    }

    pub fn with_step(start: Ms, step: Ms) -> Self {
        Self {
            now: AtomicI64::new(start),
            step,
        }
    }

    pub fn set(&self, t: Ms) {
        self.now.store(t, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Ms {
        self.now.fetch_add(self.step, Ordering::SeqCst)
    }
}
