//! Time source shared by the codec, the secret cache and the session store.
//!
//! Every expiry decision reads the injected clock so tests can move time
//! forward without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of wall-clock time, expressed as the duration since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;

    /// Current time in whole Unix seconds.
    fn now_secs(&self) -> u64 {
        self.now().as_secs()
    }
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Start at the given Unix timestamp (seconds).
    pub fn at(secs: u64) -> Self {
        Self {
            millis: AtomicU64::new(secs * 1000),
        }
    }

    /// Start at the current system time.
    pub fn starting_now() -> Self {
        let now = SystemClock.now();
        Self {
            millis: AtomicU64::new(now.as_millis() as u64),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}
