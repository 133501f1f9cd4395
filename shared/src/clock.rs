//! Monotonic time sources for latency measurement and batch deadlines

use std::time::Instant;

#[cfg(any(test, feature = "test-util"))]
pub use manual::ManualClock;

/// A monotonic clock
pub trait Clock {
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// The process monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(any(test, feature = "test-util"))]
mod manual {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::Clock;

    /// A clock that only moves when advanced.
    ///
    /// Clones share the same time, so a transport can advance the clock the
    /// engine is reading from.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        origin: Instant,
        offset_ns: Arc<AtomicU64>,
    }

    impl ManualClock {
        /// Create a clock frozen at the current instant
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset_ns: Arc::new(AtomicU64::new(0)),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: Duration) {
            let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
            self.offset_ns.fetch_add(nanos, Ordering::SeqCst);
        }

        /// Time elapsed since the clock was created
        pub fn elapsed(&self) -> Duration {
            Duration::from_nanos(self.offset_ns.load(Ordering::SeqCst))
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.origin + self.elapsed()
        }
    }
}
