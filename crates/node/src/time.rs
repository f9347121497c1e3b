use core::fmt::Debug;
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

/// Trait for the clock used by the node to derive block timestamps.
pub trait TimeSinceEpoch: Debug + Send + Sync + 'static {
    /// Returns the current time as seconds since the UNIX epoch.
    fn since_epoch(&self) -> u64;

    /// Returns the number of seconds that elapsed since the provided time.
    /// If the provided time lies in the future, the error holds the forward
    /// drift.
    fn since(&self, time: SystemTime) -> Result<u64, SystemTimeError>;
}

/// The wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct CurrentTime;

impl TimeSinceEpoch for CurrentTime {
    fn since_epoch(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Current time must be after the UNIX epoch")
            .as_secs()
    }

    fn since(&self, time: SystemTime) -> Result<u64, SystemTimeError> {
        SystemTime::now()
            .duration_since(time)
            .map(|elapsed| elapsed.as_secs())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use self::mock::MockTime;

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use std::{
        sync::Arc,
        time::{Duration, SystemTime, SystemTimeError, UNIX_EPOCH},
    };

    use parking_lot::RwLock;

    use super::TimeSinceEpoch;

    /// A clock that only moves when told to. Clones share the same time.
    #[derive(Clone, Debug)]
    pub struct MockTime {
        now: Arc<RwLock<SystemTime>>,
    }

    impl MockTime {
        /// Constructs a clock that is stopped at the current wall-clock time.
        pub fn now() -> Self {
            Self::at(SystemTime::now())
        }

        /// Constructs a clock that is stopped at the provided time.
        pub fn at(time: SystemTime) -> Self {
            Self {
                now: Arc::new(RwLock::new(time)),
            }
        }

        /// Moves the clock forward by the provided number of seconds.
        pub fn add_seconds(&self, seconds: u64) {
            *self.now.write() += Duration::from_secs(seconds);
        }
    }

    impl TimeSinceEpoch for MockTime {
        fn since_epoch(&self) -> u64 {
            self.now
                .read()
                .duration_since(UNIX_EPOCH)
                .expect("Mock time must be after the UNIX epoch")
                .as_secs()
        }

        fn since(&self, time: SystemTime) -> Result<u64, SystemTimeError> {
            self.now
                .read()
                .duration_since(time)
                .map(|elapsed| elapsed.as_secs())
        }
    }
}
