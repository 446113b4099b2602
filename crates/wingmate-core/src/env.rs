//! Environment abstraction for deterministic testing.
//!
//! Decouples the hub and client state machines from wall-clock time and
//! system randomness, so the same logic can run against real time in
//! production and virtual time under `turmoil` in `wingmate-harness`.

use std::time::Duration;

/// Abstract environment providing time, randomness, and async sleep.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards.
/// - `random_bytes()` uses a cryptographically secure source in production.
pub trait Environment: Clone + Send + Sync + 'static {
    /// The instant type used by this environment. Production uses
    /// `std::time::Instant`; simulation uses a virtual clock.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the given duration. The only async method in the trait;
    /// only driver code calls it, never the pure state machines.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u32`, used for session uuids.
    fn random_u32(&self) -> u32 {
        let mut bytes = [0u8; 4];
        self.random_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Production `Environment` using the real system clock and a
/// cryptographically secure RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        use rand::RngCore;
        rand::rngs::OsRng.fill_bytes(buffer);
    }
}

/// Deterministic, seedable `Environment` for unit tests that don't need a
/// real async runtime. Time only advances when [`ManualEnvironment::advance`]
/// is called.
pub mod testing {
    use std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicU64, Ordering},
        },
        time::{Duration, Instant},
    };

    use rand::{RngCore, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::Environment;

    /// A clock that only moves forward when told to, paired with a seeded
    /// RNG so tests are fully reproducible.
    #[derive(Clone)]
    pub struct ManualEnvironment {
        base: Instant,
        offset_nanos: Arc<AtomicU64>,
        rng: Arc<Mutex<ChaCha8Rng>>,
    }

    impl ManualEnvironment {
        /// Create a new manual environment seeded deterministically.
        #[must_use]
        pub fn new(seed: u64) -> Self {
            Self {
                base: Instant::now(),
                offset_nanos: Arc::new(AtomicU64::new(0)),
                rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            }
        }

        /// Move the clock forward by `duration`.
        pub fn advance(&self, duration: Duration) {
            self.offset_nanos.fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
        }
    }

    impl Environment for ManualEnvironment {
        type Instant = Instant;

        fn now(&self) -> Self::Instant {
            self.base + Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).fill_bytes(buffer);
        }
    }
}
