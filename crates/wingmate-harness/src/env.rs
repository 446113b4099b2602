//! A `turmoil`-compatible [`Environment`].
//!
//! `now()` returns `tokio::time::Instant` rather than `std::time::Instant`:
//! under a real tokio runtime the two track the same wall clock, but only
//! `tokio::time::Instant` observes `turmoil`'s paused, per-host virtual
//! clock. Randomness is seeded so a scenario run is fully reproducible for
//! a given seed, matching `turmoil::Builder::build_with_rng_seed`.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use wingmate_core::Environment;

/// `Environment` driven by `turmoil`'s virtual clock.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SimEnv {
    /// Create a new environment seeded deterministically.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))) }
    }
}

impl Environment for SimEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).fill_bytes(buffer);
    }
}
