//! Chaotic storage wrapper for fault injection testing
//!
//! Storage wrapper that randomly fails operations to test that every write
//! scope rolls back cleanly. A failed commit never reaches the inner
//! storage, so the inner state is always a prefix of successful commits.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use super::{Storage, StorageError, WriteBatch};
use crate::{
    identifier::{PersonaIdentifier, ProfileIdentifier},
    record::{PersonaRecord, ProfileRecord},
};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying storage implementation but fails operations
/// at a configured rate. Reads and commits can be made chaotic separately,
/// so a test can let reads through and exercise only commit failures.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    /// Failure rate for loads and listings (0.0 = never fail)
    read_failure_rate: f64,
    /// Failure rate for commits (0.0 = never fail)
    commit_failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Operations attempted
    operation_count: Arc<AtomicUsize>,
    /// Failures injected
    injected_failures: Arc<AtomicUsize>,
}

/// Simple deterministic RNG for chaos injection
///
/// Uses linear congruential generator (LCG) for fast, deterministic randomness.
/// This ensures chaos tests are reproducible with the same seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Wrapper failing every operation with probability `failure_rate`.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit rates and seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if either rate is not in [0.0, 1.0]
    #[allow(clippy::panic)]
    pub fn with_seed(
        inner: S,
        read_failure_rate: f64,
        commit_failure_rate: f64,
        seed: u64,
    ) -> Self {
        for rate in [read_failure_rate, commit_failure_rate] {
            assert!(
                (0.0..=1.0).contains(&rate),
                "failure_rate must be between 0.0 and 1.0, got {rate}"
            );
        }

        Self {
            inner,
            read_failure_rate,
            commit_failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(AtomicUsize::new(0)),
            injected_failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of storage operations attempted.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::Relaxed)
    }

    /// Number of operations that were failed on purpose.
    pub fn injected_failures(&self) -> usize {
        self.injected_failures.load(Ordering::Relaxed)
    }

    fn maybe_fail(&self, rate: f64) -> Result<(), StorageError> {
        self.operation_count.fetch_add(1, Ordering::Relaxed);

        // A poisoned RNG only means another test thread panicked mid-draw
        let roll = self.rng.lock().map_or_else(|e| e.into_inner().next(), |mut rng| rng.next());
        if roll < rate {
            self.injected_failures.fetch_add(1, Ordering::Relaxed);
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn load_profile(&self, id: &ProfileIdentifier) -> Result<Option<ProfileRecord>, StorageError> {
        self.maybe_fail(self.read_failure_rate)?;
        self.inner.load_profile(id)
    }

    fn load_persona(&self, id: &PersonaIdentifier) -> Result<Option<PersonaRecord>, StorageError> {
        self.maybe_fail(self.read_failure_rate)?;
        self.inner.load_persona(id)
    }

    fn list_profiles(&self) -> Result<Vec<ProfileRecord>, StorageError> {
        self.maybe_fail(self.read_failure_rate)?;
        self.inner.list_profiles()
    }

    fn list_personas(&self) -> Result<Vec<PersonaRecord>, StorageError> {
        self.maybe_fail(self.read_failure_rate)?;
        self.inner.list_personas()
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
        self.maybe_fail(self.commit_failure_rate)?;
        self.inner.commit(batch)
    }
}
