//! Deterministic RNG for exploration strategies.
//!
//! All randomized strategies draw from this wrapper, never from ambient
//! entropy, so a run is reproducible from its master seed alone.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Mixing constant for per-iteration seed derivation.
const ITERATION_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Deterministic RNG for strategy decisions.
pub struct ControlledRng {
    inner: ChaCha8Rng,
}

impl ControlledRng {
    /// Create a new RNG from a seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Derive the RNG for one iteration of a run.
    ///
    /// The stream depends only on the master seed and the iteration
    /// counter, so iteration N of two runs with the same master seed
    /// makes identical draws.
    #[must_use]
    pub fn for_iteration(master_seed: u64, iteration: u64) -> Self {
        Self::new(master_seed ^ iteration.wrapping_mul(ITERATION_SALT))
    }

    /// Derive a child RNG from the current stream.
    #[must_use]
    pub fn fork(&mut self) -> Self {
        let seed = self.inner.next_u64();
        Self::new(seed)
    }

    /// Sample a uniform integer in `[0, max_value)`.
    ///
    /// `max_value` of zero yields zero.
    pub fn next_integer(&mut self, max_value: u64) -> u64 {
        if max_value == 0 {
            return 0;
        }
        self.inner.gen_range(0..max_value)
    }

    /// Sample a boolean with a `1/max_value` bias: true iff a uniform
    /// draw from `[0, max_value)` lands on zero. `max_value` of 2 is a
    /// fair coin.
    pub fn next_boolean(&mut self, max_value: u64) -> bool {
        self.next_integer(max_value) == 0
    }

    /// Pick a uniform index into a slice of the given length.
    ///
    /// Length zero yields zero; callers check emptiness first.
    pub fn pick_index(&mut self, len: usize) -> usize {
        usize::try_from(self.next_integer(len as u64)).unwrap_or(0)
    }

    /// Fisher-Yates shuffle of an index vector.
    pub fn shuffle(&mut self, values: &mut [usize]) {
        for idx in (1..values.len()).rev() {
            let other = self.pick_index(idx + 1);
            values.swap(idx, other);
        }
    }
}
