//! Seeded deterministic pseudo-random source.
//!
//! Everything the generator emits must be reproducible from a seed string,
//! so this walks a fixed SHA-256 digest of the seed instead of pulling from
//! an OS or thread-local RNG. Determinism is the goal here, not
//! unpredictability.

use sha2::{Digest, Sha256};

/// Deterministic pseudo-random number generator seeded from a string.
///
/// The seed is hashed once; successive draws walk the digest bytes,
/// wrapping around when exhausted. Two instances built from equal seed
/// strings produce identical sequences for any number of draws.
pub struct SeededRng {
    digest: [u8; 32],
    position: usize,
}

impl SeededRng {
    /// Create a new generator from an arbitrary seed string.
    pub fn new(seed: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        Self {
            digest: hasher.finalize().into(),
            position: 0,
        }
    }

    /// Next value in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        let byte = self.digest[self.position % self.digest.len()];
        self.position += 1;
        byte as f64 / 256.0
    }

    /// Next integer in `[min, max)`. Returns `min` when the range is empty.
    pub fn random_int(&mut self, min: usize, max: usize) -> usize {
        if min >= max {
            return min;
        }
        min + (self.next_f64() * (max - min) as f64).floor() as usize
    }

    /// Pick an element from a non-empty slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.random_int(0, items.len())]
    }
}
