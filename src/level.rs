//! Level selection for newly inserted nodes.
//!
//! Every insertion draws a level from a geometric distribution: start at 1 and
//! climb one more level with probability 1/4 per step, capped at the
//! configured maximum. One uniform 64-bit draw is enough: each trailing zero
//! base-4 digit is one successful climb.
//!
//! The source of randomness is injectable through [`LevelGenerator`] so tests
//! can pin the level sequence.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::AtomicU64;

use parking_lot::Mutex;
use rand_core::RngCore;

use crate::ordering::RELAXED;

/// Fallback xorshift state; the generator must never hold zero.
const NONZERO_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// Map 64 uniform bits onto a level in `1..=max_level`.
///
/// `P(level > k) = 4^-k` until the cap is reached.
#[must_use]
#[inline]
pub fn level_from_bits(bits: u64, max_level: usize) -> usize {
    let climbs: usize = (bits.trailing_zeros() / 2) as usize;
    (1 + climbs).min(max_level.max(1))
}

/// Source of node levels.
///
/// Implementations are shared by every thread inserting into the same map,
/// hence `&self` and `Send + Sync`.
pub trait LevelGenerator: Send + Sync {
    /// Draw a level in `1..=max_level`.
    fn random_level(&self, max_level: usize) -> usize;
}

/// Lock-free xorshift level generator (the default).
///
/// Concurrent draws may observe the same state and produce the same level.
/// That only skews the distribution slightly under contention and never
/// affects correctness.
#[derive(Debug)]
pub struct XorShiftLevels {
    state: AtomicU64,
}

impl XorShiftLevels {
    /// Create a generator with a fixed seed. A zero seed is replaced.
    #[must_use]
    pub const fn with_seed(seed: u64) -> Self {
        let seed: u64 = if seed == 0 { NONZERO_SEED } else { seed };
        Self {
            state: AtomicU64::new(seed),
        }
    }

    /// Create a generator seeded from the process's hash randomness.
    #[must_use]
    pub fn new() -> Self {
        let mut hasher = RandomState::new().build_hasher();
        hasher.write_usize(std::ptr::from_ref(&hasher).addr());
        Self::with_seed(hasher.finish())
    }

    fn next_bits(&self) -> u64 {
        // xorshift64 (Marsaglia).
        let mut x: u64 = self.state.load(RELAXED);
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state.store(x, RELAXED);
        x
    }
}

impl Default for XorShiftLevels {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelGenerator for XorShiftLevels {
    #[inline]
    fn random_level(&self, max_level: usize) -> usize {
        level_from_bits(self.next_bits(), max_level)
    }
}

/// Adapter that draws levels from any [`RngCore`].
///
/// The RNG sits behind a mutex, so this is meant for deterministic tests and
/// reproducible runs rather than heavily contended inserts.
///
/// ```rust
/// use rand::SeedableRng;
/// use rand::rngs::SmallRng;
/// use skiplist::level::{LevelGenerator, RngLevels};
///
/// let levels = RngLevels::new(SmallRng::seed_from_u64(7));
/// let level = levels.random_level(32);
/// assert!((1..=32).contains(&level));
/// ```
#[derive(Debug)]
pub struct RngLevels<R> {
    rng: Mutex<R>,
}

impl<R: RngCore> RngLevels<R> {
    /// Wrap an RNG.
    #[must_use]
    pub const fn new(rng: R) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// Recover the wrapped RNG.
    #[must_use]
    pub fn into_inner(self) -> R {
        self.rng.into_inner()
    }
}

impl<R: RngCore + Send> LevelGenerator for RngLevels<R> {
    #[inline]
    fn random_level(&self, max_level: usize) -> usize {
        level_from_bits(self.rng.lock().next_u64(), max_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn test_level_from_bits() {
        // Low base-4 digit non-zero: no climb.
        assert_eq!(level_from_bits(0b01, 32), 1);
        assert_eq!(level_from_bits(0b10, 32), 1);
        assert_eq!(level_from_bits(0b11, 32), 1);
        // One zero digit, then a non-zero one.
        assert_eq!(level_from_bits(0b0100, 32), 2);
        assert_eq!(level_from_bits(0b1000, 32), 2);
        assert_eq!(level_from_bits(0b01_0000, 32), 3);
        // All zero: 32 climbs, then the cap applies.
        assert_eq!(level_from_bits(0, 64), 33);
        assert_eq!(level_from_bits(0, 32), 32);
        assert_eq!(level_from_bits(0, 4), 4);
        assert_eq!(level_from_bits(0, 0), 1);
    }

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let a = RngLevels::new(SmallRng::seed_from_u64(42));
        let b = RngLevels::new(SmallRng::seed_from_u64(42));

        let left: Vec<usize> = (0..1000).map(|_| a.random_level(32)).collect();
        let right: Vec<usize> = (0..1000).map(|_| b.random_level(32)).collect();
        assert_eq!(left, right);

        // One draw per level: the recovered RNG sits exactly 1000 steps in.
        let mut reference = SmallRng::seed_from_u64(42);
        for _ in 0..1000 {
            reference.next_u64();
        }
        assert_eq!(a.into_inner().next_u64(), reference.next_u64());
    }

    #[test]
    fn test_xorshift_is_deterministic() {
        let a = XorShiftLevels::with_seed(7);
        let b = XorShiftLevels::with_seed(7);
        for _ in 0..1000 {
            assert_eq!(a.random_level(32), b.random_level(32));
        }
    }

    #[test]
    fn test_zero_seed_is_replaced() {
        let levels = XorShiftLevels::with_seed(0);
        // A zero xorshift state would stay zero forever and always yield the cap.
        let drawn: Vec<usize> = (0..64).map(|_| levels.random_level(32)).collect();
        assert!(drawn.iter().any(|&l| l < 32));
    }

    #[test]
    fn test_distribution_is_geometric_quarter() {
        const DRAWS: usize = 200_000;
        let levels = RngLevels::new(SmallRng::seed_from_u64(0x5eed));

        let mut histogram = [0usize; 34];
        for _ in 0..DRAWS {
            histogram[levels.random_level(32)] += 1;
        }

        assert_eq!(histogram[0], 0, "level 0 is never drawn");

        // P(level == 1) = 3/4, P(level == 2) = 3/16, P(level == 3) = 3/64.
        let expect = |p: f64| p * DRAWS as f64;
        let within = |got: usize, want: f64| (got as f64 - want).abs() < want * 0.05;
        assert!(within(histogram[1], expect(0.75)), "{histogram:?}");
        assert!(within(histogram[2], expect(0.1875)), "{histogram:?}");
        assert!(within(histogram[3], expect(0.046_875)), "{histogram:?}");
    }

    #[test]
    fn test_levels_respect_cap() {
        let levels = XorShiftLevels::with_seed(99);
        for _ in 0..10_000 {
            let level = levels.random_level(3);
            assert!((1..=3).contains(&level));
        }
    }
}
