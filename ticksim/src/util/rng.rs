//! Pseudo-random number generator for tests.

use std::cell::Cell;

/// A xorshift64* generator.
///
/// Statistically weak, but fast and reproducible from a seed, which is all
/// the fuzz tests need.
#[derive(Clone, Debug)]
pub(crate) struct Rng {
    state: Cell<u64>,
}

impl Rng {
    /// Creates a generator from a seed.
    ///
    /// A zero seed would stall the generator and is replaced by a fixed
    /// constant.
    pub(crate) fn new(seed: u64) -> Self {
        let seed = if seed == 0 { 0x853c_49e6_748f_ea9b } else { seed };

        Self {
            state: Cell::new(seed),
        }
    }

    /// Returns the next 64-bit value.
    pub(crate) fn next_u64(&self) -> u64 {
        let mut x = self.state.get();
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state.set(x);

        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    /// Returns a value in `[0, bound)`.
    ///
    /// The modulo bias is negligible for the small bounds used in tests.
    pub(crate) fn below(&self, bound: u64) -> u64 {
        assert_ne!(bound, 0);

        self.next_u64() % bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rng_is_reproducible() {
        let a = Rng::new(7);
        let b = Rng::new(7);

        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
        assert_ne!(Rng::new(0).next_u64(), 0);
    }

    #[test]
    fn rng_below_covers_range() {
        let rng = Rng::new(12345);
        let mut seen = [false; 6];

        for _ in 0..1_000 {
            seen[rng.below(6) as usize] = true;
        }

        assert!(seen.iter().all(|&s| s));
    }
}
