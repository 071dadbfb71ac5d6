// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Seeded Random Source
// ─────────────────────────────────────────────────────────────────────
//! Per-run random source. Every run owns one, seeded from its scenario
//! seed, so runs are reproducible and never share a generator.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

#[derive(Debug, Clone)]
pub struct SeededRng {
    seed: u64,
    inner: ChaCha8Rng,
}

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform in [lo, hi); returns `lo` for an empty interval.
    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        if lo.is_nan() || hi.is_nan() || hi <= lo {
            return lo;
        }
        self.inner.gen_range(lo..hi)
    }

    /// Standard normal.
    pub fn normal(&mut self) -> f64 {
        self.inner.sample(StandardNormal)
    }

    /// Uniform index in [0, n); 0 when n == 0.
    pub fn index(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        self.inner.gen_range(0..n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = SeededRng::new(42);
        let mut b = SeededRng::new(42);
        for _ in 0..32 {
            assert_eq!(a.normal().to_bits(), b.normal().to_bits());
        }
    }

    #[test]
    fn test_uniform_bounds() {
        let mut rng = SeededRng::new(3);
        for _ in 0..1000 {
            let u = rng.uniform(1.0, 1000.0);
            assert!((1.0..1000.0).contains(&u), "u={u}");
        }
        assert_eq!(rng.uniform(5.0, 5.0), 5.0);
    }

    #[test]
    fn test_index_bounds() {
        let mut rng = SeededRng::new(9);
        assert!((0..100).all(|_| rng.index(4) < 4));
        assert_eq!(rng.index(0), 0);
    }

    #[test]
    fn test_normal_moments() {
        let mut rng = SeededRng::new(11);
        let n = 20_000;
        let xs: Vec<f64> = (0..n).map(|_| rng.normal()).collect();
        let mean = xs.iter().sum::<f64>() / n as f64;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.05, "mean={mean}");
        assert!((var - 1.0).abs() < 0.05, "var={var}");
    }
}
