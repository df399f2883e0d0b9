//! Gaussian vector generators with batch repositioning.
//!
//! The Monte Carlo drivers consume standard normal increments one path
//! vector at a time. The contract is deliberately narrow: a generator is
//! prepared for a fixed dimension (one coordinate per time step), can be
//! positioned at any path index, and fills a caller-provided `f64` buffer.
//! Cloned generators share no mutable state, so each parallel batch
//! repositions its own clone and the full `(path, step) -> z` map is
//! deterministic and independent of worker count.
//!
//! Increments are plain `f64` by design: randomness carries no derivative,
//! and lifting draws onto the tape would only grow it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::math::normal_inv_cdf;
use crate::math::sobol::{SobolSequence, mix64};

/// Source of standard normal path vectors.
pub trait GaussianRng: Send {
    /// Coordinates per draw (the number of time steps).
    fn dimension(&self) -> usize;

    /// Positions the generator so the next draw is for path `path`
    /// (0-indexed).
    fn skip_to(&mut self, path: usize);

    /// Fills `out` with `dimension()` standard normals and advances by one
    /// path.
    fn next_g(&mut self, out: &mut [f64]);
}

/// Quasi-random generator: scrambled Sobol points mapped through the
/// inverse normal CDF.
#[derive(Debug, Clone)]
pub struct SobolGaussianRng {
    sequence: SobolSequence,
    uniforms: Vec<f64>,
}

impl SobolGaussianRng {
    /// Prepares a `dim`-dimensional scrambled Sobol generator.
    pub fn new(dim: usize, seed: u64) -> Self {
        Self {
            sequence: SobolSequence::new(dim, seed),
            uniforms: vec![0.0; dim],
        }
    }
}

impl GaussianRng for SobolGaussianRng {
    fn dimension(&self) -> usize {
        self.sequence.dimensions()
    }

    fn skip_to(&mut self, path: usize) {
        self.sequence.skip_to(path as u64);
    }

    fn next_g(&mut self, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.uniforms.len());
        if !self.sequence.next_into(&mut self.uniforms) {
            // 2^64 draws exhausted; unreachable for any practical path count.
            self.sequence.skip_to(0);
            self.sequence.next_into(&mut self.uniforms);
        }
        for (z, &u) in out.iter_mut().zip(self.uniforms.iter()) {
            *z = normal_inv_cdf(u);
        }
    }
}

/// Pseudo-random generator with counter-based streams.
///
/// Every path draws from a fresh `StdRng` seeded by mixing the base seed
/// with the path index, so `skip_to` is a counter assignment and any draw
/// order reproduces the same `(path, step) -> z` map.
#[derive(Debug, Clone)]
pub struct StreamGaussianRng {
    dim: usize,
    seed: u64,
    path: u64,
}

impl StreamGaussianRng {
    /// Prepares a `dim`-dimensional pseudo-random generator.
    pub fn new(dim: usize, seed: u64) -> Self {
        Self { dim, seed, path: 0 }
    }
}

impl GaussianRng for StreamGaussianRng {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn skip_to(&mut self, path: usize) {
        self.path = path as u64;
    }

    fn next_g(&mut self, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.dim);
        let stream = mix64(
            self.seed ^ self.path.wrapping_add(1).wrapping_mul(0xD6E8_FEB8_6659_FD93),
        );
        let mut rng = StdRng::seed_from_u64(stream);
        for z in out.iter_mut() {
            *z = rng.sample(StandardNormal);
        }
        self.path += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draws<R: GaussianRng>(rng: &mut R, from: usize, count: usize) -> Vec<Vec<f64>> {
        let dim = rng.dimension();
        rng.skip_to(from);
        (0..count)
            .map(|_| {
                let mut buf = vec![0.0_f64; dim];
                rng.next_g(&mut buf);
                buf
            })
            .collect()
    }

    #[test]
    fn stream_rng_skip_reproduces_the_sequential_draws() {
        let mut a = StreamGaussianRng::new(8, 42);
        let mut b = StreamGaussianRng::new(8, 42);

        let sequential = draws(&mut a, 0, 32);
        let jumped = draws(&mut b, 16, 16);
        assert_eq!(&sequential[16..], &jumped[..]);
    }

    #[test]
    fn sobol_rng_skip_reproduces_the_sequential_draws() {
        let mut a = SobolGaussianRng::new(8, 42);
        let mut b = SobolGaussianRng::new(8, 42);

        let sequential = draws(&mut a, 0, 32);
        let jumped = draws(&mut b, 16, 16);
        assert_eq!(&sequential[16..], &jumped[..]);
    }

    #[test]
    fn clones_share_no_mutable_state() {
        let mut a = SobolGaussianRng::new(4, 7);
        let mut buf = vec![0.0_f64; 4];
        a.skip_to(100);
        a.next_g(&mut buf);

        let mut c = a.clone();
        let from_clone = draws(&mut c, 0, 4);
        let from_original = draws(&mut a, 0, 4);
        assert_eq!(from_clone, from_original);
    }

    #[test]
    fn stream_rng_draws_have_roughly_standard_moments() {
        let mut rng = StreamGaussianRng::new(16, 1);
        let mut buf = vec![0.0_f64; 16];
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let n = 2_000;
        for _ in 0..n {
            rng.next_g(&mut buf);
            for &z in &buf {
                sum += z;
                sum_sq += z * z;
            }
        }
        let count = (n * 16) as f64;
        let mean = sum / count;
        let var = sum_sq / count - mean * mean;
        assert!(mean.abs() < 0.02, "mean={mean}");
        assert!((var - 1.0).abs() < 0.05, "var={var}");
    }

    #[test]
    fn sobol_rng_draws_have_roughly_standard_moments() {
        let mut rng = SobolGaussianRng::new(4, 3);
        let mut buf = vec![0.0_f64; 4];
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let n = 4_096;
        for _ in 0..n {
            rng.next_g(&mut buf);
            for &z in &buf {
                sum += z;
                sum_sq += z * z;
            }
        }
        let count = (n * 4) as f64;
        let mean = sum / count;
        let var = sum_sq / count - mean * mean;
        assert!(mean.abs() < 0.02, "mean={mean}");
        assert!((var - 1.0).abs() < 0.05, "var={var}");
    }
}
