//! Dupire local-vol knock-out barrier option: Monte Carlo price and AAD
//! risks.
//!
//! The batch kernel [`dupire_barrier_mc_batch`] is generic over
//! [`SimScalar`]. The value-only drivers instantiate it with `f64`; the
//! risk drivers instantiate it with [`TapeScalar`], run one adjoint sweep
//! per batch, and read delta and the full vega grid off the tape. The risk
//! code path is literally the pricing code path.
//!
//! Batches are the parallelization grain: each batch positions its own
//! clone of the prototype generator with `skip_to(first_path)`, so the
//! simulated draws depend only on the path index and serial and parallel
//! execution produce identical results. Batch contributions are reduced in
//! batch order with the same accumulation expression in both drivers.

use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::core::{BarrierDirection, BarrierOption, PricingError, RiskReport};
use crate::math::aad::{SimScalar, Tape, TapeScalar, adjoints};
use crate::math::rng::GaussianRng;
use crate::vol::{LocalVolSurface, interp2d};

/// Tape-reservation estimate per simulated time step (interpolation,
/// log-Euler update, and barrier ramp, including lifted constants).
const TAPE_OPS_PER_STEP: usize = 48;

/// Average payoff of the knock-out call over paths
/// `[first_path, last_path)`.
///
/// One log-Euler step per Gaussian increment, with the local volatility
/// re-interpolated at the current `(spot, time)`. Barrier monitoring is
/// smoothed over a band of half-width `epsilon`: outside the band the path
/// is definitely dead or definitely alive; inside, the surviving notional
/// is multiplied by a linear ramp, which keeps the pathwise derivative of
/// the knock-out decision non-degenerate. Increments are plain `f64` and
/// never recorded. Barrier and strike comparisons read forward values:
/// branching is control flow, not an operation on the tape.
#[allow(clippy::too_many_arguments)]
pub fn dupire_barrier_mc_batch<T, R>(
    s0: T,
    spots: &[T],
    times: &[T],
    vols: &DMatrix<T>,
    maturity: T,
    strike: T,
    barrier: T,
    direction: BarrierDirection,
    first_path: usize,
    last_path: usize,
    num_steps: usize,
    epsilon: T,
    rng: &mut R,
    increments: &mut [f64],
) -> T
where
    T: SimScalar,
    R: GaussianRng,
{
    debug_assert!(first_path < last_path);
    debug_assert_eq!(increments.len(), num_steps);

    let dt = maturity / T::lift(num_steps as f64);
    let sdt = dt.sqrt();
    let zero = T::lift(0.0);
    let one = T::lift(1.0);
    let half = T::lift(0.5);
    let two_epsilon = T::lift(2.0) * epsilon;

    let barrier_level = barrier.value();
    let band = epsilon.value();
    let strike_level = strike.value();

    rng.skip_to(first_path);

    let mut sum = zero;
    for _ in first_path..last_path {
        rng.next_g(increments);

        let mut spot = s0;
        let mut time = zero;
        let mut alive = one;

        for &z in increments.iter() {
            let vol = interp2d(spots, times, vols, spot, time);
            spot *= (vol * sdt * T::lift(z) - half * vol * vol * dt).exp();
            time += dt;

            let level = spot.value();
            match direction {
                BarrierDirection::Up => {
                    if level > barrier_level + band {
                        // definitely dead
                        alive = zero;
                        break;
                    }
                    if level >= barrier_level - band {
                        // in the band: linear kill ramp
                        alive *= one - (spot - barrier + epsilon) / two_epsilon;
                    }
                }
                BarrierDirection::Down => {
                    if level < barrier_level - band {
                        alive = zero;
                        break;
                    }
                    if level <= barrier_level + band {
                        alive *= (spot - barrier + epsilon) / two_epsilon;
                    }
                }
            }
        }

        // Pay on the surviving notional.
        if spot.value() > strike_level {
            sum += alive * (spot - strike);
        }
    }

    sum / T::lift((last_path - first_path) as f64)
}

/// Batched Monte Carlo engine for the Dupire knock-out barrier option.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DupireBarrierMcEngine {
    /// Total number of simulated paths.
    pub num_paths: usize,
    /// Paths per batch; the last batch may be smaller.
    pub batch_size: usize,
    /// Time steps per path.
    pub num_steps: usize,
    /// Absolute half-width of the barrier smoothing band, in spot units.
    pub epsilon: f64,
}

impl DupireBarrierMcEngine {
    /// Creates an engine with explicit path, batch, and step counts.
    pub fn new(num_paths: usize, batch_size: usize, num_steps: usize, epsilon: f64) -> Self {
        Self {
            num_paths,
            batch_size,
            num_steps,
            epsilon,
        }
    }

    /// Sets the smoothing band as a fraction of spot, the convention host
    /// wrappers usually pass.
    pub fn with_relative_epsilon(mut self, spot: f64, relative: f64) -> Self {
        self.epsilon = spot * relative;
        self
    }

    fn validate<R: GaussianRng>(
        &self,
        spot: f64,
        option: &BarrierOption,
        rng: &R,
    ) -> Result<(), PricingError> {
        option.validate()?;
        if !spot.is_finite() || spot <= 0.0 {
            return Err(PricingError::InvalidInput(
                "spot must be finite and > 0".to_string(),
            ));
        }
        if self.num_paths == 0 {
            return Err(PricingError::InvalidInput(
                "num_paths must be > 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(PricingError::InvalidInput(
                "batch_size must be > 0".to_string(),
            ));
        }
        if self.num_steps == 0 {
            return Err(PricingError::InvalidInput(
                "num_steps must be > 0".to_string(),
            ));
        }
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(PricingError::InvalidInput(
                "smoothing epsilon must be finite and > 0".to_string(),
            ));
        }
        if rng.dimension() != self.num_steps {
            return Err(PricingError::InvalidInput(format!(
                "rng dimension {} does not match num_steps {}",
                rng.dimension(),
                self.num_steps
            )));
        }
        Ok(())
    }

    fn batch_bounds(&self) -> Vec<(usize, usize)> {
        let mut bounds = Vec::with_capacity(self.num_paths.div_ceil(self.batch_size));
        let mut first = 0;
        while first < self.num_paths {
            let last = (first + self.batch_size).min(self.num_paths);
            bounds.push((first, last));
            first = last;
        }
        bounds
    }

    fn tape_capacity(&self, batch_paths: usize, surface: &LocalVolSurface) -> usize {
        let sources = 5 + surface.spots().len() + surface.times().len()
            + surface.spots().len() * surface.times().len();
        batch_paths * self.num_steps * TAPE_OPS_PER_STEP + sources + 64
    }

    /// Monte Carlo price, batches run serially.
    pub fn price<R>(
        &self,
        spot: f64,
        surface: &LocalVolSurface,
        option: &BarrierOption,
        rng: &R,
    ) -> Result<f64, PricingError>
    where
        R: GaussianRng + Clone,
    {
        self.validate(spot, option, rng)?;

        let mut local = rng.clone();
        let mut scratch = vec![0.0_f64; self.num_steps];
        let batch_means: Vec<(f64, usize)> = self
            .batch_bounds()
            .into_iter()
            .map(|(first, last)| {
                let mean = dupire_barrier_mc_batch(
                    spot,
                    surface.spots(),
                    surface.times(),
                    surface.vols(),
                    option.maturity,
                    option.strike,
                    option.barrier,
                    option.direction,
                    first,
                    last,
                    self.num_steps,
                    self.epsilon,
                    &mut local,
                    &mut scratch,
                );
                (mean, last - first)
            })
            .collect();

        Ok(reduce_price(&batch_means, self.num_paths))
    }

    /// Monte Carlo price, batches run on the rayon pool.
    ///
    /// Identical to [`price`](Self::price) to floating-point equality: the
    /// batch list, every per-batch computation, and the reduction order are
    /// the same; only the workers differ.
    pub fn price_parallel<R>(
        &self,
        spot: f64,
        surface: &LocalVolSurface,
        option: &BarrierOption,
        rng: &R,
    ) -> Result<f64, PricingError>
    where
        R: GaussianRng + Clone + Sync,
    {
        self.validate(spot, option, rng)?;

        let batch_means: Vec<(f64, usize)> = self
            .batch_bounds()
            .into_par_iter()
            .map_init(
                || (rng.clone(), vec![0.0_f64; self.num_steps]),
                |(local, scratch), (first, last)| {
                    let mean = dupire_barrier_mc_batch(
                        spot,
                        surface.spots(),
                        surface.times(),
                        surface.vols(),
                        option.maturity,
                        option.strike,
                        option.barrier,
                        option.direction,
                        first,
                        last,
                        self.num_steps,
                        self.epsilon,
                        local,
                        scratch,
                    );
                    (mean, last - first)
                },
            )
            .collect();

        Ok(reduce_price(&batch_means, self.num_paths))
    }

    /// One batch on the recording scalar: wipe the worker's tape, seed the
    /// inputs as sources, run the kernel, sweep, and pick the results.
    #[allow(clippy::too_many_arguments)]
    fn risk_batch<R>(
        &self,
        spot: f64,
        surface: &LocalVolSurface,
        option: &BarrierOption,
        first: usize,
        last: usize,
        rng: &mut R,
        scratch: &mut [f64],
    ) -> (f64, f64, DMatrix<f64>)
    where
        R: GaussianRng,
    {
        Tape::reset(self.tape_capacity(last - first, surface));

        let s0 = TapeScalar::record(spot);
        let spots: Vec<TapeScalar> = surface
            .spots()
            .iter()
            .map(|&x| TapeScalar::record(x))
            .collect();
        let times: Vec<TapeScalar> = surface
            .times()
            .iter()
            .map(|&x| TapeScalar::record(x))
            .collect();
        let vols = surface.vols().map(TapeScalar::record);
        let maturity = TapeScalar::record(option.maturity);
        let strike = TapeScalar::record(option.strike);
        let barrier = TapeScalar::record(option.barrier);
        let epsilon = TapeScalar::record(self.epsilon);

        let batch_mean = dupire_barrier_mc_batch(
            s0,
            &spots,
            &times,
            &vols,
            maturity,
            strike,
            barrier,
            option.direction,
            first,
            last,
            self.num_steps,
            epsilon,
            rng,
            scratch,
        );

        let adj = adjoints(batch_mean);
        let delta = adj[s0.index()];
        let vegas = DMatrix::from_fn(vols.nrows(), vols.ncols(), |i, j| {
            adj[vols[(i, j)].index()]
        });
        (batch_mean.value, delta, vegas)
    }

    /// Price, delta, and the vega grid from one adjoint sweep per batch,
    /// batches run serially.
    pub fn risks<R>(
        &self,
        spot: f64,
        surface: &LocalVolSurface,
        option: &BarrierOption,
        rng: &R,
    ) -> Result<RiskReport, PricingError>
    where
        R: GaussianRng + Clone,
    {
        self.validate(spot, option, rng)?;

        let mut local = rng.clone();
        let mut scratch = vec![0.0_f64; self.num_steps];
        let batch_risks: Vec<(f64, f64, DMatrix<f64>, usize)> = self
            .batch_bounds()
            .into_iter()
            .map(|(first, last)| {
                let (price, delta, vegas) =
                    self.risk_batch(spot, surface, option, first, last, &mut local, &mut scratch);
                (price, delta, vegas, last - first)
            })
            .collect();

        Ok(reduce_risks(&batch_risks, self.num_paths, surface))
    }

    /// Parallel variant of [`risks`](Self::risks). Every worker owns its
    /// thread-local tape and scratch; nothing is shared within a batch, and
    /// the ordered reduction matches the serial driver exactly.
    pub fn risks_parallel<R>(
        &self,
        spot: f64,
        surface: &LocalVolSurface,
        option: &BarrierOption,
        rng: &R,
    ) -> Result<RiskReport, PricingError>
    where
        R: GaussianRng + Clone + Sync,
    {
        self.validate(spot, option, rng)?;

        let batch_risks: Vec<(f64, f64, DMatrix<f64>, usize)> = self
            .batch_bounds()
            .into_par_iter()
            .map_init(
                || (rng.clone(), vec![0.0_f64; self.num_steps]),
                |(local, scratch), (first, last)| {
                    let (price, delta, vegas) =
                        self.risk_batch(spot, surface, option, first, last, local, scratch);
                    (price, delta, vegas, last - first)
                },
            )
            .collect();

        Ok(reduce_risks(&batch_risks, self.num_paths, surface))
    }
}

fn reduce_price(batch_means: &[(f64, usize)], num_paths: usize) -> f64 {
    let mut acc = 0.0_f64;
    for &(mean, paths) in batch_means {
        acc += mean * paths as f64;
    }
    acc / num_paths as f64
}

fn reduce_risks(
    batch_risks: &[(f64, f64, DMatrix<f64>, usize)],
    num_paths: usize,
    surface: &LocalVolSurface,
) -> RiskReport {
    let ns = surface.spots().len();
    let nt = surface.times().len();

    let mut price = 0.0_f64;
    let mut delta = 0.0_f64;
    let mut vegas = DMatrix::zeros(ns, nt);
    for (batch_price, batch_delta, batch_vegas, paths) in batch_risks {
        let w = *paths as f64;
        price += batch_price * w;
        delta += batch_delta * w;
        for i in 0..ns {
            for j in 0..nt {
                vegas[(i, j)] += batch_vegas[(i, j)] * w;
            }
        }
    }

    let n = num_paths as f64;
    price /= n;
    delta /= n;
    vegas /= n;

    RiskReport {
        price,
        delta,
        vegas,
    }
}
