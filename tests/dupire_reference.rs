//! End-to-end scenario for the Dupire barrier drivers: serial/parallel
//! agreement and adjoint risks against bump-and-revalue references.

use approx::assert_relative_eq;
use openadjoint::engines::dupire::DupireBarrierMcEngine;
use openadjoint::math::rng::{SobolGaussianRng, StreamGaussianRng};
use openadjoint::vol::LocalVolSurface;
use openadjoint::BarrierOption;

const SPOT: f64 = 100.0;
const NUM_STEPS: usize = 24;

fn scenario_surface(vol: f64) -> LocalVolSurface {
    LocalVolSurface::flat(
        vec![50.0, 75.0, 100.0, 125.0, 150.0],
        vec![0.25, 0.5, 1.0, 2.0],
        vol,
    )
    .unwrap()
}

fn scenario_option() -> BarrierOption {
    BarrierOption::up_and_out(110.0, 150.0, 2.0)
}

fn scenario_engine(num_paths: usize) -> DupireBarrierMcEngine {
    DupireBarrierMcEngine::new(num_paths, 1_024, NUM_STEPS, 1.0).with_relative_epsilon(SPOT, 0.01)
}

#[test]
fn sobol_serial_and_parallel_agree_to_the_bit() {
    let surface = scenario_surface(0.2);
    let option = scenario_option();
    let engine = scenario_engine(32_768);
    let rng = SobolGaussianRng::new(NUM_STEPS, 42);

    let serial_price = engine.price(SPOT, &surface, &option, &rng).unwrap();
    let parallel_price = engine
        .price_parallel(SPOT, &surface, &option, &rng)
        .unwrap();
    assert_eq!(serial_price.to_bits(), parallel_price.to_bits());

    let serial = engine.risks(SPOT, &surface, &option, &rng).unwrap();
    let parallel = engine.risks_parallel(SPOT, &surface, &option, &rng).unwrap();
    assert_eq!(serial.price.to_bits(), parallel.price.to_bits());
    assert_eq!(serial.delta.to_bits(), parallel.delta.to_bits());
    for (a, b) in serial.vegas.iter().zip(parallel.vegas.iter()) {
        assert_eq!(a.to_bits(), b.to_bits());
    }

    // The adjoint pass rides on the same forward evaluation.
    assert_eq!(serial.price.to_bits(), serial_price.to_bits());
}

#[test]
fn pseudo_rng_drivers_agree_across_batch_sizes_and_workers() {
    let surface = scenario_surface(0.2);
    let option = scenario_option();
    let rng = StreamGaussianRng::new(NUM_STEPS, 7);

    let reference = DupireBarrierMcEngine::new(16_384, 256, NUM_STEPS, 1.0)
        .price(SPOT, &surface, &option, &rng)
        .unwrap();
    for batch_size in [1_024, 4_096] {
        let engine = DupireBarrierMcEngine::new(16_384, batch_size, NUM_STEPS, 1.0);
        let serial = engine.price(SPOT, &surface, &option, &rng).unwrap();
        let parallel = engine.price_parallel(SPOT, &surface, &option, &rng).unwrap();
        assert_eq!(serial.to_bits(), parallel.to_bits());
        assert_relative_eq!(serial, reference, epsilon = 1e-10);
    }
}

#[test]
fn adjoint_delta_matches_bump_and_revalue() {
    let surface = scenario_surface(0.2);
    let option = scenario_option();
    let engine = scenario_engine(32_768);
    let rng = SobolGaussianRng::new(NUM_STEPS, 42);

    let report = engine.risks(SPOT, &surface, &option, &rng).unwrap();

    // Common draws make the central difference a low-noise reference.
    let bump = 1e-4 * SPOT;
    let up = engine.price(SPOT + bump, &surface, &option, &rng).unwrap();
    let down = engine.price(SPOT - bump, &surface, &option, &rng).unwrap();
    let fd_delta = (up - down) / (2.0 * bump);

    assert_relative_eq!(report.delta, fd_delta, max_relative = 1e-2, epsilon = 1e-4);
}

#[test]
fn summed_vegas_match_a_parallel_vol_shift() {
    let surface = scenario_surface(0.2);
    let option = scenario_option();
    let engine = scenario_engine(16_384);
    let rng = SobolGaussianRng::new(NUM_STEPS, 42);

    let report = engine.risks(SPOT, &surface, &option, &rng).unwrap();
    let total_vega: f64 = report.vegas.iter().sum();

    // d price / d(uniform shift) is the sum of all node sensitivities.
    let h = 1e-5;
    let up = engine
        .price(SPOT, &scenario_surface(0.2 + h), &option, &rng)
        .unwrap();
    let down = engine
        .price(SPOT, &scenario_surface(0.2 - h), &option, &rng)
        .unwrap();
    let fd_vega = (up - down) / (2.0 * h);

    assert_relative_eq!(total_vega, fd_vega, max_relative = 1e-2, epsilon = 1e-4);
}

#[test]
fn vega_mass_sits_on_the_traversed_region_of_the_surface() {
    let surface = scenario_surface(0.2);
    let option = scenario_option();
    let engine = scenario_engine(16_384);
    let rng = SobolGaussianRng::new(NUM_STEPS, 42);

    let report = engine.risks(SPOT, &surface, &option, &rng).unwrap();

    // Every node is finite, and the nodes bracketing the initial spot at
    // short maturities carry non-trivial sensitivity.
    assert!(report.vegas.iter().all(|v| v.is_finite()));
    let near_spot: f64 = report.vegas.row(2).iter().map(|v| v.abs()).sum();
    assert!(near_spot > 0.0, "no vega near the initial spot");
}

#[test]
fn risk_report_is_reproducible_for_a_fixed_seed() {
    let surface = scenario_surface(0.2);
    let option = scenario_option();
    let engine = scenario_engine(8_192);
    let rng = SobolGaussianRng::new(NUM_STEPS, 123);

    let a = engine.risks_parallel(SPOT, &surface, &option, &rng).unwrap();
    let b = engine.risks_parallel(SPOT, &surface, &option, &rng).unwrap();
    assert_eq!(a.price.to_bits(), b.price.to_bits());
    assert_eq!(a.delta.to_bits(), b.delta.to_bits());
    assert_eq!(a.vegas, b.vegas);
}
