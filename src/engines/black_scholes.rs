//! Black-Scholes closed form, generic over the simulation scalar.
//!
//! Instantiated with `f64` this is the usual analytic price; instantiated
//! with [`TapeScalar`](crate::math::aad::TapeScalar) the whole formula is
//! recorded and a single adjoint sweep returns all first-order
//! sensitivities at once. The latter is the end-to-end exercise of the
//! tape machinery against known Greeks.

use crate::math::aad::SimScalar;

/// Undiscounted-forward form of the Black-Scholes call price.
///
/// `dividend_yield` is a continuous yield; `maturity` is in year fractions.
pub fn black_scholes<T: SimScalar>(
    spot: T,
    rate: T,
    dividend_yield: T,
    vol: T,
    strike: T,
    maturity: T,
) -> T {
    let half = T::lift(0.5);

    let df = (-(rate * maturity)).exp();
    let fwd = spot * ((rate - dividend_yield) * maturity).exp();
    let std_dev = vol * maturity.sqrt();

    let d = (fwd / strike).ln() / std_dev;
    let d1 = d + half * std_dev;
    let d2 = d - half * std_dev;

    df * (fwd * d1.normal_cdf() - strike * d2.normal_cdf())
}
