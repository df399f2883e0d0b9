//! Library-wide error type, product terms, and result payloads.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Errors surfaced by the pricing and risk API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    /// Input validation error, raised before any simulation starts.
    InvalidInput(String),
    /// Numerical issue (overflow, invalid state, etc.).
    NumericalError(String),
}

impl std::fmt::Display for PricingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::NumericalError(msg) => write!(f, "numerical error: {msg}"),
        }
    }
}

impl std::error::Error for PricingError {}

/// Barrier crossing direction for a knock-out contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarrierDirection {
    /// Knocks out when spot rises through the barrier level.
    Up,
    /// Knocks out when spot falls through the barrier level.
    Down,
}

/// Terms of a continuously monitored knock-out call.
///
/// The payoff is `max(S_T - strike, 0)` on the notional that survives
/// barrier monitoring along the path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarrierOption {
    /// Call strike.
    pub strike: f64,
    /// Knock-out level in spot units.
    pub barrier: f64,
    /// Maturity in year fractions.
    pub maturity: f64,
    /// Monitoring direction.
    pub direction: BarrierDirection,
}

impl BarrierOption {
    /// Up-and-out call: dies when spot rises above the barrier.
    pub fn up_and_out(strike: f64, barrier: f64, maturity: f64) -> Self {
        Self {
            strike,
            barrier,
            maturity,
            direction: BarrierDirection::Up,
        }
    }

    /// Down-and-out call: dies when spot falls below the barrier.
    pub fn down_and_out(strike: f64, barrier: f64, maturity: f64) -> Self {
        Self {
            strike,
            barrier,
            maturity,
            direction: BarrierDirection::Down,
        }
    }

    /// Validates contract terms.
    pub fn validate(&self) -> Result<(), PricingError> {
        if !self.strike.is_finite() || self.strike <= 0.0 {
            return Err(PricingError::InvalidInput(
                "strike must be finite and > 0".to_string(),
            ));
        }
        if !self.barrier.is_finite() || self.barrier <= 0.0 {
            return Err(PricingError::InvalidInput(
                "barrier must be finite and > 0".to_string(),
            ));
        }
        if !self.maturity.is_finite() || self.maturity <= 0.0 {
            return Err(PricingError::InvalidInput(
                "maturity must be finite and > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Price and first-order risks from one adjoint sweep per batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskReport {
    /// Monte Carlo price.
    pub price: f64,
    /// Sensitivity of the price to the initial spot.
    pub delta: f64,
    /// Sensitivity of the price to every local-vol node, shaped
    /// `spots.len() x times.len()`.
    pub vegas: DMatrix<f64>,
}
