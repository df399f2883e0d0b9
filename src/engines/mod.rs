//! Pricing engines: the scalar-generic analytic closed form and the
//! Dupire local-vol Monte Carlo drivers.

pub mod black_scholes;
pub mod dupire;
