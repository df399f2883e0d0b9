//! Local-volatility surface and its scalar-generic bilinear interpolation.

use nalgebra::DMatrix;

use crate::core::PricingError;
use crate::math::aad::SimScalar;

/// Dupire local-volatility surface on a rectangular spot/time grid.
///
/// `vols[(i, j)]` is the local volatility at `spots[i]`, `times[j]`. Both
/// axes must be strictly ascending; evaluation between nodes is bilinear
/// and flat beyond the edges.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVolSurface {
    spots: Vec<f64>,
    times: Vec<f64>,
    vols: DMatrix<f64>,
}

fn validate_axis(axis: &[f64], name: &str) -> Result<(), PricingError> {
    if axis.is_empty() {
        return Err(PricingError::InvalidInput(format!(
            "{name} axis must not be empty"
        )));
    }
    if axis.iter().any(|v| !v.is_finite()) {
        return Err(PricingError::InvalidInput(format!(
            "{name} axis must be finite"
        )));
    }
    if axis.windows(2).any(|w| w[1] <= w[0]) {
        return Err(PricingError::InvalidInput(format!(
            "{name} axis must be strictly ascending"
        )));
    }
    Ok(())
}

impl LocalVolSurface {
    /// Builds a surface, validating axis ordering and grid shape.
    pub fn new(
        spots: Vec<f64>,
        times: Vec<f64>,
        vols: DMatrix<f64>,
    ) -> Result<Self, PricingError> {
        validate_axis(&spots, "spot")?;
        validate_axis(&times, "time")?;
        if vols.nrows() != spots.len() || vols.ncols() != times.len() {
            return Err(PricingError::InvalidInput(format!(
                "vol grid is {}x{} but axes are {}x{}",
                vols.nrows(),
                vols.ncols(),
                spots.len(),
                times.len()
            )));
        }
        if vols.iter().any(|v| !v.is_finite()) {
            return Err(PricingError::InvalidInput(
                "vol grid must be finite".to_string(),
            ));
        }
        Ok(Self { spots, times, vols })
    }

    /// Constant surface, mostly for tests and sanity checks.
    pub fn flat(spots: Vec<f64>, times: Vec<f64>, vol: f64) -> Result<Self, PricingError> {
        let grid = DMatrix::from_element(spots.len(), times.len(), vol);
        Self::new(spots, times, grid)
    }

    /// Spot axis.
    pub fn spots(&self) -> &[f64] {
        &self.spots
    }

    /// Time axis.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Vol grid, `spots.len() x times.len()`.
    pub fn vols(&self) -> &DMatrix<f64> {
        &self.vols
    }

    /// Local volatility at `(spot, time)`.
    pub fn local_vol(&self, spot: f64, time: f64) -> f64 {
        interp2d(&self.spots, &self.times, &self.vols, spot, time)
    }
}

/// Bracketing interval for a query on an ascending axis; collapses to a
/// single node beyond the edges (flat extrapolation) and on degenerate
/// single-node axes.
fn bracket<T: SimScalar>(axis: &[T], x: f64) -> (usize, usize) {
    let n = axis.len();
    // The negated comparison also routes non-finite queries to the edge.
    if n == 1 || !(x > axis[0].value()) {
        return (0, 0);
    }
    if x >= axis[n - 1].value() {
        return (n - 1, n - 1);
    }
    let hi = axis.partition_point(|v| v.value() <= x);
    (hi - 1, hi)
}

fn axis_weight<T: SimScalar>(axis: &[T], lo: usize, hi: usize, x: T) -> T {
    if lo == hi {
        T::lift(0.0)
    } else {
        (x - axis[lo]) / (axis[hi] - axis[lo])
    }
}

/// Bilinear interpolation of `vols` at `(spot, time)`, generic over the
/// simulation scalar.
///
/// The result is linear in every grid value, so each `vols[(i, j)]`
/// sensitivity is exactly the bilinear weight of its cell corner, and with
/// a recording scalar those weights flow through the tape unchanged. The
/// bracketing search is control flow on forward values; the weights
/// themselves are recorded arithmetic so spot and time sensitivities flow
/// inside the grid.
pub fn interp2d<T: SimScalar>(
    spots: &[T],
    times: &[T],
    vols: &DMatrix<T>,
    spot: T,
    time: T,
) -> T {
    let (i0, i1) = bracket(spots, spot.value());
    let (j0, j1) = bracket(times, time.value());

    let ws = axis_weight(spots, i0, i1, spot);
    let wt = axis_weight(times, j0, j1, time);
    let one = T::lift(1.0);

    let v00 = vols[(i0, j0)];
    let v10 = vols[(i1, j0)];
    let v01 = vols[(i0, j1)];
    let v11 = vols[(i1, j1)];

    let early = (one - ws) * v00 + ws * v10;
    let late = (one - ws) * v01 + ws * v11;
    (one - wt) * early + wt * late
}
