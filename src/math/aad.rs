//! Reverse-mode AAD over a linear tape.
//!
//! Three pieces live here:
//! - [`Tape`], an append-only Wengert list with a thread-local active
//!   binding. Exactly one tape is active per worker thread; it is reset at
//!   the start of every Monte Carlo batch and reused across the batches
//!   assigned to that worker.
//! - [`TapeScalar`], an operator-overloading scalar. Every arithmetic
//!   operation computes the forward value and appends exactly one node with
//!   the local partial derivatives evaluated at the operand values.
//! - [`adjoints`], the backward sweep: seed the output with 1 and propagate
//!   `a[arg] += a[node] * der` in one descending pass. The tape is already
//!   in evaluation order, so no topological sort is needed.
//!
//! The [`SimScalar`] trait abstracts the scalar so that simulation code is
//! written once and instantiated for both `f64` (pricing) and `TapeScalar`
//! (pricing plus risks). Comparisons against plain doubles read the forward
//! value: branching is a control-flow decision, never a recorded operation.
//!
//! References:
//! - Savine (2018), *Modern Computational Finance*, ch. 9-10.
//! - Griewank and Walther (2008), *Evaluating Derivatives*.

use std::cell::RefCell;
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::math::{normal_cdf, normal_pdf};

/// One recorded elementary operation.
///
/// Argument indices always refer to earlier positions on the same tape;
/// the stored partials are `d(out)/d(arg)` evaluated at the forward values
/// the operands had when the node was recorded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TapeOp {
    /// A source: a scalar lifted from `f64`, with no arguments.
    Leaf,
    /// Unary operation.
    Unary {
        /// Tape index of the argument.
        arg: usize,
        /// Local partial derivative to the argument.
        der: f64,
    },
    /// Binary operation.
    Binary {
        /// Tape index of the left argument.
        lhs: usize,
        /// Tape index of the right argument.
        rhs: usize,
        /// Local partial derivative to the left argument.
        dlhs: f64,
        /// Local partial derivative to the right argument.
        drhs: f64,
    },
}

/// Append-only record of elementary operations.
///
/// All access goes through the thread-local active binding: a worker calls
/// [`Tape::reset`] before a batch, runs `TapeScalar` arithmetic, reads
/// adjoints, and resets again for the next batch. A reset invalidates every
/// outstanding `TapeScalar`; using one afterwards is a programming error
/// caught by debug assertions on index bounds.
#[derive(Debug, Default)]
pub struct Tape {
    nodes: Vec<TapeOp>,
}

thread_local! {
    static ACTIVE: RefCell<Option<Tape>> = const { RefCell::new(None) };
}

impl Tape {
    /// Activates (or wipes) this thread's tape and reserves node capacity.
    ///
    /// The tape allocation persists for the life of the thread, so repeated
    /// resets across batches reuse storage.
    pub fn reset(capacity: usize) {
        ACTIVE.with(|slot| {
            let mut slot = slot.borrow_mut();
            let tape = slot.get_or_insert_with(Tape::default);
            tape.nodes.clear();
            tape.nodes.reserve(capacity);
        });
    }

    /// Drops this thread's tape entirely.
    pub fn release() {
        ACTIVE.with(|slot| {
            *slot.borrow_mut() = None;
        });
    }

    /// True when a tape is bound on this thread.
    pub fn is_active() -> bool {
        ACTIVE.with(|slot| slot.borrow().is_some())
    }

    /// Number of nodes on this thread's tape (0 when none is bound).
    pub fn active_len() -> usize {
        ACTIVE.with(|slot| slot.borrow().as_ref().map_or(0, |t| t.nodes.len()))
    }

    /// Snapshot of the recorded nodes, for inspection in tests.
    pub fn active_nodes() -> Vec<TapeOp> {
        ACTIVE.with(|slot| {
            slot.borrow()
                .as_ref()
                .map_or_else(Vec::new, |t| t.nodes.clone())
        })
    }

    fn push(&mut self, op: TapeOp) -> usize {
        let next = self.nodes.len();
        match op {
            TapeOp::Leaf => {}
            TapeOp::Unary { arg, .. } => {
                debug_assert!(arg < next, "stale tape index: scalar outlived a reset");
            }
            TapeOp::Binary { lhs, rhs, .. } => {
                debug_assert!(lhs < next, "stale tape index: scalar outlived a reset");
                debug_assert!(rhs < next, "stale tape index: scalar outlived a reset");
            }
        }
        self.nodes.push(op);
        next
    }

    fn sweep(&self, output: usize) -> Vec<f64> {
        let mut adj = vec![0.0_f64; self.nodes.len()];
        adj[output] = 1.0;
        for k in (1..=output).rev() {
            let a = adj[k];
            if a == 0.0 {
                continue;
            }
            match self.nodes[k] {
                TapeOp::Leaf => {}
                TapeOp::Unary { arg, der } => {
                    adj[arg] += a * der;
                }
                TapeOp::Binary {
                    lhs,
                    rhs,
                    dlhs,
                    drhs,
                } => {
                    adj[lhs] += a * dlhs;
                    adj[rhs] += a * drhs;
                }
            }
        }
        adj
    }
}

fn record(op: TapeOp) -> usize {
    ACTIVE.with(|slot| {
        let mut slot = slot.borrow_mut();
        let tape = slot
            .as_mut()
            .expect("no active tape on this thread: call Tape::reset before recording");
        tape.push(op)
    })
}

/// Reverse accumulation over this thread's tape.
///
/// Returns the full adjoint vector: `out[idx]` is the derivative of
/// `output` to the node at `idx`. Index the result with
/// [`TapeScalar::index`] of the recorded sources. Nodes past the output and
/// nodes the output does not depend on carry adjoint zero. A fresh vector
/// is allocated per call; the tape is left untouched.
pub fn adjoints(output: TapeScalar) -> Vec<f64> {
    ACTIVE.with(|slot| {
        let slot = slot.borrow();
        let tape = slot
            .as_ref()
            .expect("no active tape on this thread: call Tape::reset before the sweep");
        tape.sweep(output.idx)
    })
}

/// Scalar that records its arithmetic on the active tape.
///
/// A pair of the forward value and the tape position of the node that
/// produced it. Construction from `f64` appends a leaf node, so mixed
/// arithmetic with constants goes through the same lifting path as seeded
/// inputs and every recorded node references only existing tape indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TapeScalar {
    /// Forward value.
    pub value: f64,
    idx: usize,
}

impl TapeScalar {
    /// Records `value` as a new source node on the active tape.
    pub fn record(value: f64) -> Self {
        let idx = record(TapeOp::Leaf);
        Self { value, idx }
    }

    /// Position of this scalar's node on the active tape.
    pub fn index(&self) -> usize {
        self.idx
    }

    fn unary(self, value: f64, der: f64) -> Self {
        let idx = record(TapeOp::Unary {
            arg: self.idx,
            der,
        });
        Self { value, idx }
    }

    fn binary(self, rhs: Self, value: f64, dlhs: f64, drhs: f64) -> Self {
        let idx = record(TapeOp::Binary {
            lhs: self.idx,
            rhs: rhs.idx,
            dlhs,
            drhs,
        });
        Self { value, idx }
    }

    /// Exponential.
    pub fn exp(self) -> Self {
        let v = self.value.exp();
        self.unary(v, v)
    }

    /// Natural logarithm.
    pub fn ln(self) -> Self {
        self.unary(self.value.ln(), 1.0 / self.value)
    }

    /// Square root.
    pub fn sqrt(self) -> Self {
        let v = self.value.sqrt();
        self.unary(v, 0.5 / v)
    }

    /// Standard normal density.
    pub fn normal_pdf(self) -> Self {
        let v = normal_pdf(self.value);
        self.unary(v, -v * self.value)
    }

    /// Standard normal CDF.
    pub fn normal_cdf(self) -> Self {
        self.unary(normal_cdf(self.value), normal_pdf(self.value))
    }
}

impl Add for TapeScalar {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.binary(rhs, self.value + rhs.value, 1.0, 1.0)
    }
}

impl Sub for TapeScalar {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.binary(rhs, self.value - rhs.value, 1.0, -1.0)
    }
}

impl Mul for TapeScalar {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.binary(rhs, self.value * rhs.value, rhs.value, self.value)
    }
}

impl Div for TapeScalar {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        let inv = 1.0 / rhs.value;
        self.binary(rhs, self.value * inv, inv, -self.value * inv * inv)
    }
}

impl Neg for TapeScalar {
    type Output = Self;

    fn neg(self) -> Self {
        self.unary(-self.value, -1.0)
    }
}

impl AddAssign for TapeScalar {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for TapeScalar {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for TapeScalar {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl DivAssign for TapeScalar {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

/// Scalar interface of the simulation code.
///
/// Covers the arithmetic the pricing kernel needs, plus lifting of plain
/// constants and forward-value read-out for control-flow comparisons.
/// Implemented by `f64` and by [`TapeScalar`]; the kernel instantiated with
/// either runs literally the same code path.
pub trait SimScalar:
    Copy
    + Debug
    + PartialEq
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
{
    /// Lifts a plain constant into the computation.
    fn lift(x: f64) -> Self;

    /// Forward value, used for branching decisions only.
    fn value(self) -> f64;

    /// Exponential.
    fn exp(self) -> Self;

    /// Natural logarithm.
    fn ln(self) -> Self;

    /// Square root.
    fn sqrt(self) -> Self;

    /// Standard normal density.
    fn normal_pdf(self) -> Self;

    /// Standard normal CDF.
    fn normal_cdf(self) -> Self;
}

impl SimScalar for f64 {
    fn lift(x: f64) -> Self {
        x
    }

    fn value(self) -> f64 {
        self
    }

    fn exp(self) -> Self {
        f64::exp(self)
    }

    fn ln(self) -> Self {
        f64::ln(self)
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    fn normal_pdf(self) -> Self {
        normal_pdf(self)
    }

    fn normal_cdf(self) -> Self {
        normal_cdf(self)
    }
}

impl SimScalar for TapeScalar {
    fn lift(x: f64) -> Self {
        TapeScalar::record(x)
    }

    fn value(self) -> f64 {
        self.value
    }

    fn exp(self) -> Self {
        TapeScalar::exp(self)
    }

    fn ln(self) -> Self {
        TapeScalar::ln(self)
    }

    fn sqrt(self) -> Self {
        TapeScalar::sqrt(self)
    }

    fn normal_pdf(self) -> Self {
        TapeScalar::normal_pdf(self)
    }

    fn normal_cdf(self) -> Self {
        TapeScalar::normal_cdf(self)
    }
}
