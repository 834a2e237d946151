//! optimization — stepwise minimizer, numerical guards, and error surface.
//!
//! Purpose
//! -------
//! Group the pieces of the optimization layer: the resumable stepwise
//! minimizer, the shared finiteness and norm helpers it relies on, and a
//! single configuration error enum with its result alias.
//!
//! Key behaviors
//! -------------
//! - `stepwise`: methods, line search, state, step, convergence, and the
//!   `minimize` driver.
//! - `numerical_stability`: non-panicking helpers for norms, finiteness
//!   scans, relative change, and guarded division.
//! - `errors`: `OptError` / `OptResult<T>` for configuration problems.
//!
//! Invariants & assumptions
//! ------------------------
//! - Configuration mistakes are reported as `OptError`, never panics.
//! - Numerical trouble during a run is state, not an error: it terminates
//!   the run with a `NumericalFailure` reason and a recorded message.
//!
//! Conventions
//! -----------
//! - Everything minimizes. Maximization is done by negating the objective.
//! - Vectors are `ndarray::Array1<f64>`.
//!
//! Downstream usage
//! ----------------
//! - Import the curated surface with `optimization::prelude::*`, or the
//!   finer-grained `stepwise::prelude` / `numerical_stability::prelude`.
//!
//! Testing notes
//! -------------
//! - Unit tests live next to each submodule; end-to-end runs live under
//!   `tests/`.

pub mod errors;
pub mod numerical_stability;
pub mod stepwise;

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use stepwise_optim::optimization::prelude::*;
//
// to import the main optimization surface in a single line.

pub mod prelude {
    pub use super::errors::{OptError, OptResult};
    pub use super::numerical_stability::prelude::*;
    pub use super::stepwise::prelude::*;
}
