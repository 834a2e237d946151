//! numerical_stability — finiteness guards, norms, and safe ratios.
//!
//! Purpose
//! -------
//! Centralize the small numeric tolerances and helper computations that the
//! stepwise optimizer relies on, so direction rules, the line search, and
//! the convergence evaluator agree on what "finite", "negligible curvature",
//! and "relative change" mean.
//!
//! Key behaviors
//! -------------
//! - Detect non-finite entries in function values and gradients
//!   (`first_non_finite`, `all_finite`); these drive the numerical-failure
//!   classification.
//! - Compute gradient and displacement norms (`norm2` via `argmin-math`,
//!   `norm_inf`).
//! - Provide guarded ratios (`relative_change`, `safe_ratio`) used by the
//!   relative tolerance and by conjugate-gradient beta formulas.
//!
//! Invariants & assumptions
//! ------------------------
//! - Helpers never panic on `NaN`/`±∞` inputs; they report or propagate them
//!   so callers can classify the failure.
//! - `CURVATURE_EPS` is the single threshold below which a secant pair is
//!   considered unusable by BFGS and L-BFGS.
//!
//! Conventions
//! -----------
//! - All routines operate on `ndarray::Array1<f64>` or plain `f64`.
//! - This module performs no logging and holds no state.
//!
//! Testing notes
//! -------------
//! - Unit tests in [`guards`] cover hand-computed norms, zero handling in
//!   `relative_change`, and fallback behavior in `safe_ratio`.

pub mod guards;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::guards::{
    CURVATURE_EPS, DENOM_FLOOR, all_finite, first_non_finite, norm2, norm_inf, relative_change,
    safe_ratio,
};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::guards::{CURVATURE_EPS, all_finite, norm2, norm_inf, relative_change};
}
