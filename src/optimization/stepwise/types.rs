//! stepwise::types — shared numeric aliases and method defaults.
//!
//! Purpose
//! -------
//! Centralize the numeric types and default constants used by the stepwise
//! optimizer so the direction rules, line search, and state code stay
//! agnostic to `ndarray` generics and agree on default settings.
//!
//! Key behaviors
//! -------------
//! - Define canonical aliases for Points, gradients, dense inverse-Hessian
//!   approximations, and scalar objective values (`Point`, `Grad`,
//!   `InvHessian`, `Cost`).
//! - Expose per-method default constants (L-BFGS memory, Wolfe constants,
//!   backtracking contraction, delta-bar-delta rates).
//!
//! Invariants & assumptions
//! ------------------------
//! - All vectors and matrices are `ndarray` containers over `f64`.
//! - `InvHessian` is `dim × dim` whenever it is allocated.
//!
//! Testing notes
//! -------------
//! - This module only defines aliases and constants; it is exercised
//!   indirectly by every other stepwise module.
use ndarray::{Array1, Array2};

/// Parameter vector being optimized.
pub type Point = Array1<f64>;

/// Gradient vector, same length as [`Point`].
pub type Grad = Array1<f64>;

/// Dense inverse-Hessian approximation; `n × n` for `n = Point.len()`.
pub type InvHessian = Array2<f64>;

/// Scalar objective value.
pub type Cost = f64;

/// Default history size (`m`) for L-BFGS.
pub const DEFAULT_LBFGS_MEM: usize = 5;

/// Default sufficient-decrease constant `c1`.
pub const DEFAULT_C1: f64 = 1e-4;

/// Default curvature constant `c2` for quasi-Newton methods (loose Wolfe).
pub const DEFAULT_C2_QUASI_NEWTON: f64 = 0.9;

/// Default curvature constant `c2` for conjugate gradient (tight Wolfe).
pub const DEFAULT_C2_CG: f64 = 0.1;

/// Default backtracking contraction factor.
pub const DEFAULT_RHO: f64 = 0.5;

/// Default cap on function evaluations inside one line search.
pub const DEFAULT_MAX_LS_EVALS: usize = 20;

/// Default constant momentum coefficient.
pub const DEFAULT_MOMENTUM: f64 = 0.9;

/// Delta-bar-delta: default additive rate increase.
pub const DEFAULT_DBD_KAPPA: f64 = 1e-3;

/// Delta-bar-delta: default multiplicative rate decrease fraction.
pub const DEFAULT_DBD_PHI: f64 = 0.1;

/// Delta-bar-delta: default weight of the previous gradient trace.
pub const DEFAULT_DBD_THETA: f64 = 0.7;

/// Delta-bar-delta: default initial per-parameter rate.
pub const DEFAULT_DBD_EPSILON: f64 = 1e-3;
