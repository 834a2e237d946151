//! Numerical guards shared by the direction, line-search, and convergence code.
//!
//! Provides small, allocation-free checks and ratios that keep `f64`
//! arithmetic honest when gradients vanish or curvature collapses.
//!
//! # Provided items
//! - [`CURVATURE_EPS`]: minimum accepted `sᵀy` before a secant pair is used.
//! - [`DENOM_FLOOR`]: floor applied to denominators of relative quantities.
//! - [`first_non_finite`] / [`all_finite`]: locate `NaN` or `±∞` entries.
//! - [`norm2`] / [`norm_inf`]: gradient and step norms.
//! - [`relative_change`]: `|a − b| / max(|a|, |b|)` with a floored denominator.
//! - [`safe_ratio`]: division that falls back when the denominator is tiny.
use argmin_math::ArgminL2Norm;
use ndarray::Array1;

/// Minimum curvature `sᵀy` for a secant pair to be accepted.
///
/// Pairs with smaller (or negative) curvature would break positive
/// definiteness of the quasi-Newton approximation, so updates are skipped.
pub const CURVATURE_EPS: f64 = 1e-10;

/// Floor used for denominators in relative measures.
pub const DENOM_FLOOR: f64 = f64::MIN_POSITIVE;

/// Return the index and value of the first non-finite entry, if any.
pub fn first_non_finite(v: &Array1<f64>) -> Option<(usize, f64)> {
    v.iter().enumerate().find(|(_, x)| !x.is_finite()).map(|(i, &x)| (i, x))
}

/// `true` when every entry is finite.
pub fn all_finite(v: &Array1<f64>) -> bool {
    first_non_finite(v).is_none()
}

/// Euclidean norm.
pub fn norm2(v: &Array1<f64>) -> f64 {
    v.l2_norm()
}

/// Infinity norm (largest absolute entry); `0.0` for an empty vector.
pub fn norm_inf(v: &Array1<f64>) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}

/// Relative change between two scalars.
///
/// Computes `|old − new| / max(|old|, |new|, DENOM_FLOOR)`, so two exact
/// zeros report a change of `0.0` rather than `NaN`.
pub fn relative_change(old: f64, new: f64) -> f64 {
    (old - new).abs() / old.abs().max(new.abs()).max(DENOM_FLOOR)
}

/// `num / den`, or `fallback` when `|den|` is below `DENOM_FLOOR` or the
/// quotient is not finite.
pub fn safe_ratio(num: f64, den: f64, fallback: f64) -> f64 {
    if den.abs() < DENOM_FLOOR {
        return fallback;
    }
    let q = num / den;
    if q.is_finite() { q } else { fallback }
}
