//! Validation helpers for the stepwise optimizer.
//!
//! This module centralizes the configuration checks performed once at
//! initialization, so the step and convergence code can assume sane inputs:
//!
//! - **Tolerance checks**: [`verify_tol`] ensures float tolerances are
//!   finite and non-negative when provided.
//! - **Cadence checks**: [`verify_check_every`], [`verify_log_every`] reject
//!   zero intervals.
//! - **Point checks**: [`verify_nonempty`] and [`verify_dimension`] fix and
//!   then enforce the dimensionality of the Point.
//! - **Method parameters**: [`verify_unit_interval`] and [`verify_positive`]
//!   guard momentum coefficients, rate factors, and similar constants.
//! - **Restored state**: [`verify_state_len`] checks that vectors inside a
//!   deserialized state match its dimension.
//!
//! These helpers standardize error reporting by returning configuration
//! [`OptError`] variants.
use crate::optimization::{
    errors::{OptError, OptResult},
    stepwise::types::Point,
};

/// Ensure a vector stored in the state has `dim` entries.
///
/// # Errors
/// Returns [`OptError::InvalidState`] naming `field` otherwise.
pub fn verify_state_len(field: &'static str, len: usize, dim: usize) -> OptResult<()> {
    if len != dim {
        return Err(OptError::InvalidState {
            field,
            reason: format!("expected {dim} entries, found {len}"),
        });
    }
    Ok(())
}

/// Validate an optional float tolerance.
///
/// - Accepts `None` (rule disabled).
/// - If `Some`, the value must be **finite** and **non-negative**.
///
/// # Errors
/// Returns [`OptError::InvalidTolerance`] naming `name` if the value is
/// non-finite or `< 0.0`.
pub fn verify_tol(name: &'static str, tol: Option<f64>) -> OptResult<()> {
    if let Some(tol) = tol {
        if !tol.is_finite() {
            return Err(OptError::InvalidTolerance {
                name,
                tol,
                reason: "Tolerance must be finite.",
            });
        }
        if tol < 0.0 {
            return Err(OptError::InvalidTolerance {
                name,
                tol,
                reason: "Tolerance must be non-negative.",
            });
        }
    }
    Ok(())
}

/// Validate the convergence-check interval.
///
/// # Errors
/// Returns [`OptError::InvalidCheckInterval`] for `Some(0)`.
pub fn verify_check_every(every: Option<usize>) -> OptResult<()> {
    if every == Some(0) {
        return Err(OptError::InvalidCheckInterval {
            every: 0,
            reason: "Convergence must be checked at least every iteration.",
        });
    }
    Ok(())
}

/// Validate the progress-report interval.
///
/// # Errors
/// Returns [`OptError::InvalidLogInterval`] for `Some(0)`.
pub fn verify_log_every(every: Option<usize>) -> OptResult<()> {
    if every == Some(0) {
        return Err(OptError::InvalidLogInterval {
            every: 0,
            reason: "Logging interval must be at least one iteration.",
        });
    }
    Ok(())
}

/// Ensure the starting Point has at least one coordinate.
///
/// # Errors
/// Returns [`OptError::EmptyPoint`] for a zero-length Point.
pub fn verify_nonempty(par: &Point) -> OptResult<usize> {
    if par.is_empty() {
        return Err(OptError::EmptyPoint);
    }
    Ok(par.len())
}

/// Ensure a Point matches the dimension fixed at initialization.
///
/// # Errors
/// Returns [`OptError::DimensionMismatch`] when `par.len() != dim`.
pub fn verify_dimension(par: &Point, dim: usize) -> OptResult<()> {
    if par.len() != dim {
        return Err(OptError::DimensionMismatch { expected: dim, found: par.len() });
    }
    Ok(())
}

/// Ensure a method constant lies in the half-open interval `[0, 1)`.
///
/// # Errors
/// Returns [`OptError::InvalidMethodParameter`] otherwise.
pub fn verify_unit_interval(name: &'static str, value: f64) -> OptResult<()> {
    if !value.is_finite() || !(0.0..1.0).contains(&value) {
        return Err(OptError::InvalidMethodParameter {
            name,
            value,
            reason: "Value must be finite and lie in [0, 1).",
        });
    }
    Ok(())
}

/// Ensure a method constant is finite and strictly positive.
///
/// # Errors
/// Returns [`OptError::InvalidMethodParameter`] otherwise.
pub fn verify_positive(name: &'static str, value: f64) -> OptResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(OptError::InvalidMethodParameter {
            name,
            value,
            reason: "Value must be finite and strictly positive.",
        });
    }
    Ok(())
}
