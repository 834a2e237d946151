//! errors — unified configuration error surface for the stepwise optimizer.
//!
//! Purpose
//! -------
//! Collect every way a caller can hand the optimizer an unusable setup into
//! one enum, [`OptError`], with a crate-wide alias [`OptResult`]. These are
//! the synchronous, fatal "ConfigError" family: invalid method names,
//! inconsistent tolerances, and dimension mismatches.
//!
//! Key behaviors
//! -------------
//! - Configuration problems are raised at initialization (or when a step is
//!   handed a Point of the wrong length) and are never retried.
//! - Numerical failures during a step are **not** represented here; they are
//!   captured into the optimizer state's error slot and surface as a
//!   terminal `NumericalFailure` classification instead of an `Err`.
//!
//! Conventions
//! -----------
//! - Variants carry the offending value plus a static `reason` string where a
//!   human-readable explanation helps.
//! - `Display` messages are single-line and lowercase-free of trailing
//!   punctuation so they compose inside higher-level messages.
//!
//! Testing notes
//! -------------
//! - Unit tests check that `Display` output names the offending option and
//!   that the enum is usable through `Box<dyn std::error::Error>`.

/// Crate-wide result alias for optimizer operations.
pub type OptResult<T> = Result<T, OptError>;

#[derive(Debug, Clone, PartialEq)]
pub enum OptError {
    // ---- Method selection ----
    /// Method tag did not match any supported family.
    InvalidMethod {
        name: String,
        reason: &'static str,
    },

    /// A method-specific parameter is out of range (e.g. L-BFGS memory 0).
    InvalidMethodParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    // ---- Point ----
    /// Starting point has no coordinates, so the dimension is undefined.
    EmptyPoint,

    /// Point length does not match the dimension fixed at initialization.
    DimensionMismatch {
        expected: usize,
        found: usize,
    },

    // ---- OptState ----
    /// A restored state is internally inconsistent (e.g. method memory sized
    /// for another dimension).
    InvalidState {
        field: &'static str,
        reason: String,
    },

    // ---- OptConfig ----
    /// A tolerance must be finite and non-negative.
    InvalidTolerance {
        name: &'static str,
        tol: f64,
        reason: &'static str,
    },

    /// `check_conv_every` must be at least one.
    InvalidCheckInterval {
        every: usize,
        reason: &'static str,
    },

    /// `log_every` must be at least one.
    InvalidLogInterval {
        every: usize,
        reason: &'static str,
    },

    /// Driver was asked to run with nothing that could ever stop it.
    NoStoppingRule,

    // ---- Line search ----
    /// Invalid line searcher name.
    InvalidLineSearch {
        name: String,
        reason: &'static str,
    },

    /// Line-search constant out of range (e.g. `c2 <= c1`).
    InvalidLineSearchParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}

impl std::error::Error for OptError {}

impl std::fmt::Display for OptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Method selection ----
            OptError::InvalidMethod { name, reason } => {
                write!(f, "Invalid optimization method '{name}': {reason}")
            }
            OptError::InvalidMethodParameter { name, value, reason } => {
                write!(f, "Invalid method parameter {name} = {value}: {reason}")
            }

            // ---- Point ----
            OptError::EmptyPoint => {
                write!(f, "Starting point is empty; dimension cannot be determined")
            }
            OptError::DimensionMismatch { expected, found } => {
                write!(f, "Point dimension mismatch: expected {expected}, found {found}")
            }

            // ---- OptState ----
            OptError::InvalidState { field, reason } => {
                write!(f, "Invalid optimizer state field {field}: {reason}")
            }

            // ---- OptConfig ----
            OptError::InvalidTolerance { name, tol, reason } => {
                write!(f, "Invalid {name} = {tol}: {reason}")
            }
            OptError::InvalidCheckInterval { every, reason } => {
                write!(f, "Invalid check_conv_every = {every}: {reason}")
            }
            OptError::InvalidLogInterval { every, reason } => {
                write!(f, "Invalid log_every = {every}: {reason}")
            }
            OptError::NoStoppingRule => {
                write!(
                    f,
                    "No stopping rule configured: set max_iter, an evaluation budget, or a tolerance"
                )
            }

            // ---- Line search ----
            OptError::InvalidLineSearch { name, reason } => {
                write!(f, "Invalid line search '{name}': {reason}")
            }
            OptError::InvalidLineSearchParameter { name, value, reason } => {
                write!(f, "Invalid line search parameter {name} = {value}: {reason}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // Ensure `Display` names the offending option and value.
    //
    // Given
    // -----
    // - An `InvalidTolerance` error for `abs_tol = -1`.
    //
    // Expect
    // ------
    // - The rendered message mentions both `abs_tol` and `-1`.
    fn display_names_offending_tolerance() {
        // Arrange
        let err = OptError::InvalidTolerance {
            name: "abs_tol",
            tol: -1.0,
            reason: "Tolerance must be non-negative.",
        };

        // Act
        let msg = err.to_string();

        // Assert
        assert!(msg.contains("abs_tol"), "message should name the option: {msg}");
        assert!(msg.contains("-1"), "message should carry the value: {msg}");
    }

    #[test]
    // Purpose
    // -------
    // Verify that `OptError` can be boxed as a standard error trait object.
    //
    // Given
    // -----
    // - A `DimensionMismatch` error.
    //
    // Expect
    // ------
    // - Boxing succeeds and the message survives the conversion.
    fn opt_error_boxes_as_std_error() {
        // Arrange
        let err = OptError::DimensionMismatch { expected: 2, found: 3 };

        // Act
        let boxed: Box<dyn std::error::Error> = Box::new(err);

        // Assert
        assert_eq!(boxed.to_string(), "Point dimension mismatch: expected 2, found 3");
    }
}
