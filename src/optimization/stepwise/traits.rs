//! Public API surface for configuring and classifying a stepwise run.
//!
//! - [`Objective`]: the caller-supplied function/gradient oracle.
//! - [`Tolerances`] and [`OptConfig`]: termination budgets, tolerances, and
//!   cadence, validated once at initialization.
//! - [`TerminationReason`] and [`RunStatus`]: the termination state machine.
//!
//! Convention: the optimizer always *minimizes* `f(par)`. Callers wanting to
//! maximize supply the negated objective and gradient.
use serde::{Deserialize, Serialize};

use crate::optimization::{
    errors::OptResult,
    stepwise::{
        line_search::LineSearchOptions,
        types::{Cost, Grad, Point},
        validation::{verify_check_every, verify_log_every, verify_tol},
    },
};

/// User-implemented objective/gradient oracle.
///
/// Both methods must be pure: deterministic, side-effect free, and callable
/// any number of times in any order. The gradient must have the same length
/// as `par`.
///
/// Non-finite outputs are not errors at this boundary; the step procedure
/// captures them into the optimizer state as a numerical failure.
pub trait Objective {
    fn value(&self, par: &Point) -> Cost;
    fn gradient(&self, par: &Point) -> Grad;
}

impl<T: Objective + ?Sized> Objective for &T {
    fn value(&self, par: &Point) -> Cost {
        (**self).value(par)
    }

    fn gradient(&self, par: &Point) -> Grad {
        (**self).gradient(par)
    }
}

/// Termination budgets and stopping tolerances.
///
/// Every field is independently optional; `None` disables the rule.
///
/// - `max_iter`: hard cap on the iteration count.
/// - `max_fn`, `max_gr`, `max_fg`: caps on function, gradient, and combined
///   evaluations. Enforced inside the line search, never overshot.
/// - `abs_tol`, `rel_tol`: stop when consecutive checked function values
///   differ by less than the absolute / relative threshold.
/// - `grad_tol`, `ginf_tol`: stop when the gradient 2-norm / infinity-norm
///   falls below the threshold.
/// - `step_tol`: stop when the displacement between iterates falls below the
///   threshold; ignored on restart iterations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    pub max_iter: Option<usize>,
    pub max_fn: Option<usize>,
    pub max_gr: Option<usize>,
    pub max_fg: Option<usize>,
    pub abs_tol: Option<f64>,
    pub rel_tol: Option<f64>,
    pub grad_tol: Option<f64>,
    pub ginf_tol: Option<f64>,
    pub step_tol: Option<f64>,
}

impl Tolerances {
    /// Validate every present tolerance.
    ///
    /// # Rules
    /// - Float tolerances must be **finite and non-negative**.
    /// - Integer budgets are unsigned, so any present value is accepted;
    ///   a budget of `0` simply terminates before the first evaluation.
    ///
    /// # Errors
    /// - `OptError::InvalidTolerance` naming the first offending field.
    pub fn validate(&self) -> OptResult<()> {
        verify_tol("abs_tol", self.abs_tol)?;
        verify_tol("rel_tol", self.rel_tol)?;
        verify_tol("grad_tol", self.grad_tol)?;
        verify_tol("ginf_tol", self.ginf_tol)?;
        verify_tol("step_tol", self.step_tol)?;
        Ok(())
    }

    /// `true` when at least one rule could ever stop a run.
    pub fn has_stopping_rule(&self) -> bool {
        self.max_iter.is_some()
            || self.max_fn.is_some()
            || self.max_gr.is_some()
            || self.max_fg.is_some()
            || self.abs_tol.is_some()
            || self.rel_tol.is_some()
            || self.grad_tol.is_some()
            || self.ginf_tol.is_some()
            || self.step_tol.is_some()
    }

    /// `true` when a function-value tolerance needs `f` at each check.
    pub fn needs_fn(&self) -> bool {
        self.abs_tol.is_some() || self.rel_tol.is_some()
    }

    /// `true` when a gradient-norm tolerance needs `g` at each check.
    pub fn needs_gr(&self) -> bool {
        self.grad_tol.is_some() || self.ginf_tol.is_some()
    }
}

/// Optimizer-level configuration.
///
/// Fields:
/// - `tols: Tolerances`: budgets and stopping tolerances.
/// - `check_conv_every: Option<usize>`: interval between full convergence
///   classifications; `None` means every iteration.
/// - `log_every: Option<usize>`: interval between progress reports in the
///   driver; forced to `check_conv_every` when not a multiple of it.
/// - `line_search: Option<LineSearchOptions>`: overrides the per-method
///   default line search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptConfig {
    pub tols: Tolerances,
    pub check_conv_every: Option<usize>,
    pub log_every: Option<usize>,
    pub line_search: Option<LineSearchOptions>,
}

impl OptConfig {
    /// Build a validated configuration without a line-search override.
    ///
    /// # Errors
    /// Propagates any error from [`OptConfig::validated`].
    pub fn new(
        tols: Tolerances, check_conv_every: Option<usize>, log_every: Option<usize>,
    ) -> OptResult<Self> {
        Self { tols, check_conv_every, log_every, line_search: None }.validated()
    }

    /// Attach a line-search override, validating its constants.
    pub fn with_line_search(mut self, opts: LineSearchOptions) -> OptResult<Self> {
        opts.validate()?;
        self.line_search = Some(opts);
        Ok(self)
    }

    /// Validate every field and apply the `log_every` coercion.
    ///
    /// Idempotent: validating an already-validated config returns it
    /// unchanged.
    ///
    /// # Errors
    /// - `OptError::InvalidTolerance` from [`Tolerances::validate`].
    /// - `OptError::InvalidCheckInterval` if `check_conv_every == Some(0)`.
    /// - `OptError::InvalidLogInterval` if `log_every == Some(0)`.
    /// - Line-search errors from [`LineSearchOptions::validate`].
    pub fn validated(mut self) -> OptResult<Self> {
        self.tols.validate()?;
        verify_check_every(self.check_conv_every)?;
        verify_log_every(self.log_every)?;
        if let Some(ls) = &self.line_search {
            ls.validate()?;
        }
        if let Some(log_every) = self.log_every {
            let check_every = self.check_every();
            if log_every % check_every != 0 {
                tracing::debug!(
                    log_every,
                    check_every,
                    "log_every is not a multiple of check_conv_every; coercing"
                );
                self.log_every = Some(check_every);
            }
        }
        Ok(self)
    }

    /// Effective classification interval (`1` when unset).
    pub fn check_every(&self) -> usize {
        self.check_conv_every.unwrap_or(1)
    }
}

/// Why a run stopped.
///
/// Only [`TerminationReason::NumericalFailure`] is an error; every other
/// reason is a normal stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminationReason {
    NumericalFailure,
    MaxIter,
    MaxFn,
    MaxGr,
    MaxFg,
    AbsTol,
    RelTol,
    GradTol,
    GinfTol,
    StepTol,
}

impl TerminationReason {
    /// Stable short code for reports (`"max_iter"`, `"abs_tol"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::NumericalFailure => "numerical failure",
            TerminationReason::MaxIter => "max_iter",
            TerminationReason::MaxFn => "max_fn",
            TerminationReason::MaxGr => "max_gr",
            TerminationReason::MaxFg => "max_fg",
            TerminationReason::AbsTol => "abs_tol",
            TerminationReason::RelTol => "rel_tol",
            TerminationReason::GradTol => "grad_tol",
            TerminationReason::GinfTol => "ginf_tol",
            TerminationReason::StepTol => "step_tol",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TerminationReason::NumericalFailure)
    }

    /// `true` for the tolerance rules, `false` for budgets and failures.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            TerminationReason::AbsTol
                | TerminationReason::RelTol
                | TerminationReason::GradTol
                | TerminationReason::GinfTol
                | TerminationReason::StepTol
        )
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Termination state machine.
///
/// `Running` is the initial state. `Terminated` is absorbing; whether it is
/// the normal or the error terminal state follows from `reason`, so the two
/// are mutually exclusive by construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    #[default]
    Running,
    Terminated {
        reason: TerminationReason,
        iter: usize,
    },
}

impl RunStatus {
    pub fn is_terminated(&self) -> bool {
        matches!(self, RunStatus::Terminated { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RunStatus::Terminated { reason, .. } if reason.is_error())
    }

    pub fn reason(&self) -> Option<TerminationReason> {
        match self {
            RunStatus::Running => None,
            RunStatus::Terminated { reason, .. } => Some(*reason),
        }
    }

    /// Iteration at which termination fired.
    pub fn iter(&self) -> Option<usize> {
        match self {
            RunStatus::Running => None,
            RunStatus::Terminated { iter, .. } => Some(*iter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::errors::OptError;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Tolerance validation and the `log_every` coercion in `OptConfig`.
    // - Reason codes and the error/normal split of `RunStatus`.
    //
    // They intentionally DO NOT cover:
    // - Classification order, which is tested in `convergence`.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Ensure a `log_every` that is not a multiple of `check_conv_every` is
    // coerced to `check_conv_every`.
    //
    // Given
    // -----
    // - `check_conv_every = 3`, `log_every = 4`.
    //
    // Expect
    // ------
    // - The validated config carries `log_every = Some(3)`.
    fn log_every_not_multiple_is_coerced_to_check_every() {
        // Arrange
        let tols = Tolerances { max_iter: Some(10), ..Tolerances::default() };

        // Act
        let cfg = OptConfig::new(tols, Some(3), Some(4)).expect("config should be valid");

        // Assert
        assert_eq!(cfg.log_every, Some(3));
        assert_eq!(cfg.check_every(), 3);
    }

    #[test]
    // Purpose
    // -------
    // Verify that an exact multiple of `check_conv_every` is left alone.
    //
    // Given
    // -----
    // - `check_conv_every = 2`, `log_every = 6`.
    //
    // Expect
    // ------
    // - `log_every` stays `Some(6)`.
    fn log_every_multiple_is_kept() {
        // Arrange
        let tols = Tolerances { max_iter: Some(10), ..Tolerances::default() };

        // Act
        let cfg = OptConfig::new(tols, Some(2), Some(6)).expect("config should be valid");

        // Assert
        assert_eq!(cfg.log_every, Some(6));
    }

    #[test]
    // Purpose
    // -------
    // Reject negative and non-finite tolerances, and a zero check interval.
    //
    // Given
    // -----
    // - `rel_tol = -1e-3`; separately `grad_tol = NaN`; separately
    //   `check_conv_every = 0`.
    //
    // Expect
    // ------
    // - `InvalidTolerance` for the first two, `InvalidCheckInterval` for the
    //   last.
    fn invalid_options_are_rejected() {
        // Arrange
        let neg = Tolerances { rel_tol: Some(-1e-3), ..Tolerances::default() };
        let nan = Tolerances { grad_tol: Some(f64::NAN), ..Tolerances::default() };

        // Act
        let neg_res = OptConfig::new(neg, None, None);
        let nan_res = OptConfig::new(nan, None, None);
        let zero_res = OptConfig::new(Tolerances::default(), Some(0), None);

        // Assert
        assert!(matches!(neg_res, Err(OptError::InvalidTolerance { name: "rel_tol", .. })));
        assert!(matches!(nan_res, Err(OptError::InvalidTolerance { name: "grad_tol", .. })));
        assert!(matches!(zero_res, Err(OptError::InvalidCheckInterval { every: 0, .. })));
    }

    #[test]
    fn zero_tolerance_is_accepted_as_non_negative() {
        let tols = Tolerances { abs_tol: Some(0.0), ..Tolerances::default() };
        assert!(tols.validate().is_ok());
        assert!(tols.needs_fn());
        assert!(!tols.needs_gr());
    }

    #[test]
    fn run_status_splits_error_from_normal_termination() {
        let failed =
            RunStatus::Terminated { reason: TerminationReason::NumericalFailure, iter: 3 };
        let done = RunStatus::Terminated { reason: TerminationReason::AbsTol, iter: 7 };

        assert!(failed.is_terminated() && failed.is_error());
        assert!(done.is_terminated() && !done.is_error());
        assert!(!RunStatus::Running.is_terminated());
        assert_eq!(done.iter(), Some(7));
        assert_eq!(failed.reason().map(|r| r.as_str()), Some("numerical failure"));
        assert_eq!(TerminationReason::MaxIter.to_string(), "max_iter");
    }
}
