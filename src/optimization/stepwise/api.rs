//! High-level entry point that drives a stepwise run to termination.
//!
//! Callers that want control between iterations use `step` and `evaluate`
//! directly; [`minimize`] is the loop most callers would write by hand.
use serde::{Deserialize, Serialize};

use crate::optimization::{
    errors::{OptError, OptResult},
    stepwise::{
        convergence::{StepSummary, evaluate},
        methods::MethodChoice,
        state::OptState,
        step::step,
        traits::{Objective, OptConfig, TerminationReason},
        types::{Cost, Point},
    },
};

/// Result of a completed run.
///
/// - `par`: best Point seen (lowest `f`, else lowest gradient norm); the
///   final Point when nothing was ever evaluated.
/// - `f`, `grad_norm`: values recorded for `par`, when known.
/// - `reason`: why the run stopped.
/// - `converged`: `true` when a tolerance rule fired (not a budget or a
///   failure).
/// - `iterations`, `nf`, `ng`: final iteration and evaluation counts.
/// - `error`: captured numerical-failure message, if any.
/// - `state`: the terminal state, kept for inspection or persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimOutcome {
    pub par: Point,
    pub f: Option<Cost>,
    pub grad_norm: Option<f64>,
    pub reason: TerminationReason,
    pub converged: bool,
    pub iterations: usize,
    pub nf: usize,
    pub ng: usize,
    pub error: Option<String>,
    pub state: OptState,
}

impl OptimOutcome {
    fn new(summary: StepSummary, last: Point, reason: TerminationReason) -> Self {
        let (par, f, grad_norm) = match summary.state.best() {
            Some(best) => (best.par.clone(), best.f, best.g2n),
            None => (last, summary.f, summary.g2n),
        };
        let state = summary.state;
        Self {
            par,
            f,
            grad_norm,
            reason,
            converged: reason.is_converged(),
            iterations: state.iter(),
            nf: state.nf(),
            ng: state.ng(),
            error: state.error().map(str::to_owned),
            state,
        }
    }
}

/// Minimize `objective` from `par0` with the chosen method.
///
/// # Behavior
/// - Builds an [`OptState`] from `choice` and `config`.
/// - Classifies the starting Point (iteration 0), then alternates `step` and
///   `evaluate` until the state is terminated.
/// - Emits a `tracing::info!` progress line every `log_every` iterations
///   (after the `check_conv_every` coercion). Nothing is logged when
///   `log_every` is unset.
///
/// # Parameters
/// - `objective`: function/gradient oracle.
/// - `par0`: starting Point; its length fixes the dimension.
/// - `choice`: method selector, e.g. `"l-bfgs".parse()?`.
/// - `config`: tolerances, budgets, cadence, and line-search override.
///
/// # Errors
/// - `OptError::NoStoppingRule` when no budget or tolerance is set.
/// - Any construction error from [`OptState::new`].
///
/// A gradient of the wrong length from the oracle is not an `Err`: it ends
/// the run with `NumericalFailure` and an `error` message.
///
/// # Returns
/// An [`OptimOutcome`]. A numerical failure is a normal return with
/// `reason == TerminationReason::NumericalFailure` and `error` set.
///
/// # Example
/// ```no_run
/// use ndarray::array;
/// use stepwise_optim::optimization::stepwise::{
///     FnObjective, MethodChoice, OptConfig, Tolerances, minimize,
/// };
///
/// let obj = FnObjective::new(
///     |x: &ndarray::Array1<f64>| x.dot(x),
///     |x: &ndarray::Array1<f64>| x * 2.0,
/// );
/// let tols = Tolerances { grad_tol: Some(1e-8), max_iter: Some(200), ..Tolerances::default() };
/// let config = OptConfig::new(tols, None, Some(10))?;
///
/// let out = minimize(&obj, array![1.0, -2.0], MethodChoice::Bfgs, config)?;
/// println!("x* = {:?} ({})", out.par, out.reason);
/// # Ok::<(), stepwise_optim::optimization::errors::OptError>(())
/// ```
pub fn minimize<O: Objective + ?Sized>(
    objective: &O, par0: Point, choice: MethodChoice, config: OptConfig,
) -> OptResult<OptimOutcome> {
    let state = OptState::new(choice, &par0, config)?;
    if !state.config().tols.has_stopping_rule() {
        return Err(OptError::NoStoppingRule);
    }
    let log_every = state.config().log_every;
    let method = state.method().tag();

    let mut summary = evaluate(state, &par0, objective, None)?;
    let mut par = par0;
    loop {
        if let Some(every) = log_every {
            if summary.iter % every == 0 {
                tracing::info!(
                    method,
                    iter = summary.iter,
                    f = ?summary.f,
                    grad_norm = ?summary.g2n,
                    alpha = summary.alpha,
                    nf = summary.nf,
                    ng = summary.ng,
                    "optimizer progress"
                );
            }
        }
        if let Some(reason) = summary.state.reason() {
            tracing::info!(
                method,
                iter = summary.iter,
                %reason,
                nf = summary.nf,
                ng = summary.ng,
                "optimizer finished"
            );
            return Ok(OptimOutcome::new(summary, par, reason));
        }
        let next = step(summary.state, par.clone(), objective)?;
        summary = evaluate(next.state, &next.par, objective, Some(&par))?;
        par = next.par;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::stepwise::{
        adapter::FnObjective,
        methods::{MomentumSchedule, RestartPolicy},
        traits::Tolerances,
        types::Grad,
    };
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Rejection of configurations with no stopping rule.
    // - Convergence on a convex quadratic and the best-seen outcome.
    // - Numerical failures surfacing as a normal outcome.
    // - Budget stops being reported as not converged.
    // - Function tolerances not mistaking a momentum restart for convergence.
    // -------------------------------------------------------------------------

    fn bowl() -> FnObjective<impl Fn(&Point) -> Cost, impl Fn(&Point) -> Grad> {
        FnObjective::new(
            |x: &Point| x[0] * x[0] + 4.0 * x[1] * x[1],
            |x: &Point| array![2.0 * x[0], 8.0 * x[1]],
        )
    }

    #[test]
    fn no_stopping_rule_is_rejected() {
        let cfg = OptConfig::new(Tolerances::default(), None, None).expect("valid config");
        let res = minimize(&bowl(), array![1.0, 1.0], MethodChoice::Bfgs, cfg);
        assert_eq!(res, Err(OptError::NoStoppingRule));
    }

    #[test]
    // Purpose
    // -------
    // Drive BFGS on an ill-scaled quadratic to a gradient tolerance.
    //
    // Given
    // -----
    // - `f(x) = x0² + 4 x1²` from `(1, 1)`, `grad_tol = 1e-8`, `max_iter = 100`.
    //
    // Expect
    // ------
    // - Stops on `grad_tol`, reports convergence, and returns a Point near 0.
    fn bfgs_reaches_gradient_tolerance_on_quadratic() {
        // Arrange
        let tols = Tolerances { grad_tol: Some(1e-8), max_iter: Some(100), ..Default::default() };
        let cfg = OptConfig::new(tols, None, Some(1)).expect("valid config");

        // Act
        let out = minimize(&bowl(), array![1.0, 1.0], MethodChoice::Bfgs, cfg).expect("runs");

        // Assert
        assert_eq!(out.reason, TerminationReason::GradTol);
        assert!(out.converged);
        assert!(out.error.is_none());
        assert!(out.iterations < 100);
        assert!(out.par.iter().all(|v| v.abs() < 1e-8));
        assert!(out.grad_norm.is_some_and(|g| g < 1e-8));
        assert_eq!((out.nf, out.ng), (out.state.nf(), out.state.ng()));
    }

    #[test]
    fn budget_stop_is_not_convergence() {
        let tols = Tolerances { max_iter: Some(2), ..Default::default() };
        let cfg = OptConfig::new(tols, None, None).expect("valid config");

        let out = minimize(&bowl(), array![1.0, 1.0], MethodChoice::SteepestDescent, cfg)
            .expect("runs");

        assert_eq!(out.reason, TerminationReason::MaxIter);
        assert!(!out.converged);
        assert_eq!(out.iterations, 2);
        assert!(out.f.is_some_and(|f| f < 5.0));
    }

    #[test]
    // Purpose
    // -------
    // A momentum restart leaves `f` unchanged; that must not read as
    // `abs_tol` convergence.
    //
    // Given
    // -----
    // - `f(x) = x² / 2` from `x = 2`, constant `mu = 0.9`, `Gr` restart,
    //   `abs_tol = 1e-8`, `grad_tol = 1e-8`. Iteration 2 restarts back to
    //   `x = 1`; iteration 3 lands on the minimizer.
    //
    // Expect
    // ------
    // - Stops on `GradTol` at iteration 3 with `x = 0`, not `AbsTol` at
    //   `x = 1`.
    fn momentum_restart_is_not_function_convergence() {
        // Arrange
        let obj = FnObjective::new(|x: &Point| 0.5 * x.dot(x), |x: &Point| x.clone());
        let choice = MethodChoice::Momentum {
            schedule: MomentumSchedule::Constant { mu: 0.9 },
            restart: RestartPolicy::Gr,
        };
        let tols = Tolerances {
            abs_tol: Some(1e-8),
            grad_tol: Some(1e-8),
            max_iter: Some(50),
            ..Default::default()
        };
        let cfg = OptConfig::new(tols, None, None).expect("valid config");

        // Act
        let out = minimize(&obj, array![2.0], choice, cfg).expect("runs");

        // Assert
        assert_eq!(out.reason, TerminationReason::GradTol);
        assert_eq!(out.iterations, 3);
        assert_eq!(out.par, array![0.0]);
        assert_eq!(out.f, Some(0.0));
    }

    #[test]
    // Purpose
    // -------
    // A NaN gradient at the start is captured, not returned as `Err`.
    //
    // Given
    // -----
    // - An oracle whose gradient is always NaN and `grad_tol` set.
    //
    // Expect
    // ------
    // - `NumericalFailure` at iteration 0 with an error message, and the
    //   starting Point returned.
    fn nan_gradient_is_reported_in_outcome() {
        // Arrange
        let obj =
            FnObjective::new(|x: &Point| x.sum(), |x: &Point| Grad::from_elem(x.len(), f64::NAN));
        let tols = Tolerances { grad_tol: Some(1e-6), max_iter: Some(10), ..Default::default() };
        let cfg = OptConfig::new(tols, None, None).expect("valid config");

        // Act
        let out = minimize(&obj, array![0.5, 0.5], MethodChoice::Bfgs, cfg).expect("runs");

        // Assert
        assert_eq!(out.reason, TerminationReason::NumericalFailure);
        assert_eq!(out.iterations, 0);
        assert_eq!(out.par, array![0.5, 0.5]);
        assert!(out.error.as_deref().is_some_and(|e| e.contains("non-finite")));
        assert!(out.state.is_error());
    }
}
