//! stepwise::step — one iteration of the optimizer.
//!
//! Purpose
//! -------
//! Consume an [`OptState`] and the current Point, advance exactly one
//! iteration, and hand back the next Point together with the next state.
//!
//! Key behaviors
//! -------------
//! - A terminated state is returned unchanged without evaluating anything.
//! - The gradient (and `f` when the line search needs it) at the current
//!   Point comes from the cache when available, else from the evaluation
//!   gate.
//! - The method supplies a direction; a non-descent direction resets the
//!   method memory and falls back to `−g`.
//! - The line search runs under the remaining budget; momentum methods add
//!   `mu · velocity` to the accepted displacement.
//! - The method memory absorbs the transition, counters are copied back
//!   from the gate, and the iteration counter advances.
//!
//! Invariants & assumptions
//! ------------------------
//! - Counters are only ever updated from the gate.
//! - Every non-terminated call advances `iter` by one, including zero steps
//!   caused by budget exhaustion or a failed line search.
//! - On a numerical failure the state keeps its previous Point, cache, and
//!   memory; only the counters, error slot, and status change. Any
//!   non-finite value met during the step counts, including line-search
//!   trials that were never accepted.
//!
//! Conventions
//! -----------
//! - Restart iterations (discarded move plus memory reset) are flagged in
//!   `StepInfo::restart` so step-size convergence can ignore them.
//! - Budget-blocked zero steps, steps from an exactly zero gradient, and
//!   failed searches on memory-less methods are ordinary zero steps, not
//!   restarts.
//!
//! Testing notes
//! -------------
//! - Unit tests cover the no-op on terminated states, dimension checks,
//!   budget blocking, numerical failure capture, and momentum restarts.
//!   End-to-end behavior is tested under `tests/`.
use crate::optimization::{
    errors::OptResult,
    numerical_stability::guards::{first_non_finite, norm2, safe_ratio},
    stepwise::{
        adapter::EvalGate,
        methods::{RestartPolicy, Transition},
        state::{EvalCache, LsMemory, OptState, StepInfo},
        traits::Objective,
        types::{Cost, Grad, Point},
        validation::verify_dimension,
    },
};

/// Output of one [`step`].
///
/// - `par`: the Point to hand to the next call.
/// - `f`, `g`: values at `par` when known.
/// - `nf`, `ng`: cumulative evaluation counts.
/// - `state`: the next optimizer state.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub par: Point,
    pub f: Option<Cost>,
    pub g: Option<Grad>,
    pub nf: usize,
    pub ng: usize,
    pub state: OptState,
}

impl StepResult {
    fn from_state(par: Point, state: OptState) -> Self {
        let (f, g) = if state.cache.par == par {
            (state.cache.f, state.cache.g.clone())
        } else {
            (None, None)
        };
        Self { par, f, g, nf: state.counts.nf, ng: state.counts.ng, state }
    }
}

/// Advance the optimizer by one iteration.
///
/// Parameters
/// ----------
/// - `state`: current state, consumed.
/// - `par`: current Point (normally the `par` of the previous result).
/// - `objective`: function/gradient oracle.
///
/// Returns
/// -------
/// `OptResult<StepResult>` with the next Point and state. Numerical failures,
/// including a gradient of the wrong length returned by the oracle, are
/// captured in the returned state, not reported as `Err`.
///
/// Errors
/// ------
/// - `OptError::DimensionMismatch` when `par` does not match the dimension
///   fixed at initialization. Nothing is evaluated in that case.
pub fn step<O: Objective + ?Sized>(
    state: OptState, par: Point, objective: &O,
) -> OptResult<StepResult> {
    let mut state = state;
    if state.is_terminated() {
        return Ok(StepResult::from_state(par, state));
    }
    verify_dimension(&par, state.dim)?;
    state.sync_cache(&par);

    let tols = state.config.tols;
    let mut gate = EvalGate::new(objective, state.counts, &tols);
    let next = advance(&mut state, &par, &mut gate);
    state.counts = gate.counts();
    let next = match next {
        Ok(next) => next,
        Err(err) => {
            state.fail(format!("objective gradient rejected at iteration {}: {err}", state.iter));
            par
        }
    };
    Ok(StepResult::from_state(next, state))
}

impl OptState {
    /// Method form of [`step`].
    pub fn step<O: Objective + ?Sized>(self, par: Point, objective: &O) -> OptResult<StepResult> {
        step(self, par, objective)
    }
}

fn advance<O: Objective + ?Sized>(
    state: &mut OptState, par: &Point, gate: &mut EvalGate<'_, O>,
) -> OptResult<Point> {
    let needs_f = state.needs_value();
    if state.cache.g.is_none() {
        state.cache.g = gate.gradient(par)?;
    }
    if needs_f && state.cache.f.is_none() && state.cache.g.is_some() {
        state.cache.f = gate.value(par);
    }
    if !state.check_cache_finite() {
        return Ok(par.clone());
    }
    let f0 = state.cache.f;
    let g0 = match &state.cache.g {
        Some(g) if f0.is_some() || !needs_f => g.clone(),
        _ => {
            tracing::debug!(iter = state.iter, "evaluation budget blocks the step; zero step");
            finish(state, StepInfo::default());
            return Ok(par.clone());
        }
    };

    let iter = state.iter;
    if g0.iter().all(|v| *v == 0.0) {
        tracing::debug!(iter, "stationary point; zero step");
        finish(state, StepInfo::default());
        return Ok(par.clone());
    }
    let d = {
        let rule = state.method.rule_mut();
        let d = rule.direction(&g0);
        if g0.dot(&d) < 0.0 {
            d
        } else {
            tracing::debug!(iter, "not a descent direction; resetting method memory");
            rule.reset();
            -&g0
        }
    };

    let alpha0 = initial_step(state, &g0, f0, &d);
    let outcome = state.line_search.search(gate, par, &d, f0, &g0, alpha0)?;
    if let Some(what) = outcome.non_finite {
        state.fail(format!("{what}, iteration {iter}"));
        return Ok(par.clone());
    }
    if outcome.alpha == 0.0 {
        zero_step(state, gate.refused());
        return Ok(par.clone());
    }

    let alpha = outcome.alpha;
    let mut s = &d * alpha;
    let mut mu = 0.0;
    let mut coasting = false;
    if let Some((m, velocity)) = state.method.rule().inertia(iter) {
        mu = m;
        if m > 0.0 && velocity.iter().any(|v| *v != 0.0) {
            s.scaled_add(m, velocity);
            coasting = true;
        }
    }
    let new_par = par + &s;

    let (mut f_new, mut g_new) = if coasting { (None, None) } else { (outcome.f, outcome.g) };
    if g_new.is_none() {
        g_new = gate.gradient(&new_par)?;
    }
    let policy = state.method.rule().restart_policy();
    if coasting && policy == RestartPolicy::Fn && f_new.is_none() {
        f_new = gate.value(&new_par);
    }

    if let Some(f) = f_new.filter(|f| !f.is_finite()) {
        state.fail(format!("non-finite function value {f} at accepted point, iteration {iter}"));
        return Ok(par.clone());
    }
    if let Some((idx, val)) = g_new.as_ref().and_then(first_non_finite) {
        state.fail(format!(
            "non-finite gradient component {idx} = {val} at accepted point, iteration {iter}"
        ));
        return Ok(par.clone());
    }

    let wrong_way = coasting
        && match policy {
            RestartPolicy::None => false,
            RestartPolicy::Fn => matches!((f_new, f0), (Some(new), Some(old)) if new > old),
            RestartPolicy::Gr => g_new.as_ref().is_some_and(|g| g.dot(&s) > 0.0),
        };
    if wrong_way {
        tracing::debug!(iter, ?policy, "momentum step went the wrong way; restarting");
        state.method.rule_mut().reset();
        finish(state, StepInfo { alpha: 0.0, mu, restart: true });
        return Ok(par.clone());
    }

    if let Some(g_new) = &g_new {
        state.method.rule_mut().update(&Transition { d: &d, s: &s, g_old: &g0, g_new });
    }
    state.ls_memory = LsMemory { f_prev: f0, alpha_prev: Some(alpha) };
    state.cache = EvalCache { par: new_par.clone(), f: f_new, g: g_new };
    finish(state, StepInfo { alpha, mu, restart: false });
    state.observe_current();
    tracing::debug!(iter = state.iter, alpha, f = ?f_new, "step accepted");
    Ok(new_par)
}

/// No acceptable step length: stay put.
fn zero_step(state: &mut OptState, budget_refused: bool) {
    let restart = !budget_refused && state.method.rule().has_memory();
    if budget_refused {
        tracing::debug!(iter = state.iter, "evaluation budget exhausted inside line search");
    } else if restart {
        tracing::debug!(iter = state.iter, "line search failed; resetting method memory");
        state.method.rule_mut().reset();
    } else {
        tracing::debug!(iter = state.iter, "line search failed; zero step");
    }
    finish(state, StepInfo { alpha: 0.0, mu: 0.0, restart });
}

fn finish(state: &mut OptState, info: StepInfo) {
    state.iter += 1;
    state.last_step = info;
}

/// Initial trial length for the line search.
///
/// - First iteration (or no accepted step yet): `min(1, 1/‖g‖₂)`.
/// - Quasi-Newton directions: `1`.
/// - Otherwise `min(1, 1.01 · 2 (f − f_prev) / gᵀd)` when that is positive
///   and finite, else the previous accepted length.
fn initial_step(state: &OptState, g: &Grad, f: Option<Cost>, d: &Grad) -> f64 {
    let first = safe_ratio(1.0, norm2(g), 1.0).min(1.0);
    let Some(alpha_prev) = state.ls_memory.alpha_prev else {
        return first;
    };
    if state.iter == 0 {
        return first;
    }
    if state.method.rule().unit_step() {
        return 1.0;
    }
    match (f, state.ls_memory.f_prev) {
        (Some(f), Some(f_prev)) => {
            let guess = 1.01 * 2.0 * (f - f_prev) / g.dot(d);
            if guess.is_finite() && guess > 0.0 { guess.min(1.0) } else { alpha_prev }
        }
        _ => alpha_prev,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::{
        errors::OptError,
        stepwise::{
            adapter::{EvalCounts, FnObjective},
            methods::{Method, MethodChoice, MomentumSchedule},
            traits::{OptConfig, Tolerances, TerminationReason},
        },
    };
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Absorbing termination and dimension checks.
    // - A hand-traceable steepest-descent step on `f(x) = x²`.
    // - Budget-blocked and failed-search zero steps.
    // - Numerical failure capture (accepted point, rejected trials, and
    //   malformed oracle gradients) and momentum gradient restarts.
    //
    // They intentionally DO NOT cover:
    // - Multi-iteration convergence (see `tests/integration_rosenbrock_pipeline.rs`).
    // -------------------------------------------------------------------------

    fn square() -> FnObjective<impl Fn(&Point) -> Cost, impl Fn(&Point) -> Grad> {
        FnObjective::new(|x: &Point| x.dot(x), |x: &Point| x * 2.0)
    }

    fn config(tols: Tolerances) -> OptConfig {
        OptConfig::new(tols, None, None).expect("valid config")
    }

    fn unbounded() -> OptConfig {
        config(Tolerances { max_iter: Some(100), ..Tolerances::default() })
    }

    #[test]
    // Purpose
    // -------
    // Trace one steepest-descent step by hand.
    //
    // Given
    // -----
    // - `f(x) = x²` at `x = 1`; `g = 2`, initial trial `min(1, 1/2) = 0.5`.
    //
    // Expect
    // ------
    // - The first trial lands on the minimizer `x = 0` and is accepted.
    // - `nf = 2` (start + trial), `ng = 2` (start + new point), `iter = 1`.
    fn steepest_descent_step_matches_hand_trace() {
        // Arrange
        let obj = square();
        let state =
            OptState::new(MethodChoice::SteepestDescent, &array![1.0], unbounded()).expect("state");

        // Act
        let res = step(state, array![1.0], &obj).expect("step succeeds");

        // Assert
        assert_eq!(res.par, array![0.0]);
        assert_eq!(res.f, Some(0.0));
        assert_eq!(res.g, Some(array![0.0]));
        assert_eq!((res.nf, res.ng), (2, 2));
        assert_eq!(res.state.iter(), 1);
        assert_relative_eq!(res.state.last_step().alpha, 0.5);
        assert!(!res.state.last_step().restart);
    }

    #[test]
    fn terminated_state_is_returned_unchanged() {
        let obj = square();
        let mut state =
            OptState::new(MethodChoice::Bfgs, &array![1.0], unbounded()).expect("state");
        state.terminate(TerminationReason::MaxIter);
        let before = state.clone();

        let res = step(state, array![1.0], &obj).expect("no-op succeeds");

        assert_eq!(res.state, before);
        assert_eq!(res.par, array![1.0]);
        assert_eq!((res.nf, res.ng), (0, 0));
    }

    #[test]
    fn mismatched_point_is_a_configuration_error() {
        let obj = square();
        let state = OptState::new(MethodChoice::Bfgs, &array![1.0, 2.0], unbounded())
            .expect("state");

        let err = step(state, array![1.0], &obj).unwrap_err();

        assert_eq!(err, OptError::DimensionMismatch { expected: 2, found: 1 });
    }

    #[test]
    // Purpose
    // -------
    // Ensure a step with no gradient budget is a counted zero step, not a
    // restart, and never calls the oracle.
    //
    // Given
    // -----
    // - `max_gr = 0`.
    //
    // Expect
    // ------
    // - Same Point, `iter = 1`, zero counters, `restart == false`.
    fn budget_blocked_step_is_plain_zero_step() {
        // Arrange
        let obj = square();
        let cfg = config(Tolerances { max_gr: Some(0), ..Tolerances::default() });
        let state = OptState::new(MethodChoice::Bfgs, &array![1.0], cfg).expect("state");

        // Act
        let res = step(state, array![1.0], &obj).expect("step succeeds");

        // Assert
        assert_eq!(res.par, array![1.0]);
        assert_eq!(res.state.iter(), 1);
        assert_eq!(res.state.counts(), EvalCounts::default());
        assert!(!res.state.last_step().restart);
        assert!(!res.state.is_terminated());
    }

    #[test]
    fn failed_search_on_memoryless_method_is_plain_zero_step() {
        // The gradient points uphill, so every backtracking trial increases f.
        let obj = FnObjective::new(|x: &Point| x.dot(x), |x: &Point| x * -2.0);
        let state =
            OptState::new(MethodChoice::SteepestDescent, &array![1.0], unbounded()).expect("state");

        let res = step(state, array![1.0], &obj).expect("step succeeds");

        assert_eq!(res.par, array![1.0]);
        assert_eq!(res.state.last_step(), StepInfo { alpha: 0.0, mu: 0.0, restart: false });
        assert_eq!((res.nf, res.ng), (21, 1));
        assert_eq!(res.state.iter(), 1);
    }

    #[test]
    // Purpose
    // -------
    // Verify a non-finite gradient at the accepted point is captured as a
    // numerical failure instead of an `Err`.
    //
    // Given
    // -----
    // - `f(x) = x²` whose gradient is `NaN` for `|x| < 0.5`; SD from `x = 1`
    //   lands on `x = 0`.
    //
    // Expect
    // ------
    // - Terminated with `NumericalFailure` at iteration 0, error text set,
    //   returned Point still `1`.
    fn non_finite_gradient_terminates_with_numerical_failure() {
        // Arrange
        let obj = FnObjective::new(
            |x: &Point| x.dot(x),
            |x: &Point| if x[0].abs() < 0.5 { array![f64::NAN] } else { x * 2.0 },
        );
        let state =
            OptState::new(MethodChoice::SteepestDescent, &array![1.0], unbounded()).expect("state");

        // Act
        let res = step(state, array![1.0], &obj).expect("failure is captured, not returned");

        // Assert
        assert_eq!(res.par, array![1.0]);
        assert_eq!(res.state.reason(), Some(TerminationReason::NumericalFailure));
        assert_eq!(res.state.status().iter(), Some(0));
        assert!(res.state.error().is_some_and(|e| e.contains("gradient")));
        assert_eq!(res.ng, 2);
    }

    #[test]
    // Purpose
    // -------
    // Verify a non-finite value at a rejected line-search trial still fails
    // the step.
    //
    // Given
    // -----
    // - `f(x) = x²` for `x ≥ −0.1`, `+∞` below; SD from `x = 0.3`. The first
    //   trial `alpha = 1` lands on `x = −0.3`.
    //
    // Expect
    // ------
    // - `NumericalFailure` at iteration 0 naming the infinite value, Point
    //   kept at `0.3`, and the search stopped after that single trial.
    fn non_finite_trial_value_terminates_with_numerical_failure() {
        // Arrange
        let obj = FnObjective::new(
            |x: &Point| if x[0] < -0.1 { f64::INFINITY } else { x.dot(x) },
            |x: &Point| x * 2.0,
        );
        let state =
            OptState::new(MethodChoice::SteepestDescent, &array![0.3], unbounded()).expect("state");

        // Act
        let res = step(state, array![0.3], &obj).expect("failure is captured, not returned");

        // Assert
        assert_eq!(res.par, array![0.3]);
        assert_eq!(res.state.reason(), Some(TerminationReason::NumericalFailure));
        assert_eq!(res.state.status().iter(), Some(0));
        assert!(res.state.error().is_some_and(|e| e.contains("function value inf")));
        assert_eq!((res.nf, res.ng), (2, 1));
    }

    #[test]
    // Purpose
    // -------
    // Ensure a wrong-length gradient from the oracle mid-step keeps the
    // state and is reported through the error slot.
    //
    // Given
    // -----
    // - A 1-D `f(x) = x²` whose gradient has two components for `x < 0.5`;
    //   SD from `x = 1` accepts `x = 0`.
    //
    // Expect
    // ------
    // - `Ok` result, `NumericalFailure`, Point kept at `1`, counters include
    //   the rejected gradient call.
    fn malformed_oracle_gradient_is_captured_in_state() {
        // Arrange
        let obj = FnObjective::new(
            |x: &Point| x.dot(x),
            |x: &Point| if x[0] < 0.5 { array![0.0, 0.0] } else { x * 2.0 },
        );
        let state =
            OptState::new(MethodChoice::SteepestDescent, &array![1.0], unbounded()).expect("state");

        // Act
        let res = step(state, array![1.0], &obj).expect("failure is captured, not returned");

        // Assert
        assert_eq!(res.par, array![1.0]);
        assert_eq!(res.state.reason(), Some(TerminationReason::NumericalFailure));
        assert!(res.state.error().is_some_and(|e| e.contains("expected 1, found 2")));
        assert_eq!((res.nf, res.ng), (2, 2));
    }

    #[test]
    fn zero_gradient_is_plain_zero_step() {
        let obj = square();
        let state = OptState::new(MethodChoice::Bfgs, &array![0.0], unbounded()).expect("state");

        let res = step(state, array![0.0], &obj).expect("step succeeds");

        assert_eq!(res.par, array![0.0]);
        assert_eq!(res.state.last_step(), StepInfo::default());
        assert_eq!(res.state.iter(), 1);
        assert_eq!((res.nf, res.ng), (1, 1));
    }

    #[test]
    // Purpose
    // -------
    // Check the gradient restart policy discards an overshooting momentum
    // step and zeroes the velocity.
    //
    // Given
    // -----
    // - `f(x) = x² / 2` from `x = 2`, constant momentum `mu = 0.9`, `Gr`
    //   restart. Step 1 moves to `x = 1` (no velocity yet). Step 2 accepts
    //   `alpha = 1` and coasts to `x = −0.9`, where `g · s > 0`.
    //
    // Expect
    // ------
    // - Step 2 returns `x = 1`, flags a restart, and the velocity is zero.
    fn gradient_restart_reverts_overshooting_momentum_step() {
        // Arrange
        let obj = FnObjective::new(|x: &Point| 0.5 * x.dot(x), |x: &Point| x.clone());
        let choice = MethodChoice::Momentum {
            schedule: MomentumSchedule::Constant { mu: 0.9 },
            restart: RestartPolicy::Gr,
        };
        let state = OptState::new(choice, &array![2.0], unbounded()).expect("state");

        // Act
        let first = step(state, array![2.0], &obj).expect("first step");
        let second = step(first.state, first.par.clone(), &obj).expect("second step");

        // Assert
        assert_eq!(first.par, array![1.0]);
        assert_eq!(second.par, array![1.0]);
        assert!(second.state.last_step().restart);
        assert_relative_eq!(second.state.last_step().mu, 0.9);
        assert_eq!(second.state.iter(), 2);
        match second.state.method() {
            Method::Momentum(m) => assert_eq!(m.velocity(), &array![0.0]),
            other => panic!("expected momentum memory, got {other:?}"),
        }
    }
}
