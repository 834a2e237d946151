//! stepwise::convergence — summaries and termination classification.
//!
//! Purpose
//! -------
//! Inspect the state at the current Point, compute whatever the configured
//! tolerances need, and decide whether the run is over.
//!
//! Key behaviors
//! -------------
//! - [`summarize`] builds a read-only [`StepSummary`]. It always checks the
//!   cached values for finiteness; on classification iterations
//!   (`iter % check_conv_every == 0`) it lazily evaluates `f` (only for
//!   `abs_tol` / `rel_tol`) and the gradient (only for `grad_tol` /
//!   `ginf_tol`) through the evaluation gate.
//! - [`check_convergence`] applies the tolerances in a fixed precedence and
//!   records the terminal reason in the state.
//! - [`evaluate`] performs both.
//!
//! Invariants & assumptions
//! ------------------------
//! - Precedence, first match wins: numerical failure, `max_iter`, `max_fn`,
//!   `max_gr`, `max_fg`, `abs_tol`, `rel_tol`, `grad_tol`, `ginf_tol`,
//!   `step_tol`.
//! - `max_iter` is a hard cap: it is tested on every iteration, including
//!   those skipped by `check_conv_every`.
//! - `abs_tol`, `rel_tol`, and `step_tol` never fire on a restart
//!   iteration, where the Point and `f` are unchanged by construction.
//! - A terminated state is absorbing: summarizing or checking it again
//!   performs no evaluation and changes nothing.
//! - `fn_old` is refreshed on every classification iteration where `f` is
//!   known and the last step was not a restart, whether or not a rule fires.
//!
//! Conventions
//! -----------
//! - `rel = |f_old − f| / max(|f_old|, |f|, f64::MIN_POSITIVE)`.
//! - All tolerance comparisons are strict (`<`).
//!
//! Testing notes
//! -------------
//! - Unit tests build states directly and cover precedence, cadence,
//!   absorption, restart handling for `step_tol`, and lazy evaluation.
use crate::optimization::{
    errors::OptResult,
    numerical_stability::guards::{all_finite, norm2, norm_inf, relative_change},
    stepwise::{
        adapter::EvalGate,
        state::OptState,
        traits::{Objective, TerminationReason},
        types::{Cost, Point},
        validation::verify_dimension,
    },
};

/// Read-only view of the state at a Point.
///
/// - `f`, `g2n`, `ginfn`: function value and gradient 2-/infinity-norms at
///   the Point, when known.
/// - `step`: `‖par − par_old‖₂` when `par_old` was supplied.
/// - `alpha`, `mu`, `restart`: diagnostics of the most recent step.
/// - `checked`: whether a full classification ran for this iteration.
/// - `state`: the state after any evaluations the summary performed.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSummary {
    pub iter: usize,
    pub nf: usize,
    pub ng: usize,
    pub f: Option<Cost>,
    pub g2n: Option<f64>,
    pub ginfn: Option<f64>,
    pub step: Option<f64>,
    pub alpha: f64,
    pub mu: f64,
    pub restart: bool,
    pub checked: bool,
    pub state: OptState,
}

impl StepSummary {
    fn snapshot(state: OptState, par: &Point, par_old: Option<&Point>, checked: bool) -> Self {
        let at_par = state.cache.par == *par;
        let f = state.cache.f.filter(|_| at_par);
        let g = state.cache.g.as_ref().filter(|g| at_par && all_finite(g));
        let step = par_old.filter(|old| old.len() == par.len()).map(|old| norm2(&(par - old)));
        Self {
            iter: state.iter,
            nf: state.counts.nf,
            ng: state.counts.ng,
            f,
            g2n: g.map(norm2),
            ginfn: g.map(norm_inf),
            step,
            alpha: state.last_step.alpha,
            mu: state.last_step.mu,
            restart: state.last_step.restart,
            checked,
            state,
        }
    }

    /// `true` when the summarized state is terminated.
    pub fn is_terminated(&self) -> bool {
        self.state.is_terminated()
    }
}

/// Summarize the state at `par`, evaluating lazily on classification
/// iterations.
///
/// Parameters
/// ----------
/// - `state`: consumed; returned inside the summary.
/// - `par`: the current Point.
/// - `objective`: oracle used for lazy evaluations.
/// - `par_old`: previous Point, for the step-size measure.
///
/// Errors
/// ------
/// - `OptError::DimensionMismatch` when `par` or `par_old` has the wrong
///   length. A wrong-length gradient from the oracle is captured in the
///   state's error slot instead.
pub fn summarize<O: Objective + ?Sized>(
    state: OptState, par: &Point, objective: &O, par_old: Option<&Point>,
) -> OptResult<StepSummary> {
    let mut state = state;
    if state.is_terminated() {
        return Ok(StepSummary::snapshot(state, par, par_old, false));
    }
    verify_dimension(par, state.dim)?;
    if let Some(old) = par_old {
        verify_dimension(old, state.dim)?;
    }
    state.sync_cache(par);
    if !state.check_cache_finite() {
        return Ok(StepSummary::snapshot(state, par, par_old, false));
    }

    let checked = state.iter % state.config.check_every() == 0;
    if checked {
        let tols = state.config.tols;
        let mut gate = EvalGate::new(objective, state.counts, &tols);
        if tols.needs_fn() && state.cache.f.is_none() {
            state.cache.f = gate.value(par);
        }
        let g = if tols.needs_gr() && state.cache.g.is_none() {
            gate.gradient(par)
        } else {
            Ok(None)
        };
        state.counts = gate.counts();
        match g {
            Ok(Some(g)) => state.cache.g = Some(g),
            Ok(None) => {}
            Err(err) => {
                let iter = state.iter;
                state.fail(format!("objective gradient rejected at iteration {iter}: {err}"));
                return Ok(StepSummary::snapshot(state, par, par_old, false));
            }
        }
        if !state.check_cache_finite() {
            return Ok(StepSummary::snapshot(state, par, par_old, false));
        }
    }
    state.observe_current();
    Ok(StepSummary::snapshot(state, par, par_old, checked))
}

/// Classify a summary and record any terminal reason in its state.
///
/// Summaries whose state is already terminated are returned unchanged.
/// Summaries that are not `checked` are only tested against `max_iter`.
pub fn check_convergence(summary: StepSummary) -> StepSummary {
    let mut summary = summary;
    if summary.state.is_terminated() {
        return summary;
    }
    if !summary.checked {
        let state = &mut summary.state;
        if state.config.tols.max_iter.is_some_and(|cap| state.iter >= cap) {
            state.terminate(TerminationReason::MaxIter);
        }
        return summary;
    }
    let reason = classify(&summary);
    if let Some(f) = summary.f.filter(|_| !summary.restart) {
        summary.state.fn_old = Some(f);
    }
    if let Some(reason) = reason {
        summary.state.terminate(reason);
    }
    summary
}

/// [`summarize`] followed by [`check_convergence`].
pub fn evaluate<O: Objective + ?Sized>(
    state: OptState, par: &Point, objective: &O, par_old: Option<&Point>,
) -> OptResult<StepSummary> {
    summarize(state, par, objective, par_old).map(check_convergence)
}

impl OptState {
    /// Method form of [`evaluate`].
    pub fn evaluate<O: Objective + ?Sized>(
        self, par: &Point, objective: &O, par_old: Option<&Point>,
    ) -> OptResult<StepSummary> {
        evaluate(self, par, objective, par_old)
    }
}

fn classify(summary: &StepSummary) -> Option<TerminationReason> {
    let state = &summary.state;
    let tols = &state.config.tols;
    let counts = state.counts;
    let reached = |cap: Option<usize>, used: usize| cap.is_some_and(|cap| used >= cap);
    let below = |tol: Option<f64>, value: Option<f64>| {
        matches!((tol, value), (Some(tol), Some(value)) if value < tol)
    };

    if reached(tols.max_iter, state.iter) {
        return Some(TerminationReason::MaxIter);
    }
    if reached(tols.max_fn, counts.nf) {
        return Some(TerminationReason::MaxFn);
    }
    if reached(tols.max_gr, counts.ng) {
        return Some(TerminationReason::MaxGr);
    }
    if reached(tols.max_fg, counts.total()) {
        return Some(TerminationReason::MaxFg);
    }
    if let (false, Some(f), Some(f_old)) = (summary.restart, summary.f, state.fn_old) {
        if below(tols.abs_tol, Some((f_old - f).abs())) {
            return Some(TerminationReason::AbsTol);
        }
        if below(tols.rel_tol, Some(relative_change(f_old, f))) {
            return Some(TerminationReason::RelTol);
        }
    }
    if below(tols.grad_tol, summary.g2n) {
        return Some(TerminationReason::GradTol);
    }
    if below(tols.ginf_tol, summary.ginfn) {
        return Some(TerminationReason::GinfTol);
    }
    if !summary.restart && below(tols.step_tol, summary.step) {
        return Some(TerminationReason::StepTol);
    }
    None
}
