//! stepwise::state — the serializable optimizer state.
//!
//! Purpose
//! -------
//! Hold everything needed to continue a run: method memory, line-search
//! settings and history, configuration, evaluation counters, cached values
//! at the current Point, best-seen Point, and termination status. The state
//! is a plain value: callers may clone it, persist it with `serde`, and
//! resume later with identical behavior.
//!
//! Key behaviors
//! -------------
//! - [`OptState::new`] validates the configuration, fixes the dimension, and
//!   allocates method memory; [`OptState::seeded`] additionally evaluates the
//!   starting Point through the counting gate.
//! - Read accessors expose every field; mutation only happens through the
//!   step procedure and the convergence evaluator, which consume a state and
//!   return the next one.
//!
//! Invariants & assumptions
//! ------------------------
//! - `dim` never changes after construction.
//! - `counts.nf` and `counts.ng` never decrease.
//! - Once `status` is terminated it never changes again.
//! - `error` is written at most once and never cleared.
//! - Method memory, cache, and best-seen Point are sized for `dim`; a
//!   deserialized state that breaks this is rejected by [`OptState::validate`].
//! - The cache always describes `cache.par`; callers handing in a different
//!   Point invalidate it.
//!
//! Downstream usage
//! ----------------
//! - `step::step` and `convergence::evaluate` are the only transforms.
//! - `api::minimize` drives a state to termination.
//!
//! Testing notes
//! -------------
//! - Unit tests cover construction, seeding, best-seen bookkeeping, and
//!   rejection of inconsistent restored states. Serialization round-trips
//!   are exercised in `tests/checkpoint_resume.rs`.
use serde::{Deserialize, Serialize};

use crate::optimization::{
    errors::{OptError, OptResult},
    numerical_stability::guards::{all_finite, first_non_finite, norm2},
    stepwise::{
        adapter::{EvalCounts, EvalGate},
        line_search::LineSearchOptions,
        methods::{Method, MethodChoice, RestartPolicy},
        traits::{Objective, OptConfig, RunStatus, TerminationReason},
        types::{Cost, Grad, Point},
        validation::{verify_nonempty, verify_state_len},
    },
};

/// Last known values at `par`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCache {
    pub par: Point,
    pub f: Option<Cost>,
    pub g: Option<Grad>,
}

impl EvalCache {
    fn empty(par: &Point) -> Self {
        Self { par: par.clone(), f: None, g: None }
    }
}

/// Best Point seen so far.
///
/// Ranked by lowest `f`; when no `f` was ever available, by lowest gradient
/// 2-norm; when neither, the most recent Point wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestSeen {
    pub par: Point,
    pub f: Option<Cost>,
    pub g2n: Option<f64>,
}

impl BestSeen {
    fn is_beaten_by(&self, f: Option<Cost>, g2n: Option<f64>) -> bool {
        match (self.f, f) {
            (Some(best), Some(f)) => f < best,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => match (self.g2n, g2n) {
                (Some(best), Some(g2n)) => g2n < best,
                (Some(_), None) => false,
                (None, _) => true,
            },
        }
    }
}

/// Diagnostics for the most recent step.
///
/// - `alpha`: accepted line-search step length (`0` for a zero step).
/// - `mu`: momentum coefficient applied (`0` for non-momentum methods).
/// - `restart`: the step discarded its move and reinitialized the memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub alpha: f64,
    pub mu: f64,
    pub restart: bool,
}

/// Line-search history used only to seed the next initial trial length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LsMemory {
    pub f_prev: Option<Cost>,
    pub alpha_prev: Option<f64>,
}

/// Complete, resumable optimizer state.
///
/// Deserialization runs [`OptState::validate`], so a restored state whose
/// memory or cache does not fit its dimension is rejected on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredState")]
pub struct OptState {
    pub(crate) method: Method,
    pub(crate) line_search: LineSearchOptions,
    pub(crate) ls_memory: LsMemory,
    pub(crate) config: OptConfig,
    pub(crate) dim: usize,
    pub(crate) counts: EvalCounts,
    pub(crate) iter: usize,
    pub(crate) cache: EvalCache,
    pub(crate) fn_old: Option<Cost>,
    pub(crate) best: Option<BestSeen>,
    pub(crate) status: RunStatus,
    pub(crate) error: Option<String>,
    pub(crate) last_step: StepInfo,
}

/// Serialized layout of [`OptState`], checked before it becomes one.
#[derive(Deserialize)]
struct StoredState {
    method: Method,
    line_search: LineSearchOptions,
    ls_memory: LsMemory,
    config: OptConfig,
    dim: usize,
    counts: EvalCounts,
    iter: usize,
    cache: EvalCache,
    fn_old: Option<Cost>,
    best: Option<BestSeen>,
    status: RunStatus,
    error: Option<String>,
    last_step: StepInfo,
}

impl TryFrom<StoredState> for OptState {
    type Error = OptError;

    fn try_from(stored: StoredState) -> OptResult<Self> {
        let state = OptState {
            method: stored.method,
            line_search: stored.line_search,
            ls_memory: stored.ls_memory,
            config: stored.config,
            dim: stored.dim,
            counts: stored.counts,
            iter: stored.iter,
            cache: stored.cache,
            fn_old: stored.fn_old,
            best: stored.best,
            status: stored.status,
            error: stored.error,
            last_step: stored.last_step,
        };
        state.validate()?;
        Ok(state)
    }
}

impl OptState {
    /// Build an unevaluated state at `par`.
    ///
    /// Parameters
    /// ----------
    /// - `choice`: method selector (also parseable from a short tag).
    /// - `par`: starting Point; its length fixes the dimension.
    /// - `config`: tolerances, budgets, and cadence.
    ///
    /// Errors
    /// ------
    /// - `OptError::EmptyPoint` for a zero-length `par`.
    /// - Configuration errors from `OptConfig::validated`.
    /// - `OptError::InvalidMethodParameter` from `MethodChoice::build`.
    pub fn new(choice: MethodChoice, par: &Point, config: OptConfig) -> OptResult<Self> {
        let dim = verify_nonempty(par)?;
        let config = config.validated()?;
        let method = choice.build(dim)?;
        let line_search =
            config.line_search.unwrap_or_else(|| method.rule().default_line_search());
        tracing::debug!(
            method = method.tag(),
            dim,
            searcher = ?line_search.searcher,
            "initialized optimizer state"
        );
        Ok(Self {
            method,
            line_search,
            ls_memory: LsMemory::default(),
            config,
            dim,
            counts: EvalCounts::default(),
            iter: 0,
            cache: EvalCache::empty(par),
            fn_old: None,
            best: None,
            status: RunStatus::Running,
            error: None,
            last_step: StepInfo::default(),
        })
    }

    /// Build a state and evaluate the starting Point.
    ///
    /// The gradient is always requested; the function value only when the
    /// line search or restart policy needs it. Both calls go through the
    /// evaluation gate and are counted. A non-finite seed terminates the
    /// state immediately with a numerical failure.
    ///
    /// Errors
    /// ------
    /// - Everything [`OptState::new`] reports.
    /// - `OptError::DimensionMismatch` for a gradient of the wrong length.
    pub fn seeded<O: Objective + ?Sized>(
        choice: MethodChoice, par: &Point, objective: &O, config: OptConfig,
    ) -> OptResult<Self> {
        let mut state = Self::new(choice, par, config)?;
        let tols = state.config.tols;
        let mut gate = EvalGate::new(objective, state.counts, &tols);
        state.cache.g = gate.gradient(par)?;
        if state.needs_value() {
            state.cache.f = gate.value(par);
        }
        state.counts = gate.counts();
        if state.check_cache_finite() {
            state.observe_current();
        }
        Ok(state)
    }

    /// Check internal consistency: configuration and line-search constants
    /// in range, and every stored vector or matrix sized for `dim`.
    ///
    /// Runs automatically when a state is deserialized.
    ///
    /// Errors
    /// ------
    /// - `OptError::EmptyPoint` for `dim == 0`.
    /// - Configuration and line-search errors, as at construction.
    /// - `OptError::InvalidState` naming the first mis-sized field.
    pub fn validate(&self) -> OptResult<()> {
        if self.dim == 0 {
            return Err(OptError::EmptyPoint);
        }
        self.config.clone().validated()?;
        self.line_search.validate()?;
        self.method.rule().verify_dim(self.dim)?;
        verify_state_len("cache.par", self.cache.par.len(), self.dim)?;
        if let Some(g) = &self.cache.g {
            verify_state_len("cache.g", g.len(), self.dim)?;
        }
        if let Some(best) = &self.best {
            verify_state_len("best.par", best.par.len(), self.dim)?;
        }
        Ok(())
    }

    // ---- Read accessors ----

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn line_search(&self) -> &LineSearchOptions {
        &self.line_search
    }

    pub fn ls_memory(&self) -> LsMemory {
        self.ls_memory
    }

    pub fn config(&self) -> &OptConfig {
        &self.config
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn counts(&self) -> EvalCounts {
        self.counts
    }

    pub fn nf(&self) -> usize {
        self.counts.nf
    }

    pub fn ng(&self) -> usize {
        self.counts.ng
    }

    pub fn iter(&self) -> usize {
        self.iter
    }

    pub fn cache(&self) -> &EvalCache {
        &self.cache
    }

    pub fn fn_old(&self) -> Option<Cost> {
        self.fn_old
    }

    pub fn best(&self) -> Option<&BestSeen> {
        self.best.as_ref()
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn last_step(&self) -> StepInfo {
        self.last_step
    }

    pub fn is_terminated(&self) -> bool {
        self.status.is_terminated()
    }

    pub fn is_error(&self) -> bool {
        self.status.is_error()
    }

    pub fn reason(&self) -> Option<TerminationReason> {
        self.status.reason()
    }

    // ---- Crate-internal transitions ----

    /// `true` when a step needs `f` at the starting Point.
    pub(crate) fn needs_value(&self) -> bool {
        self.line_search.searcher.needs_value()
            || self.method.rule().restart_policy() == RestartPolicy::Fn
    }

    /// Point the cache at `par`, discarding values computed elsewhere.
    pub(crate) fn sync_cache(&mut self, par: &Point) {
        if &self.cache.par != par {
            tracing::debug!(iter = self.iter, "point differs from cached point; dropping cache");
            self.cache = EvalCache::empty(par);
        }
    }

    /// Record a terminal reason unless already terminated.
    pub(crate) fn terminate(&mut self, reason: TerminationReason) {
        if self.status.is_terminated() {
            return;
        }
        self.status = RunStatus::Terminated { reason, iter: self.iter };
        tracing::debug!(
            iter = self.iter,
            %reason,
            nf = self.counts.nf,
            ng = self.counts.ng,
            "optimizer terminated"
        );
    }

    /// Capture a numerical failure into the error slot and terminate.
    pub(crate) fn fail(&mut self, message: String) {
        if self.status.is_terminated() {
            return;
        }
        tracing::warn!(iter = self.iter, %message, "numerical failure");
        if self.error.is_none() {
            self.error = Some(message);
        }
        self.terminate(TerminationReason::NumericalFailure);
    }

    /// Fail when the cached value or gradient is non-finite. Returns `true`
    /// when the cache is clean.
    pub(crate) fn check_cache_finite(&mut self) -> bool {
        if let Some(f) = self.cache.f {
            if !f.is_finite() {
                self.fail(format!("non-finite function value {f} at iteration {}", self.iter));
                return false;
            }
        }
        if let Some((idx, val)) = self.cache.g.as_ref().and_then(first_non_finite) {
            self.fail(format!(
                "non-finite gradient component {idx} = {val} at iteration {}",
                self.iter
            ));
            return false;
        }
        true
    }

    /// Offer the cached Point to the best-seen record.
    pub(crate) fn observe_current(&mut self) {
        let g2n = self.cache.g.as_ref().filter(|g| all_finite(g)).map(norm2);
        self.observe(self.cache.f, g2n);
    }

    pub(crate) fn observe(&mut self, f: Option<Cost>, g2n: Option<f64>) {
        let f = f.filter(|v| v.is_finite());
        let g2n = g2n.filter(|v| v.is_finite());
        if self.best.as_ref().map_or(true, |best| best.is_beaten_by(f, g2n)) {
            self.best = Some(BestSeen { par: self.cache.par.clone(), f, g2n });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::{
        errors::OptError,
        stepwise::{
            adapter::FnObjective, line_search::LineSearcher, methods::Bfgs, traits::Tolerances,
        },
    };
    use ndarray::{Array1, array};

    fn sphere() -> FnObjective<impl Fn(&Point) -> Cost, impl Fn(&Point) -> Grad> {
        FnObjective::new(|x: &Point| x.dot(x), |x: &Point| x * 2.0)
    }

    fn config() -> OptConfig {
        OptConfig::new(Tolerances { max_iter: Some(5), ..Tolerances::default() }, None, None)
            .expect("valid config")
    }

    #[test]
    // Purpose
    // -------
    // Ensure a fresh state starts running at iteration 0 with zero counters
    // and the method's default line search.
    //
    // Given
    // -----
    // - BFGS at `(1, 2)`, no objective.
    //
    // Expect
    // ------
    // - `iter == 0`, `nf == ng == 0`, strong Wolfe line search, empty cache.
    fn new_state_starts_clean() {
        // Arrange
        let par = array![1.0, 2.0];

        // Act
        let state = OptState::new(MethodChoice::Bfgs, &par, config()).expect("valid state");

        // Assert
        assert_eq!(state.iter(), 0);
        assert_eq!(state.counts(), EvalCounts::default());
        assert_eq!(state.dim(), 2);
        assert_eq!(state.line_search().searcher, LineSearcher::StrongWolfe);
        assert_eq!(state.status(), RunStatus::Running);
        assert!(state.cache().f.is_none() && state.cache().g.is_none());
    }

    #[test]
    fn empty_point_is_rejected() {
        let empty: Array1<f64> = Array1::zeros(0);
        let res = OptState::new(MethodChoice::SteepestDescent, &empty, config());
        assert_eq!(res.unwrap_err(), OptError::EmptyPoint);
    }

    #[test]
    // Purpose
    // -------
    // Verify seeding evaluates through the gate and counts the calls.
    //
    // Given
    // -----
    // - Steepest descent (backtracking needs `f`) on the sphere at `(1, 1)`.
    //
    // Expect
    // ------
    // - `nf == 1`, `ng == 1`, cache holds `f = 2`, `g = (2, 2)`.
    // - The starting Point is the best seen so far.
    fn seeded_state_counts_initial_evaluations() {
        // Arrange
        let par = array![1.0, 1.0];
        let obj = sphere();

        // Act
        let state = OptState::seeded(MethodChoice::SteepestDescent, &par, &obj, config())
            .expect("valid state");

        // Assert
        assert_eq!(state.counts(), EvalCounts { nf: 1, ng: 1 });
        assert_eq!(state.cache().f, Some(2.0));
        assert_eq!(state.cache().g, Some(array![2.0, 2.0]));
        assert_eq!(state.best().map(|b| b.f), Some(Some(2.0)));
    }

    #[test]
    fn seeding_without_value_for_constant_step_methods() {
        let obj = sphere();
        let choice = "dbd".parse().expect("tag");
        let state = OptState::seeded(choice, &array![1.0], &obj, config()).expect("valid state");
        assert_eq!(state.counts(), EvalCounts { nf: 0, ng: 1 });
    }

    #[test]
    fn non_finite_seed_terminates_with_numerical_failure() {
        let obj = FnObjective::new(|_: &Point| f64::NAN, |x: &Point| x.clone());
        let state = OptState::seeded(MethodChoice::Bfgs, &array![1.0], &obj, config())
            .expect("construction itself succeeds");
        assert!(state.is_error());
        assert_eq!(state.reason(), Some(TerminationReason::NumericalFailure));
        assert!(state.error().is_some_and(|e| e.contains("non-finite")));
    }

    #[test]
    fn best_seen_prefers_function_value_over_gradient_norm() {
        let mut state =
            OptState::new(MethodChoice::SteepestDescent, &array![0.0], config()).expect("state");
        state.observe(None, Some(3.0));
        state.observe(None, Some(1.0));
        assert_eq!(state.best().and_then(|b| b.g2n), Some(1.0));
        state.observe(Some(10.0), None);
        assert_eq!(state.best().and_then(|b| b.f), Some(10.0));
        state.observe(None, Some(0.1));
        assert_eq!(state.best().and_then(|b| b.f), Some(10.0));
    }

    #[test]
    // Purpose
    // -------
    // Ensure a checkpoint whose BFGS inverse Hessian was swapped for one of
    // another size is refused on load instead of panicking in a later step.
    //
    // Given
    // -----
    // - A 2-D BFGS state serialized with a 3x3 inverse Hessian.
    //
    // Expect
    // ------
    // - `serde_json` reports an error naming `inv_hessian`.
    fn mis_sized_inverse_hessian_is_rejected_on_load() {
        // Arrange
        let mut state =
            OptState::new(MethodChoice::Bfgs, &array![1.0, 2.0], config()).expect("state");
        state.method = Method::Bfgs(Bfgs::new(3));
        let json = serde_json::to_string(&state).expect("serializes");

        // Act
        let res = serde_json::from_str::<OptState>(&json);

        // Assert
        let err = res.expect_err("mis-sized memory must be rejected");
        assert!(err.to_string().contains("inv_hessian"), "unexpected error: {err}");
    }

    #[test]
    fn validate_reports_mis_sized_cache_and_accepts_fresh_state() {
        let choice = MethodChoice::SteepestDescent;
        let mut state = OptState::new(choice, &array![1.0, 2.0], config()).expect("state");
        assert_eq!(state.validate(), Ok(()));

        state.cache.g = Some(array![1.0]);

        assert!(matches!(
            state.validate(),
            Err(OptError::InvalidState { field: "cache.g", .. })
        ));
    }
}
