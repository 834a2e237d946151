//! stepwise::line_search — budget-aware one-dimensional searches.
//!
//! Purpose
//! -------
//! Turn a descent direction `d` at a Point `x` into an accepted step length
//! `alpha`, calling the oracle only through an [`EvalGate`] so evaluation
//! budgets hold even in the middle of a search.
//!
//! Key behaviors
//! -------------
//! - [`LineSearcher::Backtracking`]: Armijo backtracking, contracting the
//!   trial by `rho` until sufficient decrease holds.
//! - [`LineSearcher::StrongWolfe`]: bracketing with step doubling followed by
//!   a zoom phase using safeguarded quadratic interpolation (10% margin from
//!   each bracket end, bisection fallback). Gradients are only requested at
//!   trials that already satisfy sufficient decrease.
//! - [`LineSearcher::Constant`]: no oracle calls; the step is `step · d`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Callers pass a descent direction (`g0 · d < 0`). A non-descent
//!   direction yields a zero step without any evaluation.
//! - On a gate refusal or after `max_evals` function trials, the best
//!   sufficient-decrease point seen so far is returned, else a zero step.
//!
//! Conventions
//! -----------
//! - A zero step is reported as `alpha == 0.0` with `f` and `g` unset; the
//!   step procedure then decides between a plain zero step, a restart, or a
//!   budget-blocked step.
//! - The first non-finite function value or gradient component met at any
//!   trial stops the search at once and is described in
//!   `LineSearchOutcome::non_finite`; the step procedure turns it into a
//!   numerical failure.
//!
//! Testing notes
//! -------------
//! - Unit tests use a 1-D quadratic where each phase of the strong Wolfe
//!   search can be traced by hand.
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::optimization::{
    errors::{OptError, OptResult},
    numerical_stability::guards::first_non_finite,
    stepwise::{
        adapter::EvalGate,
        traits::Objective,
        types::{
            Cost, DEFAULT_C1, DEFAULT_C2_CG, DEFAULT_C2_QUASI_NEWTON, DEFAULT_MAX_LS_EVALS,
            DEFAULT_RHO, Grad, Point,
        },
    },
};

/// Choice of line-search algorithm.
///
/// Parsing is case-insensitive and accepts `"backtracking"` (or
/// `"armijo"`), `"strong-wolfe"` (or `"strongwolfe"`, `"wolfe"`), and
/// `"constant"` (or `"fixed"`). Unknown names return
/// `OptError::InvalidLineSearch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineSearcher {
    Backtracking,
    StrongWolfe,
    Constant,
}

impl LineSearcher {
    /// `true` when the search needs `f` at the starting Point.
    pub fn needs_value(&self) -> bool {
        !matches!(self, LineSearcher::Constant)
    }
}

impl FromStr for LineSearcher {
    type Err = OptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "backtracking" | "armijo" => Ok(LineSearcher::Backtracking),
            "strong-wolfe" | "strongwolfe" | "wolfe" => Ok(LineSearcher::StrongWolfe),
            "constant" | "fixed" => Ok(LineSearcher::Constant),
            _ => Err(OptError::InvalidLineSearch {
                name: s.to_string(),
                reason: "Valid options are case insensitive 'backtracking', 'strong-wolfe' or 'constant'.",
            }),
        }
    }
}

/// Line-search constants.
///
/// Fields:
/// - `searcher`: algorithm.
/// - `c1`: sufficient-decrease constant, `0 < c1 < 1`.
/// - `c2`: curvature constant for strong Wolfe, `c1 < c2 < 1`.
/// - `rho`: backtracking contraction, `0 < rho < 1`.
/// - `max_evals`: cap on function trials per search, at least one.
/// - `step`: fixed step length for [`LineSearcher::Constant`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSearchOptions {
    pub searcher: LineSearcher,
    pub c1: f64,
    pub c2: f64,
    pub rho: f64,
    pub max_evals: usize,
    pub step: f64,
}

impl Default for LineSearchOptions {
    fn default() -> Self {
        Self::backtracking()
    }
}

impl LineSearchOptions {
    /// Armijo backtracking with `c1 = 1e-4`, `rho = 0.5`.
    pub fn backtracking() -> Self {
        Self {
            searcher: LineSearcher::Backtracking,
            c1: DEFAULT_C1,
            c2: DEFAULT_C2_QUASI_NEWTON,
            rho: DEFAULT_RHO,
            max_evals: DEFAULT_MAX_LS_EVALS,
            step: 1.0,
        }
    }

    /// Strong Wolfe search with curvature constant `c2`.
    pub fn strong_wolfe(c2: f64) -> Self {
        Self { searcher: LineSearcher::StrongWolfe, c2, ..Self::backtracking() }
    }

    /// Strong Wolfe with the loose curvature condition used by quasi-Newton methods.
    pub fn quasi_newton() -> Self {
        Self::strong_wolfe(DEFAULT_C2_QUASI_NEWTON)
    }

    /// Strong Wolfe with the tight curvature condition used by conjugate gradient.
    pub fn conjugate_gradient() -> Self {
        Self::strong_wolfe(DEFAULT_C2_CG)
    }

    /// Fixed step length `step`.
    pub fn constant(step: f64) -> Self {
        Self { searcher: LineSearcher::Constant, step, ..Self::backtracking() }
    }

    /// Validate the constants relevant to `searcher`.
    ///
    /// # Errors
    /// - `OptError::InvalidLineSearchParameter` naming the offending constant.
    pub fn validate(&self) -> OptResult<()> {
        match self.searcher {
            LineSearcher::Constant => {
                if !self.step.is_finite() || self.step <= 0.0 {
                    return Err(invalid("step", self.step, "Step must be finite and positive."));
                }
            }
            LineSearcher::Backtracking | LineSearcher::StrongWolfe => {
                if !(self.c1 > 0.0 && self.c1 < 1.0) {
                    return Err(invalid("c1", self.c1, "c1 must lie in (0, 1)."));
                }
                if self.max_evals == 0 {
                    return Err(invalid("max_evals", 0.0, "At least one trial is required."));
                }
            }
        }
        if self.searcher == LineSearcher::Backtracking && !(self.rho > 0.0 && self.rho < 1.0) {
            return Err(invalid("rho", self.rho, "rho must lie in (0, 1)."));
        }
        if self.searcher == LineSearcher::StrongWolfe && !(self.c2 > self.c1 && self.c2 < 1.0) {
            return Err(invalid("c2", self.c2, "c2 must lie in (c1, 1)."));
        }
        Ok(())
    }

    /// Search along `d` from `x`.
    ///
    /// Parameters
    /// ----------
    /// - `gate`: evaluation gate carrying the remaining budget.
    /// - `x`, `d`: starting Point and descent direction.
    /// - `f0`: `f(x)`; required by every searcher except `Constant`.
    /// - `g0`: `∇f(x)`.
    /// - `alpha0`: initial trial length (ignored by `Constant`).
    ///
    /// Errors
    /// ------
    /// - `OptError::DimensionMismatch` when the oracle returns a gradient of
    ///   the wrong length.
    pub fn search<O: Objective + ?Sized>(
        &self, gate: &mut EvalGate<'_, O>, x: &Point, d: &Grad, f0: Option<Cost>, g0: &Grad,
        alpha0: f64,
    ) -> OptResult<LineSearchOutcome> {
        if self.searcher == LineSearcher::Constant {
            return Ok(LineSearchOutcome { alpha: self.step, ..LineSearchOutcome::zero() });
        }
        let slope = g0.dot(d);
        let Some(f0) = f0 else {
            return Ok(LineSearchOutcome::zero());
        };
        if !(slope < 0.0) || !f0.is_finite() {
            return Ok(LineSearchOutcome::zero());
        }
        let mut ray = Ray { x, d, f0, slope, opts: self, tally: Tally::default() };
        let found = match self.searcher {
            LineSearcher::Backtracking => ray.backtrack(gate, alpha0),
            _ => ray.wolfe(gate, alpha0)?,
        };
        Ok(ray.tally.finish(found))
    }
}

fn invalid(name: &'static str, value: f64, reason: &'static str) -> OptError {
    OptError::InvalidLineSearchParameter { name, value, reason }
}

/// Result of one line search.
///
/// `f` and `g` are the values at `x + alpha · d` when the search computed
/// them; either may be `None` (e.g. after a gradient refusal, or for
/// backtracking, which never requests gradients).
///
/// `non_finite` describes the first non-finite value the search produced;
/// when set, `alpha` is zero and `f` / `g` are unset.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSearchOutcome {
    pub alpha: f64,
    pub f: Option<Cost>,
    pub g: Option<Grad>,
    pub trials: usize,
    pub non_finite: Option<String>,
}

impl LineSearchOutcome {
    pub fn zero() -> Self {
        Self { alpha: 0.0, f: None, g: None, trials: 0, non_finite: None }
    }
}

type Found = Option<(f64, Cost, Option<Grad>)>;

#[derive(Debug, Default)]
struct Tally {
    trials: usize,
    non_finite: Option<String>,
    best: Option<(f64, Cost, Grad)>,
}

impl Tally {
    fn consider(&mut self, a: f64, f: Cost, g: &Grad) {
        if self.best.as_ref().map_or(true, |(_, fb, _)| f < *fb) {
            self.best = Some((a, f, g.clone()));
        }
    }

    fn fallback(&mut self) -> Found {
        self.best.take().map(|(a, f, g)| (a, f, Some(g)))
    }

    fn finish(self, found: Found) -> LineSearchOutcome {
        let trials = self.trials;
        match (self.non_finite, found) {
            (Some(what), _) => {
                LineSearchOutcome { trials, non_finite: Some(what), ..LineSearchOutcome::zero() }
            }
            (None, Some((alpha, f, g))) => {
                LineSearchOutcome { alpha, f: Some(f), g, trials, non_finite: None }
            }
            (None, None) => LineSearchOutcome { trials, ..LineSearchOutcome::zero() },
        }
    }
}

/// The search ray `x + a · d` with its acceptance constants.
struct Ray<'p> {
    x: &'p Point,
    d: &'p Grad,
    f0: Cost,
    slope: f64,
    opts: &'p LineSearchOptions,
    tally: Tally,
}

impl Ray<'_> {
    fn at(&self, a: f64) -> Point {
        self.x + &(self.d * a)
    }

    fn sufficient(&self, a: f64, f: Cost) -> bool {
        f.is_finite() && f <= self.f0 + self.opts.c1 * a * self.slope
    }

    fn curvature(&self, dphi: f64) -> bool {
        dphi.abs() <= -self.opts.c2 * self.slope
    }

    fn exhausted(&self) -> bool {
        self.tally.trials >= self.opts.max_evals
    }

    /// Function value at `alpha = a`; `None` on a gate refusal or a
    /// non-finite value, the latter recorded in the tally.
    fn trial<O: Objective + ?Sized>(&mut self, gate: &mut EvalGate<'_, O>, a: f64) -> Option<Cost> {
        let f = gate.value(&self.at(a))?;
        self.tally.trials += 1;
        if !f.is_finite() {
            self.tally.non_finite =
                Some(format!("non-finite function value {f} at line-search trial alpha = {a}"));
            return None;
        }
        Some(f)
    }

    /// Record a non-finite gradient component at `alpha = a`. Returns `true`
    /// when the search must stop.
    fn blown_gradient(&mut self, a: f64, g: &Grad) -> bool {
        let Some((idx, val)) = first_non_finite(g) else {
            return false;
        };
        self.tally.non_finite = Some(format!(
            "non-finite gradient component {idx} = {val} at line-search trial alpha = {a}"
        ));
        true
    }

    fn backtrack<O: Objective + ?Sized>(
        &mut self, gate: &mut EvalGate<'_, O>, alpha0: f64,
    ) -> Found {
        let mut a = alpha0;
        while !self.exhausted() {
            let f = self.trial(gate, a)?;
            if self.sufficient(a, f) {
                return Some((a, f, None));
            }
            a *= self.opts.rho;
        }
        None
    }

    fn wolfe<O: Objective + ?Sized>(
        &mut self, gate: &mut EvalGate<'_, O>, alpha0: f64,
    ) -> OptResult<Found> {
        let (mut a_prev, mut f_prev, mut d_prev) = (0.0, self.f0, self.slope);
        let mut a = alpha0;
        let mut first = true;
        while !self.exhausted() {
            let Some(f) = self.trial(gate, a) else {
                return Ok(self.tally.fallback());
            };
            if !self.sufficient(a, f) || (!first && f >= f_prev) {
                let bracket = Bracket { lo: a_prev, hi: a, f_lo: f_prev, d_lo: d_prev, f_hi: f };
                return self.zoom(gate, bracket);
            }
            let Some(g) = gate.gradient(&self.at(a))? else {
                return Ok(Some((a, f, None)));
            };
            if self.blown_gradient(a, &g) {
                return Ok(None);
            }
            let dphi = g.dot(self.d);
            if self.curvature(dphi) {
                return Ok(Some((a, f, Some(g))));
            }
            self.tally.consider(a, f, &g);
            if dphi >= 0.0 {
                let bracket = Bracket { lo: a, hi: a_prev, f_lo: f, d_lo: dphi, f_hi: f_prev };
                return self.zoom(gate, bracket);
            }
            (a_prev, f_prev, d_prev) = (a, f, dphi);
            a *= 2.0;
            first = false;
        }
        Ok(self.tally.fallback())
    }

    fn zoom<O: Objective + ?Sized>(
        &mut self, gate: &mut EvalGate<'_, O>, mut br: Bracket,
    ) -> OptResult<Found> {
        while !self.exhausted() {
            let a = br.interpolate();
            let Some(f) = self.trial(gate, a) else {
                break;
            };
            if !self.sufficient(a, f) || f >= br.f_lo {
                br.hi = a;
                br.f_hi = f;
                continue;
            }
            let Some(g) = gate.gradient(&self.at(a))? else {
                return Ok(Some((a, f, None)));
            };
            if self.blown_gradient(a, &g) {
                return Ok(None);
            }
            let dphi = g.dot(self.d);
            if self.curvature(dphi) {
                return Ok(Some((a, f, Some(g))));
            }
            self.tally.consider(a, f, &g);
            if dphi * (br.hi - br.lo) >= 0.0 {
                br.hi = br.lo;
                br.f_hi = br.f_lo;
            }
            br.lo = a;
            br.f_lo = f;
            br.d_lo = dphi;
        }
        Ok(self.tally.fallback())
    }
}

/// Zoom bracket: `lo` always satisfies sufficient decrease with the lowest
/// value seen so far; `hi` may lie on either side of `lo`.
#[derive(Debug, Clone, Copy)]
struct Bracket {
    lo: f64,
    hi: f64,
    f_lo: Cost,
    d_lo: f64,
    f_hi: Cost,
}

impl Bracket {
    /// Minimizer of the quadratic through `(lo, f_lo)` with slope `d_lo`
    /// and `(hi, f_hi)`, kept at least 10% of the bracket away from either
    /// end; bisection otherwise.
    fn interpolate(&self) -> f64 {
        let span = self.hi - self.lo;
        let mid = 0.5 * (self.lo + self.hi);
        if !self.f_hi.is_finite() {
            return mid;
        }
        let den = 2.0 * (self.f_hi - self.f_lo - self.d_lo * span);
        if !(den > 0.0) {
            return mid;
        }
        let a = self.lo - self.d_lo * span * span / den;
        let pad = 0.1 * span.abs();
        let (a_min, a_max) = (self.lo.min(self.hi), self.lo.max(self.hi));
        if a.is_finite() && a >= a_min + pad && a <= a_max - pad { a } else { mid }
    }
}
