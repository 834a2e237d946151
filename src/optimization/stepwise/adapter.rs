//! Oracle adapters: closure objectives and the counting evaluation gate.
//!
//! Two pieces live here:
//!
//! - [`FnObjective`] bridges a pair of closures `(f, g)` to the
//!   [`Objective`] trait, so callers can drive the optimizer without defining
//!   a type.
//! - [`EvalGate`] is the **only** place in the crate that invokes the
//!   oracle. It counts every call into [`EvalCounts`] and refuses any call
//!   that would exceed the configured `max_fn`, `max_gr`, or `max_fg`
//!   budgets. The step procedure, line search, and convergence evaluator all
//!   borrow a gate instead of calling the objective directly, which keeps
//!   budget accounting in one source of truth.
use serde::{Deserialize, Serialize};

use crate::optimization::{
    errors::{OptError, OptResult},
    stepwise::{
        traits::{Objective, Tolerances},
        types::{Cost, Grad, Point},
    },
};

/// Function and gradient evaluation counters.
///
/// Both counters are monotonically non-decreasing over the lifetime of a
/// state lineage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalCounts {
    pub nf: usize,
    pub ng: usize,
}

impl EvalCounts {
    /// Combined evaluations, as compared against `max_fg`.
    pub fn total(&self) -> usize {
        self.nf + self.ng
    }
}

/// Adapts a pair of closures to [`Objective`].
///
/// - `f`: `Fn(&Point) -> Cost`
/// - `g`: `Fn(&Point) -> Grad`
#[derive(Debug, Clone)]
pub struct FnObjective<F, G> {
    f: F,
    g: G,
}

impl<F, G> FnObjective<F, G>
where
    F: Fn(&Point) -> Cost,
    G: Fn(&Point) -> Grad,
{
    pub fn new(f: F, g: G) -> Self {
        Self { f, g }
    }
}

impl<F, G> Objective for FnObjective<F, G>
where
    F: Fn(&Point) -> Cost,
    G: Fn(&Point) -> Grad,
{
    fn value(&self, par: &Point) -> Cost {
        (self.f)(par)
    }

    fn gradient(&self, par: &Point) -> Grad {
        (self.g)(par)
    }
}

/// Budget-enforcing, counting front door to the oracle.
///
/// A gate is created from the state's current counters and budgets at the
/// start of a step or convergence evaluation; afterwards the caller writes
/// [`EvalGate::counts`] back into the state.
///
/// Refusals are sticky in [`EvalGate::refused`] so callers can tell budget
/// exhaustion apart from an ordinary failed search.
#[derive(Debug)]
pub struct EvalGate<'a, O: Objective + ?Sized> {
    objective: &'a O,
    counts: EvalCounts,
    max_fn: Option<usize>,
    max_gr: Option<usize>,
    max_fg: Option<usize>,
    refused: bool,
}

impl<'a, O: Objective + ?Sized> EvalGate<'a, O> {
    pub fn new(objective: &'a O, counts: EvalCounts, tols: &Tolerances) -> Self {
        Self {
            objective,
            counts,
            max_fn: tols.max_fn,
            max_gr: tols.max_gr,
            max_fg: tols.max_fg,
            refused: false,
        }
    }

    /// `true` when one more function evaluation fits the budget.
    pub fn can_value(&self) -> bool {
        within(self.counts.nf, self.max_fn) && within(self.counts.total(), self.max_fg)
    }

    /// `true` when one more gradient evaluation fits the budget.
    pub fn can_gradient(&self) -> bool {
        within(self.counts.ng, self.max_gr) && within(self.counts.total(), self.max_fg)
    }

    /// Evaluate `f(par)`, or `None` if the budget forbids it.
    pub fn value(&mut self, par: &Point) -> Option<Cost> {
        if !self.can_value() {
            self.refuse("function");
            return None;
        }
        self.counts.nf += 1;
        Some(self.objective.value(par))
    }

    /// Evaluate `∇f(par)`, or `Ok(None)` if the budget forbids it.
    ///
    /// # Errors
    /// - [`OptError::DimensionMismatch`] when the oracle returns a gradient
    ///   whose length differs from `par.len()`. The call is still counted.
    pub fn gradient(&mut self, par: &Point) -> OptResult<Option<Grad>> {
        if !self.can_gradient() {
            self.refuse("gradient");
            return Ok(None);
        }
        self.counts.ng += 1;
        let g = self.objective.gradient(par);
        if g.len() != par.len() {
            return Err(OptError::DimensionMismatch { expected: par.len(), found: g.len() });
        }
        Ok(Some(g))
    }

    pub fn counts(&self) -> EvalCounts {
        self.counts
    }

    pub fn refused(&self) -> bool {
        self.refused
    }

    fn refuse(&mut self, what: &'static str) {
        if !self.refused {
            tracing::debug!(
                what,
                nf = self.counts.nf,
                ng = self.counts.ng,
                "evaluation budget exhausted; refusing oracle call"
            );
        }
        self.refused = true;
    }
}

fn within(used: usize, cap: Option<usize>) -> bool {
    cap.map_or(true, |cap| used < cap)
}
