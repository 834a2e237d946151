//! stepwise::methods — direction rules and their serializable memory.
//!
//! Purpose
//! -------
//! Define the closed family of optimization methods. [`MethodChoice`] is the
//! caller-facing selector (parseable from short tags), and [`Method`] is the
//! per-run value carrying each method's private memory inside the optimizer
//! state.
//!
//! Key behaviors
//! -------------
//! - [`MethodChoice::build`] validates method parameters and allocates memory
//!   sized to the problem dimension.
//! - Every memory type implements the crate-internal [`DescentRule`] seam:
//!   produce a direction from the current gradient, absorb a completed
//!   transition, reset to the freshly initialized memory.
//! - Momentum-style methods additionally expose an inertia term
//!   (`mu · velocity`) that the step procedure blends with the line-search
//!   displacement.
//!
//! Invariants & assumptions
//! ------------------------
//! - Memory is sized once from `dim` and never resized.
//! - `reset` restores exactly the memory `build` would produce, so a
//!   restarted method behaves like a fresh one.
//!
//! Conventions
//! -----------
//! - Tags accepted by `FromStr` (case-insensitive): `"sd"`, `"cg"`,
//!   `"bfgs"`, `"l-bfgs"` / `"lbfgs"`, `"mom"` / `"momentum"`, `"nag"`,
//!   `"dbd"`.
//!
//! Testing notes
//! -------------
//! - Each method module tests its own update rule; this module tests
//!   parsing, parameter validation, and dispatch.
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::optimization::{
    errors::{OptError, OptResult},
    stepwise::{
        line_search::LineSearchOptions,
        types::{DEFAULT_LBFGS_MEM, DEFAULT_MOMENTUM, Grad, Point},
    },
};

pub mod bfgs;
pub mod conjugate;
pub mod delta_bar_delta;
pub mod lbfgs;
pub mod momentum;
pub mod steepest;

pub use self::{
    bfgs::Bfgs,
    conjugate::{CgUpdate, ConjugateGradient},
    delta_bar_delta::{DbdParams, DeltaBarDelta},
    lbfgs::Lbfgs,
    momentum::{Momentum, MomentumSchedule, RestartPolicy},
    steepest::SteepestDescent,
};

/// One completed move, as seen by a memory update.
///
/// - `d`: direction handed to the line search.
/// - `s`: displacement actually applied (`x_new − x_old`).
/// - `g_old`, `g_new`: gradients at both ends.
#[derive(Debug, Clone, Copy)]
pub struct Transition<'a> {
    pub d: &'a Grad,
    pub s: &'a Point,
    pub g_old: &'a Grad,
    pub g_new: &'a Grad,
}

impl Transition<'_> {
    /// Gradient change `y = g_new − g_old`.
    pub fn y(&self) -> Grad {
        self.g_new - self.g_old
    }
}

/// Direction/update/reset seam implemented by every method's memory.
pub(crate) trait DescentRule {
    /// Search direction for gradient `g`. May record bookkeeping (e.g. the
    /// CG beta) in the memory.
    fn direction(&mut self, g: &Grad) -> Grad;

    /// Absorb a completed transition.
    fn update(&mut self, t: &Transition<'_>);

    /// Return to the freshly built memory.
    fn reset(&mut self);

    /// `true` when the memory currently carries information a reset would lose.
    fn has_memory(&self) -> bool;

    /// Line search used when the configuration does not override it.
    fn default_line_search(&self) -> LineSearchOptions;

    /// `true` when the direction is already scaled so that a unit step is
    /// the natural first trial (quasi-Newton methods).
    fn unit_step(&self) -> bool {
        false
    }

    /// Momentum coefficient and velocity to blend into the displacement.
    fn inertia(&self, _iter: usize) -> Option<(f64, &Point)> {
        None
    }

    fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy::None
    }

    /// Check that restored memory fits a `dim`-dimensional problem and that
    /// its parameters are still in range.
    fn verify_dim(&self, _dim: usize) -> OptResult<()> {
        Ok(())
    }
}

/// Caller-facing method selector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MethodChoice {
    SteepestDescent,
    ConjugateGradient { update: CgUpdate },
    Bfgs,
    Lbfgs { memory: usize },
    Momentum { schedule: MomentumSchedule, restart: RestartPolicy },
    DeltaBarDelta(DbdParams),
}

impl MethodChoice {
    /// Short tag naming the method family.
    pub fn tag(&self) -> &'static str {
        match self {
            MethodChoice::SteepestDescent => "sd",
            MethodChoice::ConjugateGradient { .. } => "cg",
            MethodChoice::Bfgs => "bfgs",
            MethodChoice::Lbfgs { .. } => "l-bfgs",
            MethodChoice::Momentum {
                schedule: MomentumSchedule::NesterovSchedule { .. }, ..
            } => "nag",
            MethodChoice::Momentum { .. } => "momentum",
            MethodChoice::DeltaBarDelta(_) => "dbd",
        }
    }

    /// Validate parameters and allocate memory for a `dim`-dimensional problem.
    ///
    /// # Errors
    /// - `OptError::InvalidMethodParameter` for an L-BFGS memory of zero,
    ///   a momentum coefficient outside `[0, 1)`, or invalid delta-bar-delta
    ///   constants.
    pub fn build(&self, dim: usize) -> OptResult<Method> {
        let method = match *self {
            MethodChoice::SteepestDescent => Method::SteepestDescent(SteepestDescent),
            MethodChoice::ConjugateGradient { update } => {
                Method::ConjugateGradient(ConjugateGradient::new(update, dim))
            }
            MethodChoice::Bfgs => Method::Bfgs(Bfgs::new(dim)),
            MethodChoice::Lbfgs { memory } => Method::Lbfgs(Lbfgs::new(memory, dim)?),
            MethodChoice::Momentum { schedule, restart } => {
                Method::Momentum(Momentum::new(schedule, restart, dim)?)
            }
            MethodChoice::DeltaBarDelta(params) => {
                Method::DeltaBarDelta(DeltaBarDelta::new(params, dim)?)
            }
        };
        Ok(method)
    }
}

impl FromStr for MethodChoice {
    type Err = OptError;

    /// Parse a method tag (case-insensitive) into its default configuration.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sd" | "steepest" => Ok(MethodChoice::SteepestDescent),
            "cg" => Ok(MethodChoice::ConjugateGradient { update: CgUpdate::default() }),
            "bfgs" => Ok(MethodChoice::Bfgs),
            "l-bfgs" | "lbfgs" => Ok(MethodChoice::Lbfgs { memory: DEFAULT_LBFGS_MEM }),
            "mom" | "momentum" => Ok(MethodChoice::Momentum {
                schedule: MomentumSchedule::Constant { mu: DEFAULT_MOMENTUM },
                restart: RestartPolicy::None,
            }),
            "nag" => Ok(MethodChoice::Momentum {
                schedule: MomentumSchedule::nesterov_schedule(),
                restart: RestartPolicy::Gr,
            }),
            "dbd" => Ok(MethodChoice::DeltaBarDelta(DbdParams::default())),
            _ => Err(OptError::InvalidMethod {
                name: s.to_string(),
                reason: "Valid options are case insensitive 'sd', 'cg', 'bfgs', 'l-bfgs', 'mom', 'nag' or 'dbd'.",
            }),
        }
    }
}

/// Method plus its private memory, stored inside the optimizer state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Method {
    SteepestDescent(SteepestDescent),
    ConjugateGradient(ConjugateGradient),
    Bfgs(Bfgs),
    Lbfgs(Lbfgs),
    Momentum(Momentum),
    DeltaBarDelta(DeltaBarDelta),
}

impl Method {
    pub fn tag(&self) -> &'static str {
        match self {
            Method::SteepestDescent(_) => "sd",
            Method::ConjugateGradient(_) => "cg",
            Method::Bfgs(_) => "bfgs",
            Method::Lbfgs(_) => "l-bfgs",
            Method::Momentum(m) => m.tag(),
            Method::DeltaBarDelta(_) => "dbd",
        }
    }

    pub(crate) fn rule(&self) -> &dyn DescentRule {
        match self {
            Method::SteepestDescent(m) => m,
            Method::ConjugateGradient(m) => m,
            Method::Bfgs(m) => m,
            Method::Lbfgs(m) => m,
            Method::Momentum(m) => m,
            Method::DeltaBarDelta(m) => m,
        }
    }

    pub(crate) fn rule_mut(&mut self) -> &mut dyn DescentRule {
        match self {
            Method::SteepestDescent(m) => m,
            Method::ConjugateGradient(m) => m,
            Method::Bfgs(m) => m,
            Method::Lbfgs(m) => m,
            Method::Momentum(m) => m,
            Method::DeltaBarDelta(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_parse_case_insensitively() {
        assert_eq!("BFGS".parse::<MethodChoice>(), Ok(MethodChoice::Bfgs));
        assert_eq!(
            "LBFGS".parse::<MethodChoice>(),
            Ok(MethodChoice::Lbfgs { memory: DEFAULT_LBFGS_MEM })
        );
        assert_eq!("l-bfgs".parse::<MethodChoice>().map(|m| m.tag()), Ok("l-bfgs"));
        assert_eq!("Mom".parse::<MethodChoice>().map(|m| m.tag()), Ok("momentum"));
        assert_eq!("nag".parse::<MethodChoice>().map(|m| m.tag()), Ok("nag"));
        assert_eq!("dbd".parse::<MethodChoice>().map(|m| m.tag()), Ok("dbd"));
        assert_eq!("Sd".parse::<MethodChoice>(), Ok(MethodChoice::SteepestDescent));
    }

    #[test]
    // Purpose
    // -------
    // Ensure unknown tags are rejected at parse time.
    //
    // Given
    // -----
    // - The tag `"newton"`.
    //
    // Expect
    // ------
    // - `OptError::InvalidMethod` carrying the original text.
    fn unknown_tag_is_invalid_method() {
        // Arrange
        let tag = "newton";

        // Act
        let res = tag.parse::<MethodChoice>();

        // Assert
        match res {
            Err(OptError::InvalidMethod { name, .. }) => assert_eq!(name, "newton"),
            other => panic!("expected InvalidMethod, got {other:?}"),
        }
    }

    #[test]
    fn build_rejects_zero_lbfgs_memory() {
        let res = MethodChoice::Lbfgs { memory: 0 }.build(3);
        assert!(matches!(res, Err(OptError::InvalidMethodParameter { name: "memory", .. })));
    }

    #[test]
    fn default_line_searches_follow_method_family() {
        use crate::optimization::stepwise::line_search::LineSearcher;

        let ls = |tag: &str| {
            let method = tag.parse::<MethodChoice>().expect("tag").build(2).expect("build");
            let opts = method.rule().default_line_search();
            (opts.searcher, opts.c2)
        };

        assert_eq!(ls("bfgs"), (LineSearcher::StrongWolfe, 0.9));
        assert_eq!(ls("l-bfgs"), (LineSearcher::StrongWolfe, 0.9));
        assert_eq!(ls("cg"), (LineSearcher::StrongWolfe, 0.1));
        assert_eq!(ls("sd").0, LineSearcher::Backtracking);
        assert_eq!(ls("mom").0, LineSearcher::Backtracking);
        assert_eq!(ls("dbd").0, LineSearcher::Constant);
    }
}
