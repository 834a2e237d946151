//! Gradient descent with momentum.
//!
//! Each step moves by `alpha · (−g) + mu_t · v`, where `alpha` comes from the
//! line search along `−g`, `v` is the previous displacement, and `mu_t` is
//! given by the [`MomentumSchedule`]. A [`RestartPolicy`] can discard the
//! move and zero the velocity when it goes the wrong way.
//!
//! This is heavy-ball momentum for every schedule. The `"nag"` tag pairs it
//! with Nesterov's coefficient sequence and gradient restarts; the gradient
//! is always taken at the current Point, never at a look-ahead Point.
use serde::{Deserialize, Serialize};

use crate::optimization::{
    errors::OptResult,
    stepwise::{
        line_search::LineSearchOptions,
        methods::{DescentRule, Transition},
        types::{Grad, Point},
        validation::{verify_state_len, verify_unit_interval},
    },
};

/// Cap on the Nesterov-schedule coefficient used by the `"nag"` tag.
pub const DEFAULT_NESTEROV_MU_MAX: f64 = 0.999;

/// Momentum coefficient per iteration.
///
/// - `Constant { mu }`: `mu_t = mu`.
/// - `NesterovSchedule { mu_max }`: `mu_t = min(1 − 3 / (t + 5), mu_max)`,
///   the coefficient sequence of Nesterov's accelerated gradient. Only the
///   coefficients are borrowed; the update itself stays heavy-ball.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MomentumSchedule {
    Constant { mu: f64 },
    NesterovSchedule { mu_max: f64 },
}

impl MomentumSchedule {
    pub fn nesterov_schedule() -> Self {
        MomentumSchedule::NesterovSchedule { mu_max: DEFAULT_NESTEROV_MU_MAX }
    }

    /// Coefficient at iteration `t`.
    pub fn mu(&self, t: usize) -> f64 {
        match *self {
            MomentumSchedule::Constant { mu } => mu,
            MomentumSchedule::NesterovSchedule { mu_max } => {
                (1.0 - 3.0 / (t as f64 + 5.0)).min(mu_max)
            }
        }
    }

    fn validate(&self) -> OptResult<()> {
        match *self {
            MomentumSchedule::Constant { mu } => verify_unit_interval("mu", mu),
            MomentumSchedule::NesterovSchedule { mu_max } => {
                verify_unit_interval("mu_max", mu_max)
            }
        }
    }
}

/// When to discard a momentum step.
///
/// - `None`: never.
/// - `Fn`: the function value increased.
/// - `Gr`: the new gradient has a positive component along the displacement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartPolicy {
    #[default]
    None,
    Fn,
    Gr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Momentum {
    schedule: MomentumSchedule,
    restart: RestartPolicy,
    velocity: Point,
}

impl Momentum {
    /// # Errors
    /// `OptError::InvalidMethodParameter` when the coefficient lies outside `[0, 1)`.
    pub fn new(schedule: MomentumSchedule, restart: RestartPolicy, dim: usize) -> OptResult<Self> {
        schedule.validate()?;
        Ok(Self { schedule, restart, velocity: Point::zeros(dim) })
    }

    pub fn schedule(&self) -> MomentumSchedule {
        self.schedule
    }

    pub fn velocity(&self) -> &Point {
        &self.velocity
    }

    pub fn tag(&self) -> &'static str {
        match self.schedule {
            MomentumSchedule::NesterovSchedule { .. } => "nag",
            MomentumSchedule::Constant { .. } => "momentum",
        }
    }
}

impl DescentRule for Momentum {
    fn direction(&mut self, g: &Grad) -> Grad {
        -g
    }

    fn update(&mut self, t: &Transition<'_>) {
        self.velocity.assign(t.s);
    }

    fn reset(&mut self) {
        self.velocity.fill(0.0);
    }

    fn has_memory(&self) -> bool {
        self.velocity.iter().any(|v| *v != 0.0)
    }

    fn default_line_search(&self) -> LineSearchOptions {
        LineSearchOptions::backtracking()
    }

    fn inertia(&self, iter: usize) -> Option<(f64, &Point)> {
        Some((self.schedule.mu(iter), &self.velocity))
    }

    fn restart_policy(&self) -> RestartPolicy {
        self.restart
    }

    fn verify_dim(&self, dim: usize) -> OptResult<()> {
        self.schedule.validate()?;
        verify_state_len("momentum.velocity", self.velocity.len(), dim)
    }
}
