//! Delta-bar-delta: per-parameter adaptive learning rates.
//!
//! Each coordinate keeps its own rate `eta_i` and an exponential trace of
//! past gradients `bar_i ← (1 − theta) g_i + theta · bar_i`. After a move,
//! when the new gradient agrees in sign with the trace the rate grows
//! additively by `kappa`; when it disagrees the rate shrinks by the factor
//! `1 − phi`. The direction is `d_i = −eta_i g_i`, used with a constant unit
//! step, optionally blended with constant momentum `mu`.
use serde::{Deserialize, Serialize};

use crate::optimization::{
    errors::OptResult,
    stepwise::{
        line_search::LineSearchOptions,
        methods::{DescentRule, Transition},
        types::{
            DEFAULT_DBD_EPSILON, DEFAULT_DBD_KAPPA, DEFAULT_DBD_PHI, DEFAULT_DBD_THETA, Grad,
            Point,
        },
        validation::{verify_positive, verify_state_len, verify_unit_interval},
    },
};

/// Delta-bar-delta constants.
///
/// - `kappa`: additive rate increase.
/// - `phi`: fractional rate decrease, in `[0, 1)`.
/// - `theta`: trace weight of past gradients, in `[0, 1)`.
/// - `epsilon`: initial rate for every coordinate.
/// - `mu`: constant momentum coefficient, in `[0, 1)`; `0` disables it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DbdParams {
    pub kappa: f64,
    pub phi: f64,
    pub theta: f64,
    pub epsilon: f64,
    pub mu: f64,
}

impl Default for DbdParams {
    fn default() -> Self {
        Self {
            kappa: DEFAULT_DBD_KAPPA,
            phi: DEFAULT_DBD_PHI,
            theta: DEFAULT_DBD_THETA,
            epsilon: DEFAULT_DBD_EPSILON,
            mu: 0.0,
        }
    }
}

impl DbdParams {
    fn validate(&self) -> OptResult<()> {
        verify_positive("kappa", self.kappa)?;
        verify_unit_interval("phi", self.phi)?;
        verify_unit_interval("theta", self.theta)?;
        verify_positive("epsilon", self.epsilon)?;
        verify_unit_interval("mu", self.mu)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaBarDelta {
    params: DbdParams,
    rates: Point,
    trace: Grad,
    velocity: Point,
}

impl DeltaBarDelta {
    /// # Errors
    /// `OptError::InvalidMethodParameter` for a constant out of range.
    pub fn new(params: DbdParams, dim: usize) -> OptResult<Self> {
        params.validate()?;
        Ok(Self {
            params,
            rates: Point::from_elem(dim, params.epsilon),
            trace: Grad::zeros(dim),
            velocity: Point::zeros(dim),
        })
    }

    pub fn rates(&self) -> &Point {
        &self.rates
    }
}

impl DescentRule for DeltaBarDelta {
    fn direction(&mut self, g: &Grad) -> Grad {
        -(&self.rates * g)
    }

    fn update(&mut self, t: &Transition<'_>) {
        let DbdParams { kappa, phi, theta, .. } = self.params;
        self.trace = t.g_old * (1.0 - theta) + &self.trace * theta;
        for ((rate, bar), g) in self.rates.iter_mut().zip(self.trace.iter()).zip(t.g_new.iter()) {
            let agreement = bar * g;
            if agreement > 0.0 {
                *rate += kappa;
            } else if agreement < 0.0 {
                *rate *= 1.0 - phi;
            }
        }
        self.velocity.assign(t.s);
    }

    fn reset(&mut self) {
        self.rates.fill(self.params.epsilon);
        self.trace.fill(0.0);
        self.velocity.fill(0.0);
    }

    fn has_memory(&self) -> bool {
        self.trace.iter().any(|v| *v != 0.0)
    }

    fn default_line_search(&self) -> LineSearchOptions {
        LineSearchOptions::constant(1.0)
    }

    fn inertia(&self, _iter: usize) -> Option<(f64, &Point)> {
        (self.params.mu > 0.0).then_some((self.params.mu, &self.velocity))
    }

    fn verify_dim(&self, dim: usize) -> OptResult<()> {
        self.params.validate()?;
        verify_state_len("dbd.rates", self.rates.len(), dim)?;
        verify_state_len("dbd.trace", self.trace.len(), dim)?;
        verify_state_len("dbd.velocity", self.velocity.len(), dim)
    }
}
