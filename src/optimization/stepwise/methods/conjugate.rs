//! Nonlinear conjugate gradient.
//!
//! Directions follow `d_k = −g_k + beta_k · d_{k−1}` with `beta_k` chosen by
//! [`CgUpdate`]. With `y = g_k − g_{k−1}`:
//!
//! | update  | `beta`                                                        |
//! |---------|---------------------------------------------------------------|
//! | FR      | `gᵀg / g_prevᵀg_prev`                                         |
//! | PR      | `gᵀy / g_prevᵀg_prev`                                         |
//! | HS      | `gᵀy / d_prevᵀy`                                              |
//! | DY      | `gᵀg / d_prevᵀy`                                              |
//! | HZ      | `(y − 2 d_prev ‖y‖² / d_prevᵀy)ᵀ g / d_prevᵀy`                |
//!
//! The `Plus` variants truncate: PR+ and HS+ at zero, HZ+ at
//! `−1 / (‖d_prev‖ · min(0.01, ‖g_prev‖))`.
//!
//! The method falls back to `−g` on the first iteration, every `dim`
//! iterations, and whenever a denominator degenerates. The step procedure
//! separately resets the memory when the combined direction is not a
//! descent direction.
use serde::{Deserialize, Serialize};

use crate::optimization::{
    errors::OptResult,
    numerical_stability::guards::{norm2, safe_ratio},
    stepwise::{
        line_search::LineSearchOptions,
        methods::{DescentRule, Transition},
        types::Grad,
        validation::verify_state_len,
    },
};

/// Beta formula for nonlinear conjugate gradient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CgUpdate {
    /// Fletcher–Reeves.
    FR,
    /// Polak–Ribière.
    PR,
    /// Polak–Ribière truncated at zero.
    #[default]
    PRPlus,
    /// Hestenes–Stiefel.
    HS,
    /// Hestenes–Stiefel truncated at zero.
    HSPlus,
    /// Dai–Yuan.
    DY,
    /// Hager–Zhang.
    HZ,
    /// Hager–Zhang with the lower bound `eta_k`.
    HZPlus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CgMemory {
    d_prev: Grad,
    g_prev: Grad,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConjugateGradient {
    update: CgUpdate,
    dim: usize,
    prev: Option<CgMemory>,
    beta: f64,
    since_restart: usize,
}

impl ConjugateGradient {
    pub fn new(update: CgUpdate, dim: usize) -> Self {
        Self { update, dim, prev: None, beta: 0.0, since_restart: 0 }
    }

    pub fn update_rule(&self) -> CgUpdate {
        self.update
    }

    /// `beta` used for the most recent direction (`0` after a restart).
    pub fn beta(&self) -> f64 {
        self.beta
    }

    fn compute_beta(&self, g: &Grad, mem: &CgMemory) -> f64 {
        let y = g - &mem.g_prev;
        let gg_prev = mem.g_prev.dot(&mem.g_prev);
        let dy = mem.d_prev.dot(&y);
        match self.update {
            CgUpdate::FR => safe_ratio(g.dot(g), gg_prev, 0.0),
            CgUpdate::PR => safe_ratio(g.dot(&y), gg_prev, 0.0),
            CgUpdate::PRPlus => safe_ratio(g.dot(&y), gg_prev, 0.0).max(0.0),
            CgUpdate::HS => safe_ratio(g.dot(&y), dy, 0.0),
            CgUpdate::HSPlus => safe_ratio(g.dot(&y), dy, 0.0).max(0.0),
            CgUpdate::DY => safe_ratio(g.dot(g), dy, 0.0),
            CgUpdate::HZ => hager_zhang(g, &y, &mem.d_prev, dy),
            CgUpdate::HZPlus => {
                let beta = hager_zhang(g, &y, &mem.d_prev, dy);
                let floor = norm2(&mem.d_prev) * norm2(&mem.g_prev).min(0.01);
                beta.max(safe_ratio(-1.0, floor, beta))
            }
        }
    }
}

fn hager_zhang(g: &Grad, y: &Grad, d_prev: &Grad, dy: f64) -> f64 {
    let yy = y.dot(y);
    let shift = safe_ratio(2.0 * yy, dy, 0.0);
    let v = y - &(d_prev * shift);
    safe_ratio(v.dot(g), dy, 0.0)
}

impl DescentRule for ConjugateGradient {
    fn direction(&mut self, g: &Grad) -> Grad {
        let beta = match &self.prev {
            Some(mem) if self.since_restart < self.dim => self.compute_beta(g, mem),
            _ => {
                self.since_restart = 0;
                0.0
            }
        };
        self.beta = if beta.is_finite() { beta } else { 0.0 };
        match &self.prev {
            Some(mem) if self.beta != 0.0 => &mem.d_prev * self.beta - g,
            _ => -g,
        }
    }

    fn update(&mut self, t: &Transition<'_>) {
        self.prev = Some(CgMemory { d_prev: t.d.clone(), g_prev: t.g_old.clone() });
        self.since_restart += 1;
    }

    fn reset(&mut self) {
        self.prev = None;
        self.beta = 0.0;
        self.since_restart = 0;
    }

    fn has_memory(&self) -> bool {
        self.prev.is_some()
    }

    fn default_line_search(&self) -> LineSearchOptions {
        LineSearchOptions::conjugate_gradient()
    }

    fn verify_dim(&self, dim: usize) -> OptResult<()> {
        verify_state_len("cg.dim", self.dim, dim)?;
        if let Some(mem) = &self.prev {
            verify_state_len("cg.d_prev", mem.d_prev.len(), dim)?;
            verify_state_len("cg.g_prev", mem.g_prev.len(), dim)?;
        }
        Ok(())
    }
}
