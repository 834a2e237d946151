//! BFGS with a dense inverse-Hessian approximation.
//!
//! The inverse Hessian `H` starts at the identity. On the first accepted
//! secant pair it is rescaled to `(sᵀy / yᵀy) · I` before the rank-2 update
//!
//! `H ← H + ρ ((1 + ρ yᵀHy) s sᵀ − H y sᵀ − s (H y)ᵀ)`, `ρ = 1 / sᵀy`,
//!
//! which keeps `H` symmetric positive definite as long as `sᵀy > 0`. Pairs
//! with `sᵀy <= CURVATURE_EPS` are skipped.
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::optimization::{
    errors::{OptError, OptResult},
    numerical_stability::guards::CURVATURE_EPS,
    stepwise::{
        line_search::LineSearchOptions,
        methods::{DescentRule, Transition},
        types::{Grad, InvHessian},
    },
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bfgs {
    inv_hessian: InvHessian,
    first_update: bool,
}

impl Bfgs {
    pub fn new(dim: usize) -> Self {
        Self { inv_hessian: Array2::eye(dim), first_update: true }
    }

    pub fn inv_hessian(&self) -> &InvHessian {
        &self.inv_hessian
    }
}

impl DescentRule for Bfgs {
    fn direction(&mut self, g: &Grad) -> Grad {
        -self.inv_hessian.dot(g)
    }

    fn update(&mut self, t: &Transition<'_>) {
        let y = t.y();
        let s = t.s;
        let sy = s.dot(&y);
        if !(sy > CURVATURE_EPS) {
            tracing::debug!(sy, "skipping BFGS update: insufficient curvature");
            return;
        }
        if self.first_update {
            let scale = sy / y.dot(&y);
            self.inv_hessian = Array2::eye(s.len()) * scale;
            self.first_update = false;
        }
        let rho = 1.0 / sy;
        let hy = self.inv_hessian.dot(&y);
        let yhy = y.dot(&hy);
        let ss_coef = 1.0 + rho * yhy;
        for ((i, j), h) in self.inv_hessian.indexed_iter_mut() {
            *h += rho * (ss_coef * s[i] * s[j] - hy[i] * s[j] - s[i] * hy[j]);
        }
    }

    fn reset(&mut self) {
        let dim = self.inv_hessian.nrows();
        self.inv_hessian = Array2::eye(dim);
        self.first_update = true;
    }

    fn has_memory(&self) -> bool {
        !self.first_update
    }

    fn default_line_search(&self) -> LineSearchOptions {
        LineSearchOptions::quasi_newton()
    }

    fn unit_step(&self) -> bool {
        true
    }

    fn verify_dim(&self, dim: usize) -> OptResult<()> {
        let (rows, cols) = self.inv_hessian.dim();
        if (rows, cols) != (dim, dim) {
            return Err(OptError::InvalidState {
                field: "inv_hessian",
                reason: format!("expected {dim}x{dim}, found {rows}x{cols}"),
            });
        }
        Ok(())
    }
}
