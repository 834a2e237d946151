//! Limited-memory BFGS.
//!
//! Keeps the `memory` most recent secant pairs `(s, y)` in a ring buffer and
//! applies the inverse-Hessian approximation implicitly through the two-loop
//! recursion, seeded with `gamma · I`, `gamma = sᵀy / yᵀy` of the newest pair.
//! Pairs with `sᵀy <= CURVATURE_EPS` are dropped.
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::optimization::{
    errors::{OptError, OptResult},
    numerical_stability::guards::CURVATURE_EPS,
    stepwise::{
        line_search::LineSearchOptions,
        methods::{DescentRule, Transition},
        types::{Grad, Point},
        validation::verify_state_len,
    },
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SecantPair {
    s: Point,
    y: Grad,
    rho: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lbfgs {
    memory: usize,
    pairs: VecDeque<SecantPair>,
}

impl Lbfgs {
    /// # Errors
    /// `OptError::InvalidMethodParameter` when `memory == 0`.
    pub fn new(memory: usize, _dim: usize) -> OptResult<Self> {
        if memory == 0 {
            return Err(OptError::InvalidMethodParameter {
                name: "memory",
                value: 0.0,
                reason: "L-BFGS needs room for at least one secant pair.",
            });
        }
        Ok(Self { memory, pairs: VecDeque::with_capacity(memory) })
    }

    pub fn memory(&self) -> usize {
        self.memory
    }

    /// Number of secant pairs currently stored.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl DescentRule for Lbfgs {
    fn direction(&mut self, g: &Grad) -> Grad {
        let mut q = g.clone();
        let mut alphas = Vec::with_capacity(self.pairs.len());
        for pair in self.pairs.iter().rev() {
            let a = pair.rho * pair.s.dot(&q);
            q.scaled_add(-a, &pair.y);
            alphas.push(a);
        }
        let gamma = match self.pairs.back() {
            Some(newest) => newest.s.dot(&newest.y) / newest.y.dot(&newest.y),
            None => 1.0,
        };
        let mut r = q * gamma;
        for (pair, a) in self.pairs.iter().zip(alphas.into_iter().rev()) {
            let b = pair.rho * pair.y.dot(&r);
            r.scaled_add(a - b, &pair.s);
        }
        -r
    }

    fn update(&mut self, t: &Transition<'_>) {
        let y = t.y();
        let sy = t.s.dot(&y);
        if !(sy > CURVATURE_EPS) {
            tracing::debug!(sy, "dropping L-BFGS pair: insufficient curvature");
            return;
        }
        if self.pairs.len() == self.memory {
            self.pairs.pop_front();
        }
        self.pairs.push_back(SecantPair { s: t.s.clone(), y, rho: 1.0 / sy });
    }

    fn reset(&mut self) {
        self.pairs.clear();
    }

    fn has_memory(&self) -> bool {
        !self.pairs.is_empty()
    }

    fn default_line_search(&self) -> LineSearchOptions {
        LineSearchOptions::quasi_newton()
    }

    fn unit_step(&self) -> bool {
        true
    }

    fn verify_dim(&self, dim: usize) -> OptResult<()> {
        if self.memory == 0 || self.pairs.len() > self.memory {
            return Err(OptError::InvalidState {
                field: "lbfgs.pairs",
                reason: format!("{} pairs stored with memory {}", self.pairs.len(), self.memory),
            });
        }
        for pair in &self.pairs {
            verify_state_len("lbfgs.s", pair.s.len(), dim)?;
            verify_state_len("lbfgs.y", pair.y.len(), dim)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn push(lbfgs: &mut Lbfgs, s: Point, g_old: Grad, g_new: Grad) {
        let d = s.clone();
        lbfgs.update(&Transition { d: &d, s: &s, g_old: &g_old, g_new: &g_new });
    }

    #[test]
    // Purpose
    // -------
    // On a diagonal quadratic `f = ½ xᵀ diag(1, 4) x`, two exact secant pairs
    // along the coordinate axes recover the Newton direction.
    //
    // Given
    // -----
    // - Pairs `s = e1, y = e1` and `s = e2, y = 4 e2`.
    //
    // Expect
    // ------
    // - `d = −H g = (−g1, −g2 / 4)`.
    fn two_loop_recovers_newton_direction_on_diagonal_quadratic() {
        // Arrange
        let mut lbfgs = Lbfgs::new(5, 2).expect("memory is positive");
        push(&mut lbfgs, array![1.0, 0.0], array![0.0, 0.0], array![1.0, 0.0]);
        push(&mut lbfgs, array![0.0, 1.0], array![0.0, 0.0], array![0.0, 4.0]);

        // Act
        let d = lbfgs.direction(&array![2.0, 8.0]);

        // Assert
        assert_relative_eq!(d[0], -2.0, epsilon = 1e-12);
        assert_relative_eq!(d[1], -2.0, epsilon = 1e-12);
    }

    #[test]
    fn ring_buffer_evicts_oldest_pair() {
        let mut lbfgs = Lbfgs::new(2, 1).expect("memory is positive");
        for k in 1..=3 {
            let scale = k as f64;
            push(&mut lbfgs, array![1.0], array![0.0], array![scale]);
        }

        assert_eq!(lbfgs.len(), 2);
        // gamma from the newest pair: s·y / y·y = 3 / 9.
        assert_relative_eq!(lbfgs.direction(&array![0.0])[0], 0.0);
        let d = lbfgs.direction(&array![3.0]);
        assert!(d[0] < 0.0);
    }

    #[test]
    fn empty_memory_gives_steepest_descent() {
        let mut lbfgs = Lbfgs::new(3, 2).expect("memory is positive");
        assert_eq!(lbfgs.direction(&array![1.0, -2.0]), array![-1.0, 2.0]);
        assert!(!lbfgs.has_memory());
    }
}
