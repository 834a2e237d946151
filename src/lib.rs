//! stepwise_optim — a resumable, externally drivable numerical optimizer.
//!
//! Purpose
//! -------
//! Minimize smooth objectives with a family of gradient methods (steepest
//! descent, nonlinear conjugate gradient, BFGS, L-BFGS, heavy-ball momentum
//! with constant or Nesterov-schedule coefficients, delta-bar-delta) while
//! leaving the iteration loop to the caller.
//!
//! Key behaviors
//! -------------
//! - The whole optimizer state is a serializable value; a run can be
//!   checkpointed between any two iterations and resumed identically.
//! - Evaluation budgets and tolerances are checked by a separate convergence
//!   step, so callers can interleave their own logic between iterations.
//!
//! Downstream usage
//! ----------------
//! - `use stepwise_optim::optimization::prelude::*;` pulls in the main
//!   surface: `OptState`, `step`, `evaluate`, `minimize`, and the config
//!   types.
//!
//! Testing notes
//! -------------
//! - Unit tests live in each module; integration tests under `tests/` run
//!   full optimizations and checkpoint/resume scenarios.

pub mod optimization;
