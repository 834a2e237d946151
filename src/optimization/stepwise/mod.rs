//! stepwise — a resumable, externally drivable gradient-based minimizer.
//!
//! Purpose
//! -------
//! Minimize a smooth scalar objective one iteration at a time. The caller
//! owns the loop: each call consumes an [`OptState`] and returns the next
//! one, so a run can be paused, inspected, persisted with `serde`, and
//! resumed with identical results.
//!
//! Key behaviors
//! -------------
//! - [`OptState::new`] / [`OptState::seeded`] fix the dimension, validate the
//!   [`OptConfig`], and allocate method memory for the chosen
//!   [`MethodChoice`]. A deserialized state is checked by
//!   [`OptState::validate`] before it is handed back.
//! - [`step`] produces the next Point: direction from the method memory,
//!   step length from the line search, optional momentum blending, restarts,
//!   and memory updates. Evaluation budgets are enforced through a counting
//!   gate and never overshot.
//! - [`evaluate`] (= [`summarize`] + [`check_convergence`]) decides whether
//!   the run is over, evaluating lazily only what the tolerances need.
//! - [`minimize`] drives both to termination and returns an
//!   [`OptimOutcome`].
//!
//! Invariants & assumptions
//! ------------------------
//! - The optimizer always minimizes. Callers maximizing supply `−f`, `−∇f`.
//! - Configuration problems are `Err(OptError)`; numerical problems
//!   (non-finite values or gradients) are captured in the state and surface
//!   as `TerminationReason::NumericalFailure`.
//! - Termination is absorbing: stepping or evaluating a terminated state
//!   returns it unchanged without calling the objective.
//!
//! Conventions
//! -----------
//! - Points and gradients are `ndarray::Array1<f64>` (see [`types`]).
//! - Logging goes through `tracing`: `debug!` for restarts, zero steps, and
//!   budget refusals; `warn!` for numerical failures; `info!` for driver
//!   progress. No subscriber is installed here.
//!
//! Downstream usage
//! ----------------
//! - Callers with their own loop use [`step`] and [`evaluate`] directly and
//!   may checkpoint the state between calls.
//! - Callers wanting a one-shot run use [`minimize`].
//!
//! Testing notes
//! -------------
//! - Every submodule carries unit tests for its own rules.
//! - `tests/integration_rosenbrock_pipeline.rs` runs whole methods on the
//!   Rosenbrock function; `tests/checkpoint_resume.rs` covers persistence,
//!   resume equivalence, and budget properties.

pub mod adapter;
pub mod api;
pub mod convergence;
pub mod line_search;
pub mod methods;
pub mod state;
pub mod step;
pub mod traits;
pub mod types;
pub mod validation;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::adapter::{EvalCounts, FnObjective};
pub use self::api::{OptimOutcome, minimize};
pub use self::convergence::{StepSummary, check_convergence, evaluate, summarize};
pub use self::line_search::{LineSearchOptions, LineSearcher};
pub use self::methods::{CgUpdate, DbdParams, Method, MethodChoice, MomentumSchedule, RestartPolicy};
pub use self::state::{BestSeen, EvalCache, LsMemory, OptState, StepInfo};
pub use self::step::{StepResult, step};
pub use self::traits::{Objective, OptConfig, RunStatus, TerminationReason, Tolerances};
pub use self::types::{Cost, DEFAULT_LBFGS_MEM, Grad, Point};

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use stepwise_optim::optimization::stepwise::prelude::*;
//
// to import the main optimizer surface in a single line.

pub mod prelude {
    pub use super::api::{OptimOutcome, minimize};
    pub use super::convergence::{StepSummary, evaluate};
    pub use super::methods::MethodChoice;
    pub use super::state::OptState;
    pub use super::step::{StepResult, step};
    pub use super::traits::{Objective, OptConfig, TerminationReason, Tolerances};
    pub use super::types::{Cost, Grad, Point};
}
