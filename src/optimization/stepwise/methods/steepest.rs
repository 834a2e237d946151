//! Steepest descent: `d = −g`, no memory.
use serde::{Deserialize, Serialize};

use crate::optimization::stepwise::{
    line_search::LineSearchOptions,
    methods::{DescentRule, Transition},
    types::Grad,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SteepestDescent;

impl DescentRule for SteepestDescent {
    fn direction(&mut self, g: &Grad) -> Grad {
        -g
    }

    fn update(&mut self, _t: &Transition<'_>) {}

    fn reset(&mut self) {}

    fn has_memory(&self) -> bool {
        false
    }

    fn default_line_search(&self) -> LineSearchOptions {
        LineSearchOptions::backtracking()
    }
}
