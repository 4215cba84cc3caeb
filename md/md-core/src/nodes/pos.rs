//! The position node.

use std::any::Any;

use md_types::ComputeMode;

use crate::node::{DerivComputation, InputView, NodeSpec, OutputView, SensView};

/// The distinguished graph source holding current atomic positions.
///
/// Both evaluation legs are inert: the integrator writes positions between
/// `compute` calls, and the engine's gather step deposits the gradient of
/// the total potential into the node's sensitivity buffer.
#[derive(Debug, Clone, Copy)]
pub struct Pos {
    n_atom: usize,
}

impl Pos {
    /// Create a position node for `n_atom` atoms.
    #[must_use]
    pub fn new(n_atom: usize) -> Self {
        Self { n_atom }
    }

    /// Number of atoms.
    #[must_use]
    pub fn n_atom(&self) -> usize {
        self.n_atom
    }
}

impl DerivComputation for Pos {
    fn spec(&self) -> NodeSpec {
        NodeSpec::Coord {
            n_elem: self.n_atom,
            elem_width: 3,
        }
    }

    fn compute_value(&mut self, _: ComputeMode, _: OutputView<'_>, _: &mut [InputView<'_>]) {}

    fn propagate_deriv(&mut self, _: SensView<'_>, _: &mut [InputView<'_>]) {}

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
