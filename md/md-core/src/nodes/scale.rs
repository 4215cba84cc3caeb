//! Uniform coordinate scaling node.

use std::any::Any;

use md_types::{ComputeMode, Result};

use crate::autodiff::{deposit_weighted_jacobian, AutoDiffParams};
use crate::engine::GraphContext;
use crate::node::{DerivComputation, InputView, NodeSpec, OutputView, SensView};

/// Coordinate node computing `y = gain · x`, element for element.
///
/// Works for any parent width. The single parameter is the gain; its
/// potential derivative `Σ sens · x` is accumulated on the reverse leg.
#[derive(Debug)]
pub struct ScaleCoords {
    n_elem: usize,
    elem_width: usize,
    gain: f32,
    params: Vec<AutoDiffParams>,
    jac: Vec<f32>,
    gain_deriv: f32,
}

impl ScaleCoords {
    /// Build the node against parent 0, reserving one full-width region per
    /// element.
    pub fn new(ctx: &mut GraphContext<'_>, gain: f32) -> Result<Self> {
        let n_elem = ctx.parent_n_elem(0);
        let elem_width = ctx.parent_elem_width(0);
        let mut params = Vec::with_capacity(n_elem);
        let mut jac = Vec::with_capacity(n_elem * elem_width * elem_width);
        for elem in 0..n_elem {
            let slot = ctx.reserve_slot(0, elem, elem_width);
            let mut entry = AutoDiffParams::default();
            entry.push_primary(slot)?;
            params.push(entry);
            for k in 0..elem_width {
                for dim in 0..elem_width {
                    jac.push(if k == dim { gain } else { 0.0 });
                }
            }
        }
        Ok(Self {
            n_elem,
            elem_width,
            gain,
            params,
            jac,
            gain_deriv: 0.0,
        })
    }

    fn rebuild_jacobian(&mut self) {
        self.jac.fill(0.0);
        let w = self.elem_width;
        for elem in 0..self.n_elem {
            for k in 0..w {
                self.jac[elem * w * w + k * w + k] = self.gain;
            }
        }
    }
}

impl DerivComputation for ScaleCoords {
    fn spec(&self) -> NodeSpec {
        NodeSpec::Coord {
            n_elem: self.n_elem,
            elem_width: self.elem_width,
        }
    }

    fn compute_value(
        &mut self,
        _mode: ComputeMode,
        mut own: OutputView<'_>,
        inputs: &mut [InputView<'_>],
    ) {
        let coords = inputs[0].output;
        let Some(output) = own.as_coord() else { return };
        for elem in 0..self.n_elem {
            for dim in 0..self.elem_width {
                output.set(dim, elem, self.gain * coords.get(dim, elem));
            }
        }
    }

    fn propagate_deriv(&mut self, own: SensView<'_>, inputs: &mut [InputView<'_>]) {
        let Some(sens) = own.sens() else { return };
        let coords = inputs[0].output;
        let mut gain_deriv = 0.0;
        for elem in 0..self.n_elem {
            for dim in 0..self.elem_width {
                gain_deriv += sens.get(dim, elem) * coords.get(dim, elem);
            }
        }
        self.gain_deriv = gain_deriv;
        deposit_weighted_jacobian(&self.params, sens, &self.jac, inputs);
    }

    fn get_param(&self) -> Vec<f32> {
        vec![self.gain]
    }

    fn set_param(&mut self, new_params: &[f32]) {
        if let Some(&gain) = new_params.first() {
            self.gain = gain;
            self.rebuild_jacobian();
        }
    }

    fn get_param_deriv(&self) -> Vec<f32> {
        vec![self.gain_deriv]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
