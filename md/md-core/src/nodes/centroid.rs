//! Group centroid coordinate node.

use std::any::Any;

use nalgebra::Vector3;

use md_types::{ComputeMode, EngineError, Result};

use crate::autodiff::{deposit_weighted_jacobian, AutoDiffParams};
use crate::engine::GraphContext;
use crate::node::{DerivComputation, InputView, NodeSpec, OutputView, SensView};

/// Coordinate node producing the centroid of each member group.
///
/// Output is one width-3 element per group. Uses the generic slot path: the
/// (constant) `(1/n) I` Jacobian blocks are laid down at construction and
/// the reverse deposit is the shared kernel. Group sizes are bounded by the
/// kernel's primary slot capacity.
#[derive(Debug)]
pub struct GroupCentroid {
    groups: Vec<Vec<usize>>,
    params: Vec<AutoDiffParams>,
    jac: Vec<f32>,
}

impl GroupCentroid {
    /// Build the node against parent 0, reserving one width-3 region per
    /// group member.
    pub fn new(ctx: &mut GraphContext<'_>, groups: Vec<Vec<usize>>) -> Result<Self> {
        ctx.require_width(0, 3)?;
        let n_elem = ctx.parent_n_elem(0);
        let mut params = Vec::with_capacity(groups.len());
        let mut jac = Vec::new();
        for group in &groups {
            let mut entry = AutoDiffParams::default();
            let inv_n = 1.0 / group.len() as f32;
            for &member in group {
                if member >= n_elem {
                    return Err(EngineError::size_mismatch(ctx.node_name(), member, n_elem));
                }
                let slot = ctx.reserve_slot(0, member, 3);
                entry.push_primary(slot)?;
                for k in 0..3 {
                    for dim in 0..3 {
                        jac.push(if k == dim { inv_n } else { 0.0 });
                    }
                }
            }
            params.push(entry);
        }
        Ok(Self { groups, params, jac })
    }

    /// Number of groups.
    #[must_use]
    pub fn n_groups(&self) -> usize {
        self.groups.len()
    }
}

impl DerivComputation for GroupCentroid {
    fn spec(&self) -> NodeSpec {
        NodeSpec::Coord {
            n_elem: self.groups.len(),
            elem_width: 3,
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
        for (elem, group) in self.groups.iter().enumerate() {
            let mut sum = Vector3::zeros();
            for &member in group {
                sum += coords.vec3(member);
            }
            output.set_vec3(elem, sum / group.len() as f32);
        }
    }

    fn propagate_deriv(&mut self, own: SensView<'_>, inputs: &mut [InputView<'_>]) {
        let Some(sens) = own.sens() else { return };
        deposit_weighted_jacobian(&self.params, sens, &self.jac, inputs);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
