//! The node capability set and the engine-side node data.
//!
//! A node's *computation* is a trait object over [`DerivComputation`]; its
//! *buffers* live in a tagged [`NodeData`] owned by the engine. The tag is
//! what distinguishes the two node families: coordinate nodes own an output
//! array, a sensitivity array, and a [`SlotLedger`]; potential nodes own a
//! single scalar.

use std::any::Any;

use nalgebra::Vector3;

use md_types::{ComputeMode, CoordArray, Result};

use crate::ledger::{Slot, SlotLedger};

/// Shape a computation declares at add time; the engine allocates the node's
/// buffers from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSpec {
    /// The node produces a coordinate array.
    Coord {
        /// Number of output elements.
        n_elem: usize,
        /// Per-element dimensionality of the output.
        elem_width: usize,
    },
    /// The node produces a scalar potential energy.
    Potential,
}

/// Buffers of a coordinate node.
#[derive(Debug, Clone)]
pub struct CoordData {
    /// Output array, written during the forward pass.
    pub output: CoordArray,
    /// Sensitivity of the summed potentials with respect to `output`.
    pub sens: CoordArray,
    /// Ledger of downstream slot reservations against this node.
    pub ledger: SlotLedger,
}

impl CoordData {
    /// Allocate zeroed buffers of the given shape.
    #[must_use]
    pub fn new(elem_width: usize, n_elem: usize) -> Self {
        Self {
            output: CoordArray::new(elem_width, n_elem),
            sens: CoordArray::new(elem_width, n_elem),
            ledger: SlotLedger::new(elem_width, n_elem),
        }
    }
}

/// Engine-owned state of a node, tagged by family.
#[derive(Debug, Clone)]
pub enum NodeData {
    /// Coordinate node: output/sens buffers plus the ledger.
    Coord(CoordData),
    /// Potential node: one scalar energy.
    Potential {
        /// Energy computed by the last forward pass.
        potential: f32,
    },
}

impl NodeData {
    /// Whether this node contributes to the engine-wide potential sum.
    #[must_use]
    pub fn is_potential_term(&self) -> bool {
        matches!(self, Self::Potential { .. })
    }

    /// The coordinate buffers, if this is a coordinate node.
    #[must_use]
    pub fn as_coord(&self) -> Option<&CoordData> {
        match self {
            Self::Coord(data) => Some(data),
            Self::Potential { .. } => None,
        }
    }

    /// Mutable coordinate buffers, if this is a coordinate node.
    pub fn as_coord_mut(&mut self) -> Option<&mut CoordData> {
        match self {
            Self::Coord(data) => Some(data),
            Self::Potential { .. } => None,
        }
    }

    /// The scalar energy, if this is a potential node.
    #[must_use]
    pub fn potential(&self) -> Option<f32> {
        match self {
            Self::Potential { potential } => Some(*potential),
            Self::Coord(_) => None,
        }
    }
}

/// View of one parent during evaluation: read access to its output and write
/// access to the slots this node reserved in its ledger.
pub struct InputView<'a> {
    /// The parent's output array.
    pub output: &'a CoordArray,
    /// The parent's ledger; deposits go through the slots reserved at
    /// construction time.
    pub ledger: &'a mut SlotLedger,
}

impl InputView<'_> {
    /// Deposit a 3-vector as row `k` of the region at `slot`.
    #[inline]
    pub fn deposit_vec3(&mut self, slot: Slot, k: usize, value: Vector3<f32>) {
        let row = self.ledger.slot_row_mut(slot, k);
        row[0] = value.x;
        row[1] = value.y;
        row[2] = value.z;
    }
}

/// Write access to a node's own value during the forward pass.
pub enum OutputView<'a> {
    /// Coordinate output array.
    Coord(&'a mut CoordArray),
    /// Scalar potential.
    Potential(&'a mut f32),
}

impl OutputView<'_> {
    /// The coordinate array, if this node is a coordinate node.
    pub fn as_coord(&mut self) -> Option<&mut CoordArray> {
        match self {
            Self::Coord(array) => Some(&mut **array),
            Self::Potential(_) => None,
        }
    }

    /// The scalar potential, if this node is a potential node.
    pub fn as_potential(&mut self) -> Option<&mut f32> {
        match self {
            Self::Potential(value) => Some(&mut **value),
            Self::Coord(_) => None,
        }
    }
}

/// Read access to a node's own state during the reverse pass.
pub enum SensView<'a> {
    /// Coordinate node: its forward output and its gathered sensitivity.
    Coord {
        /// Output written by the forward pass.
        output: &'a CoordArray,
        /// Sensitivity of the summed potentials with respect to the output,
        /// already gathered from this node's ledger.
        sens: &'a CoordArray,
    },
    /// Potential node: the sensitivity to a scalar energy is the unit
    /// coefficient, so there is nothing to carry.
    Potential,
}

impl SensView<'_> {
    /// The gathered sensitivity array, if this is a coordinate node.
    #[must_use]
    pub fn sens(&self) -> Option<&CoordArray> {
        match self {
            Self::Coord { sens, .. } => Some(*sens),
            Self::Potential => None,
        }
    }
}

/// The capability set of a differentiable computation.
///
/// Concrete terms implement the two evaluation methods and whichever of the
/// optional capabilities they serve. The engine owns the node's buffers and
/// hands them in as views, so implementations hold only their parameters and
/// whatever they cache between the forward and reverse legs.
pub trait DerivComputation: Send {
    /// Declared output shape; the engine allocates buffers from it once, at
    /// add time.
    fn spec(&self) -> NodeSpec;

    /// Read inputs and compute the output value.
    ///
    /// In deriv modes this must also cache whatever the reverse leg needs;
    /// the graph structure is frozen, so only numbers change between calls.
    fn compute_value(
        &mut self,
        mode: ComputeMode,
        own: OutputView<'_>,
        inputs: &mut [InputView<'_>],
    );

    /// Use the sensitivity to this node's output to add to the sensitivities
    /// of its inputs, by depositing weighted Jacobian rows into the reserved
    /// ledger slots.
    fn propagate_deriv(&mut self, own: SensView<'_>, inputs: &mut [InputView<'_>]);

    /// Return an arbitrary subset of parameters.
    fn get_param(&self) -> Vec<f32> {
        Vec::new()
    }

    /// Set the same subset of parameters returned by [`Self::get_param`].
    fn set_param(&mut self, _new_params: &[f32]) {}

    /// Derivative of the summed potentials with respect to the
    /// [`Self::get_param`] subset, as accumulated by the last reverse pass.
    fn get_param_deriv(&self) -> Vec<f32> {
        Vec::new()
    }

    /// Compute a named diagnostic quantity. Keys and their meanings are part
    /// of each node's own contract.
    fn get_value_by_name(&self, key: &str) -> Result<Vec<f32>> {
        Err(md_types::EngineError::unknown_value(key))
    }

    /// The hydrogen-bond count diagnostic, for nodes that maintain one.
    fn n_hbond(&self) -> Option<f32> {
        None
    }

    /// Upcast for the typed accessor.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for the typed accessor.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
