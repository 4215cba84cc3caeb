//! Hydrogen-bond counting term.

use std::any::Any;

use nalgebra::Vector3;

use md_types::{ComputeMode, EngineError, Result};

use crate::engine::GraphContext;
use crate::ledger::Slot;
use crate::node::{DerivComputation, InputView, NodeSpec, OutputView, SensView};

/// One donor/acceptor pair to score.
#[derive(Debug, Clone, Copy)]
pub struct HBondPair {
    /// Donor element index in the parent coordinate array.
    pub donor: usize,
    /// Acceptor element index in the parent coordinate array.
    pub acceptor: usize,
}

#[derive(Debug, Clone, Copy)]
struct PairTerm {
    donor: usize,
    acceptor: usize,
    slots: [Slot; 2],
}

/// Smooth hydrogen-bond counter.
///
/// Each pair contributes a logistic switching value
/// `s(r) = 1 / (1 + exp((r − r0) / w))`, so `n_hbond = Σ s` varies smoothly
/// with geometry and `potential = energy · n_hbond`. A negative bond energy
/// makes formed bonds favourable. The count is a diagnostic as well as a
/// potential: it reads back through [`DerivComputation::n_hbond`] and the
/// `"n_hbond"` value key, and holds `-1` until the first forward pass.
#[derive(Debug)]
pub struct HBondCount {
    pairs: Vec<PairTerm>,
    cutoff_dist: f32,
    switch_width: f32,
    bond_energy: f32,
    n_hbond: f32,
    // (energy * ds/dr, unit separation) per pair
    cached: Vec<(f32, Vector3<f32>)>,
}

impl HBondCount {
    /// Build the term against parent 0.
    ///
    /// `cutoff_dist` is the midpoint of the switching function,
    /// `switch_width` its softness, `bond_energy` the energy per formed
    /// bond.
    pub fn new(
        ctx: &mut GraphContext<'_>,
        pairs: Vec<HBondPair>,
        cutoff_dist: f32,
        switch_width: f32,
        bond_energy: f32,
    ) -> Result<Self> {
        ctx.require_width(0, 3)?;
        let n_elem = ctx.parent_n_elem(0);
        let mut terms = Vec::with_capacity(pairs.len());
        for pair in pairs {
            for &atom in &[pair.donor, pair.acceptor] {
                if atom >= n_elem {
                    return Err(EngineError::size_mismatch(ctx.node_name(), atom, n_elem));
                }
            }
            let slots = [
                ctx.reserve_slot(0, pair.donor, 1),
                ctx.reserve_slot(0, pair.acceptor, 1),
            ];
            terms.push(PairTerm {
                donor: pair.donor,
                acceptor: pair.acceptor,
                slots,
            });
        }
        let cached = vec![(0.0, Vector3::zeros()); terms.len()];
        Ok(Self {
            pairs: terms,
            cutoff_dist,
            switch_width,
            bond_energy,
            n_hbond: -1.0,
            cached,
        })
    }
}

impl DerivComputation for HBondCount {
    fn spec(&self) -> NodeSpec {
        NodeSpec::Potential
    }

    fn compute_value(
        &mut self,
        _mode: ComputeMode,
        mut own: OutputView<'_>,
        inputs: &mut [InputView<'_>],
    ) {
        let coords = inputs[0].output;
        let mut count = 0.0;
        for (pair, cached) in self.pairs.iter().zip(&mut self.cached) {
            let sep = coords.vec3(pair.donor) - coords.vec3(pair.acceptor);
            let dist = sep.norm();
            let unit = if dist > 1e-6 { sep / dist } else { Vector3::zeros() };
            let switch = 1.0 / (1.0 + ((dist - self.cutoff_dist) / self.switch_width).exp());
            let dswitch_ddist = -switch * (1.0 - switch) / self.switch_width;
            count += switch;
            *cached = (self.bond_energy * dswitch_ddist, unit);
        }
        self.n_hbond = count;
        if let Some(potential) = own.as_potential() {
            *potential = self.bond_energy * count;
        }
    }

    fn propagate_deriv(&mut self, _own: SensView<'_>, inputs: &mut [InputView<'_>]) {
        for (pair, &(coeff, unit)) in self.pairs.iter().zip(&self.cached) {
            inputs[0].deposit_vec3(pair.slots[0], 0, coeff * unit);
            inputs[0].deposit_vec3(pair.slots[1], 0, -coeff * unit);
        }
    }

    fn get_value_by_name(&self, key: &str) -> Result<Vec<f32>> {
        match key {
            "n_hbond" => Ok(vec![self.n_hbond]),
            _ => Err(EngineError::unknown_value(key)),
        }
    }

    fn n_hbond(&self) -> Option<f32> {
        Some(self.n_hbond)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
