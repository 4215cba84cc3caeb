//! Harmonic restraint terms.

use std::any::Any;

use nalgebra::Vector3;

use md_types::{ComputeMode, EngineError, Result};

use crate::engine::GraphContext;
use crate::ledger::Slot;
use crate::node::{DerivComputation, InputView, NodeSpec, OutputView, SensView};

/// One positional restraint: a harmonic well around an equilibrium point.
#[derive(Debug, Clone, Copy)]
pub struct Restraint {
    /// Element index in the parent coordinate array.
    pub atom: usize,
    /// Equilibrium position.
    pub equil_pos: Vector3<f32>,
    /// Spring constant.
    pub spring_const: f32,
}

#[derive(Debug, Clone, Copy)]
struct PosTerm {
    atom: usize,
    equil_pos: Vector3<f32>,
    spring_const: f32,
    slot: Slot,
}

/// Potential `V = Σ ½ k_a ‖x_a − x0_a‖²` over restrained elements.
///
/// Parameters are the spring constants; the parameter derivative is the
/// per-restraint `½ ‖x − x0‖²` cached by the last forward pass.
#[derive(Debug)]
pub struct PosSpring {
    terms: Vec<PosTerm>,
    displacement: Vec<Vector3<f32>>,
    energy: f32,
}

impl PosSpring {
    /// Build the term against parent 0, reserving one gradient row per
    /// restrained element.
    pub fn new(ctx: &mut GraphContext<'_>, restraints: Vec<Restraint>) -> Result<Self> {
        ctx.require_width(0, 3)?;
        let n_elem = ctx.parent_n_elem(0);
        let mut terms = Vec::with_capacity(restraints.len());
        for restraint in restraints {
            if restraint.atom >= n_elem {
                return Err(EngineError::size_mismatch(
                    ctx.node_name(),
                    restraint.atom,
                    n_elem,
                ));
            }
            let slot = ctx.reserve_slot(0, restraint.atom, 1);
            terms.push(PosTerm {
                atom: restraint.atom,
                equil_pos: restraint.equil_pos,
                spring_const: restraint.spring_const,
                slot,
            });
        }
        let displacement = vec![Vector3::zeros(); terms.len()];
        Ok(Self {
            terms,
            displacement,
            energy: 0.0,
        })
    }

    /// Energy from the last forward pass.
    #[must_use]
    pub fn energy(&self) -> f32 {
        self.energy
    }
}

impl DerivComputation for PosSpring {
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
        let mut energy = 0.0;
        for (term, cached) in self.terms.iter().zip(&mut self.displacement) {
            let disp = coords.vec3(term.atom) - term.equil_pos;
            *cached = disp;
            energy += 0.5 * term.spring_const * disp.norm_squared();
        }
        self.energy = energy;
        if let Some(potential) = own.as_potential() {
            *potential = energy;
        }
    }

    fn propagate_deriv(&mut self, _own: SensView<'_>, inputs: &mut [InputView<'_>]) {
        for (term, &disp) in self.terms.iter().zip(&self.displacement) {
            inputs[0].deposit_vec3(term.slot, 0, term.spring_const * disp);
        }
    }

    fn get_param(&self) -> Vec<f32> {
        self.terms.iter().map(|term| term.spring_const).collect()
    }

    fn set_param(&mut self, new_params: &[f32]) {
        for (term, &value) in self.terms.iter_mut().zip(new_params) {
            term.spring_const = value;
        }
    }

    fn get_param_deriv(&self) -> Vec<f32> {
        self.displacement
            .iter()
            .map(|disp| 0.5 * disp.norm_squared())
            .collect()
    }

    fn get_value_by_name(&self, key: &str) -> Result<Vec<f32>> {
        match key {
            "spring_energy" => Ok(vec![self.energy]),
            _ => Err(EngineError::unknown_value(key)),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// One harmonic bond between two elements of the parent array.
#[derive(Debug, Clone, Copy)]
pub struct Bond {
    /// The two element indices.
    pub atoms: [usize; 2],
    /// Equilibrium separation.
    pub equil_dist: f32,
    /// Spring constant.
    pub spring_const: f32,
}

#[derive(Debug, Clone, Copy)]
struct BondTerm {
    atoms: [usize; 2],
    equil_dist: f32,
    spring_const: f32,
    slots: [Slot; 2],
}

/// Potential `V = Σ ½ k (|x_i − x_j| − r0)²` over bonded pairs.
#[derive(Debug)]
pub struct DistSpring {
    terms: Vec<BondTerm>,
    // (k * stretch, unit separation) per bond, cached for the reverse leg
    cached: Vec<(f32, Vector3<f32>)>,
}

impl DistSpring {
    /// Build the term against parent 0, reserving one gradient row per bond
    /// endpoint.
    pub fn new(ctx: &mut GraphContext<'_>, bonds: Vec<Bond>) -> Result<Self> {
        ctx.require_width(0, 3)?;
        let n_elem = ctx.parent_n_elem(0);
        let mut terms = Vec::with_capacity(bonds.len());
        for bond in bonds {
            for &atom in &bond.atoms {
                if atom >= n_elem {
                    return Err(EngineError::size_mismatch(ctx.node_name(), atom, n_elem));
                }
            }
            let slots = [
                ctx.reserve_slot(0, bond.atoms[0], 1),
                ctx.reserve_slot(0, bond.atoms[1], 1),
            ];
            terms.push(BondTerm {
                atoms: bond.atoms,
                equil_dist: bond.equil_dist,
                spring_const: bond.spring_const,
                slots,
            });
        }
        let cached = vec![(0.0, Vector3::zeros()); terms.len()];
        Ok(Self { terms, cached })
    }
}

impl DerivComputation for DistSpring {
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
        let mut energy = 0.0;
        for (term, cached) in self.terms.iter().zip(&mut self.cached) {
            let sep = coords.vec3(term.atoms[0]) - coords.vec3(term.atoms[1]);
            let dist = sep.norm();
            // degenerate overlap has no defined direction
            let unit = if dist > 1e-6 { sep / dist } else { Vector3::zeros() };
            let stretch = dist - term.equil_dist;
            *cached = (term.spring_const * stretch, unit);
            energy += 0.5 * term.spring_const * stretch * stretch;
        }
        if let Some(potential) = own.as_potential() {
            *potential = energy;
        }
    }

    fn propagate_deriv(&mut self, _own: SensView<'_>, inputs: &mut [InputView<'_>]) {
        for (term, &(coeff, unit)) in self.terms.iter().zip(&self.cached) {
            inputs[0].deposit_vec3(term.slots[0], 0, coeff * unit);
            inputs[0].deposit_vec3(term.slots[1], 0, -coeff * unit);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use approx::assert_relative_eq;

    #[test]
    fn test_pos_spring_quadratic_values() {
        let mut engine = Engine::new(2);
        engine.position_mut().set_vec3(0, Vector3::new(1.0, 2.0, 3.0));

        let restraints = (0..2)
            .map(|atom| Restraint {
                atom,
                equil_pos: Vector3::zeros(),
                spring_const: 1.0,
            })
            .collect();
        engine
            .add_node::<_, EngineError>("quadratic", &["pos"], |ctx| {
                Ok(Box::new(PosSpring::new(ctx, restraints)?))
            })
            .unwrap();

        engine.compute(ComputeMode::PotentialAndDeriv);
        assert_eq!(engine.potential(), 7.0);
        assert_eq!(engine.position_sens().vec3(0), Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(engine.position_sens().vec3(1), Vector3::zeros());
    }

    #[test]
    fn test_pos_spring_params_round_trip() {
        let mut engine = Engine::new(1);
        engine.position_mut().set_vec3(0, Vector3::new(2.0, 0.0, 0.0));
        let restraints = vec![Restraint {
            atom: 0,
            equil_pos: Vector3::zeros(),
            spring_const: 3.0,
        }];
        engine
            .add_node::<_, EngineError>("restraint", &["pos"], |ctx| {
                Ok(Box::new(PosSpring::new(ctx, restraints)?))
            })
            .unwrap();
        engine.compute(ComputeMode::PotentialAndDeriv);

        let spring = engine.get_as::<PosSpring>("restraint").unwrap();
        assert_eq!(spring.get_param(), vec![3.0]);
        // dV/dk = 0.5 * |x|^2 = 2
        assert_eq!(spring.get_param_deriv(), vec![2.0]);
        assert_eq!(
            engine.get_value_by_name("restraint", "spring_energy").unwrap(),
            vec![6.0]
        );
        assert!(engine
            .get_value_by_name("restraint", "bogus")
            .is_err());

        let spring = engine.get_as_mut::<PosSpring>("restraint").unwrap();
        spring.set_param(&[1.0]);
        engine.compute(ComputeMode::PotentialAndDeriv);
        assert_eq!(engine.potential(), 2.0);
    }

    #[test]
    fn test_dist_spring_gradient_direction() {
        let mut engine = Engine::new(2);
        engine.position_mut().set_vec3(0, Vector3::new(0.0, 0.0, 0.0));
        engine.position_mut().set_vec3(1, Vector3::new(3.0, 0.0, 0.0));

        let bonds = vec![Bond {
            atoms: [0, 1],
            equil_dist: 2.0,
            spring_const: 1.0,
        }];
        engine
            .add_node::<_, EngineError>("bond", &["pos"], |ctx| {
                Ok(Box::new(DistSpring::new(ctx, bonds)?))
            })
            .unwrap();

        engine.compute(ComputeMode::PotentialAndDeriv);
        assert_relative_eq!(engine.potential(), 0.5, epsilon = 1e-6);
        // stretched bond pulls the endpoints together
        assert_relative_eq!(engine.position_sens().get(0, 0), -1.0, epsilon = 1e-6);
        assert_relative_eq!(engine.position_sens().get(0, 1), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_out_of_range_atom_is_rejected() {
        let mut engine = Engine::new(2);
        let restraints = vec![Restraint {
            atom: 5,
            equil_pos: Vector3::zeros(),
            spring_const: 1.0,
        }];
        let err = engine
            .add_node::<_, EngineError>("bad", &["pos"], |ctx| {
                Ok(Box::new(PosSpring::new(ctx, restraints)?))
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::SizeMismatch { .. }));
    }
}
