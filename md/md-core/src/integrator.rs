//! Symplectic integration and recentering.
//!
//! The integrator advances positions and momenta with a sequence of
//! substeps, each a velocity kick followed by a position drift scaled by a
//! per-substep coefficient pair. Forces come from the engine's reverse pass:
//! each substep refreshes the position gradient before kicking.
//!
//! # Integration Schemes
//!
//! | Scheme | Substeps | Order | Notes |
//! |--------|----------|-------|-------|
//! | Verlet | 2 | 2 | Velocity Verlet in kick-drift-kick form |
//! | Predescu | 5 | 4 | Five-kick extended Forest-Ruth schedule |
//!
//! Force clipping bounds each Cartesian force component at `max_force`,
//! which keeps early, badly strained configurations from blowing up the
//! trajectory.

use md_types::{ComputeMode, CoordArray};

use crate::engine::Engine;

/// Selects the substep coefficient schedule for one integration cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegratorType {
    /// Two-substep velocity Verlet.
    Verlet,
    /// Five-substep fourth-order schedule.
    Predescu,
}

/// One substep: momentum gains `vel * dt` of the clipped force, then
/// position gains `pos * dt` of the updated momentum.
#[derive(Debug, Clone, Copy)]
struct Substep {
    vel: f32,
    pos: f32,
}

/// Velocity Verlet: half-kick, full drift, half-kick.
const VERLET: [Substep; 2] = [
    Substep { vel: 0.5, pos: 1.0 },
    Substep { vel: 0.5, pos: 0.0 },
];

// Velocity-extended Forest-Ruth coefficients from Omelyan, Mryglod & Folk,
// Comput. Phys. Commun. 146 (2002) 188.
const XI: f32 = 0.164_498_65;
const LAMBDA: f32 = -0.020_943_34;
const CHI: f32 = 1.235_692_7;

/// Five-kick fourth-order schedule. Kick coefficients sum to 1, drift
/// coefficients sum to 1, and the final substep leaves positions untouched
/// so the cycle ends on a force-consistent state.
const PREDESCU: [Substep; 5] = [
    Substep { vel: XI, pos: 0.5 - LAMBDA },
    Substep { vel: CHI, pos: LAMBDA },
    Substep { vel: 1.0 - 2.0 * (CHI + XI), pos: LAMBDA },
    Substep { vel: CHI, pos: 0.5 - LAMBDA },
    Substep { vel: XI, pos: 0.0 },
];

/// Advance momenta and positions by one substep.
///
/// For each atom and Cartesian axis, the force is the negated sensitivity,
/// clipped to `±max_force`; momentum gains `vel_dt` of the force and
/// position gains `pos_dt` of the updated momentum.
pub fn integration_stage(
    mom: &mut CoordArray,
    pos: &mut CoordArray,
    sens: &CoordArray,
    vel_dt: f32,
    pos_dt: f32,
    max_force: f32,
) {
    for atom in 0..pos.n_elem() {
        for dim in 0..3 {
            let mut force = -sens.get(dim, atom);
            if force.abs() > max_force {
                force = max_force.copysign(force);
            }
            let momentum = mom.get(dim, atom) + vel_dt * force;
            mom.set(dim, atom, momentum);
            pos.add(dim, atom, pos_dt * momentum);
        }
    }
}

/// Subtract the centroid of `pos` from every atom.
///
/// With `xy_only` set, the z-component is left untouched (useful for
/// membrane systems). Accumulation runs in `f64` so the centroid stays
/// accurate for large atom counts.
pub fn recenter(pos: &mut CoordArray, xy_only: bool) {
    let n_atom = pos.n_elem();
    if n_atom == 0 {
        return;
    }
    let mut centroid = [0.0f64; 3];
    for atom in 0..n_atom {
        for (dim, acc) in centroid.iter_mut().enumerate() {
            *acc += f64::from(pos.get(dim, atom));
        }
    }
    let n_dim = if xy_only { 2 } else { 3 };
    for (dim, acc) in centroid.iter().enumerate().take(n_dim) {
        let mean = (*acc / n_atom as f64) as f32;
        for atom in 0..n_atom {
            pos.add(dim, atom, -mean);
        }
    }
}

impl Engine {
    /// Advance the engine's positions and the given momenta by one
    /// integration cycle.
    ///
    /// Each substep refreshes the position gradient with a derivative-only
    /// forward/reverse pass, then applies one [`integration_stage`] with the
    /// scheme's coefficients.
    pub fn integration_cycle(
        &mut self,
        mom: &mut CoordArray,
        dt: f32,
        max_force: f32,
        integrator: IntegratorType,
    ) {
        let schedule: &[Substep] = match integrator {
            IntegratorType::Verlet => &VERLET,
            IntegratorType::Predescu => &PREDESCU,
        };
        for substep in schedule {
            self.compute(ComputeMode::Deriv);
            let coord = self.pos_data_mut();
            // sens is read-only here while output is advanced in place
            let (pos, sens) = (&mut coord.output, &coord.sens);
            integration_stage(mom, pos, sens, substep.vel * dt, substep.pos * dt, max_force);
        }
    }

    /// Recenter the position array; see [`recenter`].
    pub fn recenter(&mut self, xy_only: bool) {
        recenter(&mut self.pos_data_mut().output, xy_only);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use md_types::Vector3;

    #[test]
    fn test_kick_coefficients_sum_to_one() {
        let kick: f32 = PREDESCU.iter().map(|s| s.vel).sum();
        let drift: f32 = PREDESCU.iter().map(|s| s.pos).sum();
        assert_relative_eq!(kick, 1.0, epsilon = 1e-6);
        assert_relative_eq!(drift, 1.0, epsilon = 1e-6);

        let kick: f32 = VERLET.iter().map(|s| s.vel).sum();
        let drift: f32 = VERLET.iter().map(|s| s.pos).sum();
        assert_eq!(kick, 1.0);
        assert_eq!(drift, 1.0);
    }

    #[test]
    fn test_force_clipping_is_exact() {
        // An enormous gradient must clip to max_force, so the momentum
        // change over a half-kick is exactly -vel_dt * max_force.
        let mut mom = CoordArray::new(3, 1);
        let mut pos = CoordArray::new(3, 1);
        pos.set_vec3(0, Vector3::new(100.0, 0.0, 0.0));
        let mut sens = CoordArray::new(3, 1);
        sens.set_vec3(0, Vector3::new(100.0, 0.0, 0.0));

        let dt = 0.01;
        integration_stage(&mut mom, &mut pos, &sens, 0.5 * dt, dt, 1.0);

        assert_eq!(mom.get(0, 0), -0.5 * dt);
        assert_eq!(mom.get(1, 0), 0.0);
    }

    #[test]
    fn test_unclipped_force_passes_through() {
        let mut mom = CoordArray::new(3, 1);
        let mut pos = CoordArray::new(3, 1);
        let mut sens = CoordArray::new(3, 1);
        sens.set_vec3(0, Vector3::new(0.25, -0.5, 0.0));

        integration_stage(&mut mom, &mut pos, &sens, 1.0, 1.0, 10.0);

        assert_eq!(mom.vec3(0), Vector3::new(-0.25, 0.5, 0.0));
        assert_eq!(pos.vec3(0), mom.vec3(0));
    }

    #[test]
    fn test_recenter_full() {
        let mut pos = CoordArray::new(3, 3);
        pos.set_vec3(0, Vector3::new(1.0, 2.0, 3.0));
        pos.set_vec3(1, Vector3::new(4.0, 5.0, 6.0));
        pos.set_vec3(2, Vector3::new(7.0, 8.0, 9.0));

        recenter(&mut pos, false);

        let centroid: Vector3<f32> = (pos.vec3(0) + pos.vec3(1) + pos.vec3(2)) / 3.0;
        assert_relative_eq!(centroid.norm(), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_recenter_xy_only_leaves_z() {
        let mut pos = CoordArray::new(3, 2);
        pos.set_vec3(0, Vector3::new(1.0, 1.0, 5.0));
        pos.set_vec3(1, Vector3::new(3.0, -1.0, 7.0));

        recenter(&mut pos, true);

        assert_relative_eq!(pos.get(0, 0) + pos.get(0, 1), 0.0, epsilon = 1e-5);
        assert_relative_eq!(pos.get(1, 0) + pos.get(1, 1), 0.0, epsilon = 1e-5);
        assert_eq!(pos.get(2, 0), 5.0);
        assert_eq!(pos.get(2, 1), 7.0);
    }

    #[test]
    fn test_recenter_empty() {
        let mut pos = CoordArray::new(3, 0);
        recenter(&mut pos, false);
    }
}
