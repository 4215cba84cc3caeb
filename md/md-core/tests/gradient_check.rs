//! Reverse-mode gradients must agree with central finite differences.

#![allow(clippy::unwrap_used)]

use md_core::finite_diff::{central_difference_deriv, relative_rms_deviation};
use md_core::nodes::{Bond, DistSpring, GroupCentroid, HBondCount, HBondPair, PosSpring, Restraint, ScaleCoords};
use md_core::{ComputeMode, Engine, EngineError, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const REL_RMS_TOL: f64 = 1e-3;

/// Build a graph that exercises every built-in term and both propagation
/// paths (custom deposits and the generic slot kernel).
fn build_mixed_graph(n_atom: usize, rng: &mut StdRng) -> Engine {
    let mut engine = Engine::new(n_atom);

    let restraints: Vec<Restraint> = (0..n_atom)
        .map(|atom| Restraint {
            atom,
            equil_pos: Vector3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            ),
            spring_const: rng.gen_range(0.5..2.0),
        })
        .collect();
    engine
        .add_node::<_, EngineError>("pos_spring", &["pos"], |ctx| {
            Ok(Box::new(PosSpring::new(ctx, restraints)?))
        })
        .unwrap();

    let bonds: Vec<Bond> = (0..n_atom - 1)
        .map(|atom| Bond {
            atoms: [atom, atom + 1],
            equil_dist: rng.gen_range(0.8..1.5),
            spring_const: rng.gen_range(0.5..2.0),
        })
        .collect();
    engine
        .add_node::<_, EngineError>("dist_spring", &["pos"], |ctx| {
            Ok(Box::new(DistSpring::new(ctx, bonds)?))
        })
        .unwrap();

    let groups: Vec<Vec<usize>> = (0..n_atom / 2).map(|g| vec![2 * g, 2 * g + 1]).collect();
    engine
        .add_node::<_, EngineError>("com", &["pos"], |ctx| {
            Ok(Box::new(GroupCentroid::new(ctx, groups)?))
        })
        .unwrap();
    engine
        .add_node::<_, EngineError>("com_scaled", &["com"], |ctx| {
            Ok(Box::new(ScaleCoords::new(ctx, 1.5)?))
        })
        .unwrap();
    let com_restraints: Vec<Restraint> = (0..n_atom / 2)
        .map(|group| Restraint {
            atom: group,
            equil_pos: Vector3::zeros(),
            spring_const: 0.7,
        })
        .collect();
    engine
        .add_node::<_, EngineError>("com_spring", &["com_scaled"], |ctx| {
            Ok(Box::new(PosSpring::new(ctx, com_restraints)?))
        })
        .unwrap();

    let pairs: Vec<HBondPair> = (0..n_atom / 2)
        .map(|pair| HBondPair {
            donor: pair,
            acceptor: n_atom - 1 - pair,
        })
        .collect();
    engine
        .add_node::<_, EngineError>("hbond", &["pos"], |ctx| {
            Ok(Box::new(HBondCount::new(ctx, pairs, 2.0, 0.5, -1.0)?))
        })
        .unwrap();

    engine
}

fn randomize_positions(engine: &mut Engine, rng: &mut StdRng) {
    let n_atom = engine.n_atom();
    for atom in 0..n_atom {
        engine.position_mut().set_vec3(
            atom,
            Vector3::new(
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-2.0..2.0),
            ),
        );
    }
}

#[test]
fn reverse_gradient_matches_finite_differences() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for trial in 0..5 {
        let n_atom = 6;
        let mut engine = build_mixed_graph(n_atom, &mut rng);
        randomize_positions(&mut engine, &mut rng);

        engine.compute(ComputeMode::PotentialAndDeriv);
        let analytic = engine.position_sens().to_flat();

        let flat = engine.position().to_flat();
        let numeric = central_difference_deriv(
            |x| {
                engine.position_mut().copy_from_buffer(x);
                engine.compute(ComputeMode::PotentialAndDeriv);
                engine.potential()
            },
            &flat,
            1e-2,
        );

        let deviation = relative_rms_deviation(&numeric, &analytic);
        assert!(
            deviation < REL_RMS_TOL,
            "trial {trial}: relative RMS deviation {deviation} exceeds {REL_RMS_TOL}"
        );
    }
}

#[test]
fn ledger_slots_stay_in_bounds_and_disjoint() {
    let mut rng = StdRng::seed_from_u64(7);
    let engine = build_mixed_graph(8, &mut rng);

    for node in engine.nodes() {
        let Some(coord) = node.data().as_coord() else {
            continue;
        };
        let ledger = &coord.ledger;
        let mut next_free = 0;
        for record in ledger.tape() {
            let loc = record.loc as usize;
            let rows = record.output_width as usize;
            assert!((loc + rows) * ledger.width() <= ledger.accum_len());
            // append-only reservation: each record starts where the
            // previous one ended, so regions cannot overlap
            assert_eq!(loc, next_free);
            next_free = loc + rows;
        }
        assert_eq!(next_free * ledger.width(), ledger.accum_len());
    }
}

#[test]
fn execution_levels_respect_every_edge() {
    let mut rng = StdRng::seed_from_u64(11);
    let engine = build_mixed_graph(6, &mut rng);

    for node in engine.nodes() {
        for &parent in node.parents() {
            let parent = &engine.nodes()[parent];
            assert!(parent.forward_level() < node.forward_level());
            assert!(parent.reverse_level() > node.reverse_level());
        }
    }
    for (idx, node) in engine.nodes().iter().enumerate() {
        for &child in node.children() {
            assert!(engine.nodes()[child].parents().contains(&idx));
        }
    }
}

#[test]
fn repeated_passes_are_bitwise_identical() {
    let mut rng = StdRng::seed_from_u64(23);
    let mut engine = build_mixed_graph(6, &mut rng);
    randomize_positions(&mut engine, &mut rng);

    engine.compute(ComputeMode::PotentialAndDeriv);
    let first_sens = engine.position_sens().to_flat();
    let first_potential = engine.potential();

    engine.compute(ComputeMode::PotentialAndDeriv);
    assert_eq!(first_sens, engine.position_sens().to_flat());
    assert_eq!(first_potential, engine.potential());
}
