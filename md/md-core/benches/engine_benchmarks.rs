//! Benchmarks for forward/reverse evaluation and integration.

#![allow(clippy::unwrap_used)]

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use md_core::nodes::{Bond, DistSpring, PosSpring, Restraint};
use md_core::{ComputeMode, CoordArray, Engine, EngineError, IntegratorType, Vector3};

fn chain_engine(n_atom: usize) -> Engine {
    let mut engine = Engine::new(n_atom);
    for atom in 0..n_atom {
        engine
            .position_mut()
            .set_vec3(atom, Vector3::new(atom as f32, 0.1 * atom as f32, 0.0));
    }

    let restraints: Vec<Restraint> = (0..n_atom)
        .map(|atom| Restraint {
            atom,
            equil_pos: Vector3::new(atom as f32, 0.0, 0.0),
            spring_const: 0.5,
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
            equil_dist: 1.0,
            spring_const: 2.0,
        })
        .collect();
    engine
        .add_node::<_, EngineError>("dist_spring", &["pos"], |ctx| {
            Ok(Box::new(DistSpring::new(ctx, bonds)?))
        })
        .unwrap();

    engine
}

fn bench_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute");
    for n_atom in [64, 512] {
        let mut engine = chain_engine(n_atom);
        group.bench_function(format!("forward_reverse_{n_atom}"), |b| {
            b.iter(|| {
                engine.compute(ComputeMode::PotentialAndDeriv);
                black_box(engine.potential())
            });
        });
    }
    group.finish();
}

fn bench_integration(c: &mut Criterion) {
    let mut engine = chain_engine(256);
    let mut mom = CoordArray::new(3, 256);
    c.bench_function("verlet_cycle_256", |b| {
        b.iter(|| {
            engine.integration_cycle(&mut mom, 0.005, 10.0, IntegratorType::Verlet);
            black_box(mom.get(0, 0))
        });
    });
}

criterion_group!(benches, bench_compute, bench_integration);
criterion_main!(benches);
