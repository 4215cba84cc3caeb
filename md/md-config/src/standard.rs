//! Creation functions for the built-in node types.
//!
//! Each function parses its own configuration subgroup and constructs the
//! corresponding term from `md_core::nodes`; the engine never sees the
//! configuration itself.

use md_core::nodes::{Bond, DistSpring, GroupCentroid, HBondCount, HBondPair, PosSpring, Restraint, ScaleCoords};
use md_core::{DerivComputation, GraphContext, Vector3};

use crate::error::{ConfigError, Result};
use crate::registry::NodeRegistry;
use crate::tree::ConfigGroup;

/// Register every built-in term.
pub fn register_standard_nodes(registry: &mut NodeRegistry) {
    registry.register1("pos_spring", create_pos_spring);
    registry.register1("dist_spring", create_dist_spring);
    registry.register1("centroid", create_centroid);
    registry.register1("scale", create_scale);
    registry.register1("hbond", create_hbond);
}

/// Expand a per-term dataset that may be given once for all terms.
fn broadcast(
    values: Vec<f32>,
    n_terms: usize,
    dataset: &'static str,
    group: &ConfigGroup,
) -> Result<Vec<f32>> {
    match values.len() {
        n if n == n_terms => Ok(values),
        1 => Ok(vec![values[0]; n_terms]),
        n => Err(ConfigError::invalid_dataset(
            dataset,
            &group.name,
            format!("expected 1 or {n_terms} values, got {n}"),
        )),
    }
}

fn create_pos_spring(
    group: &ConfigGroup,
    ctx: &mut GraphContext<'_>,
) -> Result<Box<dyn DerivComputation>> {
    let n_elem = ctx.parent_n_elem(0);
    let atoms = group.dataset_indices("atom", n_elem)?;
    let equil = group.dataset_f32("x0")?;
    if equil.len() != 3 * atoms.len() {
        return Err(ConfigError::invalid_dataset(
            "x0",
            &group.name,
            format!("expected 3 values per atom, got {}", equil.len()),
        ));
    }
    let consts = broadcast(
        group.dataset_f32("spring_const")?,
        atoms.len(),
        "spring_const",
        group,
    )?;

    let restraints = atoms
        .iter()
        .zip(&consts)
        .enumerate()
        .map(|(term, (&atom, &spring_const))| Restraint {
            atom,
            equil_pos: Vector3::new(equil[3 * term], equil[3 * term + 1], equil[3 * term + 2]),
            spring_const,
        })
        .collect();
    Ok(Box::new(PosSpring::new(ctx, restraints)?))
}

fn create_dist_spring(
    group: &ConfigGroup,
    ctx: &mut GraphContext<'_>,
) -> Result<Box<dyn DerivComputation>> {
    let n_elem = ctx.parent_n_elem(0);
    let pairs = group.dataset_indices("id", n_elem)?;
    if pairs.len() % 2 != 0 {
        return Err(ConfigError::invalid_dataset(
            "id",
            &group.name,
            "expected two indices per bond",
        ));
    }
    let n_bonds = pairs.len() / 2;
    let equil_dist = broadcast(group.dataset_f32("equil_dist")?, n_bonds, "equil_dist", group)?;
    let consts = broadcast(
        group.dataset_f32("spring_const")?,
        n_bonds,
        "spring_const",
        group,
    )?;

    let bonds = (0..n_bonds)
        .map(|bond| Bond {
            atoms: [pairs[2 * bond], pairs[2 * bond + 1]],
            equil_dist: equil_dist[bond],
            spring_const: consts[bond],
        })
        .collect();
    Ok(Box::new(DistSpring::new(ctx, bonds)?))
}

fn create_centroid(
    group: &ConfigGroup,
    ctx: &mut GraphContext<'_>,
) -> Result<Box<dyn DerivComputation>> {
    let n_elem = ctx.parent_n_elem(0);
    let members = group.dataset_indices("index", n_elem)?;
    let bounds = group.dataset_indices("bounds", members.len() + 1)?;
    if bounds.first() != Some(&0) || bounds.last() != Some(&members.len()) {
        return Err(ConfigError::invalid_dataset(
            "bounds",
            &group.name,
            "bounds must start at 0 and end at the member count",
        ));
    }
    let mut groups = Vec::with_capacity(bounds.len().saturating_sub(1));
    for window in bounds.windows(2) {
        if window[1] < window[0] {
            return Err(ConfigError::invalid_dataset(
                "bounds",
                &group.name,
                "bounds must be non-decreasing",
            ));
        }
        groups.push(members[window[0]..window[1]].to_vec());
    }
    Ok(Box::new(GroupCentroid::new(ctx, groups)?))
}

fn create_scale(
    group: &ConfigGroup,
    ctx: &mut GraphContext<'_>,
) -> Result<Box<dyn DerivComputation>> {
    let gain = group.attr_f32("factor")?;
    Ok(Box::new(ScaleCoords::new(ctx, gain)?))
}

fn create_hbond(
    group: &ConfigGroup,
    ctx: &mut GraphContext<'_>,
) -> Result<Box<dyn DerivComputation>> {
    let n_elem = ctx.parent_n_elem(0);
    let donors = group.dataset_indices("donor", n_elem)?;
    let acceptors = group.dataset_indices("acceptor", n_elem)?;
    if donors.len() != acceptors.len() {
        return Err(ConfigError::invalid_dataset(
            "acceptor",
            &group.name,
            format!("{} donors but {} acceptors", donors.len(), acceptors.len()),
        ));
    }
    let pairs = donors
        .iter()
        .zip(&acceptors)
        .map(|(&donor, &acceptor)| HBondPair { donor, acceptor })
        .collect();

    let cutoff_dist = group.attr_f32_or("cutoff_dist", 3.5)?;
    let switch_width = group.attr_f32_or("switch_width", 0.25)?;
    let bond_energy = group.attr_f32_or("bond_energy", -1.0)?;
    Ok(Box::new(HBondCount::new(
        ctx,
        pairs,
        cutoff_dist,
        switch_width,
        bond_energy,
    )?))
}
