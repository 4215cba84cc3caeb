//! Engine materialisation from a configuration tree.

use md_core::Engine;
use md_types::EngineError;
use tracing::{debug, warn};

use crate::error::{ConfigError, Result};
use crate::registry::NodeRegistry;
use crate::tree::ConfigGroup;

/// The parent-node names a subgroup declares; an absent `arguments`
/// attribute means the node consumes nothing.
fn declared_parents(group: &ConfigGroup) -> Result<Vec<String>> {
    if group.attrs.contains_key("arguments") {
        group.attr_str_list("arguments")
    } else {
        Ok(Vec::new())
    }
}

/// Build an engine from the subgroups of `potential`.
///
/// Each subgroup's name doubles as the node name and the registry lookup
/// key. Groups may be listed in any order: a group whose parents are not
/// yet constructed is deferred and retried, and only a truly missing parent
/// (or a dependency cycle) is an error.
pub fn initialize_from_config(
    n_atom: usize,
    potential: &ConfigGroup,
    registry: &NodeRegistry,
) -> Result<Engine> {
    let mut engine = Engine::new(n_atom);
    let mut pending: Vec<&ConfigGroup> = potential.groups.iter().collect();

    while !pending.is_empty() {
        let n_before = pending.len();
        let mut deferred: Vec<&ConfigGroup> = Vec::new();

        for group in pending {
            let parents = declared_parents(group)?;
            if parents.iter().any(|name| engine.get_idx(name).is_none()) {
                deferred.push(group);
                continue;
            }

            let entry = registry
                .lookup(&group.name)
                .ok_or_else(|| ConfigError::UnknownNodeType(group.name.clone()))?;
            entry.check_arity(&group.name, parents.len())?;

            let parent_refs: Vec<&str> = parents.iter().map(String::as_str).collect();
            engine.add_node::<_, ConfigError>(&group.name, &parent_refs, |ctx| {
                entry.create(group, ctx)
            })?;
            debug!(node = %group.name, registry_key = entry.prefix(), "materialised node");
        }

        if deferred.len() == n_before {
            // no progress this round: some parent can never appear
            let group = deferred[0];
            let missing = declared_parents(group)?
                .into_iter()
                .find(|name| engine.get_idx(name).is_none())
                .unwrap_or_default();
            return Err(EngineError::unknown_parent(missing, &group.name).into());
        }
        if !deferred.is_empty() {
            warn!(
                deferred = deferred.len(),
                "potential groups listed before their parents; retrying"
            );
        }
        pending = deferred;
    }

    Ok(engine)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use md_types::{ComputeMode, Vector3};

    fn build(json: &str, n_atom: usize) -> Result<Engine> {
        let root = ConfigGroup::from_json_str(json)?;
        let registry = NodeRegistry::with_standard_nodes();
        initialize_from_config(n_atom, &root, &registry)
    }

    #[test]
    fn test_quadratic_from_config() {
        let mut engine = build(
            r#"{
                "name": "potential",
                "groups": [
                    {
                        "name": "pos_spring",
                        "attrs": { "arguments": ["pos"] },
                        "datasets": {
                            "atom": { "data": [0, 1] },
                            "x0": { "shape": [2, 3], "data": [0.0, 0.0, 0.0, 0.0, 0.0, 0.0] },
                            "spring_const": { "data": [1.0] }
                        }
                    }
                ]
            }"#,
            2,
        )
        .unwrap();

        engine.position_mut().set_vec3(0, Vector3::new(1.0, 2.0, 3.0));
        engine.compute(ComputeMode::PotentialAndDeriv);
        assert_eq!(engine.potential(), 7.0);
        assert_eq!(engine.position_sens().vec3(0), Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_out_of_order_groups_are_deferred() {
        // The spring on the scaled coordinates is listed first; one retry
        // round resolves it.
        let mut engine = build(
            r#"{
                "name": "potential",
                "groups": [
                    {
                        "name": "pos_spring",
                        "attrs": { "arguments": ["scale_coords"] },
                        "datasets": {
                            "atom": { "data": [0] },
                            "x0": { "data": [0.0, 0.0, 0.0] },
                            "spring_const": { "data": [2.0] }
                        }
                    },
                    {
                        "name": "scale_coords",
                        "attrs": { "arguments": ["pos"], "factor": 2.0 }
                    }
                ]
            }"#,
            1,
        )
        .unwrap();

        engine.position_mut().set_vec3(0, Vector3::new(1.0, 0.0, 0.0));
        engine.compute(ComputeMode::PotentialAndDeriv);
        assert_eq!(engine.potential(), 4.0);
        assert_eq!(engine.position_sens().vec3(0), Vector3::new(8.0, 0.0, 0.0));
    }

    #[test]
    fn test_unknown_node_type() {
        let err = build(
            r#"{
                "name": "potential",
                "groups": [
                    { "name": "warp_field", "attrs": { "arguments": ["pos"] } }
                ]
            }"#,
            1,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownNodeType(_)));
    }

    #[test]
    fn test_missing_parent() {
        let err = build(
            r#"{
                "name": "potential",
                "groups": [
                    {
                        "name": "scale_coords",
                        "attrs": { "arguments": ["nope"], "factor": 2.0 }
                    }
                ]
            }"#,
            1,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Engine(EngineError::UnknownParent { .. })
        ));
    }

    #[test]
    fn test_arity_mismatch() {
        let err = build(
            r#"{
                "name": "potential",
                "groups": [
                    { "name": "scale_coords", "attrs": { "factor": 2.0 } }
                ]
            }"#,
            1,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ArgCountMismatch { .. }));
    }

    #[test]
    fn test_full_term_mix() {
        let mut engine = build(
            r#"{
                "name": "potential",
                "groups": [
                    {
                        "name": "dist_spring",
                        "attrs": { "arguments": ["pos"] },
                        "datasets": {
                            "id": { "shape": [2, 2], "data": [0, 1, 1, 2] },
                            "equil_dist": { "data": [1.0] },
                            "spring_const": { "data": [1.0] }
                        }
                    },
                    {
                        "name": "centroid",
                        "attrs": { "arguments": ["pos"] },
                        "datasets": {
                            "index": { "data": [0, 1, 2] },
                            "bounds": { "data": [0, 3] }
                        }
                    },
                    {
                        "name": "pos_spring_com",
                        "attrs": { "arguments": ["centroid"] },
                        "datasets": {
                            "atom": { "data": [0] },
                            "x0": { "data": [0.0, 0.0, 0.0] },
                            "spring_const": { "data": [1.0] }
                        }
                    },
                    {
                        "name": "hbond_count",
                        "attrs": { "arguments": ["pos"], "cutoff_dist": 2.0 },
                        "datasets": {
                            "donor": { "data": [0] },
                            "acceptor": { "data": [2] }
                        }
                    }
                ]
            }"#,
            3,
        )
        .unwrap();

        engine.position_mut().set_vec3(0, Vector3::new(0.0, 0.0, 0.0));
        engine.position_mut().set_vec3(1, Vector3::new(1.0, 0.0, 0.0));
        engine.position_mut().set_vec3(2, Vector3::new(2.0, 0.0, 0.0));
        engine.compute(ComputeMode::PotentialAndDeriv);

        // bonds sit at equilibrium; the centroid restraint contributes
        // +1/2 and the half-formed hydrogen bond -1/2
        assert!(engine.potential().abs() < 1e-5);
        assert!((engine.n_hbond() - 0.5).abs() < 1e-5);
    }
}
