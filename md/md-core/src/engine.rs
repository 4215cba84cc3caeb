//! The graph engine: node table, construction, and evaluation orchestration.
//!
//! Nodes reference each other by index into the engine's node table, never by
//! pointer; insertion order is a valid topological order, which the engine
//! exploits for disjoint borrows during evaluation. The position node is
//! always index 0 so the integrator can locate it without a lookup.

use core::fmt;

use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::debug;

use md_types::{ComputeMode, CoordArray, EngineError, Result};

use crate::ledger::Slot;
use crate::node::{
    CoordData, DerivComputation, InputView, NodeData, NodeSpec, OutputView, SensView,
};
use crate::nodes::Pos;

/// Name of the distinguished position node.
pub const POS_NODE_NAME: &str = "pos";

/// One entry of the engine's node table.
pub struct Node {
    name: String,
    computation: Box<dyn DerivComputation>,
    parents: Vec<usize>,
    children: Vec<usize>,
    forward_level: u32,
    reverse_level: u32,
    data: NodeData,
}

impl Node {
    /// The node's stable textual name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Indices of this node's parents in the engine's node table.
    #[must_use]
    pub fn parents(&self) -> &[usize] {
        &self.parents
    }

    /// Indices of this node's children in the engine's node table.
    #[must_use]
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    /// Execution rank during the forward pass (parents fire first).
    #[must_use]
    pub fn forward_level(&self) -> u32 {
        self.forward_level
    }

    /// Execution rank during the reverse pass (children fire first).
    #[must_use]
    pub fn reverse_level(&self) -> u32 {
        self.reverse_level
    }

    /// Engine-owned buffers of this node.
    #[must_use]
    pub fn data(&self) -> &NodeData {
        &self.data
    }

    /// The node's computation.
    #[must_use]
    pub fn computation(&self) -> &dyn DerivComputation {
        self.computation.as_ref()
    }

    /// Mutable access to the node's computation.
    pub fn computation_mut(&mut self) -> &mut dyn DerivComputation {
        self.computation.as_mut()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("parents", &self.parents)
            .field("children", &self.children)
            .field("forward_level", &self.forward_level)
            .field("reverse_level", &self.reverse_level)
            .finish_non_exhaustive()
    }
}

/// Construction-time view handed to node builders.
///
/// Exposes the shapes of the declared parents and the ability to reserve
/// ledger slots against them; a builder never touches the node table
/// directly.
pub struct GraphContext<'a> {
    nodes: &'a mut [Node],
    parents: &'a [usize],
    node_name: &'a str,
}

impl GraphContext<'_> {
    /// Number of declared parents.
    #[must_use]
    pub fn n_parents(&self) -> usize {
        self.parents.len()
    }

    /// Name of the node under construction.
    #[must_use]
    pub fn node_name(&self) -> &str {
        self.node_name
    }

    /// Node-table index of parent `k`.
    #[must_use]
    pub fn parent_index(&self, k: usize) -> usize {
        self.parents[k]
    }

    fn parent_coord(&self, k: usize) -> &CoordData {
        // add_node admits only coordinate nodes as parents
        match self.nodes[self.parents[k]].data.as_coord() {
            Some(coord) => coord,
            None => unreachable!("parents are validated as coordinate nodes"),
        }
    }

    /// Element count of parent `k`.
    #[must_use]
    pub fn parent_n_elem(&self, k: usize) -> usize {
        self.parent_coord(k).output.n_elem()
    }

    /// Element width of parent `k`.
    #[must_use]
    pub fn parent_elem_width(&self, k: usize) -> usize {
        self.parent_coord(k).output.elem_width()
    }

    /// Fail with [`EngineError::SizeMismatch`] unless parent `k` has exactly
    /// the expected element width.
    pub fn require_width(&self, k: usize, expected: usize) -> Result<()> {
        let actual = self.parent_elem_width(k);
        if actual == expected {
            Ok(())
        } else {
            Err(EngineError::size_mismatch(self.node_name, expected, actual))
        }
    }

    /// Fail with [`EngineError::SizeMismatch`] unless parent `k` has at
    /// least the given element width.
    pub fn require_width_at_least(&self, k: usize, lower_bound: usize) -> Result<()> {
        let actual = self.parent_elem_width(k);
        if actual >= lower_bound {
            Ok(())
        } else {
            Err(EngineError::size_mismatch(self.node_name, lower_bound, actual))
        }
    }

    /// Reserve `output_width` rows against element `atom` of parent `k`.
    ///
    /// The returned slot addresses the reserved region during the reverse
    /// pass.
    pub fn reserve_slot(&mut self, k: usize, atom: usize, output_width: usize) -> Slot {
        let parent = self.parents[k];
        match self.nodes[parent].data.as_coord_mut() {
            Some(coord) => coord.ledger.add_request(output_width, atom),
            None => unreachable!("parents are validated as coordinate nodes"),
        }
    }
}

/// The differentiable computation engine.
///
/// Owns the node table, orchestrates forward and reverse passes, and gives
/// the integrator access to position gradients. Construction can fail;
/// evaluation cannot.
pub struct Engine {
    nodes: Vec<Node>,
    index_by_name: HashMap<String, usize>,
    forward_order: Vec<usize>,
    reverse_order: Vec<usize>,
    potential: f32,
    n_atom: usize,
}

impl Engine {
    /// Create an engine containing only the position node, sized
    /// `3 × n_atom`, at index 0.
    #[must_use]
    pub fn new(n_atom: usize) -> Self {
        let node = Node {
            name: POS_NODE_NAME.to_string(),
            computation: Box::new(Pos::new(n_atom)),
            parents: Vec::new(),
            children: Vec::new(),
            forward_level: 0,
            reverse_level: 0,
            data: NodeData::Coord(CoordData::new(3, n_atom)),
        };
        let mut index_by_name = HashMap::new();
        index_by_name.insert(POS_NODE_NAME.to_string(), 0);
        Self {
            nodes: vec![node],
            index_by_name,
            forward_order: vec![0],
            reverse_order: vec![0],
            potential: 0.0,
            n_atom,
        }
    }

    /// Number of atoms held by the position node.
    #[must_use]
    pub fn n_atom(&self) -> usize {
        self.n_atom
    }

    /// The full node table, in insertion order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes, position node included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the engine holds no nodes. Never true: the position node is
    /// always present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Sum of the potential-term energies from the last forward pass.
    #[must_use]
    pub fn potential(&self) -> f32 {
        self.potential
    }

    fn pos_data(&self) -> &CoordData {
        match self.nodes[0].data.as_coord() {
            Some(coord) => coord,
            None => unreachable!("index 0 is always the position node"),
        }
    }

    pub(crate) fn pos_data_mut(&mut self) -> &mut CoordData {
        match self.nodes[0].data.as_coord_mut() {
            Some(coord) => coord,
            None => unreachable!("index 0 is always the position node"),
        }
    }

    /// Current atomic positions.
    #[must_use]
    pub fn position(&self) -> &CoordArray {
        &self.pos_data().output
    }

    /// Mutable atomic positions. Freely writable between `compute` calls.
    pub fn position_mut(&mut self) -> &mut CoordArray {
        &mut self.pos_data_mut().output
    }

    /// Gradient of the summed potentials with respect to the positions, as
    /// accumulated by the last reverse pass.
    #[must_use]
    pub fn position_sens(&self) -> &CoordArray {
        &self.pos_data().sens
    }

    /// Node-table index of the named node, if present.
    #[must_use]
    pub fn get_idx(&self, name: &str) -> Option<usize> {
        self.index_by_name.get(name).copied()
    }

    /// The named node, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.get_idx(name).map(|idx| &self.nodes[idx])
    }

    /// Mutable access to the named node, if present.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Node> {
        let idx = self.get_idx(name)?;
        Some(&mut self.nodes[idx])
    }

    /// Downcast the named node's computation to a concrete type.
    ///
    /// Fails with [`EngineError::TypeMismatch`] when the node is absent or
    /// its computation is of a different type.
    pub fn get_as<T: DerivComputation + 'static>(&self, name: &str) -> Result<&T> {
        self.get(name)
            .and_then(|node| node.computation.as_any().downcast_ref::<T>())
            .ok_or_else(|| EngineError::type_mismatch(name, std::any::type_name::<T>()))
    }

    /// Mutable variant of [`Self::get_as`].
    pub fn get_as_mut<T: DerivComputation + 'static>(&mut self, name: &str) -> Result<&mut T> {
        let idx = self
            .get_idx(name)
            .ok_or_else(|| EngineError::type_mismatch(name, std::any::type_name::<T>()))?;
        self.nodes[idx]
            .computation
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| EngineError::type_mismatch(name, std::any::type_name::<T>()))
    }

    /// Compute a named diagnostic quantity on the named node.
    pub fn get_value_by_name(&self, node: &str, key: &str) -> Result<Vec<f32>> {
        let node = self
            .get(node)
            .ok_or_else(|| EngineError::type_mismatch(node, "node"))?;
        node.computation.get_value_by_name(key)
    }

    /// The named node's parameter subset; empty when the node exposes none.
    pub fn node_param(&self, name: &str) -> Result<Vec<f32>> {
        self.get(name)
            .map(|node| node.computation.get_param())
            .ok_or_else(|| EngineError::type_mismatch(name, "node"))
    }

    /// Overwrite the named node's parameter subset.
    pub fn set_node_param(&mut self, name: &str, new_params: &[f32]) -> Result<()> {
        let node = self
            .get_mut(name)
            .ok_or_else(|| EngineError::type_mismatch(name, "node"))?;
        node.computation_mut().set_param(new_params);
        Ok(())
    }

    /// The named node's parameter derivative, as accumulated by the last
    /// reverse pass.
    pub fn node_param_deriv(&self, name: &str) -> Result<Vec<f32>> {
        self.get(name)
            .map(|node| node.computation.get_param_deriv())
            .ok_or_else(|| EngineError::type_mismatch(name, "node"))
    }

    /// Summed hydrogen-bond count across every counter node.
    #[must_use]
    pub fn n_hbond(&self) -> f32 {
        self.nodes
            .iter()
            .filter_map(|node| node.computation.n_hbond())
            .sum()
    }

    /// Append a node referring to previously added parents.
    ///
    /// `build` runs with a [`GraphContext`] over the declared parents and
    /// returns the node's computation; slot reservations happen inside it.
    /// Name and parent validation precedes any mutation, so a rejected name
    /// leaves the engine unchanged.
    pub fn add_node<F, E>(
        &mut self,
        name: &str,
        parent_names: &[&str],
        build: F,
    ) -> std::result::Result<usize, E>
    where
        F: FnOnce(&mut GraphContext<'_>) -> std::result::Result<Box<dyn DerivComputation>, E>,
        E: From<EngineError>,
    {
        if self.index_by_name.contains_key(name) {
            return Err(EngineError::duplicate_name(name).into());
        }
        let mut parents = Vec::with_capacity(parent_names.len());
        for parent in parent_names {
            let Some(&idx) = self.index_by_name.get(*parent) else {
                return Err(EngineError::unknown_parent(*parent, name).into());
            };
            if self.nodes[idx].data.as_coord().is_none() {
                return Err(EngineError::type_mismatch(*parent, "coordinate node").into());
            }
            // each producer is borrowed once per pass; declare it once and
            // route every slot through that single input
            if parents.contains(&idx) {
                return Err(EngineError::type_mismatch(*parent, "distinct parent").into());
            }
            parents.push(idx);
        }

        let computation = {
            let mut ctx = GraphContext {
                nodes: &mut self.nodes,
                parents: &parents,
                node_name: name,
            };
            build(&mut ctx)?
        };

        let data = match computation.spec() {
            NodeSpec::Coord { n_elem, elem_width } => {
                NodeData::Coord(CoordData::new(elem_width, n_elem))
            }
            NodeSpec::Potential => NodeData::Potential { potential: 0.0 },
        };

        let idx = self.nodes.len();
        for &parent in &parents {
            self.nodes[parent].children.push(idx);
        }
        self.nodes.push(Node {
            name: name.to_string(),
            computation,
            parents,
            children: Vec::new(),
            forward_level: 0,
            reverse_level: 0,
            data,
        });
        self.index_by_name.insert(name.to_string(), idx);
        self.refresh_levels();
        debug!(
            node = name,
            index = idx,
            level = self.nodes[idx].forward_level,
            "added node"
        );
        Ok(idx)
    }

    /// Recompute execution levels and firing orders after an insertion.
    ///
    /// Forward levels rise from the sources, reverse levels from the leaves;
    /// insertion index breaks ties so firing order is reproducible.
    fn refresh_levels(&mut self) {
        for idx in 0..self.nodes.len() {
            let level = self.nodes[idx]
                .parents
                .iter()
                .map(|&p| self.nodes[p].forward_level + 1)
                .max()
                .unwrap_or(0);
            self.nodes[idx].forward_level = level;
        }
        for idx in (0..self.nodes.len()).rev() {
            let level = self.nodes[idx]
                .children
                .iter()
                .map(|&c| self.nodes[c].reverse_level + 1)
                .max()
                .unwrap_or(0);
            self.nodes[idx].reverse_level = level;
        }

        self.forward_order = (0..self.nodes.len()).collect();
        self.forward_order
            .sort_unstable_by_key(|&idx| (self.nodes[idx].forward_level, idx));
        self.reverse_order = (0..self.nodes.len()).collect();
        self.reverse_order
            .sort_unstable_by_key(|&idx| (self.nodes[idx].reverse_level, idx));
    }

    /// Execute one forward pass, then one reverse pass.
    ///
    /// Afterwards [`Self::potential`] holds the summed potential terms and
    /// [`Self::position_sens`] holds the gradient of that sum with respect
    /// to the positions. In [`ComputeMode::Deriv`] the potential value may
    /// be approximate; the gradient is exact in both modes.
    pub fn compute(&mut self, mode: ComputeMode) {
        let order = std::mem::take(&mut self.forward_order);
        for &idx in &order {
            self.fire_forward(idx, mode);
        }
        self.forward_order = order;

        self.potential = self
            .nodes
            .iter()
            .filter_map(|node| node.data.potential())
            .sum();

        for node in &mut self.nodes {
            if let Some(coord) = node.data.as_coord_mut() {
                coord.sens.fill(0.0);
                coord.ledger.zero_accum();
            }
        }
        let order = std::mem::take(&mut self.reverse_order);
        for &idx in &order {
            self.fire_reverse(idx);
        }
        self.reverse_order = order;
    }

    fn fire_forward(&mut self, idx: usize, mode: ComputeMode) {
        let (before, rest) = self.nodes.split_at_mut(idx);
        let Some((node, _)) = rest.split_first_mut() else {
            return;
        };
        let mut inputs = input_views(before, &node.parents);
        let own = match &mut node.data {
            NodeData::Coord(coord) => OutputView::Coord(&mut coord.output),
            NodeData::Potential { potential } => OutputView::Potential(potential),
        };
        node.computation.compute_value(mode, own, &mut inputs);
    }

    fn fire_reverse(&mut self, idx: usize) {
        let (before, rest) = self.nodes.split_at_mut(idx);
        let Some((node, _)) = rest.split_first_mut() else {
            return;
        };
        // Gather the deposits this node's children made against its ledger.
        // Children hold strictly lower reverse levels, so every deposit is
        // already in place.
        if let Some(coord) = node.data.as_coord_mut() {
            coord.ledger.collect_sens(&mut coord.sens);
        }
        let mut inputs = input_views(before, &node.parents);
        let own = match &node.data {
            NodeData::Coord(coord) => SensView::Coord {
                output: &coord.output,
                sens: &coord.sens,
            },
            NodeData::Potential { .. } => SensView::Potential,
        };
        node.computation.propagate_deriv(own, &mut inputs);
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("n_atom", &self.n_atom)
            .field("nodes", &self.nodes)
            .field("potential", &self.potential)
            .finish()
    }
}

/// Build input views over the parents of a firing node.
///
/// Parents always precede the firing node in the table, so `before` contains
/// all of them; the walk below splits the slice so each parent is borrowed
/// exactly once, in declaration order.
fn input_views<'a>(before: &'a mut [Node], parents: &[usize]) -> SmallVec<[InputView<'a>; 4]> {
    let mut by_index: SmallVec<[(usize, usize); 4]> = parents
        .iter()
        .enumerate()
        .map(|(k, &p)| (p, k))
        .collect();
    by_index.sort_unstable();

    let mut collected: SmallVec<[(usize, InputView<'a>); 4]> = SmallVec::new();
    let mut rest = before;
    let mut base = 0;
    for &(parent, k) in &by_index {
        let (head, tail) = rest.split_at_mut(parent + 1 - base);
        base = parent + 1;
        rest = tail;
        if let Some(node) = head.last_mut() {
            if let Some(coord) = node.data.as_coord_mut() {
                collected.push((
                    k,
                    InputView {
                        output: &coord.output,
                        ledger: &mut coord.ledger,
                    },
                ));
            }
        }
    }
    collected.sort_unstable_by_key(|entry| entry.0);
    collected.into_iter().map(|(_, view)| view).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::nodes::{PosSpring, Restraint, ScaleCoords};
    use md_types::Vector3;

    fn quadratic(engine: &mut Engine, name: &str, parent: &str) {
        let n = engine
            .get(parent)
            .and_then(|node| node.data().as_coord())
            .map(|coord| coord.output.n_elem())
            .unwrap();
        let restraints: Vec<Restraint> = (0..n)
            .map(|atom| Restraint {
                atom,
                equil_pos: Vector3::zeros(),
                spring_const: 1.0,
            })
            .collect();
        engine
            .add_node::<_, EngineError>(name, &[parent], |ctx| {
                Ok(Box::new(PosSpring::new(ctx, restraints)?))
            })
            .unwrap();
    }

    #[test]
    fn test_empty_graph() {
        let mut engine = Engine::new(4);
        engine.position_mut().set_vec3(1, Vector3::new(1.0, 2.0, 3.0));
        engine.compute(ComputeMode::PotentialAndDeriv);

        assert_eq!(engine.potential(), 0.0);
        assert_eq!(engine.position().vec3(1), Vector3::new(1.0, 2.0, 3.0));
        for atom in 0..4 {
            assert_eq!(engine.position_sens().vec3(atom), Vector3::zeros());
        }
    }

    #[test]
    fn test_duplicate_name_is_atomic() {
        let mut engine = Engine::new(2);
        quadratic(&mut engine, "foo", "pos");
        let before = engine.len();

        let restraints = vec![Restraint {
            atom: 0,
            equil_pos: Vector3::zeros(),
            spring_const: 1.0,
        }];
        let err = engine
            .add_node::<_, EngineError>("foo", &["pos"], |ctx| {
                Ok(Box::new(PosSpring::new(ctx, restraints)?))
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateName { .. }));
        assert_eq!(engine.len(), before);
    }

    #[test]
    fn test_unknown_parent() {
        let mut engine = Engine::new(2);
        let err = engine
            .add_node::<_, EngineError>("x", &["nope"], |ctx| {
                Ok(Box::new(ScaleCoords::new(ctx, 2.0)?))
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownParent { .. }));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_levels_respect_edges() {
        let mut engine = Engine::new(2);
        engine
            .add_node::<_, EngineError>("doubled", &["pos"], |ctx| {
                Ok(Box::new(ScaleCoords::new(ctx, 2.0)?))
            })
            .unwrap();
        quadratic(&mut engine, "on_pos", "pos");
        quadratic(&mut engine, "on_doubled", "doubled");

        for node in engine.nodes() {
            for &parent in node.parents() {
                let parent = &engine.nodes()[parent];
                assert!(parent.forward_level() < node.forward_level());
                assert!(parent.reverse_level() > node.reverse_level());
            }
        }
    }

    #[test]
    fn test_get_as_mismatch() {
        let mut engine = Engine::new(2);
        quadratic(&mut engine, "foo", "pos");

        assert!(engine.get_as::<PosSpring>("foo").is_ok());
        let err = engine.get_as::<ScaleCoords>("foo").unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));
        assert!(engine.get_as::<PosSpring>("missing").is_err());
    }

    #[test]
    fn test_reverse_pass_is_reproducible() {
        let mut engine = Engine::new(3);
        for atom in 0..3 {
            engine
                .position_mut()
                .set_vec3(atom, Vector3::new(atom as f32, 0.5, -1.0));
        }
        quadratic(&mut engine, "foo", "pos");

        engine.compute(ComputeMode::PotentialAndDeriv);
        let first = engine.position_sens().clone();
        engine.compute(ComputeMode::PotentialAndDeriv);
        assert_eq!(&first, engine.position_sens());
    }
}
