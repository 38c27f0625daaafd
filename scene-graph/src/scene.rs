//! The scene: node arena plus typed component arenas.
//!
//! Nodes reference their attached components by stable arena indices, and
//! all mutation of mechanical vectors flows through the accessor methods
//! here so borrow splitting stays in one place. Components never hold
//! references into the arenas.

use std::sync::Arc;

use scene_types::{
    MechanicalState, ModelId, NodeId, ObjectId, Result, SceneError, StateId, TagRegistry, VecId,
};

use crate::node::Node;
use crate::traits::{
    EventListener, ForceContributor, ProjectiveConstraint, StatePropagator, SystemMatrixAccessor,
};
use crate::Event;

/// Which mapping callback a propagation traversal runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapPass {
    /// Position propagation: `out = f(in)`.
    Apply,
    /// Velocity propagation through the jacobian: `out = J in`.
    ApplyJ,
    /// Force back-propagation through the transpose: `in += J^T out`.
    ApplyJt,
}

/// Arena-backed scene graph.
pub struct Scene {
    nodes: Vec<Node>,
    root: NodeId,
    states: Vec<MechanicalState>,
    force_fields: Vec<Box<dyn ForceContributor>>,
    mappings: Vec<Box<dyn StatePropagator>>,
    constraints: Vec<Box<dyn ProjectiveConstraint>>,
    listeners: Vec<Box<dyn EventListener>>,
    /// Slave edges per listener object; these make object reachability a
    /// DAG rather than a tree.
    slave_edges: Vec<Vec<ObjectId>>,
    /// The single node carrying the collision pipeline registration.
    pipeline_node: Option<NodeId>,
    tags: Arc<TagRegistry>,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("nodes", &self.nodes.len())
            .field("states", &self.states.len())
            .field("force_fields", &self.force_fields.len())
            .field("mappings", &self.mappings.len())
            .field("constraints", &self.constraints.len())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Create a scene with a root node and a fresh tag registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tags(Arc::new(TagRegistry::new()))
    }

    /// Create a scene sharing an existing tag registry handle.
    #[must_use]
    pub fn with_tags(tags: Arc<TagRegistry>) -> Self {
        Self {
            nodes: vec![Node::new("root", None)],
            root: NodeId::new(0),
            states: Vec::new(),
            force_fields: Vec::new(),
            mappings: Vec::new(),
            constraints: Vec::new(),
            listeners: Vec::new(),
            slave_edges: Vec::new(),
            pipeline_node: None,
            tags,
        }
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The tag registry handle.
    #[must_use]
    pub fn tags(&self) -> &Arc<TagRegistry> {
        &self.tags
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of mechanical states.
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Number of registered force fields.
    #[must_use]
    pub fn force_field_count(&self) -> usize {
        self.force_fields.len()
    }

    /// Number of registered mappings.
    #[must_use]
    pub fn mapping_count(&self) -> usize {
        self.mappings.len()
    }

    /// Number of registered projective constraints.
    #[must_use]
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.index())
            .ok_or(SceneError::InvalidNodeId(id.raw()))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.index())
            .ok_or(SceneError::InvalidNodeId(id.raw()))
    }

    /// Append a child node under `parent`.
    pub fn add_child(&mut self, parent: NodeId, name: impl Into<String>) -> Result<NodeId> {
        let id = NodeId::new(self.nodes.len() as u32);
        self.node_mut(parent)?.children.push(id);
        self.nodes.push(Node::new(name, Some(parent)));
        Ok(id)
    }

    /// Attach a mechanical state to a node.
    ///
    /// A node has at most one mechanical state; a second attachment is
    /// rejected.
    pub fn attach_state(&mut self, node: NodeId, state: MechanicalState) -> Result<StateId> {
        if self.node(node)?.state.is_some() {
            return Err(SceneError::DuplicateState { node: node.raw() });
        }
        let id = StateId::new(self.states.len() as u32);
        self.states.push(state);
        // Lookup validated above.
        if let Ok(n) = self.node_mut(node) {
            n.state = Some(id);
        }
        Ok(id)
    }

    /// Look up a mechanical state.
    pub fn state(&self, id: StateId) -> Result<&MechanicalState> {
        self.states
            .get(id.index())
            .ok_or(SceneError::InvalidStateId(id.raw()))
    }

    /// Look up a mechanical state, mutably.
    ///
    /// Reserved for the mechanical-operations layer; arbitrary components
    /// go through traversals instead.
    pub fn state_mut(&mut self, id: StateId) -> Result<&mut MechanicalState> {
        self.states
            .get_mut(id.index())
            .ok_or(SceneError::InvalidStateId(id.raw()))
    }

    /// Iterate all states with their ids.
    pub fn states(&self) -> impl Iterator<Item = (StateId, &MechanicalState)> {
        self.states
            .iter()
            .enumerate()
            .map(|(i, s)| (StateId::new(i as u32), s))
    }

    /// Attach a force field to a node. Returns its arena index.
    pub fn attach_force_field(
        &mut self,
        node: NodeId,
        field: Box<dyn ForceContributor>,
    ) -> Result<usize> {
        let _ = self.state(field.state())?;
        let index = self.force_fields.len();
        self.node_mut(node)?.force_fields.push(index);
        self.force_fields.push(field);
        Ok(index)
    }

    /// Look up a force field by arena index.
    pub fn force_field(&self, index: usize) -> Result<&dyn ForceContributor> {
        self.force_fields
            .get(index)
            .map(AsRef::as_ref)
            .ok_or(SceneError::InvalidObjectId(index as u32))
    }

    /// Run one force field's `add_force` against its state.
    pub fn apply_force_field(&mut self, index: usize) -> Result<()> {
        let field = self
            .force_fields
            .get(index)
            .ok_or(SceneError::InvalidObjectId(index as u32))?;
        let state = self
            .states
            .get_mut(field.state().index())
            .ok_or(SceneError::InvalidStateId(field.state().raw()))?;
        field.add_force(state)
    }

    /// Run one force field's stiffness-vector product:
    /// `dst += k_fact * (dF/dx) * src` on its state.
    pub fn apply_force_field_dforce(
        &mut self,
        index: usize,
        k_fact: f64,
        src: VecId,
        dst: VecId,
    ) -> Result<()> {
        let field = self
            .force_fields
            .get(index)
            .ok_or(SceneError::InvalidObjectId(index as u32))?;
        let state = self
            .states
            .get_mut(field.state().index())
            .ok_or(SceneError::InvalidStateId(field.state().raw()))?;
        field.add_d_force(state, k_fact, src, dst)
    }

    /// Run one force field's matrix contribution.
    pub fn force_field_matrix(
        &self,
        index: usize,
        offset: usize,
        k_fact: f64,
        matrix: &mut dyn SystemMatrixAccessor,
    ) -> Result<()> {
        let field = self
            .force_fields
            .get(index)
            .ok_or(SceneError::InvalidObjectId(index as u32))?;
        let state = self.state(field.state())?;
        field.add_to_matrix(state, offset, k_fact, matrix);
        Ok(())
    }

    /// Attach a mapping to a node. The node is expected to carry the
    /// mapping's output state; the output state is marked as mapped.
    pub fn attach_mapping(
        &mut self,
        node: NodeId,
        mapping: Box<dyn StatePropagator>,
    ) -> Result<usize> {
        let input = mapping.input();
        let output = mapping.output();
        if input == output {
            return Err(SceneError::InvalidStateId(output.raw()));
        }
        let _ = self.state(input)?;
        self.state_mut(output)?.set_mapped(true);

        let index = self.mappings.len();
        self.node_mut(node)?.mappings.push(index);
        self.mappings.push(mapping);
        Ok(index)
    }

    /// Look up a mapping by arena index.
    pub fn mapping(&self, index: usize) -> Result<&dyn StatePropagator> {
        self.mappings
            .get(index)
            .map(AsRef::as_ref)
            .ok_or(SceneError::InvalidObjectId(index as u32))
    }

    /// All `(input, output)` mapping edges, for disjointness analysis.
    #[must_use]
    pub fn mapping_edges(&self) -> Vec<(StateId, StateId)> {
        self.mappings
            .iter()
            .map(|m| (m.input(), m.output()))
            .collect()
    }

    /// Run one mapping callback between its input and output states.
    ///
    /// `src` is read from the input state for [`MapPass::Apply`] and
    /// [`MapPass::ApplyJ`], and from the output state for
    /// [`MapPass::ApplyJt`]; `dst` is the vector written (accumulated for
    /// `ApplyJt`) on the opposite state.
    pub fn apply_mapping(
        &mut self,
        index: usize,
        pass: MapPass,
        src: VecId,
        dst: VecId,
    ) -> Result<()> {
        let mapping = self
            .mappings
            .get(index)
            .ok_or(SceneError::InvalidObjectId(index as u32))?;
        let (input, output) = pair_mut(&mut self.states, mapping.input(), mapping.output())?;
        match pass {
            MapPass::Apply => mapping.apply(input.vec(src)?, output.vec_mut(dst)?),
            MapPass::ApplyJ => mapping.apply_j(input.vec(src)?, output.vec_mut(dst)?),
            MapPass::ApplyJt => mapping.apply_jt(output.vec(src)?, input.vec_mut(dst)?),
        }
    }

    /// Attach a projective constraint to a node. Returns its arena index.
    pub fn attach_constraint(
        &mut self,
        node: NodeId,
        constraint: Box<dyn ProjectiveConstraint>,
    ) -> Result<usize> {
        let _ = self.state(constraint.state())?;
        let index = self.constraints.len();
        self.node_mut(node)?.constraints.push(index);
        self.constraints.push(constraint);
        Ok(index)
    }

    /// Look up a projective constraint by arena index.
    pub fn constraint(&self, index: usize) -> Result<&dyn ProjectiveConstraint> {
        self.constraints
            .get(index)
            .map(AsRef::as_ref)
            .ok_or(SceneError::InvalidObjectId(index as u32))
    }

    /// Project one constraint against a response vector of its state.
    pub fn project_response(&mut self, index: usize, v: VecId) -> Result<()> {
        let constraint = self
            .constraints
            .get(index)
            .ok_or(SceneError::InvalidObjectId(index as u32))?;
        let state = self
            .states
            .get_mut(constraint.state().index())
            .ok_or(SceneError::InvalidStateId(constraint.state().raw()))?;
        constraint.project_response(state, v)
    }

    /// Attach an event listener to a node. Returns its object id.
    pub fn attach_listener(
        &mut self,
        node: NodeId,
        listener: Box<dyn EventListener>,
    ) -> Result<ObjectId> {
        let id = ObjectId::new(self.listeners.len() as u32);
        self.node_mut(node)?.listeners.push(id);
        self.listeners.push(listener);
        self.slave_edges.push(Vec::new());
        Ok(id)
    }

    /// Register a listener object without attaching it to any node; it is
    /// only reachable through slave edges.
    pub fn register_slave_object(&mut self, listener: Box<dyn EventListener>) -> ObjectId {
        let id = ObjectId::new(self.listeners.len() as u32);
        self.listeners.push(listener);
        self.slave_edges.push(Vec::new());
        id
    }

    /// Add a master → slave edge between listener objects.
    pub fn add_slave(&mut self, master: ObjectId, slave: ObjectId) -> Result<()> {
        if slave.index() >= self.listeners.len() {
            return Err(SceneError::InvalidObjectId(slave.raw()));
        }
        self.slave_edges
            .get_mut(master.index())
            .ok_or(SceneError::InvalidObjectId(master.raw()))?
            .push(slave);
        Ok(())
    }

    /// Slaves of a listener object.
    #[must_use]
    pub fn slaves(&self, master: ObjectId) -> &[ObjectId] {
        self.slave_edges
            .get(master.index())
            .map_or(&[], Vec::as_slice)
    }

    /// Deliver an event to one listener object.
    pub fn dispatch_event(&mut self, object: ObjectId, event: &mut Event) -> Result<()> {
        self.listeners
            .get_mut(object.index())
            .ok_or(SceneError::InvalidObjectId(object.raw()))?
            .handle_event(event);
        Ok(())
    }

    /// Attach a collision model id to a node for pipeline discovery.
    pub fn attach_collision_model(&mut self, node: NodeId, model: ModelId) -> Result<()> {
        self.node_mut(node)?.collision_models.push(model);
        Ok(())
    }

    /// Register the collision pipeline on a node.
    ///
    /// At most one pipeline is discoverable per scene; duplicate
    /// registration is rejected.
    pub fn register_pipeline(&mut self, node: NodeId) -> Result<()> {
        let _ = self.node(node)?;
        if let Some(existing) = self.pipeline_node {
            return Err(SceneError::DuplicatePipeline {
                node: existing.raw(),
            });
        }
        self.pipeline_node = Some(node);
        Ok(())
    }

    /// Unregister the collision pipeline from a node.
    pub fn unregister_pipeline(&mut self, node: NodeId) -> Result<()> {
        if self.pipeline_node != Some(node) {
            return Err(SceneError::PipelineNotRegistered { node: node.raw() });
        }
        self.pipeline_node = None;
        Ok(())
    }

    /// The node carrying the pipeline registration, if any.
    #[must_use]
    pub fn pipeline_node(&self) -> Option<NodeId> {
        self.pipeline_node
    }

    /// Mutable access to two distinct states at once, for mapping
    /// propagation.
    pub fn pair_states_mut(
        &mut self,
        a: StateId,
        b: StateId,
    ) -> Result<(&mut MechanicalState, &mut MechanicalState)> {
        pair_mut(&mut self.states, a, b)
    }

    /// All state ids in the subtree rooted at `node` (depth-first,
    /// deterministic order).
    #[must_use]
    pub fn subtree_states(&self, node: NodeId) -> Vec<StateId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Ok(n) = self.node(id) {
                if let Some(state) = n.state {
                    out.push(state);
                }
                stack.extend(n.children.iter().rev().copied());
            }
        }
        out
    }
}

/// Split a state slice into two distinct mutable references.
fn pair_mut(
    states: &mut [MechanicalState],
    a: StateId,
    b: StateId,
) -> Result<(&mut MechanicalState, &mut MechanicalState)> {
    let (ia, ib) = (a.index(), b.index());
    if ia == ib {
        return Err(SceneError::InvalidStateId(a.raw()));
    }
    let len = states.len();
    if ia >= len {
        return Err(SceneError::InvalidStateId(a.raw()));
    }
    if ib >= len {
        return Err(SceneError::InvalidStateId(b.raw()));
    }
    if ia < ib {
        let (left, right) = states.split_at_mut(ib);
        Ok((&mut left[ia], &mut right[0]))
    } else {
        let (left, right) = states.split_at_mut(ia);
        Ok((&mut right[0], &mut left[ib]))
    }
}
