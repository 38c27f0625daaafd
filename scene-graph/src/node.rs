//! Scene-graph nodes.

use scene_types::{ModelId, NodeId, ObjectId, StateId};

/// A vertex in the scene graph.
///
/// A node owns no simulation logic, only structure: ordered child links
/// and ordered lists of attached component indices. Traversal order is
/// deterministic - insertion order of children and objects.
///
/// Invariant: a node has at most one mechanical state.
#[derive(Debug)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// The node's mechanical state, if any.
    pub(crate) state: Option<StateId>,
    /// Indices into the scene's force-field arena.
    pub(crate) force_fields: Vec<usize>,
    /// Indices into the scene's mapping arena. A mapping attached here has
    /// this node's state as output and an ancestor's state as input.
    pub(crate) mappings: Vec<usize>,
    /// Indices into the scene's projective-constraint arena.
    pub(crate) constraints: Vec<usize>,
    /// Collision models attached to this node.
    pub(crate) collision_models: Vec<ModelId>,
    /// Event listeners in insertion order.
    pub(crate) listeners: Vec<ObjectId>,
}

impl Node {
    pub(crate) fn new(name: impl Into<String>, parent: Option<NodeId>) -> Self {
        Self {
            name: name.into(),
            parent,
            children: Vec::new(),
            state: None,
            force_fields: Vec::new(),
            mappings: Vec::new(),
            constraints: Vec::new(),
            collision_models: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent node, `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child nodes in insertion order.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// The node's mechanical state, if any.
    #[must_use]
    pub fn state(&self) -> Option<StateId> {
        self.state
    }

    /// Indices of force fields attached to this node.
    #[must_use]
    pub fn force_fields(&self) -> &[usize] {
        &self.force_fields
    }

    /// Indices of mappings attached to this node.
    #[must_use]
    pub fn mappings(&self) -> &[usize] {
        &self.mappings
    }

    /// Indices of projective constraints attached to this node.
    #[must_use]
    pub fn constraints(&self) -> &[usize] {
        &self.constraints
    }

    /// Collision models attached to this node.
    #[must_use]
    pub fn collision_models(&self) -> &[ModelId] {
        &self.collision_models
    }

    /// Event listeners attached to this node, in insertion order.
    #[must_use]
    pub fn listeners(&self) -> &[ObjectId] {
        &self.listeners
    }
}
