//! Error types for scene operations.

use crate::VecId;
use thiserror::Error;

/// Errors that can occur while manipulating the scene graph and its
/// mechanical states.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SceneError {
    /// Invalid node index referenced.
    #[error("invalid node id: {0}")]
    InvalidNodeId(u32),

    /// Invalid state index referenced.
    #[error("invalid state id: {0}")]
    InvalidStateId(u32),

    /// Invalid attached-object index referenced.
    #[error("invalid object id: {0}")]
    InvalidObjectId(u32),

    /// A temporary vector was used before allocation or after release.
    #[error("state '{state}': temporary vector slot {slot} is not allocated")]
    TempUnallocated {
        /// Name of the state the access targeted.
        state: String,
        /// Pool slot of the stale handle.
        slot: u32,
    },

    /// A matrix-valued id was used where a plain vector is required.
    #[error("{0} is matrix-valued, not a plain vector")]
    NotAVector(VecId),

    /// Vector lengths of two states or buffers disagree.
    #[error("size mismatch: expected {expected} dofs, got {actual}")]
    SizeMismatch {
        /// Expected dof count.
        expected: usize,
        /// Actual dof count.
        actual: usize,
    },

    /// A second mechanical state was attached to the same node.
    #[error("node {node} already has a mechanical state")]
    DuplicateState {
        /// The node carrying the existing state.
        node: u32,
    },

    /// A second collision pipeline was registered on the same node.
    #[error("node {node} already has a collision pipeline registered")]
    DuplicatePipeline {
        /// The node carrying the existing registration.
        node: u32,
    },

    /// Pipeline removal was requested on a node with no registration.
    #[error("node {node} has no collision pipeline registered")]
    PipelineNotRegistered {
        /// The node the removal targeted.
        node: u32,
    },

    /// Simulation diverged (`NaN` or `Inf` detected).
    #[error("simulation diverged: {reason}")]
    Diverged {
        /// Description of what went wrong.
        reason: String,
    },
}

impl SceneError {
    /// Create a diverged error.
    #[must_use]
    pub fn diverged(reason: impl Into<String>) -> Self {
        Self::Diverged {
            reason: reason.into(),
        }
    }

    /// Check if this is a divergence error.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        matches!(self, Self::Diverged { .. })
    }

    /// Check if this is a stale temporary-vector access.
    #[must_use]
    pub fn is_stale_temp(&self) -> bool {
        matches!(self, Self::TempUnallocated { .. })
    }
}
