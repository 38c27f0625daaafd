//! Error types for the collision pipeline.

use thiserror::Error;

/// Errors surfaced by the collision pipeline.
///
/// Detection-stage errors are stage-local: the offending pair is dropped
/// and the step continues. Only scene wiring errors propagate.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    /// A scene-graph or state access failed.
    #[error(transparent)]
    Scene(#[from] scene_types::SceneError),

    /// Unknown collision model referenced.
    #[error("unknown collision model: {0}")]
    UnknownModel(u32),

    /// Geometry of a candidate pair was malformed or degenerate.
    #[error("degenerate geometry between models {model_a} and {model_b}: {detail}")]
    DegenerateGeometry {
        /// First model of the pair.
        model_a: u32,
        /// Second model of the pair.
        model_b: u32,
        /// What was wrong.
        detail: String,
    },

    /// A dof-anchored shape was created without a bound state.
    #[error("collision model '{model}' has no bound mechanical state")]
    UnboundModel {
        /// Name of the offending model.
        model: String,
    },
}

impl PipelineError {
    /// Whether this error is local to one detection pair (recoverable by
    /// dropping the pair).
    #[must_use]
    pub fn is_pair_local(&self) -> bool {
        matches!(self, Self::DegenerateGeometry { .. })
    }
}
