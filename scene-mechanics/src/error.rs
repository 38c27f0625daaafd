//! Error type for mechanical stepping.

use thiserror::Error;

/// Errors surfaced by the mechanical operations layer and integrators.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StepError {
    /// A scene-graph or state access failed.
    #[error(transparent)]
    Scene(#[from] scene_types::SceneError),

    /// The implicit solve failed, fatally for this step. The scene is left
    /// with positions and velocities unchanged so a surrounding integrator
    /// can fall back to an explicit step if it is configured to.
    #[error(transparent)]
    Solver(#[from] scene_solver::SolverError),
}

impl StepError {
    /// Whether the step failed in the linear solver.
    #[must_use]
    pub fn is_solver_failure(&self) -> bool {
        matches!(self, Self::Solver(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use scene_types::SceneError;

    #[test]
    fn test_conversions() {
        let err: StepError = SceneError::InvalidNodeId(3).into();
        assert!(!err.is_solver_failure());
        assert!(err.to_string().contains('3'));

        let err: StepError = scene_solver::SolverError::singular("m", 1, true).into();
        assert!(err.is_solver_failure());
    }
}
