//! Projective constraints.

use nalgebra::Vector3;
use scene_graph::{ProjectiveConstraint, SystemMatrixAccessor};
use scene_types::{MechanicalState, Result, StateId, VecId};

/// Pins a set of dofs: projected response vectors are zeroed there, and
/// the matching rows and columns are discarded from assembled systems.
#[derive(Debug, Clone)]
pub struct FixedConstraint {
    name: String,
    state: StateId,
    indices: Vec<usize>,
}

impl FixedConstraint {
    /// Fix the given dof indices of a state.
    #[must_use]
    pub fn new(name: impl Into<String>, state: StateId, indices: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            state,
            indices,
        }
    }

    /// The fixed dof indices.
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

impl ProjectiveConstraint for FixedConstraint {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> StateId {
        self.state
    }

    fn project_response(&self, state: &mut MechanicalState, v: VecId) -> Result<()> {
        let vec = state.vec_mut(v)?;
        for &index in &self.indices {
            if let Some(value) = vec.get_mut(index) {
                *value = Vector3::zeros();
            }
        }
        Ok(())
    }

    fn apply_to_matrix(&self, offset: usize, matrix: &mut dyn SystemMatrixAccessor) {
        for &index in &self.indices {
            for axis in 0..3 {
                matrix.discard_row_col(offset + 3 * index + axis);
            }
        }
    }
}
