//! Capability traits implemented by leaf components.
//!
//! The framework does not know concrete physical models. It only requires
//! that a component expose the callbacks its traversals invoke: force
//! accumulation, state propagation through mappings, response projection,
//! and event handling. Dispatch is by trait object; identity is the arena
//! index a component was registered under, never a pointer.

use nalgebra::Vector3;
use scene_types::{MechanicalState, Result, StateId, VecId};

use crate::Event;

/// Write access to an assembled system matrix, abstracted so components do
/// not depend on the solver crate's storage.
///
/// Row/column indices are scalar dof indices (three per mechanical dof),
/// already offset to the component's state block by the caller.
pub trait SystemMatrixAccessor {
    /// Dimension of the (square) system.
    fn dim(&self) -> usize;

    /// Accumulate `value` at `(row, col)`.
    fn add(&mut self, row: usize, col: usize, value: f64);

    /// Discard scalar row and column `index` from the system, fixing the
    /// corresponding unknown: the row and column are zeroed and the
    /// diagonal set to one. Used by projective constraints.
    fn discard_row_col(&mut self, index: usize);
}

/// A component that contributes forces to one mechanical state.
pub trait ForceContributor: Send + Sync {
    /// Component name for diagnostics.
    fn name(&self) -> &str;

    /// The state this component acts on.
    fn state(&self) -> StateId;

    /// Accumulate this component's forces into the state's
    /// [`VecId::Force`] vector. Called top-down by the force-accumulation
    /// traversal; this is the only sanctioned way to add forces.
    fn add_force(&self, state: &mut MechanicalState) -> Result<()>;

    /// Accumulate `k_fact * dF/dx` into the system matrix, with `offset`
    /// locating this state's scalar block. Components with no stiffness
    /// keep the default no-op.
    fn add_to_matrix(
        &self,
        state: &MechanicalState,
        offset: usize,
        k_fact: f64,
        matrix: &mut dyn SystemMatrixAccessor,
    ) {
        let _ = (state, offset, k_fact, matrix);
    }

    /// Accumulate the stiffness-vector product `k_fact * (dF/dx) * src`
    /// into `dst`, both resolved on this component's state. Implicit
    /// integrators use this for their right-hand side; components with no
    /// stiffness keep the default no-op.
    fn add_d_force(
        &self,
        state: &mut MechanicalState,
        k_fact: f64,
        src: VecId,
        dst: VecId,
    ) -> Result<()> {
        let _ = (state, k_fact, src, dst);
        Ok(())
    }
}

/// A mapping between an input (independent) and output (mapped) state.
///
/// `apply_jt` must be the exact adjoint of `apply_j`: for every pair of
/// vectors, `apply_j(v) · f == v · apply_jt(f)`. The type system cannot
/// enforce this; each implementation carries a property test instead.
pub trait StatePropagator: Send + Sync {
    /// Component name for diagnostics.
    fn name(&self) -> &str;

    /// The independent input state.
    fn input(&self) -> StateId;

    /// The mapped output state.
    fn output(&self) -> StateId;

    /// Propagate positions: `out = f(in)`.
    fn apply(&self, input: &[Vector3<f64>], output: &mut [Vector3<f64>]) -> Result<()>;

    /// Propagate velocities through the jacobian: `out = J in`.
    fn apply_j(&self, input: &[Vector3<f64>], output: &mut [Vector3<f64>]) -> Result<()>;

    /// Back-propagate forces through the transpose: `in += J^T out`.
    /// Accumulates, preserving forces already gathered on the input.
    fn apply_jt(&self, output_force: &[Vector3<f64>], input_force: &mut [Vector3<f64>])
        -> Result<()>;
}

/// A projective constraint filtering responses on one state.
pub trait ProjectiveConstraint: Send + Sync {
    /// Component name for diagnostics.
    fn name(&self) -> &str;

    /// The state this constraint acts on.
    fn state(&self) -> StateId;

    /// Project a response vector (force, velocity, or solution increment)
    /// onto the admissible space.
    fn project_response(&self, state: &mut MechanicalState, v: VecId) -> Result<()>;

    /// Apply the constraint to an assembled system matrix, with `offset`
    /// locating this state's scalar block.
    fn apply_to_matrix(&self, offset: usize, matrix: &mut dyn SystemMatrixAccessor);
}

/// An object that receives propagated events.
pub trait EventListener: Send + Sync {
    /// Object name for diagnostics.
    fn name(&self) -> &str;

    /// Handle a propagated event. Setting the event handled stops further
    /// propagation into the current subtree.
    fn handle_event(&mut self, event: &mut Event);
}
