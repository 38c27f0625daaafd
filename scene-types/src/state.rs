//! Mechanical state buffers.
//!
//! A [`MechanicalState`] owns the numeric vectors of one simulated body:
//! positions, velocities, forces, and any pool-allocated temporaries, all
//! addressed through logical [`VecId`] handles. Components never hold
//! references into these buffers; every access goes through the id
//! resolution here so the mechanical-operations layer keeps its ordering
//! guarantees.
//!
//! Per-dof lumped mass lives with the state as well, since every integrator
//! and solver needs it next to the vectors it scales.
//!
//! # Example
//!
//! ```
//! use scene_types::{MechanicalState, VecCategory, VecId};
//! use nalgebra::Vector3;
//!
//! let mut state = MechanicalState::new("rope", vec![Vector3::zeros(); 3]);
//!
//! // A temporary in Deriv space, slot 0.
//! state.alloc_temp(0, VecCategory::Deriv);
//! let tmp = VecId::temp(VecCategory::Deriv, 0);
//! state.v_op(tmp, VecId::Velocity, VecId::Force, 0.5).unwrap();
//!
//! state.free_temp(0).unwrap();
//! assert!(state.vec(tmp).is_err()); // stale handles fail, never read garbage
//! ```

use nalgebra::Vector3;

use crate::{SceneError, VecCategory, VecId};

/// The position/velocity/force buffers of one simulated body.
#[derive(Debug, Clone)]
pub struct MechanicalState {
    name: String,
    position: Vec<Vector3<f64>>,
    rest_position: Vec<Vector3<f64>>,
    free_position: Vec<Vector3<f64>>,
    velocity: Vec<Vector3<f64>>,
    force: Vec<Vector3<f64>>,
    dx: Vec<Vector3<f64>>,
    free_velocity: Vec<Vector3<f64>>,
    masses: Vec<f64>,
    temps: Vec<Option<TempVec>>,
    mapped: bool,
}

#[derive(Debug, Clone)]
struct TempVec {
    category: VecCategory,
    data: Vec<Vector3<f64>>,
}

impl MechanicalState {
    /// Create a state with the given initial positions.
    ///
    /// Rest and free positions start as copies of the initial positions;
    /// all derivative vectors start at zero and every dof carries unit
    /// mass.
    #[must_use]
    pub fn new(name: impl Into<String>, positions: Vec<Vector3<f64>>) -> Self {
        let n = positions.len();
        Self {
            name: name.into(),
            rest_position: positions.clone(),
            free_position: positions.clone(),
            position: positions,
            velocity: vec![Vector3::zeros(); n],
            force: vec![Vector3::zeros(); n],
            dx: vec![Vector3::zeros(); n],
            free_velocity: vec![Vector3::zeros(); n],
            masses: vec![1.0; n],
            temps: Vec::new(),
            mapped: false,
        }
    }

    /// Name of this state, used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of degrees of freedom.
    #[must_use]
    pub fn len(&self) -> usize {
        self.position.len()
    }

    /// Whether the state has no dofs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /// Whether this state is the output of a mapping (non-independent).
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Mark this state as mapping-driven. Set by the scene when a mapping
    /// with this state as output is attached.
    pub fn set_mapped(&mut self, mapped: bool) {
        self.mapped = mapped;
    }

    /// Per-dof lumped masses.
    #[must_use]
    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    /// Assign the same mass to every dof.
    pub fn set_uniform_mass(&mut self, mass: f64) {
        self.masses.fill(mass);
    }

    /// Assign per-dof masses.
    pub fn set_masses(&mut self, masses: Vec<f64>) -> Result<(), SceneError> {
        if masses.len() != self.len() {
            return Err(SceneError::SizeMismatch {
                expected: self.len(),
                actual: masses.len(),
            });
        }
        self.masses = masses;
        Ok(())
    }

    /// Resolve a logical id to its buffer.
    pub fn vec(&self, id: VecId) -> Result<&[Vector3<f64>], SceneError> {
        match id {
            VecId::Position => Ok(&self.position),
            VecId::RestPosition => Ok(&self.rest_position),
            VecId::FreePosition => Ok(&self.free_position),
            VecId::Velocity => Ok(&self.velocity),
            VecId::Force => Ok(&self.force),
            VecId::Dx => Ok(&self.dx),
            VecId::FreeVelocity => Ok(&self.free_velocity),
            VecId::ConstraintJacobian => Err(SceneError::NotAVector(id)),
            VecId::Temp { category, slot } => self.temp(category, slot).map(|t| t.data.as_slice()),
        }
    }

    /// Resolve a logical id to its buffer, mutably.
    pub fn vec_mut(&mut self, id: VecId) -> Result<&mut [Vector3<f64>], SceneError> {
        match id {
            VecId::Position => Ok(&mut self.position),
            VecId::RestPosition => Ok(&mut self.rest_position),
            VecId::FreePosition => Ok(&mut self.free_position),
            VecId::Velocity => Ok(&mut self.velocity),
            VecId::Force => Ok(&mut self.force),
            VecId::Dx => Ok(&mut self.dx),
            VecId::FreeVelocity => Ok(&mut self.free_velocity),
            VecId::ConstraintJacobian => Err(SceneError::NotAVector(id)),
            VecId::Temp { category, slot } => {
                let name = self.name.clone();
                match self.temps.get_mut(slot as usize) {
                    Some(Some(t)) if t.category == category => Ok(&mut t.data),
                    _ => Err(SceneError::TempUnallocated { state: name, slot }),
                }
            }
        }
    }

    /// Allocate a temporary buffer at the given pool slot, zero-filled.
    ///
    /// Slots are handed out by the operations pool; re-allocating a live
    /// slot is a contract violation caught in debug builds.
    pub fn alloc_temp(&mut self, slot: u32, category: VecCategory) {
        let idx = slot as usize;
        if idx >= self.temps.len() {
            self.temps.resize_with(idx + 1, || None);
        }
        debug_assert!(self.temps[idx].is_none(), "temp slot {slot} re-allocated");
        self.temps[idx] = Some(TempVec {
            category,
            data: vec![Vector3::zeros(); self.len()],
        });
    }

    /// Release a temporary buffer.
    ///
    /// Releasing a slot twice fails deterministically.
    pub fn free_temp(&mut self, slot: u32) -> Result<(), SceneError> {
        match self.temps.get_mut(slot as usize) {
            Some(entry @ Some(_)) => {
                *entry = None;
                Ok(())
            }
            _ => Err(SceneError::TempUnallocated {
                state: self.name.clone(),
                slot,
            }),
        }
    }

    fn temp(&self, category: VecCategory, slot: u32) -> Result<&TempVec, SceneError> {
        match self.temps.get(slot as usize) {
            Some(Some(t)) if t.category == category => Ok(t),
            _ => Err(SceneError::TempUnallocated {
                state: self.name.clone(),
                slot,
            }),
        }
    }

    /// Fused multiply-add over this state's dofs: `v = a + b * f`.
    ///
    /// Operands may alias (`v == a` is the common axpy form); both inputs
    /// are snapshotted first so aliased calls stay well-defined.
    pub fn v_op(&mut self, v: VecId, a: VecId, b: VecId, f: f64) -> Result<(), SceneError> {
        let a_vals = self.vec(a)?.to_vec();
        let b_vals = self.vec(b)?.to_vec();
        let out = self.vec_mut(v)?;
        for (o, (av, bv)) in out.iter_mut().zip(a_vals.iter().zip(&b_vals)) {
            *o = av + bv * f;
        }
        Ok(())
    }

    /// Copy `src` into `dest`.
    pub fn v_eq(&mut self, dest: VecId, src: VecId) -> Result<(), SceneError> {
        let vals = self.vec(src)?.to_vec();
        self.vec_mut(dest)?.copy_from_slice(&vals);
        Ok(())
    }

    /// Zero a vector.
    pub fn v_clear(&mut self, v: VecId) -> Result<(), SceneError> {
        self.vec_mut(v)?.fill(Vector3::zeros());
        Ok(())
    }

    /// Dot product of two vectors over this state's dofs.
    pub fn v_dot(&self, a: VecId, b: VecId) -> Result<f64, SceneError> {
        let a_vals = self.vec(a)?;
        let b_vals = self.vec(b)?;
        Ok(a_vals.iter().zip(b_vals).map(|(x, y)| x.dot(y)).sum())
    }

    /// Scale a force-space vector by the inverse lumped mass:
    /// `dest[i] = src[i] / m[i]`. Dofs with zero mass are left untouched
    /// (they are fixed).
    pub fn scale_by_inv_mass(&mut self, dest: VecId, src: VecId) -> Result<(), SceneError> {
        let src_vals = self.vec(src)?.to_vec();
        let masses = self.masses.clone();
        let out = self.vec_mut(dest)?;
        for ((o, s), &m) in out.iter_mut().zip(&src_vals).zip(&masses) {
            if m > 0.0 {
                *o = s / m;
            }
        }
        Ok(())
    }

    /// Verify a vector contains only finite values.
    pub fn check_finite(&self, v: VecId) -> Result<(), SceneError> {
        for (i, val) in self.vec(v)?.iter().enumerate() {
            if !val.iter().all(|c| c.is_finite()) {
                return Err(SceneError::diverged(format!(
                    "non-finite {v} at dof {i} of state '{}'",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn state3() -> MechanicalState {
        MechanicalState::new(
            "test",
            vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(2.0, 0.0, 0.0),
            ],
        )
    }

    #[test]
    fn test_fixed_vectors_exist() {
        let state = state3();
        assert_eq!(state.len(), 3);
        assert_eq!(state.vec(VecId::Position).unwrap().len(), 3);
        assert_eq!(state.vec(VecId::Velocity).unwrap().len(), 3);
        assert_eq!(state.vec(VecId::RestPosition).unwrap()[1].x, 1.0);
    }

    #[test]
    fn test_matrix_ids_are_not_vectors() {
        let state = state3();
        assert!(matches!(
            state.vec(VecId::ConstraintJacobian),
            Err(SceneError::NotAVector(_))
        ));
    }

    #[test]
    fn test_temp_lifecycle() {
        let mut state = state3();
        state.alloc_temp(0, VecCategory::Deriv);
        let tmp = VecId::temp(VecCategory::Deriv, 0);

        state.vec_mut(tmp).unwrap()[0] = Vector3::new(5.0, 0.0, 0.0);
        assert_eq!(state.vec(tmp).unwrap()[0].x, 5.0);

        state.free_temp(0).unwrap();

        // Use-after-free fails deterministically.
        assert!(state.vec(tmp).unwrap_err().is_stale_temp());
        // Double free fails deterministically.
        assert!(state.free_temp(0).unwrap_err().is_stale_temp());
    }

    #[test]
    fn test_temp_category_checked() {
        let mut state = state3();
        state.alloc_temp(0, VecCategory::Deriv);
        let wrong = VecId::temp(VecCategory::Coord, 0);
        assert!(state.vec(wrong).is_err());
    }

    #[test]
    fn test_v_op_axpy() {
        let mut state = state3();
        state.vec_mut(VecId::Velocity).unwrap()[2] = Vector3::new(0.0, 0.0, -2.0);

        // x = x + v * dt
        state
            .v_op(VecId::Position, VecId::Position, VecId::Velocity, 0.5)
            .unwrap();

        let x = state.vec(VecId::Position).unwrap();
        assert_relative_eq!(x[2].x, 2.0);
        assert_relative_eq!(x[2].z, -1.0);
        assert_relative_eq!(x[0].z, 0.0);
    }

    #[test]
    fn test_v_op_full_alias() {
        let mut state = state3();
        // x = x + x * 1.0 doubles every coordinate.
        state
            .v_op(VecId::Position, VecId::Position, VecId::Position, 1.0)
            .unwrap();
        assert_relative_eq!(state.vec(VecId::Position).unwrap()[2].x, 4.0);
    }

    #[test]
    fn test_v_dot() {
        let mut state = state3();
        state.vec_mut(VecId::Force).unwrap()[0] = Vector3::new(1.0, 2.0, 3.0);
        state.vec_mut(VecId::Dx).unwrap()[0] = Vector3::new(4.0, 5.0, 6.0);
        let dot = state.v_dot(VecId::Force, VecId::Dx).unwrap();
        assert_relative_eq!(dot, 32.0);
    }

    #[test]
    fn test_scale_by_inv_mass_skips_fixed_dofs() {
        let mut state = state3();
        state.set_masses(vec![2.0, 0.0, 4.0]).unwrap();
        state.vec_mut(VecId::Force).unwrap()[0] = Vector3::new(4.0, 0.0, 0.0);
        state.vec_mut(VecId::Force).unwrap()[1] = Vector3::new(4.0, 0.0, 0.0);
        state.vec_mut(VecId::Force).unwrap()[2] = Vector3::new(4.0, 0.0, 0.0);

        state.scale_by_inv_mass(VecId::Dx, VecId::Force).unwrap();

        let dx = state.vec(VecId::Dx).unwrap();
        assert_relative_eq!(dx[0].x, 2.0);
        assert_relative_eq!(dx[1].x, 0.0); // zero-mass dof untouched
        assert_relative_eq!(dx[2].x, 1.0);
    }

    #[test]
    fn test_check_finite() {
        let mut state = state3();
        assert!(state.check_finite(VecId::Position).is_ok());
        state.vec_mut(VecId::Position).unwrap()[1].y = f64::NAN;
        assert!(state.check_finite(VecId::Position).unwrap_err().is_diverged());
    }

    #[test]
    fn test_set_masses_size_checked() {
        let mut state = state3();
        assert!(matches!(
            state.set_masses(vec![1.0]),
            Err(SceneError::SizeMismatch { .. })
        ));
    }
}
