//! Concrete force fields used to exercise the accumulation contracts.

use nalgebra::{Matrix3, Vector3};
use scene_graph::{ForceContributor, SystemMatrixAccessor};
use scene_types::{MechanicalState, Result, SceneError, StateId, VecId};

/// Uniform gravity: `f[i] += m[i] * g`.
#[derive(Debug, Clone)]
pub struct Gravity {
    state: StateId,
    acceleration: Vector3<f64>,
}

impl Gravity {
    /// Create a gravity field for one state.
    #[must_use]
    pub fn new(state: StateId, acceleration: Vector3<f64>) -> Self {
        Self {
            state,
            acceleration,
        }
    }
}

impl ForceContributor for Gravity {
    fn name(&self) -> &str {
        "gravity"
    }

    fn state(&self) -> StateId {
        self.state
    }

    fn add_force(&self, state: &mut MechanicalState) -> Result<()> {
        let masses = state.masses().to_vec();
        let forces = state.vec_mut(VecId::Force)?;
        for (force, mass) in forces.iter_mut().zip(masses) {
            *force += self.acceleration * mass;
        }
        Ok(())
    }
}

/// One spring between two dofs of the same state.
#[derive(Debug, Clone, Copy)]
pub struct Spring {
    /// First endpoint dof index.
    pub a: usize,
    /// Second endpoint dof index.
    pub b: usize,
    /// Spring stiffness (N/m).
    pub stiffness: f64,
    /// Damping coefficient applied along the spring direction.
    pub damping: f64,
    /// Rest length (m).
    pub rest_length: f64,
}

/// Stiff springs between dof pairs of one state.
///
/// The stiffness block written by `add_to_matrix` uses the zero-rest-length
/// form `-k I` per endpoint pair; the rest-length geometric term is
/// dropped, which keeps the system matrix symmetric and is a standard
/// implicit-integration compromise.
#[derive(Debug, Clone)]
pub struct SpringForceField {
    name: String,
    state: StateId,
    springs: Vec<Spring>,
}

impl SpringForceField {
    /// Create a spring field over one state.
    #[must_use]
    pub fn new(name: impl Into<String>, state: StateId, springs: Vec<Spring>) -> Self {
        Self {
            name: name.into(),
            state,
            springs,
        }
    }

    /// The attached springs.
    #[must_use]
    pub fn springs(&self) -> &[Spring] {
        &self.springs
    }

    fn endpoint_positions(
        state: &MechanicalState,
        spring: &Spring,
    ) -> Result<(Vector3<f64>, Vector3<f64>)> {
        let positions = state.vec(VecId::Position)?;
        let pa = *positions.get(spring.a).ok_or(SceneError::SizeMismatch {
            expected: positions.len(),
            actual: spring.a,
        })?;
        let pb = *positions.get(spring.b).ok_or(SceneError::SizeMismatch {
            expected: positions.len(),
            actual: spring.b,
        })?;
        Ok((pa, pb))
    }
}

impl ForceContributor for SpringForceField {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> StateId {
        self.state
    }

    fn add_force(&self, state: &mut MechanicalState) -> Result<()> {
        for spring in &self.springs {
            let (pa, pb) = Self::endpoint_positions(state, spring)?;
            let delta = pb - pa;
            let length = delta.norm();
            if length < 1e-12 {
                // Coincident endpoints have no defined direction.
                continue;
            }
            let direction = delta / length;

            let velocities = state.vec(VecId::Velocity)?;
            let relative_velocity = (velocities[spring.b] - velocities[spring.a]).dot(&direction);

            let magnitude = spring.stiffness * (length - spring.rest_length)
                + spring.damping * relative_velocity;
            let force = direction * magnitude;

            let forces = state.vec_mut(VecId::Force)?;
            forces[spring.a] += force;
            forces[spring.b] -= force;
        }
        Ok(())
    }

    fn add_to_matrix(
        &self,
        _state: &MechanicalState,
        offset: usize,
        k_fact: f64,
        matrix: &mut dyn SystemMatrixAccessor,
    ) {
        for spring in &self.springs {
            let block = Matrix3::identity() * (-spring.stiffness * k_fact);
            let (ra, rb) = (offset + 3 * spring.a, offset + 3 * spring.b);
            matrix.add_block3_like(ra, ra, &block);
            matrix.add_block3_like(rb, rb, &block);
            matrix.add_block3_like(ra, rb, &(-block));
            matrix.add_block3_like(rb, ra, &(-block));
        }
    }

    fn add_d_force(
        &self,
        state: &mut MechanicalState,
        k_fact: f64,
        src: VecId,
        dst: VecId,
    ) -> Result<()> {
        for spring in &self.springs {
            let src_vals = state.vec(src)?;
            let delta = src_vals[spring.b] - src_vals[spring.a];
            let df = delta * (spring.stiffness * k_fact);
            let dst_vals = state.vec_mut(dst)?;
            dst_vals[spring.a] += df;
            dst_vals[spring.b] -= df;
        }
        Ok(())
    }
}

/// Extension for writing 3x3 blocks through the scalar accessor.
trait AccessorExt {
    fn add_block3_like(&mut self, row: usize, col: usize, block: &Matrix3<f64>);
}

impl<'a> AccessorExt for dyn SystemMatrixAccessor + 'a {
    fn add_block3_like(&mut self, row: usize, col: usize, block: &Matrix3<f64>) {
        for i in 0..3 {
            for j in 0..3 {
                let value = block[(i, j)];
                if value != 0.0 {
                    self.add(row + i, col + j, value);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spring_state() -> MechanicalState {
        let mut state = MechanicalState::new(
            "pair",
            vec![Vector3::zeros(), Vector3::new(2.0, 0.0, 0.0)],
        );
        state.set_uniform_mass(1.0);
        state
    }

    #[test]
    fn test_gravity_scales_with_mass() {
        let mut state = spring_state();
        state.set_masses(vec![1.0, 3.0]).unwrap();

        let gravity = Gravity::new(StateId::new(0), Vector3::new(0.0, 0.0, -10.0));
        gravity.add_force(&mut state).unwrap();

        let forces = state.vec(VecId::Force).unwrap();
        assert_relative_eq!(forces[0].z, -10.0);
        assert_relative_eq!(forces[1].z, -30.0);
    }

    #[test]
    fn test_stretched_spring_pulls_endpoints_together() {
        let mut state = spring_state();
        let field = SpringForceField::new(
            "spring",
            StateId::new(0),
            vec![Spring {
                a: 0,
                b: 1,
                stiffness: 100.0,
                damping: 0.0,
                rest_length: 1.0,
            }],
        );
        field.add_force(&mut state).unwrap();

        let forces = state.vec(VecId::Force).unwrap();
        // Stretched by 1m at k=100: endpoint a pulled toward +x.
        assert_relative_eq!(forces[0].x, 100.0);
        assert_relative_eq!(forces[1].x, -100.0);
        // Action-reaction: forces sum to zero.
        assert_relative_eq!((forces[0] + forces[1]).norm(), 0.0);
    }

    #[test]
    fn test_compressed_spring_pushes_apart() {
        let mut state = spring_state();
        let field = SpringForceField::new(
            "spring",
            StateId::new(0),
            vec![Spring {
                a: 0,
                b: 1,
                stiffness: 100.0,
                damping: 0.0,
                rest_length: 5.0,
            }],
        );
        field.add_force(&mut state).unwrap();

        let forces = state.vec(VecId::Force).unwrap();
        assert!(forces[0].x < 0.0);
        assert!(forces[1].x > 0.0);
    }

    #[test]
    fn test_spring_damping_opposes_separation() {
        let mut state = spring_state();
        state.vec_mut(VecId::Velocity).unwrap()[1] = Vector3::new(1.0, 0.0, 0.0);

        let field = SpringForceField::new(
            "spring",
            StateId::new(0),
            vec![Spring {
                a: 0,
                b: 1,
                stiffness: 0.0,
                damping: 10.0,
                rest_length: 2.0,
            }],
        );
        field.add_force(&mut state).unwrap();

        let forces = state.vec(VecId::Force).unwrap();
        // Separation at 1 m/s with c=10 drags b backwards.
        assert_relative_eq!(forces[1].x, -10.0);
    }

    #[test]
    fn test_d_force_matches_stiffness_block() {
        let mut state = spring_state();
        let field = SpringForceField::new(
            "spring",
            StateId::new(0),
            vec![Spring {
                a: 0,
                b: 1,
                stiffness: 50.0,
                damping: 0.0,
                rest_length: 0.0,
            }],
        );

        // dst += K * src with src = unit displacement of b.
        state.vec_mut(VecId::Dx).unwrap()[1] = Vector3::new(1.0, 0.0, 0.0);
        field
            .add_d_force(&mut state, 1.0, VecId::Dx, VecId::Force)
            .unwrap();

        let forces = state.vec(VecId::Force).unwrap();
        assert_relative_eq!(forces[0].x, 50.0);
        assert_relative_eq!(forces[1].x, -50.0);
    }
}
