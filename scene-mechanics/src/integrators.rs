//! Time integration.
//!
//! Three schemes over the mechanical operations layer:
//!
//! | Method | Order | Stability | Cost |
//! |--------|-------|-----------|------|
//! | Explicit Euler | 1 | Conditional | One force pass |
//! | Semi-Implicit Euler | 1 | Conditional, symplectic | One force pass |
//! | Implicit Euler | 1 | Unconditional | Assemble + linear solve |
//!
//! The implicit step assembles `(M - h^2 K) Δv = h (f + h K v)`, solves it
//! through the linear-solver layer, and applies the singularity contract:
//! a singular system is regularized with `εI` and retried exactly once,
//! after which the failure is fatal for this step and positions and
//! velocities are left unchanged.

use scene_graph::Scene;
use scene_solver::{CgConfig, ConjugateGradient, SparseLdl};
use scene_types::{IntegrationMethod, NodeId, SimulationConfig, VecId};
use tracing::debug;

use crate::ops::MechanicalOps;
use crate::{assembly::assemble_system, Result};

/// Which linear solver backs the implicit step.
#[derive(Debug, Clone)]
pub enum LinearSolverKind {
    /// Sparse LDL^T with the given regularization epsilon for the retry.
    Direct {
        /// Regularization added on the single retry after a singular
        /// factorization.
        regularization: f64,
    },
    /// Conjugate gradient with the given termination options.
    ConjugateGradient(CgConfig),
}

impl Default for LinearSolverKind {
    fn default() -> Self {
        Self::Direct {
            regularization: 1e-8,
        }
    }
}

/// A configured time integrator.
#[derive(Debug, Clone)]
pub struct Integrator {
    method: IntegrationMethod,
    solver: LinearSolverKind,
}

impl Integrator {
    /// Create an integrator for a method with the default direct solver.
    #[must_use]
    pub fn new(method: IntegrationMethod) -> Self {
        Self {
            method,
            solver: LinearSolverKind::default(),
        }
    }

    /// Create an integrator from a simulation config.
    #[must_use]
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.integration)
    }

    /// Select the linear solver for implicit steps.
    #[must_use]
    pub fn with_solver(mut self, solver: LinearSolverKind) -> Self {
        self.solver = solver;
        self
    }

    /// The integration method.
    #[must_use]
    pub fn method(&self) -> IntegrationMethod {
        self.method
    }

    /// Advance every state below `root` by `dt`.
    pub fn step(&self, scene: &mut Scene, root: NodeId, dt: f64) -> Result<()> {
        match self.method {
            IntegrationMethod::ExplicitEuler => self.explicit_step(scene, root, dt, false),
            IntegrationMethod::SemiImplicitEuler => self.explicit_step(scene, root, dt, true),
            IntegrationMethod::ImplicitEuler => self.implicit_step(scene, root, dt),
        }
    }

    /// Shared explicit path. Semi-implicit updates velocity first and
    /// advances positions with the new velocity; plain explicit advances
    /// positions with the old velocity.
    fn explicit_step(
        &self,
        scene: &mut Scene,
        root: NodeId,
        dt: f64,
        symplectic: bool,
    ) -> Result<()> {
        let mut ops = MechanicalOps::new(scene, root);
        ops.accumulate_force()?;
        ops.project_responses(VecId::Force)?;
        ops.v_clear(VecId::Dx)?;
        ops.compute_acceleration(VecId::Dx, VecId::Force)?;
        ops.project_responses(VecId::Dx)?;

        if symplectic {
            ops.v_op(VecId::Velocity, VecId::Velocity, VecId::Dx, dt)?;
            ops.v_op(VecId::Position, VecId::Position, VecId::Velocity, dt)?;
        } else {
            ops.v_op(VecId::Position, VecId::Position, VecId::Velocity, dt)?;
            ops.v_op(VecId::Velocity, VecId::Velocity, VecId::Dx, dt)?;
        }

        ops.propagate_position_and_velocity()?;
        ops.check_finite()?;
        Ok(())
    }

    fn implicit_step(&self, scene: &mut Scene, root: NodeId, dt: f64) -> Result<()> {
        {
            let mut ops = MechanicalOps::new(scene, root);
            ops.accumulate_force()?;

            // rhs force-space part: f + h K v, accumulated in place.
            ops.v_clear(VecId::Dx)?;
            ops.add_d_force(1.0, VecId::Velocity, VecId::Dx)?;
            ops.v_op(VecId::Force, VecId::Force, VecId::Dx, dt)?;
            ops.project_responses(VecId::Force)?;
        }

        let assembly = assemble_system(scene, root, 1.0, -(dt * dt))?;
        if assembly.dim == 0 {
            return Ok(());
        }

        let mut rhs = assembly.gather(scene, VecId::Force)?;
        rhs *= dt;

        let delta_v = match &self.solver {
            LinearSolverKind::Direct { regularization } => {
                // Singular systems get exactly one regularized retry; a
                // second failure is fatal for this step.
                SparseLdl::factor_regularized(&assembly.matrix, *regularization)?
                    .solve(&rhs)?
            }
            LinearSolverKind::ConjugateGradient(config) => {
                let outcome = ConjugateGradient::new(config.clone()).solve(&assembly.matrix, &rhs);
                if !outcome.converged {
                    debug!(
                        residual = outcome.residual,
                        iterations = outcome.iterations,
                        "implicit solve did not converge, using best available solution"
                    );
                }
                outcome.x
            }
        };

        let mut ops = MechanicalOps::new(scene, root);
        ops.v_clear(VecId::Dx)?;
        drop(ops);
        assembly.scatter(scene, VecId::Dx, &delta_v)?;

        let mut ops = MechanicalOps::new(scene, root);
        ops.project_responses(VecId::Dx)?;
        ops.v_op(VecId::Velocity, VecId::Velocity, VecId::Dx, 1.0)?;
        ops.v_op(VecId::Position, VecId::Position, VecId::Velocity, dt)?;
        ops.propagate_position_and_velocity()?;
        ops.check_finite()?;
        Ok(())
    }
}
