//! Simulation configuration.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Time-integration scheme for the mechanical step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IntegrationMethod {
    /// First-order explicit Euler.
    ExplicitEuler,
    /// First-order symplectic Euler (velocity first, then position).
    #[default]
    SemiImplicitEuler,
    /// Backward Euler, assembling and solving a linear system each step.
    ImplicitEuler,
}

/// Global simulation parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationConfig {
    /// Timestep in seconds.
    pub dt: f64,
    /// Gravity acceleration applied to every unfixed dof.
    pub gravity: Vector3<f64>,
    /// Integration scheme.
    pub integration: IntegrationMethod,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt: 1.0 / 240.0,
            gravity: Vector3::new(0.0, 0.0, -9.81),
            integration: IntegrationMethod::SemiImplicitEuler,
        }
    }
}

impl SimulationConfig {
    /// Config without gravity.
    #[must_use]
    pub fn zero_gravity() -> Self {
        Self {
            gravity: Vector3::zeros(),
            ..Default::default()
        }
    }

    /// Set the timestep.
    #[must_use]
    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    /// Set the integration scheme.
    #[must_use]
    pub fn with_integration(mut self, method: IntegrationMethod) -> Self {
        self.integration = method;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimulationConfig::default();
        assert!(config.dt > 0.0);
        assert!(config.gravity.z < 0.0);
    }

    #[test]
    fn test_builders() {
        let config = SimulationConfig::zero_gravity()
            .with_dt(0.01)
            .with_integration(IntegrationMethod::ImplicitEuler);
        assert_eq!(config.dt, 0.01);
        assert_eq!(config.gravity.norm(), 0.0);
        assert_eq!(config.integration, IntegrationMethod::ImplicitEuler);
    }
}
