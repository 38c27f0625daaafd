//! The mechanical operations layer.
//!
//! This crate implements the traversals that build and solve the per-step
//! mechanical system on top of the scene-graph visitor engine:
//!
//! - [`MechanicalOps`] - traversal-scoped vector operations over every
//!   mechanical state reachable from a root: temporary allocation with
//!   scope-based release, `v = a + b·f`, traversal-wide dot products,
//!   force accumulation with bottom-up `apply_jt` aggregation, position
//!   and velocity propagation through mappings, and response projection
//! - [`assembly`] - whole-system matrix assembly over the independent
//!   dofs, with projective constraints applied to the assembled matrix
//! - [`Integrator`] - explicit, semi-implicit, and implicit Euler steps,
//!   the implicit variant solving through the linear-solver layer with
//!   the singular-regularize-retry-once contract
//! - concrete leaf components used to exercise the contracts: gravity and
//!   spring force fields ([`forces`]), identity/subset/linear mappings
//!   ([`mapping`]), and a fixed projective constraint ([`projection`])
//!
//! # Example
//!
//! ```
//! use scene_graph::Scene;
//! use scene_mechanics::{forces::Gravity, Integrator, MechanicalOps};
//! use scene_types::{MechanicalState, SimulationConfig, VecId};
//! use nalgebra::Vector3;
//!
//! let mut scene = Scene::new();
//! let node = scene.add_child(scene.root(), "body").unwrap();
//! let state = scene
//!     .attach_state(node, MechanicalState::new("body", vec![Vector3::zeros()]))
//!     .unwrap();
//! scene
//!     .attach_force_field(node, Box::new(Gravity::new(state, Vector3::new(0.0, 0.0, -9.81))))
//!     .unwrap();
//!
//! let config = SimulationConfig::default();
//! let integrator = Integrator::from_config(&config);
//! let root = scene.root();
//! integrator.step(&mut scene, root, config.dt).unwrap();
//!
//! let v = scene.state(state).unwrap().vec(VecId::Velocity).unwrap()[0];
//! assert!(v.z < 0.0);
//! ```

#![doc(html_root_url = "https://docs.rs/scene-mechanics/0.3.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::missing_errors_doc, // Error docs added where non-obvious
)]

pub mod assembly;
mod error;
pub mod forces;
mod integrators;
pub mod mapping;
mod ops;
pub mod projection;

pub use assembly::{assemble_system, SystemAssembly};
pub use error::StepError;
pub use integrators::{Integrator, LinearSolverKind};
pub use ops::MechanicalOps;

/// Result type for mechanical stepping.
pub type Result<T> = std::result::Result<T, StepError>;
