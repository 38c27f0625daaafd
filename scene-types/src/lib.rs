//! Core types for scene-graph mechanical simulation.
//!
//! This crate provides the foundational types shared by the simulation
//! stack:
//!
//! - [`NodeId`], [`ObjectId`], [`StateId`], [`ModelId`] - arena indices into
//!   the scene graph
//! - [`VecId`] - logical handles to per-state numeric vectors (position,
//!   velocity, force, temporaries)
//! - [`MechanicalState`] - the position/velocity/force buffers of one
//!   simulated body
//! - [`TagRegistry`] - process-wide tag-name interning
//! - [`Aabb`] and [`ShapeKind`] - collision geometry data
//! - [`SimulationConfig`] - timestep and integration settings
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They have no traversal logic, no physics,
//! no integration. They're the common language between:
//!
//! - The scene-graph traversal engine (`scene-graph`)
//! - The mechanical operations layer (`scene-mechanics`)
//! - The collision pipeline (`scene-collision`)
//! - Linear solvers (`scene-solver`)
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with **zero GUI dependencies**. It can be used
//! in headless batch runs, analysis tools, and other engines.
//!
//! # Example
//!
//! ```
//! use scene_types::{MechanicalState, VecId};
//! use nalgebra::Vector3;
//!
//! let mut state = MechanicalState::new("beam", vec![Vector3::zeros(); 4]);
//! state.set_uniform_mass(2.0);
//!
//! // x = x + v * dt, addressed through logical vector ids
//! state
//!     .v_op(VecId::Position, VecId::Position, VecId::Velocity, 0.01)
//!     .unwrap();
//! assert_eq!(state.len(), 4);
//! ```

#![doc(html_root_url = "https://docs.rs/scene-types/0.3.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::missing_errors_doc,       // Error docs added where non-obvious
)]

mod config;
mod error;
mod ids;
mod shape;
mod state;
mod tags;
mod vec_id;

pub use config::{IntegrationMethod, SimulationConfig};
pub use error::SceneError;
pub use ids::{ModelId, NodeId, ObjectId, StateId};
pub use shape::{Aabb, ShapeKind};
pub use state::MechanicalState;
pub use tags::{Tag, TagRegistry};
pub use vec_id::{VecCategory, VecId};

/// Result type for scene operations.
pub type Result<T> = std::result::Result<T, SceneError>;
