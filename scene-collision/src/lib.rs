//! The collision pipeline.
//!
//! Each simulation step runs the stages strictly in order:
//!
//! ```text
//! reset ─► broad phase ─► narrow phase ─► contact manager ─► group manager
//!          (candidate      (exact contact   (persistent        (islands,
//!           model pairs)    points)          contacts +         optional)
//!                                            response)
//! ```
//!
//! - **Broad phase** consumes the active collision models and produces
//!   candidate pairs from bounding-volume overlap. It may over-report
//!   (false positives are filtered downstream) but never under-reports.
//! - **Narrow phase** runs a pluggable [`Intersection`] strategy per
//!   candidate pair and produces exact contact points (position, normal,
//!   penetration depth, dof indices). It is idempotent given identical
//!   geometry. A malformed pair is dropped with a diagnostic; it never
//!   aborts the step.
//! - **Contact manager** keeps [`Contact`]s persistent across steps by
//!   pair identity so responses retain internal state; a pair absent from
//!   this step's output is torn down.
//! - **Group manager** (optional) merges contacting states into islands;
//!   when absent the whole scene is one island.
//!
//! The pipeline registers itself on a scene-graph node; at most one
//! pipeline is discoverable per scene and duplicate registration is
//! rejected.

#![doc(html_root_url = "https://docs.rs/scene-collision/0.3.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::missing_errors_doc, // Error docs added where non-obvious
)]

mod broad;
mod contact;
mod error;
mod group;
mod model;
mod narrow;
mod pipeline;

pub use broad::{BroadPhase, BroadPhaseAlgorithm, BroadPhaseConfig, BroadPhaseDetector, BroadPhaseEntry, BruteForce, SweepAndPrune};
pub use contact::{Contact, ContactManager, ContactMapper, PairKey, ResponseParams};
pub use error::PipelineError;
pub use group::{CollisionGroups, Island};
pub use model::{CollisionModel, Element};
pub use narrow::{ContactPoint, DiscreteIntersection, Intersection, NarrowPhase};
pub use pipeline::{Pipeline, StepSummary};

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
