//! Scene-graph structure and the visitor execution engine.
//!
//! Every mechanical, collision, and event operation of the simulation core
//! is implemented as a traversal of the scene graph. This crate provides:
//!
//! - [`Scene`] - arena-backed graph of [`Node`]s with their attached
//!   mechanical states, force fields, mappings, constraints, and event
//!   listeners
//! - [`Visitor`] - the top-down / bottom-up traversal contract with
//!   `Continue` / `Prune` / `Abort` control flow
//! - [`Event`] propagation with the visit-each-object-once guarantee over
//!   slave-object DAG edges
//! - capability traits ([`ForceContributor`], [`StatePropagator`],
//!   [`ProjectiveConstraint`], [`EventListener`]) that leaf components
//!   implement to participate in traversals
//! - an optional [`parallel`] scheduler that forks provably disjoint
//!   subtrees and joins before the parent's bottom-up phase
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Visitors                               │
//! │  top_down: Continue | Prune | Abort, then post-order        │
//! │  bottom_up in reverse order of descent                      │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Scene                                 │
//! │  Node arena + typed component arenas + state arena          │
//! │  All cross-references are stable indices                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use scene_graph::{Scene, VisitResult, Visitor};
//! use scene_types::NodeId;
//!
//! struct CountingVisitor {
//!     order: Vec<NodeId>,
//! }
//!
//! impl Visitor for CountingVisitor {
//!     fn top_down(&mut self, _scene: &mut Scene, node: NodeId) -> VisitResult {
//!         self.order.push(node);
//!         VisitResult::Continue
//!     }
//! }
//!
//! let mut scene = Scene::new();
//! let a = scene.add_child(scene.root(), "a").unwrap();
//! let _b = scene.add_child(a, "b").unwrap();
//!
//! let mut visitor = CountingVisitor { order: Vec::new() };
//! let report = scene.execute(&mut visitor);
//! assert_eq!(report.top_down_visits, 3);
//! ```

#![doc(html_root_url = "https://docs.rs/scene-graph/0.3.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::missing_errors_doc, // Error docs added where non-obvious
)]

mod event;
mod node;
pub mod parallel;
mod scene;
mod traits;
mod visitor;

pub use event::{Event, EventKind, PropagateEventVisitor};
pub use node::Node;
pub use scene::{MapPass, Scene};
pub use traits::{
    EventListener, ForceContributor, ProjectiveConstraint, StatePropagator, SystemMatrixAccessor,
};
pub use visitor::{TraversalReport, VisitResult, Visitor};
