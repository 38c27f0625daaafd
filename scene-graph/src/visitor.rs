//! The visitor execution engine.
//!
//! Every operation over the scene graph is a depth-first traversal driven
//! by a [`Visitor`]:
//!
//! - entering a node invokes [`Visitor::top_down`]
//! - [`VisitResult::Continue`] descends into children in insertion order
//! - [`VisitResult::Prune`] skips the children, but the pruned node still
//!   receives its bottom-up call
//! - [`VisitResult::Abort`] terminates the whole traversal immediately,
//!   skipping every remaining bottom-up call
//! - after all children, [`Visitor::bottom_up`] runs in reverse order of
//!   descent (post-order)
//!
//! Visitors may mutate node and state data; this is the only sanctioned
//! mutation path for mechanical vectors. Well-behaved visitors do not
//! panic; a panicking visitor is fatal to the current traversal.

use scene_types::NodeId;

use crate::Scene;

/// Control flow returned by a visitor's top-down callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisitResult {
    /// Descend into the node's children.
    #[default]
    Continue,
    /// Skip the children; bottom-up still runs on this node.
    Prune,
    /// Terminate the traversal immediately.
    Abort,
}

/// A scene-graph traversal.
pub trait Visitor {
    /// Name for diagnostics.
    fn name(&self) -> &'static str {
        "visitor"
    }

    /// Called when descending into a node.
    fn top_down(&mut self, scene: &mut Scene, node: NodeId) -> VisitResult;

    /// Called after the node's children have been fully visited, in
    /// reverse order of descent.
    fn bottom_up(&mut self, scene: &mut Scene, node: NodeId) {
        let _ = (scene, node);
    }
}

/// Outcome of one traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalReport {
    /// Nodes that received a top-down call.
    pub top_down_visits: usize,
    /// Nodes that received a bottom-up call.
    pub bottom_up_visits: usize,
    /// Whether the traversal was aborted.
    pub aborted: bool,
}

impl Scene {
    /// Execute a visitor from the root.
    pub fn execute(&mut self, visitor: &mut dyn Visitor) -> TraversalReport {
        self.execute_from(self.root(), visitor)
    }

    /// Execute a visitor from a given node.
    pub fn execute_from(&mut self, root: NodeId, visitor: &mut dyn Visitor) -> TraversalReport {
        let mut report = TraversalReport::default();
        let aborted = self.visit_recursive(root, visitor, &mut report);
        report.aborted = aborted;
        report
    }

    fn visit_recursive(
        &mut self,
        node: NodeId,
        visitor: &mut dyn Visitor,
        report: &mut TraversalReport,
    ) -> bool {
        report.top_down_visits += 1;
        match visitor.top_down(self, node) {
            VisitResult::Continue => {
                let children = match self.node(node) {
                    Ok(n) => n.children().to_vec(),
                    Err(_) => Vec::new(),
                };
                for child in children {
                    if self.visit_recursive(child, visitor, report) {
                        return true;
                    }
                }
            }
            VisitResult::Prune => {}
            VisitResult::Abort => return true,
        }
        visitor.bottom_up(self, node);
        report.bottom_up_visits += 1;
        false
    }
}
