//! Parallel visitor scheduling over disjoint subtrees.
//!
//! The default execution model is single-threaded. This scheduler is the
//! opt-in variant for visitors that are commutative accumulators: it forks
//! execution per child subtree when the subtrees are provably disjoint -
//! no shared mechanical state and no mapping edge crossing between them -
//! and joins before the parent's bottom-up phase runs. Ordering of
//! bottom-up aggregation across joined subtrees is unspecified beyond
//! that barrier, which is why only commutative accumulation (force sums,
//! counters) is admissible here.
//!
//! Unlike [`Visitor`](crate::Visitor), a [`ParallelVisitor`] reads the
//! scene immutably and writes into a per-subtree accumulator that is
//! merged at the join; mutation of shared state from a forked subtree is
//! not expressible, by construction.
//!
//! [`VisitResult::Abort`] from a forked visitor stops its own subtree
//! only; whole-traversal aborts are a sequential-mode concept.

use std::collections::HashSet;

use rayon::prelude::*;
use scene_types::{NodeId, StateId};
use tracing::trace;

use crate::{Scene, VisitResult};

/// A commutative, fork-safe traversal.
pub trait ParallelVisitor: Sync {
    /// Per-subtree accumulation state.
    type Accumulator: Send;

    /// Create an empty accumulator (one per forked subtree).
    fn make_accumulator(&self) -> Self::Accumulator;

    /// Called when descending into a node.
    fn top_down(
        &self,
        scene: &Scene,
        node: NodeId,
        acc: &mut Self::Accumulator,
    ) -> VisitResult;

    /// Called after the node's children have been visited and, where
    /// forked, joined.
    fn bottom_up(&self, scene: &Scene, node: NodeId, acc: &mut Self::Accumulator) {
        let _ = (scene, node, acc);
    }

    /// Fold a forked subtree's accumulator into the parent's. Must be
    /// commutative: the fold order across siblings is unspecified.
    fn merge(&self, into: &mut Self::Accumulator, from: Self::Accumulator);
}

/// Execute a parallel visitor from a node, returning the merged
/// accumulator.
pub fn execute_parallel<V: ParallelVisitor>(
    scene: &Scene,
    root: NodeId,
    visitor: &V,
) -> V::Accumulator {
    let mut acc = visitor.make_accumulator();
    visit(scene, root, visitor, &mut acc);
    acc
}

fn visit<V: ParallelVisitor>(
    scene: &Scene,
    node: NodeId,
    visitor: &V,
    acc: &mut V::Accumulator,
) {
    match visitor.top_down(scene, node, acc) {
        VisitResult::Continue => {
            let children = scene
                .node(node)
                .map(|n| n.children().to_vec())
                .unwrap_or_default();
            if children.len() > 1 && subtrees_disjoint(scene, &children) {
                trace!(?node, forks = children.len(), "forking disjoint subtrees");
                let results: Vec<V::Accumulator> = children
                    .par_iter()
                    .map(|&child| {
                        let mut sub = visitor.make_accumulator();
                        visit(scene, child, visitor, &mut sub);
                        sub
                    })
                    .collect();
                // Join barrier: every subtree has completed before the
                // parent's bottom-up below.
                for sub in results {
                    visitor.merge(acc, sub);
                }
            } else {
                for child in children {
                    visit(scene, child, visitor, acc);
                }
            }
        }
        VisitResult::Prune => {}
        VisitResult::Abort => return,
    }
    visitor.bottom_up(scene, node, acc);
}

/// Whether the child subtrees own pairwise-disjoint state sets with no
/// mapping edge crossing between two of them.
fn subtrees_disjoint(scene: &Scene, children: &[NodeId]) -> bool {
    let sets: Vec<HashSet<StateId>> = children
        .iter()
        .map(|&c| scene.subtree_states(c).into_iter().collect())
        .collect();

    for i in 0..sets.len() {
        for j in (i + 1)..sets.len() {
            if !sets[i].is_disjoint(&sets[j]) {
                return false;
            }
        }
    }

    let owner = |state: StateId| sets.iter().position(|set| set.contains(&state));
    for (input, output) in scene.mapping_edges() {
        if let (Some(a), Some(b)) = (owner(input), owner(output)) {
            if a != b {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use scene_types::{MechanicalState, Result, VecId};

    struct KineticEnergyVisitor;

    impl ParallelVisitor for KineticEnergyVisitor {
        type Accumulator = (f64, usize);

        fn make_accumulator(&self) -> Self::Accumulator {
            (0.0, 0)
        }

        fn top_down(
            &self,
            scene: &Scene,
            node: NodeId,
            acc: &mut Self::Accumulator,
        ) -> VisitResult {
            if let Some(state_id) = scene.node(node).ok().and_then(|n| n.state()) {
                if let Ok(state) = scene.state(state_id) {
                    if let Ok(dot) = state.v_dot(VecId::Velocity, VecId::Velocity) {
                        acc.0 += 0.5 * dot;
                    }
                }
            }
            acc.1 += 1;
            VisitResult::Continue
        }

        fn merge(&self, into: &mut Self::Accumulator, from: Self::Accumulator) {
            into.0 += from.0;
            into.1 += from.1;
        }
    }

    fn moving_state(speed: f64) -> MechanicalState {
        let mut state = MechanicalState::new("s", vec![Vector3::zeros(); 2]);
        for v in state.vec_mut(VecId::Velocity).ok().into_iter().flatten() {
            *v = Vector3::new(speed, 0.0, 0.0);
        }
        state
    }

    fn build_disjoint_scene() -> Result<Scene> {
        let mut scene = Scene::new();
        for i in 0..4 {
            let node = scene.add_child(scene.root(), format!("branch{i}"))?;
            scene.attach_state(node, moving_state(1.0))?;
            let leaf = scene.add_child(node, format!("leaf{i}"))?;
            scene.attach_state(leaf, moving_state(2.0))?;
        }
        Ok(scene)
    }

    #[test]
    fn test_parallel_matches_sequential_totals() {
        let scene = build_disjoint_scene().unwrap();

        let (energy, visits) =
            execute_parallel(&scene, scene.root(), &KineticEnergyVisitor);

        // 4 branches * (2 dofs * 0.5 * 1 + 2 dofs * 0.5 * 4)
        let expected = 4.0 * (1.0 + 4.0);
        assert!((energy - expected).abs() < 1e-12, "energy {energy}");
        assert_eq!(visits, 9);
    }

    #[test]
    fn test_disjointness_analysis() {
        let scene = build_disjoint_scene().unwrap();
        let children = scene.node(scene.root()).unwrap().children().to_vec();
        assert!(subtrees_disjoint(&scene, &children));
    }

    #[test]
    fn test_parallel_handles_empty_scene() {
        let scene = Scene::new();
        let (energy, visits) =
            execute_parallel(&scene, scene.root(), &KineticEnergyVisitor);
        assert_eq!(energy, 0.0);
        assert_eq!(visits, 1);
    }
}
