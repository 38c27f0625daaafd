//! Traversal-scoped mechanical vector operations.
//!
//! A [`MechanicalOps`] instance wraps a scene and a traversal root and
//! exposes the operations used to build and solve the per-step mechanical
//! system. Every operation is implemented as a visitor over the states
//! reachable from the root, so ordering guarantees come from the traversal
//! engine, not from callers.
//!
//! # Temporary vectors
//!
//! [`MechanicalOps::v_alloc`] hands out temporary [`VecId`]s from a pool
//! scoped to this operation object. Every allocation is matched by exactly
//! one [`MechanicalOps::v_free`]; anything still live when the object is
//! dropped is released automatically (scope-based release). Using a freed
//! id afterwards fails deterministically at the state layer.
//!
//! # Example
//!
//! ```
//! use scene_graph::Scene;
//! use scene_mechanics::MechanicalOps;
//! use scene_types::{MechanicalState, VecCategory, VecId};
//! use nalgebra::Vector3;
//!
//! let mut scene = Scene::new();
//! let node = scene.add_child(scene.root(), "body").unwrap();
//! scene
//!     .attach_state(node, MechanicalState::new("body", vec![Vector3::zeros(); 8]))
//!     .unwrap();
//!
//! let root = scene.root();
//! let mut ops = MechanicalOps::new(&mut scene, root);
//! let tmp = ops.v_alloc(VecCategory::Deriv);
//! ops.v_op(tmp, VecId::Velocity, VecId::Force, 0.01).unwrap();
//! ops.v_free(tmp).unwrap();
//! ```

use scene_graph::{MapPass, Scene, VisitResult, Visitor};
use scene_types::{MechanicalState, NodeId, SceneError, VecCategory, VecId};
use tracing::trace;

/// Mechanical operations over the states reachable from one root.
pub struct MechanicalOps<'a> {
    scene: &'a mut Scene,
    root: NodeId,
    live_slots: Vec<(u32, VecCategory)>,
    next_slot: u32,
}

/// Applies a per-state closure to every state in the subtree, aborting the
/// traversal on the first error.
struct ForEachState<F> {
    f: F,
    error: Option<SceneError>,
}

impl<F> Visitor for ForEachState<F>
where
    F: FnMut(&mut MechanicalState) -> Result<(), SceneError>,
{
    fn name(&self) -> &'static str {
        "forEachState"
    }

    fn top_down(&mut self, scene: &mut Scene, node: NodeId) -> VisitResult {
        let Some(state_id) = scene.node(node).ok().and_then(|n| n.state()) else {
            return VisitResult::Continue;
        };
        match scene.state_mut(state_id).and_then(|s| (self.f)(s)) {
            Ok(()) => VisitResult::Continue,
            Err(err) => {
                self.error = Some(err);
                VisitResult::Abort
            }
        }
    }
}

/// Top-down force-field contributions, bottom-up `apply_jt` aggregation.
struct AccumulateForceVisitor {
    error: Option<SceneError>,
}

impl Visitor for AccumulateForceVisitor {
    fn name(&self) -> &'static str {
        "accumulateForce"
    }

    fn top_down(&mut self, scene: &mut Scene, node: NodeId) -> VisitResult {
        if self.error.is_some() {
            return VisitResult::Abort;
        }
        let (force_fields, state_id) = match scene.node(node) {
            Ok(n) => (n.force_fields().to_vec(), n.state()),
            Err(err) => {
                self.error = Some(err);
                return VisitResult::Abort;
            }
        };
        for index in &force_fields {
            if let Err(err) = scene.apply_force_field(*index) {
                self.error = Some(err);
                return VisitResult::Abort;
            }
        }
        // A mapped state with no force fields of its own is geometry-only:
        // its forces are absorbed upward by the bottom-up apply_jt below,
        // so there is nothing to find further down.
        if force_fields.is_empty() {
            if let Some(state_id) = state_id {
                if scene.state(state_id).map(MechanicalState::is_mapped) == Ok(true) {
                    return VisitResult::Prune;
                }
            }
        }
        VisitResult::Continue
    }

    fn bottom_up(&mut self, scene: &mut Scene, node: NodeId) {
        if self.error.is_some() {
            return;
        }
        let mappings = match scene.node(node) {
            Ok(n) => n.mappings().to_vec(),
            Err(_) => return,
        };
        for index in mappings {
            if let Err(err) =
                scene.apply_mapping(index, MapPass::ApplyJt, VecId::Force, VecId::Force)
            {
                self.error = Some(err);
                return;
            }
        }
    }
}

/// Top-down mapping propagation of one vector.
struct PropagateVisitor {
    pass: MapPass,
    src: VecId,
    dst: VecId,
    error: Option<SceneError>,
}

impl Visitor for PropagateVisitor {
    fn name(&self) -> &'static str {
        "propagate"
    }

    fn top_down(&mut self, scene: &mut Scene, node: NodeId) -> VisitResult {
        let mappings = match scene.node(node) {
            Ok(n) => n.mappings().to_vec(),
            Err(err) => {
                self.error = Some(err);
                return VisitResult::Abort;
            }
        };
        for index in mappings {
            if let Err(err) = scene.apply_mapping(index, self.pass, self.src, self.dst) {
                self.error = Some(err);
                return VisitResult::Abort;
            }
        }
        VisitResult::Continue
    }
}

/// Top-down response projection, constraints in insertion order per node.
///
/// Order across the tree is traversal order only; constraint composition
/// must be commutative or explicitly ordered by the scene author.
struct ProjectResponseVisitor {
    v: VecId,
    error: Option<SceneError>,
}

impl Visitor for ProjectResponseVisitor {
    fn name(&self) -> &'static str {
        "projectResponse"
    }

    fn top_down(&mut self, scene: &mut Scene, node: NodeId) -> VisitResult {
        let constraints = match scene.node(node) {
            Ok(n) => n.constraints().to_vec(),
            Err(err) => {
                self.error = Some(err);
                return VisitResult::Abort;
            }
        };
        for index in constraints {
            if let Err(err) = scene.project_response(index, self.v) {
                self.error = Some(err);
                return VisitResult::Abort;
            }
        }
        VisitResult::Continue
    }
}

/// Top-down stiffness-product accumulation (`dst += k_fact * K * src`).
struct DForceVisitor {
    k_fact: f64,
    src: VecId,
    dst: VecId,
    error: Option<SceneError>,
}

impl Visitor for DForceVisitor {
    fn name(&self) -> &'static str {
        "addDForce"
    }

    fn top_down(&mut self, scene: &mut Scene, node: NodeId) -> VisitResult {
        let force_fields = match scene.node(node) {
            Ok(n) => n.force_fields().to_vec(),
            Err(err) => {
                self.error = Some(err);
                return VisitResult::Abort;
            }
        };
        for index in force_fields {
            if let Err(err) =
                scene.apply_force_field_dforce(index, self.k_fact, self.src, self.dst)
            {
                self.error = Some(err);
                return VisitResult::Abort;
            }
        }
        VisitResult::Continue
    }
}

impl<'a> MechanicalOps<'a> {
    /// Create an operation sequence over the subtree rooted at `root`.
    pub fn new(scene: &'a mut Scene, root: NodeId) -> Self {
        Self {
            scene,
            root,
            live_slots: Vec::new(),
            next_slot: 0,
        }
    }

    /// The traversal root.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    fn for_each_state<F>(&mut self, f: F) -> Result<(), SceneError>
    where
        F: FnMut(&mut MechanicalState) -> Result<(), SceneError>,
    {
        let mut visitor = ForEachState { f, error: None };
        self.scene.execute_from(self.root, &mut visitor);
        visitor.error.map_or(Ok(()), Err)
    }

    /// Allocate a temporary vector on every reachable state.
    pub fn v_alloc(&mut self, category: VecCategory) -> VecId {
        let slot = self.next_slot;
        self.next_slot += 1;
        // Allocation itself cannot fail; states resize their pools.
        let _ = self.for_each_state(|s| {
            s.alloc_temp(slot, category);
            Ok(())
        });
        self.live_slots.push((slot, category));
        VecId::temp(category, slot)
    }

    /// Release a temporary vector on every reachable state.
    ///
    /// Releasing an id this pool does not own (double free, foreign id)
    /// fails deterministically.
    pub fn v_free(&mut self, v: VecId) -> Result<(), SceneError> {
        let VecId::Temp { slot, .. } = v else {
            return Err(SceneError::NotAVector(v));
        };
        let Some(position) = self.live_slots.iter().position(|&(s, _)| s == slot) else {
            return Err(SceneError::TempUnallocated {
                state: "operation pool".to_owned(),
                slot,
            });
        };
        self.live_slots.swap_remove(position);
        self.for_each_state(|s| s.free_temp(slot))
    }

    /// `v = a + b * f` on every reachable state, each over exactly the
    /// dofs it owns.
    pub fn v_op(&mut self, v: VecId, a: VecId, b: VecId, f: f64) -> Result<(), SceneError> {
        self.for_each_state(|s| s.v_op(v, a, b, f))
    }

    /// Initialize `dest` from `src` on every state; mapped states are
    /// skipped unless `propagate` is set, on the assumption that their
    /// mapping will regenerate them.
    pub fn v_init(&mut self, dest: VecId, src: VecId, propagate: bool) -> Result<(), SceneError> {
        self.for_each_state(|s| {
            if !propagate && s.is_mapped() {
                Ok(())
            } else {
                s.v_eq(dest, src)
            }
        })
    }

    /// Zero a vector on every reachable state.
    pub fn v_clear(&mut self, v: VecId) -> Result<(), SceneError> {
        self.for_each_state(|s| s.v_clear(v))
    }

    /// Dot product accumulated across every reachable state.
    pub fn v_dot(&mut self, a: VecId, b: VecId) -> Result<f64, SceneError> {
        let mut sum = 0.0;
        self.for_each_state(|s| {
            sum += s.v_dot(a, b)?;
            Ok(())
        })?;
        Ok(sum)
    }

    /// Clear forces, run force-field contributions top-down, then
    /// aggregate mapped forces into their parents bottom-up through
    /// `apply_jt`. Geometry-only mapped subtrees are pruned once absorbed.
    pub fn accumulate_force(&mut self) -> Result<(), SceneError> {
        self.v_clear(VecId::Force)?;
        let mut visitor = AccumulateForceVisitor { error: None };
        self.scene.execute_from(self.root, &mut visitor);
        visitor.error.map_or(Ok(()), Err)
    }

    /// Accumulate `dst += k_fact * K * src` from every force field.
    pub fn add_d_force(&mut self, k_fact: f64, src: VecId, dst: VecId) -> Result<(), SceneError> {
        let mut visitor = DForceVisitor {
            k_fact,
            src,
            dst,
            error: None,
        };
        self.scene.execute_from(self.root, &mut visitor);
        visitor.error.map_or(Ok(()), Err)
    }

    /// Propagate one vector through every mapping, top-down.
    pub fn propagate(&mut self, pass: MapPass, src: VecId, dst: VecId) -> Result<(), SceneError> {
        let mut visitor = PropagateVisitor {
            pass,
            src,
            dst,
            error: None,
        };
        self.scene.execute_from(self.root, &mut visitor);
        visitor.error.map_or(Ok(()), Err)
    }

    /// Propagate positions (`apply`) and velocities (`apply_j`) to mapped
    /// states.
    pub fn propagate_position_and_velocity(&mut self) -> Result<(), SceneError> {
        self.propagate(MapPass::Apply, VecId::Position, VecId::Position)?;
        self.propagate(MapPass::ApplyJ, VecId::Velocity, VecId::Velocity)
    }

    /// Project a response vector through every projective constraint,
    /// top-down in insertion order.
    pub fn project_responses(&mut self, v: VecId) -> Result<(), SceneError> {
        let mut visitor = ProjectResponseVisitor { v, error: None };
        self.scene.execute_from(self.root, &mut visitor);
        visitor.error.map_or(Ok(()), Err)
    }

    /// `dest = M^-1 * src` on every reachable state (zero-mass dofs left
    /// untouched).
    pub fn compute_acceleration(&mut self, dest: VecId, src: VecId) -> Result<(), SceneError> {
        self.for_each_state(|s| s.scale_by_inv_mass(dest, src))
    }

    /// Verify positions and velocities are finite everywhere.
    pub fn check_finite(&mut self) -> Result<(), SceneError> {
        self.for_each_state(|s| {
            s.check_finite(VecId::Position)?;
            s.check_finite(VecId::Velocity)
        })
    }
}

impl Drop for MechanicalOps<'_> {
    fn drop(&mut self) {
        if self.live_slots.is_empty() {
            return;
        }
        trace!(
            leftover = self.live_slots.len(),
            "releasing temporary vectors at end of operation scope"
        );
        let slots: Vec<u32> = self.live_slots.drain(..).map(|(slot, _)| slot).collect();
        let _ = self.for_each_state(|s| {
            for &slot in &slots {
                let _ = s.free_temp(slot);
            }
            Ok(())
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn two_state_scene() -> (Scene, scene_types::StateId, scene_types::StateId) {
        let mut scene = Scene::new();
        let a = scene.add_child(scene.root(), "a").unwrap();
        let b = scene.add_child(scene.root(), "b").unwrap();
        let sa = scene
            .attach_state(a, MechanicalState::new("a", vec![Vector3::zeros(); 2]))
            .unwrap();
        let sb = scene
            .attach_state(b, MechanicalState::new("b", vec![Vector3::zeros(); 3]))
            .unwrap();
        (scene, sa, sb)
    }

    #[test]
    fn test_temp_pool_balance() {
        let (mut scene, sa, sb) = two_state_scene();
        let root = scene.root();

        let mut ops = MechanicalOps::new(&mut scene, root);
        let tmp = ops.v_alloc(VecCategory::Deriv);
        ops.v_op(tmp, VecId::Velocity, VecId::Force, 1.0).unwrap();
        ops.v_free(tmp).unwrap();

        // Double free fails deterministically.
        assert!(ops.v_free(tmp).unwrap_err().is_stale_temp());
        drop(ops);

        // Both states saw the release.
        assert!(scene.state(sa).unwrap().vec(tmp).is_err());
        assert!(scene.state(sb).unwrap().vec(tmp).is_err());
    }

    #[test]
    fn test_temp_released_on_scope_exit() {
        let (mut scene, sa, _sb) = two_state_scene();
        let root = scene.root();

        let tmp = {
            let mut ops = MechanicalOps::new(&mut scene, root);
            ops.v_alloc(VecCategory::Coord)
            // Dropped without an explicit free.
        };

        assert!(
            scene.state(sa).unwrap().vec(tmp).is_err(),
            "scope exit must release leftover temporaries"
        );
    }

    #[test]
    fn test_v_op_spans_heterogeneous_states() {
        let (mut scene, sa, sb) = two_state_scene();
        let root = scene.root();

        scene.state_mut(sa).unwrap().vec_mut(VecId::Velocity).unwrap()[0] =
            Vector3::new(1.0, 0.0, 0.0);
        scene.state_mut(sb).unwrap().vec_mut(VecId::Velocity).unwrap()[2] =
            Vector3::new(0.0, 0.0, 2.0);

        let mut ops = MechanicalOps::new(&mut scene, root);
        ops.v_op(VecId::Position, VecId::Position, VecId::Velocity, 0.5)
            .unwrap();
        drop(ops);

        assert_relative_eq!(
            scene.state(sa).unwrap().vec(VecId::Position).unwrap()[0].x,
            0.5
        );
        assert_relative_eq!(
            scene.state(sb).unwrap().vec(VecId::Position).unwrap()[2].z,
            1.0
        );
    }

    #[test]
    fn test_v_dot_accumulates_across_states() {
        let (mut scene, sa, sb) = two_state_scene();
        let root = scene.root();

        scene.state_mut(sa).unwrap().vec_mut(VecId::Force).unwrap()[0] =
            Vector3::new(2.0, 0.0, 0.0);
        scene.state_mut(sb).unwrap().vec_mut(VecId::Force).unwrap()[0] =
            Vector3::new(3.0, 0.0, 0.0);

        let mut ops = MechanicalOps::new(&mut scene, root);
        let dot = ops.v_dot(VecId::Force, VecId::Force).unwrap();
        assert_relative_eq!(dot, 4.0 + 9.0);
    }

    #[test]
    fn test_accumulate_force_aggregates_through_mappings() {
        use crate::forces::Gravity;
        use crate::mapping::SubsetMapping;

        let mut scene = Scene::new();
        let parent = scene.add_child(scene.root(), "parent").unwrap();
        let child = scene.add_child(parent, "child").unwrap();
        let sp = scene
            .attach_state(parent, MechanicalState::new("parent", vec![Vector3::zeros(); 2]))
            .unwrap();
        let sc = scene
            .attach_state(child, MechanicalState::new("child", vec![Vector3::zeros()]))
            .unwrap();
        scene
            .attach_mapping(child, Box::new(SubsetMapping::new("map", sp, sc, vec![1])))
            .unwrap();
        scene
            .attach_force_field(parent, Box::new(Gravity::new(sp, Vector3::new(0.0, 0.0, -1.0))))
            .unwrap();
        scene
            .attach_force_field(child, Box::new(Gravity::new(sc, Vector3::new(0.0, 0.0, -10.0))))
            .unwrap();

        let root = scene.root();
        let mut ops = MechanicalOps::new(&mut scene, root);
        ops.accumulate_force().unwrap();
        drop(ops);

        // The child's force was absorbed into its generator dof through
        // the jacobian transpose; the other parent dof only sees gravity.
        let parent_force = scene.state(sp).unwrap().vec(VecId::Force).unwrap().to_vec();
        assert_relative_eq!(parent_force[0].z, -1.0);
        assert_relative_eq!(parent_force[1].z, -11.0);
        assert_relative_eq!(
            scene.state(sc).unwrap().vec(VecId::Force).unwrap()[0].z,
            -10.0
        );
    }

    #[test]
    fn test_accumulate_force_prunes_geometry_only_subtrees() {
        use crate::forces::Gravity;
        use crate::mapping::IdentityMapping;

        // parent -> mapped child with no force fields -> grandchild with
        // a force field. The mapped child is geometry-only, so descent
        // stops there and the grandchild's field never runs.
        let mut scene = Scene::new();
        let parent = scene.add_child(scene.root(), "parent").unwrap();
        let child = scene.add_child(parent, "geometry").unwrap();
        let grandchild = scene.add_child(child, "deeper").unwrap();
        let sp = scene
            .attach_state(parent, MechanicalState::new("parent", vec![Vector3::zeros()]))
            .unwrap();
        let sc = scene
            .attach_state(child, MechanicalState::new("geometry", vec![Vector3::zeros()]))
            .unwrap();
        let sg = scene
            .attach_state(grandchild, MechanicalState::new("deeper", vec![Vector3::zeros()]))
            .unwrap();
        scene
            .attach_mapping(child, Box::new(IdentityMapping::new("map", sp, sc)))
            .unwrap();
        scene
            .attach_force_field(
                grandchild,
                Box::new(Gravity::new(sg, Vector3::new(0.0, 0.0, -10.0))),
            )
            .unwrap();

        let root = scene.root();
        let mut ops = MechanicalOps::new(&mut scene, root);
        ops.accumulate_force().unwrap();
        drop(ops);

        assert_relative_eq!(
            scene.state(sg).unwrap().vec(VecId::Force).unwrap()[0].z,
            0.0
        );
    }

    #[test]
    fn test_v_init_skips_mapped_states_unless_propagating() {
        use crate::mapping::IdentityMapping;

        let mut scene = Scene::new();
        let parent = scene.add_child(scene.root(), "parent").unwrap();
        let child = scene.add_child(parent, "child").unwrap();
        let sp = scene
            .attach_state(
                parent,
                MechanicalState::new("parent", vec![Vector3::new(1.0, 0.0, 0.0)]),
            )
            .unwrap();
        let sc = scene
            .attach_state(
                child,
                MechanicalState::new("child", vec![Vector3::new(1.0, 0.0, 0.0)]),
            )
            .unwrap();
        scene
            .attach_mapping(child, Box::new(IdentityMapping::new("map", sp, sc)))
            .unwrap();

        // Zero out free positions so the copy is observable.
        for id in [sp, sc] {
            scene.state_mut(id).unwrap().v_clear(VecId::FreePosition).unwrap();
        }

        let root = scene.root();
        let mut ops = MechanicalOps::new(&mut scene, root);
        ops.v_init(VecId::FreePosition, VecId::Position, false).unwrap();
        drop(ops);

        assert_relative_eq!(
            scene.state(sp).unwrap().vec(VecId::FreePosition).unwrap()[0].x,
            1.0
        );
        // The mapped state was deliberately left untouched.
        assert_relative_eq!(
            scene.state(sc).unwrap().vec(VecId::FreePosition).unwrap()[0].x,
            0.0
        );

        let mut ops = MechanicalOps::new(&mut scene, root);
        ops.v_init(VecId::FreePosition, VecId::Position, true).unwrap();
        drop(ops);
        assert_relative_eq!(
            scene.state(sc).unwrap().vec(VecId::FreePosition).unwrap()[0].x,
            1.0
        );
    }
}
