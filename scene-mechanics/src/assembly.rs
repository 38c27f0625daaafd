//! Whole-system matrix assembly.
//!
//! An implicit solve needs `A = m_fact * M + k_fact * K` assembled over
//! every *independent* (non-mapped) state reachable from the root, with
//! the projective constraints applied to the assembled matrix. Mapped
//! states do not own independent dofs; their force contributions already
//! arrive through `apply_jt` during force accumulation.
//!
//! Assembly is a traversal like everything else: mass and stiffness
//! contributions are gathered top-down, then constraints discard their
//! rows and columns in traversal order.

use std::collections::HashSet;

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use scene_graph::{Scene, SystemMatrixAccessor, VisitResult, Visitor};
use scene_solver::TripletBuilder;
use scene_types::{NodeId, SceneError, StateId, VecId};

/// The assembled system with its dof layout.
#[derive(Debug, Clone)]
pub struct SystemAssembly {
    /// The assembled matrix, constraints applied.
    pub matrix: CsrMatrix<f64>,
    /// Independent states in traversal order with their scalar offsets.
    pub offsets: Vec<(StateId, usize)>,
    /// Total scalar dimension (3 per dof).
    pub dim: usize,
}

impl SystemAssembly {
    /// Scalar offset of a state's block, if it is part of the system.
    #[must_use]
    pub fn offset_of(&self, state: StateId) -> Option<usize> {
        self.offsets
            .iter()
            .find(|(id, _)| *id == state)
            .map(|&(_, offset)| offset)
    }

    /// Pack one logical vector of every independent state into a flat
    /// vector following the assembly layout.
    pub fn gather(&self, scene: &Scene, v: VecId) -> Result<DVector<f64>, SceneError> {
        let mut out = DVector::zeros(self.dim);
        for &(state_id, offset) in &self.offsets {
            let vec = scene.state(state_id)?.vec(v)?.to_vec();
            for (i, value) in vec.iter().enumerate() {
                out[offset + 3 * i] = value.x;
                out[offset + 3 * i + 1] = value.y;
                out[offset + 3 * i + 2] = value.z;
            }
        }
        Ok(out)
    }

    /// Unpack a flat vector back into one logical vector per state.
    pub fn scatter(
        &self,
        scene: &mut Scene,
        v: VecId,
        flat: &DVector<f64>,
    ) -> Result<(), SceneError> {
        if flat.len() != self.dim {
            return Err(SceneError::SizeMismatch {
                expected: self.dim,
                actual: flat.len(),
            });
        }
        for &(state_id, offset) in &self.offsets {
            let vec = scene.state_mut(state_id)?.vec_mut(v)?;
            for (i, value) in vec.iter_mut().enumerate() {
                value.x = flat[offset + 3 * i];
                value.y = flat[offset + 3 * i + 1];
                value.z = flat[offset + 3 * i + 2];
            }
        }
        Ok(())
    }
}

/// Triplet-backed accessor handed to components during assembly.
struct TripletAccessor {
    dim: usize,
    triplets: Vec<(usize, usize, f64)>,
    discarded: HashSet<usize>,
}

impl TripletAccessor {
    fn new(dim: usize) -> Self {
        Self {
            dim,
            triplets: Vec::new(),
            discarded: HashSet::new(),
        }
    }

    fn build(self) -> CsrMatrix<f64> {
        let mut builder = TripletBuilder::new(self.dim, self.dim);
        for (row, col, value) in self.triplets {
            if !self.discarded.contains(&row) && !self.discarded.contains(&col) {
                builder.add(row, col, value);
            }
        }
        for &index in &self.discarded {
            builder.add(index, index, 1.0);
        }
        builder.build()
    }
}

impl SystemMatrixAccessor for TripletAccessor {
    fn dim(&self) -> usize {
        self.dim
    }

    fn add(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.dim && col < self.dim);
        self.triplets.push((row, col, value));
    }

    fn discard_row_col(&mut self, index: usize) {
        debug_assert!(index < self.dim);
        self.discarded.insert(index);
    }
}

/// Gathers stiffness contributions and constraint applications.
struct AssemblyVisitor<'m> {
    accessor: &'m mut TripletAccessor,
    offsets: Vec<(StateId, usize)>,
    k_fact: f64,
    /// `(constraint index, state offset)` collected in traversal order,
    /// applied after all additive contributions.
    constraints: Vec<(usize, usize)>,
    error: Option<SceneError>,
}

impl AssemblyVisitor<'_> {
    fn offset_of(&self, state: StateId) -> Option<usize> {
        self.offsets
            .iter()
            .find(|(id, _)| *id == state)
            .map(|&(_, offset)| offset)
    }
}

impl Visitor for AssemblyVisitor<'_> {
    fn name(&self) -> &'static str {
        "assembleSystem"
    }

    fn top_down(&mut self, scene: &mut Scene, node: NodeId) -> VisitResult {
        let (force_fields, constraints) = match scene.node(node) {
            Ok(n) => (n.force_fields().to_vec(), n.constraints().to_vec()),
            Err(err) => {
                self.error = Some(err);
                return VisitResult::Abort;
            }
        };

        for index in force_fields {
            let state = match scene.force_field(index) {
                Ok(field) => field.state(),
                Err(err) => {
                    self.error = Some(err);
                    return VisitResult::Abort;
                }
            };
            // Mapped states own no block in the assembled system.
            let Some(offset) = self.offset_of(state) else {
                continue;
            };
            if let Err(err) =
                scene.force_field_matrix(index, offset, self.k_fact, self.accessor)
            {
                self.error = Some(err);
                return VisitResult::Abort;
            }
        }

        for index in constraints {
            let state = match scene.constraint(index) {
                Ok(constraint) => constraint.state(),
                Err(err) => {
                    self.error = Some(err);
                    return VisitResult::Abort;
                }
            };
            if let Some(offset) = self.offset_of(state) {
                self.constraints.push((index, offset));
            }
        }

        VisitResult::Continue
    }
}

/// Assemble `m_fact * M + k_fact * K` over the independent states below
/// `root`, then apply projective constraints to the assembled matrix.
pub fn assemble_system(
    scene: &mut Scene,
    root: NodeId,
    m_fact: f64,
    k_fact: f64,
) -> Result<SystemAssembly, SceneError> {
    // Layout: independent states in deterministic traversal order.
    let mut offsets = Vec::new();
    let mut dim = 0;
    for state_id in scene.subtree_states(root) {
        let state = scene.state(state_id)?;
        if state.is_mapped() {
            continue;
        }
        offsets.push((state_id, dim));
        dim += 3 * state.len();
    }

    let mut accessor = TripletAccessor::new(dim);

    // Mass: block diagonal.
    for &(state_id, offset) in &offsets {
        let state = scene.state(state_id)?;
        for (i, &mass) in state.masses().iter().enumerate() {
            let value = m_fact * mass;
            for axis in 0..3 {
                accessor.add(offset + 3 * i + axis, offset + 3 * i + axis, value);
            }
        }
    }

    // Stiffness and constraints via traversal.
    let mut visitor = AssemblyVisitor {
        accessor: &mut accessor,
        offsets: offsets.clone(),
        k_fact,
        constraints: Vec::new(),
        error: None,
    };
    scene.execute_from(root, &mut visitor);
    if let Some(err) = visitor.error {
        return Err(err);
    }
    let constraints = visitor.constraints;

    for (index, offset) in constraints {
        scene.constraint(index)?.apply_to_matrix(offset, &mut accessor);
    }

    Ok(SystemAssembly {
        matrix: accessor.build(),
        offsets,
        dim,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::forces::{Spring, SpringForceField};
    use crate::projection::FixedConstraint;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use scene_types::MechanicalState;

    fn spring_scene() -> (Scene, StateId) {
        let mut scene = Scene::new();
        let node = scene.add_child(scene.root(), "pair").unwrap();
        let mut state = MechanicalState::new(
            "pair",
            vec![Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0)],
        );
        state.set_uniform_mass(2.0);
        let sid = scene.attach_state(node, state).unwrap();
        scene
            .attach_force_field(
                node,
                Box::new(SpringForceField::new(
                    "spring",
                    sid,
                    vec![Spring {
                        a: 0,
                        b: 1,
                        stiffness: 10.0,
                        damping: 0.0,
                        rest_length: 1.0,
                    }],
                )),
            )
            .unwrap();
        (scene, sid)
    }

    #[test]
    fn test_mass_on_diagonal() {
        let (mut scene, _sid) = spring_scene();
        let root = scene.root();
        let assembly = assemble_system(&mut scene, root, 1.0, 0.0).unwrap();

        assert_eq!(assembly.dim, 6);
        let dense = nalgebra::DMatrix::from(&assembly.matrix);
        for i in 0..6 {
            assert_relative_eq!(dense[(i, i)], 2.0);
        }
    }

    #[test]
    fn test_stiffness_blocks_symmetric() {
        let (mut scene, _sid) = spring_scene();
        let root = scene.root();
        // A = M - h^2 K with h = 1 for easy inspection.
        let assembly = assemble_system(&mut scene, root, 1.0, -1.0).unwrap();

        let dense = nalgebra::DMatrix::from(&assembly.matrix);
        // Diagonal: mass + k.
        assert_relative_eq!(dense[(0, 0)], 2.0 + 10.0);
        // Coupling block: -k.
        assert_relative_eq!(dense[(0, 3)], -10.0);
        assert_relative_eq!(dense[(3, 0)], -10.0);
    }

    #[test]
    fn test_constraint_discards_rows_and_cols() {
        let (mut scene, sid) = spring_scene();
        let node = scene.node(scene.root()).unwrap().children()[0];
        scene
            .attach_constraint(node, Box::new(FixedConstraint::new("fix", sid, vec![0])))
            .unwrap();

        let root = scene.root();
        let assembly = assemble_system(&mut scene, root, 1.0, -1.0).unwrap();
        let dense = nalgebra::DMatrix::from(&assembly.matrix);

        // Fixed dof rows/cols are identity.
        for i in 0..3 {
            assert_relative_eq!(dense[(i, i)], 1.0);
            assert_relative_eq!(dense[(i, i + 3)], 0.0);
            assert_relative_eq!(dense[(i + 3, i)], 0.0);
        }
        // Free dof untouched by the constraint.
        assert_relative_eq!(dense[(3, 3)], 12.0);
    }

    #[test]
    fn test_gather_scatter_roundtrip() {
        let (mut scene, sid) = spring_scene();
        let root = scene.root();
        let assembly = assemble_system(&mut scene, root, 1.0, 0.0).unwrap();

        scene.state_mut(sid).unwrap().vec_mut(VecId::Velocity).unwrap()[1] =
            Vector3::new(4.0, 5.0, 6.0);

        let flat = assembly.gather(&scene, VecId::Velocity).unwrap();
        assert_relative_eq!(flat[3], 4.0);
        assert_relative_eq!(flat[5], 6.0);

        assembly.scatter(&mut scene, VecId::Dx, &flat).unwrap();
        let dx = scene.state(sid).unwrap().vec(VecId::Dx).unwrap();
        assert_relative_eq!(dx[1].y, 5.0);
    }
}
