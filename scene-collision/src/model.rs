//! Collision models.
//!
//! A [`CollisionModel`] is a geometric proxy bound to a mechanical state:
//! its world-space elements are derived from the state's current dof
//! positions each time they are queried, so the model never caches stale
//! geometry. Static half-spaces are the one exception - they reference no
//! dofs at all.

use nalgebra::Vector3;
use scene_graph::Scene;
use scene_types::{Aabb, ModelId, ShapeKind, StateId, VecId};

use crate::{PipelineError, Result};

/// Plane AABBs are represented as a very large thin slab.
const LARGE_EXTENT: f64 = 1e6;

/// One world-space collision element.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// A sphere anchored on one dof.
    Sphere {
        /// World-space center.
        center: Vector3<f64>,
        /// Radius.
        radius: f64,
        /// The dof index this sphere sits on.
        dof: usize,
    },
    /// A static half-space `normal · x <= offset`.
    Plane {
        /// Outward unit normal.
        normal: Vector3<f64>,
        /// Signed offset along the normal.
        offset: f64,
    },
    /// A capsule spanning two dofs.
    Capsule {
        /// First endpoint.
        p0: Vector3<f64>,
        /// Second endpoint.
        p1: Vector3<f64>,
        /// Radius around the segment.
        radius: f64,
        /// The dof indices of the endpoints.
        dofs: [usize; 2],
    },
}

impl Element {
    /// Bounding box of this element.
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        match self {
            Self::Sphere { center, radius, .. } => {
                Aabb::from_center(*center, Vector3::repeat(*radius))
            }
            Self::Plane { normal, offset } => {
                // A thin slab around the plane, wide in the tangent
                // directions.
                let point = normal * *offset;
                let mut min = Vector3::repeat(-LARGE_EXTENT);
                let mut max = Vector3::repeat(LARGE_EXTENT);
                for axis in 0..3 {
                    if normal[axis].abs() > 0.9 {
                        min[axis] = point[axis] - 0.01;
                        max[axis] = point[axis] + 0.01;
                    }
                }
                Aabb::new(min, max)
            }
            Self::Capsule { p0, p1, radius, .. } => {
                let r = Vector3::repeat(*radius);
                Aabb::new(p0.inf(p1) - r, p0.sup(p1) + r)
            }
        }
    }
}

/// A collision model: shape description plus state binding.
#[derive(Debug, Clone)]
pub struct CollisionModel {
    id: ModelId,
    name: String,
    state: Option<StateId>,
    shape: ShapeKind,
    active: bool,
}

impl CollisionModel {
    pub(crate) fn new(
        id: ModelId,
        name: impl Into<String>,
        state: Option<StateId>,
        shape: ShapeKind,
    ) -> Result<Self> {
        let name = name.into();
        if state.is_none() && !shape.is_static() {
            return Err(PipelineError::UnboundModel { model: name });
        }
        Ok(Self {
            id,
            name,
            state,
            shape,
            active: true,
        })
    }

    /// Model id.
    #[must_use]
    pub fn id(&self) -> ModelId {
        self.id
    }

    /// Model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bound mechanical state, if the shape is dof-anchored.
    #[must_use]
    pub fn state(&self) -> Option<StateId> {
        self.state
    }

    /// The shape description.
    #[must_use]
    pub fn shape(&self) -> &ShapeKind {
        &self.shape
    }

    /// Whether this model participates in detection.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Enable or disable detection for this model.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Whether this model is static scene geometry.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.shape.is_static()
    }

    /// Current world-space elements, derived from the bound state.
    pub fn elements(&self, scene: &Scene) -> Result<Vec<Element>> {
        match &self.shape {
            ShapeKind::HalfSpace { normal, offset } => Ok(vec![Element::Plane {
                normal: *normal,
                offset: *offset,
            }]),
            ShapeKind::Spheres { radius } => {
                let positions = self.positions(scene)?;
                Ok(positions
                    .iter()
                    .enumerate()
                    .map(|(dof, &center)| Element::Sphere {
                        center,
                        radius: *radius,
                        dof,
                    })
                    .collect())
            }
            ShapeKind::Capsules { radius, edges } => {
                let positions = self.positions(scene)?;
                edges
                    .iter()
                    .map(|&[a, b]| {
                        let p0 = positions.get(a as usize).copied().ok_or_else(|| {
                            PipelineError::DegenerateGeometry {
                                model_a: self.id.raw(),
                                model_b: self.id.raw(),
                                detail: format!("capsule endpoint {a} out of range"),
                            }
                        })?;
                        let p1 = positions.get(b as usize).copied().ok_or_else(|| {
                            PipelineError::DegenerateGeometry {
                                model_a: self.id.raw(),
                                model_b: self.id.raw(),
                                detail: format!("capsule endpoint {b} out of range"),
                            }
                        })?;
                        Ok(Element::Capsule {
                            p0,
                            p1,
                            radius: *radius,
                            dofs: [a as usize, b as usize],
                        })
                    })
                    .collect()
            }
        }
    }

    /// Bounding box over all elements, expanded by `margin`.
    pub fn aabb(&self, scene: &Scene, margin: f64) -> Result<Aabb> {
        let mut out = Aabb::empty();
        for element in self.elements(scene)? {
            out = out.merged(&element.aabb());
        }
        Ok(out.expanded(margin))
    }

    fn positions(&self, scene: &Scene) -> Result<Vec<Vector3<f64>>> {
        let state = self.state.ok_or_else(|| PipelineError::UnboundModel {
            model: self.name.clone(),
        })?;
        Ok(scene.state(state)?.vec(VecId::Position)?.to_vec())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use scene_types::MechanicalState;

    fn scene_with_sphere_state() -> (Scene, StateId) {
        let mut scene = Scene::new();
        let node = scene.add_child(scene.root(), "balls").unwrap();
        let state = scene
            .attach_state(
                node,
                MechanicalState::new(
                    "balls",
                    vec![Vector3::zeros(), Vector3::new(3.0, 0.0, 0.0)],
                ),
            )
            .unwrap();
        (scene, state)
    }

    #[test]
    fn test_sphere_elements_track_positions() {
        let (scene, state) = scene_with_sphere_state();
        let model = CollisionModel::new(
            ModelId::new(0),
            "balls",
            Some(state),
            ShapeKind::Spheres { radius: 0.5 },
        )
        .unwrap();

        let elements = model.elements(&scene).unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(
            elements[1],
            Element::Sphere {
                center: Vector3::new(3.0, 0.0, 0.0),
                radius: 0.5,
                dof: 1
            }
        );
    }

    #[test]
    fn test_model_aabb_covers_all_elements() {
        let (scene, state) = scene_with_sphere_state();
        let model = CollisionModel::new(
            ModelId::new(0),
            "balls",
            Some(state),
            ShapeKind::Spheres { radius: 0.5 },
        )
        .unwrap();

        let aabb = model.aabb(&scene, 0.0).unwrap();
        assert_eq!(aabb.min.x, -0.5);
        assert_eq!(aabb.max.x, 3.5);
    }

    #[test]
    fn test_plane_needs_no_state() {
        let model = CollisionModel::new(
            ModelId::new(1),
            "ground",
            None,
            ShapeKind::HalfSpace {
                normal: Vector3::z(),
                offset: 0.0,
            },
        )
        .unwrap();
        assert!(model.is_static());

        let scene = Scene::new();
        let elements = model.elements(&scene).unwrap();
        assert_eq!(elements.len(), 1);
    }

    #[test]
    fn test_dof_anchored_shape_requires_state() {
        let result = CollisionModel::new(
            ModelId::new(2),
            "loose",
            None,
            ShapeKind::Spheres { radius: 1.0 },
        );
        assert!(matches!(result, Err(PipelineError::UnboundModel { .. })));
    }
}
