//! Narrow-phase collision detection.
//!
//! The narrow phase consumes candidate model pairs, runs the configured
//! [`Intersection`] strategy per element pair, and produces exact contact
//! points. It is a pure function of the input geometry: identical
//! positions produce identical output, and nothing is written outside its
//! own output buffer.
//!
//! Per-pair failures (degenerate geometry) are reported to the caller,
//! which drops the pair with a diagnostic; they never abort the step.

use nalgebra::Vector3;
use scene_graph::Scene;
use tracing::trace;

use crate::model::{CollisionModel, Element};
use crate::{PipelineError, Result};

/// One exact contact between two elements.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactPoint {
    /// World-space contact position.
    pub position: Vector3<f64>,
    /// Contact normal, pointing from the second model toward the first.
    pub normal: Vector3<f64>,
    /// Penetration depth (> 0 means the elements interpenetrate).
    pub depth: f64,
    /// Involved dof on the first model, if dof-anchored.
    pub dof_a: Option<usize>,
    /// Involved dof on the second model, if dof-anchored.
    pub dof_b: Option<usize>,
}

/// Pluggable element-pair intersection strategy.
pub trait Intersection: Send + Sync {
    /// Strategy name for diagnostics.
    fn name(&self) -> &'static str;

    /// Exact test between two elements. Returns the contacts found
    /// (empty when the pair kind is unsupported or separated).
    fn test_elements(&self, a: &Element, b: &Element) -> Result<Vec<ContactPoint>>;
}

/// Discrete (position-level) intersection tests.
///
/// Supported pairs: sphere-sphere, sphere-plane, capsule-plane. A contact
/// is emitted once the surfaces come within `proximity` of each other;
/// the reported depth is positive from that threshold on.
#[derive(Debug, Clone)]
pub struct DiscreteIntersection {
    /// Distance at which contacts are emitted before true penetration.
    pub proximity: f64,
}

impl Default for DiscreteIntersection {
    fn default() -> Self {
        Self { proximity: 0.0 }
    }
}

impl DiscreteIntersection {
    /// Create a strategy with no proximity margin.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit contacts at the given surface distance.
    #[must_use]
    pub fn with_proximity(mut self, proximity: f64) -> Self {
        self.proximity = proximity;
        self
    }

    fn sphere_sphere(
        &self,
        ca: Vector3<f64>,
        ra: f64,
        dof_a: usize,
        cb: Vector3<f64>,
        rb: f64,
        dof_b: usize,
    ) -> Result<Option<ContactPoint>> {
        let delta = ca - cb;
        let distance = delta.norm();
        if distance < 1e-12 {
            return Err(PipelineError::DegenerateGeometry {
                model_a: 0,
                model_b: 0,
                detail: "coincident sphere centers".into(),
            });
        }
        let depth = ra + rb + self.proximity - distance;
        if depth <= 0.0 {
            return Ok(None);
        }
        let normal = delta / distance;
        Ok(Some(ContactPoint {
            position: cb + normal * (rb - depth * 0.5),
            normal,
            depth,
            dof_a: Some(dof_a),
            dof_b: Some(dof_b),
        }))
    }

    fn sphere_plane(
        &self,
        center: Vector3<f64>,
        radius: f64,
        dof: usize,
        normal: Vector3<f64>,
        offset: f64,
    ) -> Option<ContactPoint> {
        let signed = normal.dot(&center) - offset;
        let depth = radius + self.proximity - signed;
        if depth <= 0.0 {
            return None;
        }
        Some(ContactPoint {
            position: center - normal * signed,
            normal,
            depth,
            dof_a: Some(dof),
            dof_b: None,
        })
    }
}

impl Intersection for DiscreteIntersection {
    fn name(&self) -> &'static str {
        "discrete"
    }

    fn test_elements(&self, a: &Element, b: &Element) -> Result<Vec<ContactPoint>> {
        match (a, b) {
            (
                Element::Sphere {
                    center: ca,
                    radius: ra,
                    dof: da,
                },
                Element::Sphere {
                    center: cb,
                    radius: rb,
                    dof: db,
                },
            ) => Ok(self
                .sphere_sphere(*ca, *ra, *da, *cb, *rb, *db)?
                .into_iter()
                .collect()),
            (
                Element::Sphere {
                    center,
                    radius,
                    dof,
                },
                Element::Plane { normal, offset },
            ) => Ok(self
                .sphere_plane(*center, *radius, *dof, *normal, *offset)
                .into_iter()
                .collect()),
            (Element::Plane { .. }, Element::Sphere { .. }) => {
                // Normalize to sphere-first and flip the normal back.
                let mut contacts = self.test_elements(b, a)?;
                for contact in &mut contacts {
                    contact.normal = -contact.normal;
                    std::mem::swap(&mut contact.dof_a, &mut contact.dof_b);
                }
                Ok(contacts)
            }
            (
                Element::Capsule {
                    p0,
                    p1,
                    radius,
                    dofs,
                },
                Element::Plane { normal, offset },
            ) => {
                let mut contacts = Vec::new();
                for (point, dof) in [(p0, dofs[0]), (p1, dofs[1])] {
                    if let Some(contact) =
                        self.sphere_plane(*point, *radius, dof, *normal, *offset)
                    {
                        contacts.push(contact);
                    }
                }
                Ok(contacts)
            }
            (Element::Plane { .. }, Element::Capsule { .. }) => {
                let mut contacts = self.test_elements(b, a)?;
                for contact in &mut contacts {
                    contact.normal = -contact.normal;
                    std::mem::swap(&mut contact.dof_a, &mut contact.dof_b);
                }
                Ok(contacts)
            }
            _ => {
                trace!("unsupported element pair, skipping");
                Ok(Vec::new())
            }
        }
    }
}

/// The narrow phase: runs the intersection strategy over every element
/// pair of a candidate model pair.
pub struct NarrowPhase {
    intersection: Box<dyn Intersection>,
}

impl NarrowPhase {
    /// Create a narrow phase with an intersection strategy.
    #[must_use]
    pub fn new(intersection: Box<dyn Intersection>) -> Self {
        Self { intersection }
    }

    /// Name of the configured strategy.
    #[must_use]
    pub fn intersection_name(&self) -> &'static str {
        self.intersection.name()
    }

    /// Exact contacts for one candidate model pair.
    ///
    /// Degenerate element pairs fail the whole model pair; the pipeline
    /// drops it and continues with the others.
    pub fn detect_pair(
        &self,
        scene: &Scene,
        model_a: &CollisionModel,
        model_b: &CollisionModel,
    ) -> Result<Vec<ContactPoint>> {
        let elements_a = model_a.elements(scene)?;
        let elements_b = model_b.elements(scene)?;

        let mut contacts = Vec::new();
        for ea in &elements_a {
            for eb in &elements_b {
                contacts.extend(self.intersection.test_elements(ea, eb).map_err(|err| {
                    match err {
                        PipelineError::DegenerateGeometry { detail, .. } => {
                            PipelineError::DegenerateGeometry {
                                model_a: model_a.id().raw(),
                                model_b: model_b.id().raw(),
                                detail,
                            }
                        }
                        other => other,
                    }
                })?);
            }
        }
        Ok(contacts)
    }
}

impl Default for NarrowPhase {
    fn default() -> Self {
        Self::new(Box::new(DiscreteIntersection::new()))
    }
}
