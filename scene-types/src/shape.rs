//! Collision geometry data.
//!
//! [`Aabb`] is the bounding volume used by the broad phase. [`ShapeKind`]
//! is the tagged description of a collision model's elements; the exact
//! geometric tests live in the collision crate, keyed by a match on the
//! `(ShapeKind, ShapeKind)` pair.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vector3<f64>,
    /// Maximum corner.
    pub max: Vector3<f64>,
}

impl Aabb {
    /// Create an AABB from corners.
    #[must_use]
    pub const fn new(min: Vector3<f64>, max: Vector3<f64>) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with the given half-extents.
    #[must_use]
    pub fn from_center(center: Vector3<f64>, half_extents: Vector3<f64>) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// An inverted AABB that is the identity for [`Aabb::merged`].
    #[must_use]
    pub fn empty() -> Self {
        Self {
            min: Vector3::repeat(f64::INFINITY),
            max: Vector3::repeat(f64::NEG_INFINITY),
        }
    }

    /// Whether this AABB overlaps another.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Grow by a margin on all sides.
    #[must_use]
    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min: self.min - Vector3::repeat(margin),
            max: self.max + Vector3::repeat(margin),
        }
    }

    /// The union of two AABBs.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Minimum corner coordinate along an axis index (0..3).
    #[must_use]
    pub fn min_on_axis(&self, axis: usize) -> f64 {
        self.min[axis]
    }

    /// Maximum corner coordinate along an axis index (0..3).
    #[must_use]
    pub fn max_on_axis(&self, axis: usize) -> f64 {
        self.max[axis]
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::new(Vector3::zeros(), Vector3::zeros())
    }
}

/// Element geometry of a collision model.
///
/// Elements are anchored on the dofs of the model's bound mechanical
/// state: each sphere sits on one dof, each capsule spans an edge between
/// two dofs. A half-space is static scene geometry and references no dofs.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShapeKind {
    /// One sphere per dof of the bound state.
    Spheres {
        /// Common radius of every sphere element.
        radius: f64,
    },
    /// A static half-space `normal · x <= offset` (the solid side is below
    /// the plane).
    HalfSpace {
        /// Outward unit normal.
        normal: Vector3<f64>,
        /// Signed plane offset along the normal.
        offset: f64,
    },
    /// Capsules spanning edges between dof pairs.
    Capsules {
        /// Common radius of every capsule element.
        radius: f64,
        /// Dof index pairs forming the capsule segments.
        edges: Vec<[u32; 2]>,
    },
}

impl ShapeKind {
    /// Short name for diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Spheres { .. } => "spheres",
            Self::HalfSpace { .. } => "halfspace",
            Self::Capsules { .. } => "capsules",
        }
    }

    /// Whether this shape is anchored on state dofs at all.
    #[must_use]
    pub fn is_static(&self) -> bool {
        matches!(self, Self::HalfSpace { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_overlaps() {
        let a = Aabb::from_center(Vector3::zeros(), Vector3::repeat(1.0));
        let b = Aabb::from_center(Vector3::new(1.5, 0.0, 0.0), Vector3::repeat(1.0));
        let c = Aabb::from_center(Vector3::new(5.0, 0.0, 0.0), Vector3::repeat(1.0));

        assert!(a.overlaps(&b), "a and b should overlap");
        assert!(b.overlaps(&a), "overlap should be symmetric");
        assert!(!a.overlaps(&c), "a and c should not overlap");
    }

    #[test]
    fn test_aabb_expanded() {
        let aabb = Aabb::from_center(Vector3::zeros(), Vector3::repeat(1.0));
        let expanded = aabb.expanded(0.5);
        assert_eq!(expanded.min.x, -1.5);
        assert_eq!(expanded.max.x, 1.5);
    }

    #[test]
    fn test_aabb_merged_with_empty() {
        let a = Aabb::from_center(Vector3::new(2.0, 0.0, 0.0), Vector3::repeat(1.0));
        let merged = Aabb::empty().merged(&a);
        assert_eq!(merged, a);
    }

    #[test]
    fn test_shape_kind_names() {
        assert_eq!(
            ShapeKind::Spheres { radius: 1.0 }.kind_name(),
            "spheres"
        );
        let plane = ShapeKind::HalfSpace {
            normal: Vector3::z(),
            offset: 0.0,
        };
        assert_eq!(plane.kind_name(), "halfspace");
        assert!(plane.is_static());
    }
}
