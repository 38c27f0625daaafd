//! Logical handles for per-state numeric vectors.
//!
//! A [`VecId`] names one vector of a mechanical state without saying which
//! state: the same id resolves to a different buffer on every state it is
//! applied to. Fixed slots (position, velocity, force, ...) always exist;
//! temporary slots are allocated from a per-operation pool and must be
//! freed exactly once.
//!
//! # Categories
//!
//! | Category | Fixed slots | Meaning |
//! |----------|-------------|---------|
//! | `Coord` | `Position`, `RestPosition`, `FreePosition` | degrees of freedom |
//! | `Deriv` | `Velocity`, `Force`, `Dx`, `FreeVelocity` | time derivatives / force space |
//! | `MatrixDeriv` | `ConstraintJacobian` | constraint jacobian rows |
//!
//! # Example
//!
//! ```
//! use scene_types::{VecCategory, VecId};
//!
//! assert_eq!(VecId::Position.category(), VecCategory::Coord);
//! assert_eq!(VecId::Force.category(), VecCategory::Deriv);
//!
//! let tmp = VecId::temp(VecCategory::Deriv, 0);
//! assert!(tmp.is_temp());
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The space a vector lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VecCategory {
    /// Degrees of freedom (positions).
    Coord,
    /// Derivatives of the dofs (velocities, forces, increments).
    Deriv,
    /// Sparse constraint jacobian rows.
    MatrixDeriv,
}

/// Logical handle to one vector of a mechanical state.
///
/// Fixed variants are always valid; [`VecId::Temp`] handles come from the
/// mechanical-operations pool and are only valid between their allocation
/// and release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VecId {
    /// Current positions.
    Position,
    /// Rest (undeformed) positions.
    RestPosition,
    /// Predicted positions, used by free-motion schemes.
    FreePosition,
    /// Current velocities.
    Velocity,
    /// Accumulated forces.
    Force,
    /// Solution increment of an implicit solve.
    Dx,
    /// Predicted velocities, used by free-motion schemes.
    FreeVelocity,
    /// Constraint jacobian storage (matrix-valued, not a plain vector).
    ConstraintJacobian,
    /// A pool-allocated temporary.
    Temp {
        /// The space the temporary lives in.
        category: VecCategory,
        /// Pool slot, unique while allocated.
        slot: u32,
    },
}

impl VecId {
    /// Create a temporary handle. Normally done by the operations pool,
    /// not by hand.
    #[must_use]
    pub const fn temp(category: VecCategory, slot: u32) -> Self {
        Self::Temp { category, slot }
    }

    /// The category this id belongs to.
    #[must_use]
    pub const fn category(self) -> VecCategory {
        match self {
            Self::Position | Self::RestPosition | Self::FreePosition => VecCategory::Coord,
            Self::Velocity | Self::Force | Self::Dx | Self::FreeVelocity => VecCategory::Deriv,
            Self::ConstraintJacobian => VecCategory::MatrixDeriv,
            Self::Temp { category, .. } => category,
        }
    }

    /// Whether this is a pool-allocated temporary.
    #[must_use]
    pub const fn is_temp(self) -> bool {
        matches!(self, Self::Temp { .. })
    }
}

impl std::fmt::Display for VecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Position => write!(f, "position"),
            Self::RestPosition => write!(f, "restPosition"),
            Self::FreePosition => write!(f, "freePosition"),
            Self::Velocity => write!(f, "velocity"),
            Self::Force => write!(f, "force"),
            Self::Dx => write!(f, "dx"),
            Self::FreeVelocity => write!(f, "freeVelocity"),
            Self::ConstraintJacobian => write!(f, "constraintJacobian"),
            Self::Temp { category, slot } => write!(f, "temp{category:?}[{slot}]"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_categories() {
        assert_eq!(VecId::Position.category(), VecCategory::Coord);
        assert_eq!(VecId::RestPosition.category(), VecCategory::Coord);
        assert_eq!(VecId::FreePosition.category(), VecCategory::Coord);
        assert_eq!(VecId::Velocity.category(), VecCategory::Deriv);
        assert_eq!(VecId::Force.category(), VecCategory::Deriv);
        assert_eq!(VecId::Dx.category(), VecCategory::Deriv);
        assert_eq!(VecId::ConstraintJacobian.category(), VecCategory::MatrixDeriv);
    }

    #[test]
    fn test_temp_ids() {
        let a = VecId::temp(VecCategory::Coord, 0);
        let b = VecId::temp(VecCategory::Coord, 1);
        assert_ne!(a, b);
        assert!(a.is_temp());
        assert!(!VecId::Force.is_temp());
        assert_eq!(b.category(), VecCategory::Coord);
    }
}
