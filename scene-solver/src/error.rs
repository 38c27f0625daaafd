//! Error types for linear solvers.

use thiserror::Error;

/// Errors that can occur during factorization or solving.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    /// Factorization hit a numerically singular pivot.
    #[error("{context}: singular pivot at row {pivot} (regularized: {regularized})")]
    Singular {
        /// Which matrix was being factored.
        context: String,
        /// Row index of the failing pivot.
        pivot: usize,
        /// Whether an `εI` regularization had already been applied.
        regularized: bool,
    },

    /// Preconditioner input was not positive definite even after the
    /// automatic `εI` regularization retry.
    #[error("matrix not positive definite at pivot {pivot}, even after adding {epsilon} * I")]
    NonPositiveDefinite {
        /// Row index of the non-positive pivot.
        pivot: usize,
        /// The regularization that was attempted.
        epsilon: f64,
    },

    /// Operand dimensions disagree.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },
}

impl SolverError {
    /// Create a singularity error.
    #[must_use]
    pub fn singular(context: impl Into<String>, pivot: usize, regularized: bool) -> Self {
        Self::Singular {
            context: context.into(),
            pivot,
            regularized,
        }
    }

    /// Check if this is a singularity condition (recoverable by one
    /// regularization retry).
    #[must_use]
    pub fn is_singular(&self) -> bool {
        matches!(self, Self::Singular { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SolverError::singular("implicit system", 7, false);
        assert!(err.to_string().contains("implicit system"));
        assert!(err.to_string().contains('7'));
        assert!(err.to_string().contains("regularized: false"));

        let err = SolverError::singular("implicit system", 7, true);
        assert!(err.to_string().contains("regularized: true"));
    }

    #[test]
    fn test_predicates() {
        assert!(SolverError::singular("m", 0, false).is_singular());
        assert!(!SolverError::DimensionMismatch {
            expected: 3,
            actual: 4
        }
        .is_singular());
    }
}
