//! Iterative solvers: the conjugate-gradient family.
//!
//! CG is the workhorse behind implicit integration: the system matrix is
//! symmetric and only needs to be applied, never stored densely. The
//! termination options mirror the classic trio:
//!
//! - `precision` - convergence residual threshold. `0` disables the
//!   residual test and runs a fixed iteration count.
//! - `iterations` - maximum iteration bound.
//! - `relative` - whether `precision` is relative to the initial residual
//!   norm.
//!
//! Exceeding the iteration bound is *not* an error: the best available
//! approximation is returned with [`CgOutcome::converged`] set to `false`
//! and the achieved residual reported, so the caller can decide whether
//! degraded quality is acceptable for this step.

use nalgebra::DVector;
use tracing::{debug, warn};

use crate::matrix::LinearOperator;
use crate::precond::Preconditioner;

/// Configuration for [`ConjugateGradient`].
#[derive(Debug, Clone, PartialEq)]
pub struct CgConfig {
    /// Convergence residual threshold; `0` forces a fixed iteration count.
    pub precision: f64,
    /// Maximum iteration bound.
    pub iterations: usize,
    /// Whether `precision` is relative to the initial residual norm.
    pub relative: bool,
    /// Denominator threshold below which the search direction has
    /// degenerated and iteration stops early.
    pub small_denominator: f64,
}

impl Default for CgConfig {
    fn default() -> Self {
        Self {
            precision: 1e-5,
            iterations: 25,
            relative: false,
            small_denominator: 1e-15,
        }
    }
}

impl CgConfig {
    /// Run exactly `n` iterations with no residual test.
    #[must_use]
    pub fn fixed_iterations(n: usize) -> Self {
        Self {
            precision: 0.0,
            iterations: n,
            ..Default::default()
        }
    }

    /// Set a relative convergence threshold.
    #[must_use]
    pub fn with_relative_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self.relative = true;
        self
    }
}

/// Result of a CG solve. Always carries a usable solution.
#[derive(Debug, Clone)]
pub struct CgOutcome {
    /// The (possibly approximate) solution.
    pub x: DVector<f64>,
    /// Iterations actually performed.
    pub iterations: usize,
    /// Achieved residual norm.
    pub residual: f64,
    /// Whether the residual test passed (always `true` in fixed-count
    /// mode: the requested work was done).
    pub converged: bool,
}

/// Conjugate-gradient solver for symmetric positive definite operators.
#[derive(Debug, Clone, Default)]
pub struct ConjugateGradient {
    config: CgConfig,
}

impl ConjugateGradient {
    /// Create a solver with the given configuration.
    #[must_use]
    pub fn new(config: CgConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &CgConfig {
        &self.config
    }

    /// Solve `A x = b` from a zero initial guess.
    #[must_use]
    pub fn solve<A: LinearOperator + ?Sized>(&self, a: &A, b: &DVector<f64>) -> CgOutcome {
        self.run(a, b, None)
    }

    /// Solve `M^-1 A x = M^-1 b` with a preconditioner.
    #[must_use]
    pub fn solve_preconditioned<A: LinearOperator + ?Sized>(
        &self,
        a: &A,
        b: &DVector<f64>,
        precond: &dyn Preconditioner,
    ) -> CgOutcome {
        self.run(a, b, Some(precond))
    }

    fn run<A: LinearOperator + ?Sized>(
        &self,
        a: &A,
        b: &DVector<f64>,
        precond: Option<&dyn Preconditioner>,
    ) -> CgOutcome {
        let cfg = &self.config;
        let fixed_count = cfg.precision == 0.0;

        let mut x = DVector::zeros(b.len());
        let mut r = b.clone();

        let initial_residual = r.norm();
        let threshold = if cfg.relative {
            cfg.precision * initial_residual
        } else {
            cfg.precision
        };

        if !fixed_count && initial_residual <= threshold {
            return CgOutcome {
                x,
                iterations: 0,
                residual: initial_residual,
                converged: true,
            };
        }

        let mut z = precond.map_or_else(|| r.clone(), |m| m.apply(&r));
        let mut p = z.clone();
        let mut rz = r.dot(&z);
        let mut residual = initial_residual;
        let mut iterations = 0;

        for iter in 1..=cfg.iterations {
            let q = a.apply(&p);
            let den = p.dot(&q);
            if den.abs() < cfg.small_denominator {
                debug!(
                    iteration = iter,
                    denominator = den,
                    "CG denominator degenerated, stopping early"
                );
                break;
            }

            let alpha = rz / den;
            x.axpy(alpha, &p, 1.0);
            r.axpy(-alpha, &q, 1.0);

            iterations = iter;
            residual = r.norm();
            if !fixed_count && residual <= threshold {
                return CgOutcome {
                    x,
                    iterations,
                    residual,
                    converged: true,
                };
            }

            z = precond.map_or_else(|| r.clone(), |m| m.apply(&r));
            let rz_new = r.dot(&z);
            let beta = rz_new / rz;
            rz = rz_new;
            p = &z + &p * beta;
        }

        let converged = fixed_count;
        if !converged {
            warn!(
                iterations,
                residual, threshold, "CG exceeded iteration bound without converging"
            );
        }
        CgOutcome {
            x,
            iterations,
            residual,
            converged,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::matrix::{spmv, TripletBuilder};
    use nalgebra_sparse::CsrMatrix;

    fn laplacian_1d(n: usize) -> CsrMatrix<f64> {
        // Tridiagonal SPD matrix.
        let mut builder = TripletBuilder::new(n, n);
        for i in 0..n {
            builder.add(i, i, 2.0);
            if i + 1 < n {
                builder.add(i, i + 1, -1.0);
                builder.add(i + 1, i, -1.0);
            }
        }
        builder.build()
    }

    #[test]
    fn test_cg_converges_on_spd() {
        let matrix = laplacian_1d(10);
        let b = DVector::from_element(10, 1.0);

        let solver = ConjugateGradient::new(CgConfig {
            precision: 1e-10,
            iterations: 100,
            ..Default::default()
        });
        let outcome = solver.solve(&matrix, &b);

        assert!(outcome.converged);
        let residual = &b - spmv(&matrix, &outcome.x);
        assert!(residual.norm() < 1e-8);
    }

    #[test]
    fn test_cg_exact_in_n_iterations() {
        // CG on an n-dim SPD system converges in at most n iterations.
        let matrix = laplacian_1d(5);
        let b = DVector::from_element(5, 1.0);

        let solver = ConjugateGradient::new(CgConfig {
            precision: 1e-10,
            iterations: 5,
            ..Default::default()
        });
        let outcome = solver.solve(&matrix, &b);
        assert!(outcome.converged);
        assert!(outcome.iterations <= 5);
    }

    #[test]
    fn test_cg_nonconvergence_reports_best_effort() {
        let matrix = laplacian_1d(50);
        let b = DVector::from_element(50, 1.0);

        // Far too few iterations to converge at this precision.
        let solver = ConjugateGradient::new(CgConfig {
            precision: 1e-14,
            iterations: 2,
            ..Default::default()
        });
        let outcome = solver.solve(&matrix, &b);

        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 2);
        assert!(outcome.residual > 0.0);
        // The approximate solution is still better than nothing.
        let initial = b.norm();
        assert!(outcome.residual < initial);
        assert!(outcome.x.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_cg_fixed_iteration_mode() {
        let matrix = laplacian_1d(10);
        let b = DVector::from_element(10, 1.0);

        let solver = ConjugateGradient::new(CgConfig::fixed_iterations(3));
        let outcome = solver.solve(&matrix, &b);

        assert_eq!(outcome.iterations, 3);
        assert!(outcome.converged, "fixed-count mode reports success");
    }

    #[test]
    fn test_cg_relative_precision() {
        let matrix = laplacian_1d(10);
        let b = DVector::from_element(10, 100.0);

        let solver =
            ConjugateGradient::new(CgConfig::default().with_relative_precision(1e-8));
        let outcome = solver.solve(&matrix, &b);
        assert!(outcome.converged);
        assert!(outcome.residual <= 1e-8 * b.norm());
    }

    #[test]
    fn test_cg_zero_rhs_converges_immediately() {
        let matrix = laplacian_1d(4);
        let b = DVector::zeros(4);
        let outcome = ConjugateGradient::default().solve(&matrix, &b);
        assert!(outcome.converged);
        assert_eq!(outcome.iterations, 0);
    }
}
