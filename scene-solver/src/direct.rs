//! Direct factorization solvers.
//!
//! [`SparseLdl`] factors a symmetric matrix given in compressed-row form
//! into `L D L^T` with sparse column storage. There is no pivoting: the
//! matrices assembled by the mechanical layer are symmetric and (after
//! projection) positive definite, so a vanishing pivot means the system is
//! genuinely singular. Factorization then fails with
//! [`SolverError::Singular`] before any division happens, so the solver
//! never emits `NaN`.
//!
//! The recovery contract belongs to the caller: regularize with `A + εI`
//! and retry exactly once ([`SparseLdl::factor_regularized`] packages that
//! policy), else treat the step as failed.
//!
//! [`DenseLu`] is the fallback for small or non-symmetric systems, built
//! on nalgebra's dense LU the same way the constraint solver falls back to
//! dense when Cholesky is unavailable.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use tracing::warn;

use crate::matrix::regularized;
use crate::SolverError;

/// Relative pivot threshold below which a diagonal is treated as singular.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Sparse LDL^T factorization of a symmetric CSR matrix.
#[derive(Debug, Clone, Default)]
pub struct SparseLdl;

/// The factors of `A = L D L^T`, with unit-diagonal `L` stored by columns.
#[derive(Debug, Clone)]
pub struct LdlFactorization {
    n: usize,
    /// Strictly-lower entries of column j: `(row, L[row][j])`, row > j.
    l_cols: Vec<Vec<(usize, f64)>>,
    d: Vec<f64>,
}

impl SparseLdl {
    /// Factor a symmetric matrix.
    ///
    /// Only the lower triangle of the input is read; the caller is
    /// responsible for symmetry.
    pub fn factor(matrix: &CsrMatrix<f64>) -> Result<LdlFactorization, SolverError> {
        Self::factor_inner(matrix, false)
    }

    /// Factor with the one-retry regularization policy: on a singular
    /// pivot, retry once on `A + εI`; if that also fails, the error is
    /// final for this step.
    pub fn factor_regularized(
        matrix: &CsrMatrix<f64>,
        epsilon: f64,
    ) -> Result<LdlFactorization, SolverError> {
        match Self::factor_inner(matrix, false) {
            Ok(f) => Ok(f),
            Err(err) if err.is_singular() => {
                warn!(%err, epsilon, "LDL^T factorization singular, retrying regularized");
                Self::factor_inner(&regularized(matrix, epsilon), true)
            }
            Err(err) => Err(err),
        }
    }

    fn factor_inner(
        matrix: &CsrMatrix<f64>,
        is_regularized: bool,
    ) -> Result<LdlFactorization, SolverError> {
        let n = matrix.nrows();
        if matrix.ncols() != n {
            return Err(SolverError::DimensionMismatch {
                expected: n,
                actual: matrix.ncols(),
            });
        }

        // Column lists of the lower triangle (row >= col).
        let mut a_cols: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        let mut max_diag: f64 = 0.0;
        for (row_idx, row) in matrix.row_iter().enumerate() {
            for (&col_idx, &val) in row.col_indices().iter().zip(row.values().iter()) {
                if row_idx >= col_idx {
                    a_cols[col_idx].push((row_idx, val));
                }
                if row_idx == col_idx {
                    max_diag = max_diag.max(val.abs());
                }
            }
        }
        let tolerance = PIVOT_TOLERANCE * max_diag.max(1.0);

        let mut l_cols: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        // Row lists of L built alongside, for the left-looking updates.
        let mut l_rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        let mut d = vec![0.0; n];
        let mut work = vec![0.0; n];

        for j in 0..n {
            for &(i, v) in &a_cols[j] {
                work[i] = v;
            }

            // Subtract the contributions of every earlier column k with
            // L[j][k] != 0.
            for idx in 0..l_rows[j].len() {
                let (k, ljk) = l_rows[j][idx];
                let s = ljk * d[k];
                work[j] -= ljk * s;
                for &(i, lik) in &l_cols[k] {
                    if i > j {
                        work[i] -= lik * s;
                    }
                }
            }

            let pivot = work[j];
            if pivot.abs() <= tolerance {
                return Err(SolverError::singular("LDL^T", j, is_regularized));
            }
            d[j] = pivot;

            for i in (j + 1)..n {
                let w = work[i];
                if w != 0.0 {
                    let lij = w / pivot;
                    l_cols[j].push((i, lij));
                    l_rows[i].push((j, lij));
                }
            }

            for i in j..n {
                work[i] = 0.0;
            }
        }

        Ok(LdlFactorization { n, l_cols, d })
    }
}

impl LdlFactorization {
    /// Dimension of the factored system.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Solve `A x = b` using the cached factors.
    pub fn solve(&self, b: &DVector<f64>) -> Result<DVector<f64>, SolverError> {
        if b.len() != self.n {
            return Err(SolverError::DimensionMismatch {
                expected: self.n,
                actual: b.len(),
            });
        }
        let mut x = b.clone();

        // Forward: L y = b (unit diagonal).
        for j in 0..self.n {
            let xj = x[j];
            for &(i, lij) in &self.l_cols[j] {
                x[i] -= lij * xj;
            }
        }

        // Diagonal: D z = y.
        for j in 0..self.n {
            x[j] /= self.d[j];
        }

        // Backward: L^T x = z.
        for j in (0..self.n).rev() {
            let mut sum = x[j];
            for &(i, lij) in &self.l_cols[j] {
                sum -= lij * x[i];
            }
            x[j] = sum;
        }

        Ok(x)
    }
}

/// Dense LU fallback solver.
#[derive(Debug, Clone, Default)]
pub struct DenseLu;

impl DenseLu {
    /// Solve `A x = b` by dense LU decomposition.
    ///
    /// A non-invertible matrix is reported as [`SolverError::Singular`];
    /// the output is never `NaN`.
    pub fn solve(matrix: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>, SolverError> {
        if matrix.nrows() != b.len() {
            return Err(SolverError::DimensionMismatch {
                expected: matrix.nrows(),
                actual: b.len(),
            });
        }
        matrix
            .clone()
            .lu()
            .solve(b)
            .ok_or_else(|| SolverError::singular("dense LU", 0, false))
    }
}
