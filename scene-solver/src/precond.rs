//! Preconditioners for the iterative solvers.
//!
//! [`IncompleteCholesky`] computes an IC(0) factorization: a Cholesky
//! factor restricted to the sparsity pattern of the input's lower
//! triangle. `compute` owns the non-positive-definite recovery contract
//! (one automatic `εI` regularization retry, then an explicit fatal
//! error); `apply` solves with the cached factors. The `constant` mode
//! reuses a stale factorization across steps, an accuracy/performance
//! trade-off the caller opts into.

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use tracing::{trace, warn};

use crate::matrix::regularized;
use crate::SolverError;

/// Anything CG can use as `M^-1`.
pub trait Preconditioner {
    /// Compute `M^-1 r`.
    fn apply(&self, r: &DVector<f64>) -> DVector<f64>;
}

/// Incomplete Cholesky (zero fill-in) preconditioner.
#[derive(Debug, Clone)]
pub struct IncompleteCholesky {
    epsilon: f64,
    constant: bool,
    factor: Option<IcFactor>,
}

#[derive(Debug, Clone)]
struct IcFactor {
    /// Strictly-lower entries per row, sorted by column.
    rows: Vec<Vec<(usize, f64)>>,
    /// Strictly-lower entries per column (the transpose view).
    cols: Vec<Vec<(usize, f64)>>,
    /// Diagonal of `L`.
    diag: Vec<f64>,
}

impl Default for IncompleteCholesky {
    fn default() -> Self {
        Self::new()
    }
}

impl IncompleteCholesky {
    /// Create a preconditioner with the default regularization epsilon.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epsilon: 1e-6,
            constant: false,
            factor: None,
        }
    }

    /// Set the regularization added on a non-positive-definite retry.
    #[must_use]
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Reuse the existing factorization on later `compute` calls instead
    /// of refactoring. Stale factors trade accuracy for speed.
    #[must_use]
    pub fn constant(mut self, constant: bool) -> Self {
        self.constant = constant;
        self
    }

    /// Whether a factorization is cached.
    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.factor.is_some()
    }

    /// Factor the matrix.
    ///
    /// On detected non-positive-definiteness the matrix is regularized by
    /// `epsilon * I` and refactored once; a second failure is fatal and
    /// explicitly reported, never silently returned as garbage.
    pub fn compute(&mut self, matrix: &CsrMatrix<f64>) -> Result<(), SolverError> {
        if self.constant && self.factor.is_some() {
            trace!("constant mode: reusing cached incomplete Cholesky factors");
            return Ok(());
        }

        match ic0(matrix) {
            Ok(factor) => {
                self.factor = Some(factor);
                Ok(())
            }
            Err(pivot) => {
                warn!(
                    pivot,
                    epsilon = self.epsilon,
                    "incomplete Cholesky not positive definite, retrying regularized"
                );
                match ic0(&regularized(matrix, self.epsilon)) {
                    Ok(factor) => {
                        self.factor = Some(factor);
                        Ok(())
                    }
                    Err(pivot) => {
                        self.factor = None;
                        Err(SolverError::NonPositiveDefinite {
                            pivot,
                            epsilon: self.epsilon,
                        })
                    }
                }
            }
        }
    }
}

impl Preconditioner for IncompleteCholesky {
    fn apply(&self, r: &DVector<f64>) -> DVector<f64> {
        let Some(factor) = &self.factor else {
            debug_assert!(false, "apply called before compute");
            warn!("incomplete Cholesky applied before compute, acting as identity");
            return r.clone();
        };
        let n = factor.diag.len();
        let mut y = DVector::zeros(n);

        // Forward: L y = r.
        for i in 0..n {
            let mut sum = r[i];
            for &(j, lij) in &factor.rows[i] {
                sum -= lij * y[j];
            }
            y[i] = sum / factor.diag[i];
        }

        // Backward: L^T z = y.
        for i in (0..n).rev() {
            let mut sum = y[i];
            for &(k, lki) in &factor.cols[i] {
                sum -= lki * y[k];
            }
            y[i] = sum / factor.diag[i];
        }

        y
    }
}

/// IC(0) over the lower-triangle pattern. Returns the failing pivot row
/// on a non-positive diagonal.
fn ic0(matrix: &CsrMatrix<f64>) -> Result<IcFactor, usize> {
    let n = matrix.nrows();

    // Lower-triangle input rows, sorted by column (CSR rows already are).
    let mut a_rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    let mut a_diag = vec![0.0; n];
    for (row_idx, row) in matrix.row_iter().enumerate() {
        for (&col_idx, &val) in row.col_indices().iter().zip(row.values().iter()) {
            if col_idx < row_idx {
                a_rows[row_idx].push((col_idx, val));
            } else if col_idx == row_idx {
                a_diag[row_idx] = val;
            }
        }
    }

    let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    let mut diag = vec![0.0; n];

    for i in 0..n {
        let mut l_row: Vec<(usize, f64)> = Vec::with_capacity(a_rows[i].len());
        for &(j, a_ij) in &a_rows[i] {
            // sum_{k < j} L[i][k] * L[j][k], over the shared pattern.
            let dot = sparse_dot(&l_row, &rows[j], j);
            l_row.push((j, (a_ij - dot) / diag[j]));
        }
        let sq: f64 = l_row.iter().map(|&(_, v)| v * v).sum();
        let pivot = a_diag[i] - sq;
        if pivot <= 0.0 {
            return Err(i);
        }
        diag[i] = pivot.sqrt();
        rows[i] = l_row;
    }

    // Transpose view for the backward solve.
    let mut cols: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    for (i, row) in rows.iter().enumerate() {
        for &(j, v) in row {
            cols[j].push((i, v));
        }
    }

    Ok(IcFactor { rows, cols, diag })
}

/// Dot product of two sorted sparse rows, over columns `< limit`.
fn sparse_dot(a: &[(usize, f64)], b: &[(usize, f64)], limit: usize) -> f64 {
    let mut sum = 0.0;
    let (mut ia, mut ib) = (0, 0);
    while ia < a.len() && ib < b.len() {
        let (ca, va) = a[ia];
        let (cb, vb) = b[ib];
        if ca >= limit || cb >= limit {
            break;
        }
        match ca.cmp(&cb) {
            std::cmp::Ordering::Less => ia += 1,
            std::cmp::Ordering::Greater => ib += 1,
            std::cmp::Ordering::Equal => {
                sum += va * vb;
                ia += 1;
                ib += 1;
            }
        }
    }
    sum
}
