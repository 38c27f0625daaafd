//! Sparse system matrices in compressed-row form.
//!
//! System matrices are assembled from per-component contributions as
//! triplets and compressed once per solve. The assembled matrix is the
//! input contract of every solver in this crate.
//!
//! # Sparsity Pattern
//!
//! For a system with N dofs the matrix is 3N x 3N (three scalar rows per
//! dof). Mass contributes the diagonal; stiffness couples only dofs that
//! share a force element, so rows stay short.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Anything that can act as `A` in `A x = b`.
pub trait LinearOperator {
    /// Dimension of the (square) operator.
    fn dim(&self) -> usize;

    /// Compute `A * v`.
    fn apply(&self, v: &DVector<f64>) -> DVector<f64>;
}

impl LinearOperator for CsrMatrix<f64> {
    fn dim(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, v: &DVector<f64>) -> DVector<f64> {
        spmv(self, v)
    }
}

impl LinearOperator for DMatrix<f64> {
    fn dim(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, v: &DVector<f64>) -> DVector<f64> {
        self * v
    }
}

/// Sparse matrix-vector product over CSR rows.
#[must_use]
pub fn spmv(matrix: &CsrMatrix<f64>, v: &DVector<f64>) -> DVector<f64> {
    let mut result = DVector::zeros(matrix.nrows());
    for (row_idx, row) in matrix.row_iter().enumerate() {
        let mut sum = 0.0;
        for (&col_idx, &val) in row.col_indices().iter().zip(row.values().iter()) {
            sum += val * v[col_idx];
        }
        result[row_idx] = sum;
    }
    result
}

/// Builder for sparse system matrices using triplet accumulation.
///
/// Entries may be added in any order; duplicates sum. Near-zero values are
/// skipped so component loops don't have to special-case them.
#[derive(Debug, Clone)]
pub struct TripletBuilder {
    triplets: Vec<(usize, usize, f64)>,
    num_rows: usize,
    num_cols: usize,
}

impl TripletBuilder {
    /// Create a builder for a `num_rows` x `num_cols` matrix.
    #[must_use]
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Self {
            triplets: Vec::with_capacity(num_rows * 9),
            num_rows,
            num_cols,
        }
    }

    /// Add a single entry.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.num_rows);
        debug_assert!(col < self.num_cols);
        if value.abs() > 1e-15 {
            self.triplets.push((row, col, value));
        }
    }

    /// Add a 3x3 block at a (row, col) offset.
    pub fn add_block3(&mut self, row: usize, col: usize, block: &nalgebra::Matrix3<f64>) {
        for i in 0..3 {
            for j in 0..3 {
                self.add(row + i, col + j, block[(i, j)]);
            }
        }
    }

    /// Add `value` to every diagonal entry.
    pub fn add_diagonal(&mut self, value: f64) {
        debug_assert_eq!(self.num_rows, self.num_cols);
        for i in 0..self.num_rows {
            self.add(i, i, value);
        }
    }

    /// Number of rows.
    #[must_use]
    pub const fn nrows(&self) -> usize {
        self.num_rows
    }

    /// Compress to CSR.
    #[must_use]
    pub fn build(self) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(self.num_rows, self.num_cols);
        for (row, col, val) in self.triplets {
            coo.push(row, col, val);
        }
        CsrMatrix::from(&coo)
    }
}

/// Copy of `matrix` with `epsilon` added to the diagonal.
///
/// This is the regularization callers apply after a [`SolverError::Singular`]
/// condition before their single retry.
///
/// [`SolverError::Singular`]: crate::SolverError::Singular
#[must_use]
pub(crate) fn regularized(matrix: &CsrMatrix<f64>, epsilon: f64) -> CsrMatrix<f64> {
    let n = matrix.nrows();
    let mut coo = CooMatrix::new(n, matrix.ncols());
    for (row_idx, row) in matrix.row_iter().enumerate() {
        for (&col_idx, &val) in row.col_indices().iter().zip(row.values().iter()) {
            coo.push(row_idx, col_idx, val);
        }
    }
    for i in 0..n {
        coo.push(i, i, epsilon);
    }
    CsrMatrix::from(&coo)
}
