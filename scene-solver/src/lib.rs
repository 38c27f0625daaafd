//! Linear solvers for the simulation core.
//!
//! Implicit integrators and constraint resolution both reduce to solving
//! `A x = b` for a symmetric system matrix assembled over the mechanical
//! dofs. This crate provides the two solver families they consume:
//!
//! - **Direct**: sparse LDL^T factorization over CSR input, with a dense
//!   LU fallback ([`direct`]). Factorization detects numerical singularity
//!   and fails with [`SolverError::Singular`] instead of producing `NaN`s;
//!   callers regularize with `A + εI` and retry exactly once.
//! - **Iterative**: a conjugate-gradient family ([`iterative`]) with the
//!   `{precision, iterations, relative}` termination options, plus an
//!   incomplete-Cholesky preconditioner ([`precond`]) with one automatic
//!   regularization retry and an opt-in `constant` mode that reuses a
//!   stale factorization across steps.
//!
//! # Example
//!
//! ```
//! use scene_solver::{ConjugateGradient, CgConfig, TripletBuilder};
//! use nalgebra::DVector;
//!
//! // A 2x2 SPD system.
//! let mut builder = TripletBuilder::new(2, 2);
//! builder.add(0, 0, 4.0);
//! builder.add(0, 1, 1.0);
//! builder.add(1, 0, 1.0);
//! builder.add(1, 1, 3.0);
//! let matrix = builder.build();
//!
//! let b = DVector::from_vec(vec![1.0, 2.0]);
//! let outcome = ConjugateGradient::new(CgConfig::default()).solve(&matrix, &b);
//! assert!(outcome.converged);
//! ```

#![doc(html_root_url = "https://docs.rs/scene-solver/0.3.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::missing_errors_doc, // Error docs added where non-obvious
)]

mod direct;
mod error;
mod iterative;
mod matrix;
mod precond;

pub use direct::{DenseLu, LdlFactorization, SparseLdl};
pub use error::SolverError;
pub use iterative::{CgConfig, CgOutcome, ConjugateGradient};
pub use matrix::{spmv, LinearOperator, TripletBuilder};
pub use precond::{IncompleteCholesky, Preconditioner};

/// Result type for solver operations.
pub type Result<T> = std::result::Result<T, SolverError>;
