//! Generalized eigenvalue solvers for `K·x = ω²·M·x`.
//!
//! Two strategies: a dense simultaneous-diagonalization sweep for small
//! reduced pairs, and inverse iteration over a working subspace for the
//! assembled sparse pair. Both report eigenvalues ascending with
//! M-normalized eigenvectors.

use nalgebra::{DMatrix, DVector};

use ferro_model::matrix::SparseMtrx;

use crate::method::NumericalMethod;
use crate::outcome::Outcome;

mod gjacobi;
mod subspace;

pub use gjacobi::GJacobiSolver;
pub use subspace::InverseIteration;

/// A solver for the generalized symmetric eigenproblem.
pub trait GeneralizedEigenSolver: NumericalMethod + Send {
    /// Compute the lowest `nroot` eigenpairs of `(k, m)`.
    ///
    /// `eigenvalues` and `eigenvectors` are overwritten with `nroot`
    /// ascending values and the matching M-normalized columns. `rtol`
    /// bounds the relative eigenvalue change accepted as converged.
    fn solve(
        &mut self,
        k: &mut dyn SparseMtrx,
        m: &mut dyn SparseMtrx,
        eigenvalues: &mut DVector<f64>,
        eigenvectors: &mut DMatrix<f64>,
        rtol: f64,
        nroot: usize,
    ) -> Outcome;
}

/// Eigenvalues with their matching eigenvector columns.
///
/// Values are ascending and the columns satisfy `xᵢᵗ·M·xⱼ ≈ δᵢⱼ` for the
/// mass matrix they were computed against.
#[derive(Debug, Clone)]
pub struct EigenPairSet {
    pub eigenvalues: DVector<f64>,
    pub eigenvectors: DMatrix<f64>,
}

impl EigenPairSet {
    pub fn new(eigenvalues: DVector<f64>, eigenvectors: DMatrix<f64>) -> Self {
        assert_eq!(eigenvalues.len(), eigenvectors.ncols());
        Self {
            eigenvalues,
            eigenvectors,
        }
    }

    pub fn len(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eigenvalues.is_empty()
    }

    /// Largest deviation of `XᵗMX` from the identity.
    pub fn orthonormality_error(&self, m: &dyn SparseMtrx) -> f64 {
        let nc = self.eigenvectors.ncols();
        let mut worst = 0.0_f64;
        for i in 0..nc {
            let mxi = m.times(&self.eigenvectors.column(i).into_owned());
            for j in 0..nc {
                let product = self.eigenvectors.column(j).dot(&mxi);
                let expected = if i == j { 1.0 } else { 0.0 };
                worst = worst.max((product - expected).abs());
            }
        }
        worst
    }
}

/// Copy a sparse matrix into dense storage for the small-problem solver.
pub(crate) fn densify(a: &dyn SparseMtrx) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(a.n_rows(), a.n_columns());
    let t = a.to_triplets();
    for ((&r, &c), &v) in t.row_indices.iter().zip(&t.col_indices).zip(&t.values) {
        out[(r, c)] += v;
    }
    out
}
