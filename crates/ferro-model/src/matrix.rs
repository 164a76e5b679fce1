//! Sparse-matrix capability contract consumed by the solver framework.
//!
//! Storage implementations live outside this crate; solvers only rely on
//! this trait: matrix-vector products, optional in-place factorization with
//! back-substitution, block assembly through location arrays, and identity/
//! version stamps for cache invalidation.

use std::sync::atomic::{AtomicU64, Ordering};

use nalgebra::{DMatrix, DVector};

use crate::model::EngineeringModel;
use crate::numbering::EquationNumbering;

/// Storage families a solver can declare it expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixKind {
    /// Dense symmetric-capable storage with in-place factorization.
    Dense,
    /// Compressed sparse rows rebuilt from accumulated triplets.
    Csr,
}

/// COO interchange block: the format assembly produces and external
/// factorization packages consume.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseTriplets {
    pub nrows: usize,
    pub ncols: usize,
    pub row_indices: Vec<usize>,
    pub col_indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl SparseTriplets {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            row_indices: Vec::new(),
            col_indices: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn push(&mut self, row: usize, col: usize, value: f64) {
        self.row_indices.push(row);
        self.col_indices.push(col);
        self.values.push(value);
    }

    /// Number of stored (possibly duplicate) entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }
}

static MATRIX_IDS: AtomicU64 = AtomicU64::new(1);

/// Mint a process-unique matrix identity. Implementations call this once at
/// construction; caches compare `(id, version)` pairs instead of pointers.
pub fn next_matrix_id() -> u64 {
    MATRIX_IDS.fetch_add(1, Ordering::Relaxed)
}

/// Capability contract of an assembled system matrix.
///
/// Location arrays are 1-based with 0 meaning "skip this row/column", the
/// convention every numbering scheme produces. `version` must increase on
/// every content change (`zero`, `assemble`, `add_at`, structure rebuilds)
/// so preconditioner and factorization caches can detect staleness by
/// comparing stamps.
pub trait SparseMtrx: Send {
    fn kind(&self) -> MatrixKind;

    fn n_rows(&self) -> usize;

    fn n_columns(&self) -> usize;

    /// Process-unique identity, stable for the object's lifetime.
    fn id(&self) -> u64;

    /// Monotone content stamp.
    fn version(&self) -> u64;

    /// Size (and for sparse kinds, pre-compute the profile) from the
    /// domain's element location arrays under `numbering`.
    fn build_internal_structure(
        &mut self,
        model: &dyn EngineeringModel,
        domain_index: usize,
        numbering: &dyn EquationNumbering,
    );

    /// Zero all coefficients, keeping the structure.
    fn zero(&mut self);

    /// Accumulate a dense block: `loc[i] == 0` entries are skipped, others
    /// address global row/column `loc[i] - 1`.
    fn assemble(&mut self, loc: &[usize], block: &DMatrix<f64>);

    /// y = A·x
    fn times(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Coefficient at 0-based (i, j).
    fn at(&self, i: usize, j: usize) -> f64;

    /// Add `value` at 0-based (i, j); the position must exist in the
    /// stored structure.
    fn add_at(&mut self, i: usize, j: usize, value: f64);

    /// Main diagonal as a vector.
    fn diagonal(&self) -> DVector<f64> {
        DVector::from_fn(self.n_rows().min(self.n_columns()), |i, _| self.at(i, i))
    }

    /// Whether this storage offers in-place factorization.
    fn can_be_factorized(&self) -> bool {
        false
    }

    /// Factorize in place; `false` signals a numerically singular matrix.
    /// Implementations without factorization support keep the default.
    fn factorize(&mut self) -> bool {
        false
    }

    /// Overwrite `rhs` with the solution of the factorized system. Only
    /// valid after a successful [`SparseMtrx::factorize`].
    fn back_substitute(&self, rhs: &mut DVector<f64>);

    /// Copy out the coefficients as COO triplets.
    fn to_triplets(&self) -> SparseTriplets;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_ids_are_unique() {
        let a = next_matrix_id();
        let b = next_matrix_id();
        assert_ne!(a, b);
    }

    #[test]
    fn triplets_accumulate() {
        let mut t = SparseTriplets::new(2, 2);
        t.push(0, 0, 1.0);
        t.push(1, 1, 2.0);
        t.push(0, 0, 0.5);
        assert_eq!(t.nnz(), 3);
    }
}
