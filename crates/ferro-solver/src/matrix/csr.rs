//! Compressed-sparse-row storage with a profile built from element
//! location arrays.

use std::collections::BTreeSet;

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::coo::CooMatrix;
use nalgebra_sparse::csr::CsrMatrix;

use ferro_model::matrix::{MatrixKind, SparseMtrx, SparseTriplets, next_matrix_id};
use ferro_model::model::EngineeringModel;
use ferro_model::numbering::EquationNumbering;

/// Sparse system matrix over a fixed sparsity profile.
///
/// [`SparseMtrx::build_internal_structure`] unions the location arrays of
/// every domain element into the profile; subsequent assembly only writes
/// into existing positions. The storage declines factorization, so direct
/// solves on it report failure and the iterative family is the natural
/// match.
pub struct CsrMtrx {
    id: u64,
    version: u64,
    csr: CsrMatrix<f64>,
}

impl CsrMtrx {
    /// Empty matrix with no stored positions; the profile comes from
    /// [`SparseMtrx::build_internal_structure`].
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            id: next_matrix_id(),
            version: 0,
            csr: CsrMatrix::zeros(nrows, ncols),
        }
    }

    /// Build directly from triplets (duplicates are summed).
    pub fn from_triplets(triplets: &SparseTriplets) -> Self {
        let mut coo = CooMatrix::new(triplets.nrows, triplets.ncols);
        for k in 0..triplets.nnz() {
            coo.push(
                triplets.row_indices[k],
                triplets.col_indices[k],
                triplets.values[k],
            );
        }
        Self {
            id: next_matrix_id(),
            version: 0,
            csr: CsrMatrix::from(&coo),
        }
    }

    fn entry_mut(&mut self, i: usize, j: usize) -> &mut f64 {
        match self.csr.get_entry_mut(i, j) {
            Some(nalgebra_sparse::SparseEntryMut::NonZero(v)) => v,
            _ => panic!("position ({i}, {j}) lies outside the built profile"),
        }
    }
}

impl SparseMtrx for CsrMtrx {
    fn kind(&self) -> MatrixKind {
        MatrixKind::Csr
    }

    fn n_rows(&self) -> usize {
        self.csr.nrows()
    }

    fn n_columns(&self) -> usize {
        self.csr.ncols()
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn build_internal_structure(
        &mut self,
        model: &dyn EngineeringModel,
        domain_index: usize,
        numbering: &dyn EquationNumbering,
    ) {
        let neq = numbering.required_count();
        let domain = model.domain(domain_index);

        let mut profile = BTreeSet::new();
        for eq in 0..neq {
            profile.insert((eq, eq));
        }
        for element in &domain.elements {
            let loc = domain.location_array(element, numbering);
            for &ri in &loc {
                if ri == 0 {
                    continue;
                }
                for &rj in &loc {
                    if rj != 0 {
                        profile.insert((ri - 1, rj - 1));
                    }
                }
            }
        }

        let mut coo = CooMatrix::new(neq, neq);
        for (i, j) in profile {
            coo.push(i, j, 0.0);
        }
        self.csr = CsrMatrix::from(&coo);
        self.version += 1;
    }

    fn zero(&mut self) {
        for v in self.csr.values_mut() {
            *v = 0.0;
        }
        self.version += 1;
    }

    fn assemble(&mut self, loc: &[usize], block: &DMatrix<f64>) {
        assert_eq!(loc.len(), block.nrows());
        assert_eq!(loc.len(), block.ncols());
        for (i, &ri) in loc.iter().enumerate() {
            if ri == 0 {
                continue;
            }
            for (j, &rj) in loc.iter().enumerate() {
                if rj == 0 {
                    continue;
                }
                *self.entry_mut(ri - 1, rj - 1) += block[(i, j)];
            }
        }
        self.version += 1;
    }

    fn times(&self, x: &DVector<f64>) -> DVector<f64> {
        &self.csr * x
    }

    fn at(&self, i: usize, j: usize) -> f64 {
        match self.csr.get_entry(i, j) {
            Some(nalgebra_sparse::SparseEntry::NonZero(v)) => *v,
            Some(nalgebra_sparse::SparseEntry::Zero) => 0.0,
            None => panic!("index ({i}, {j}) out of bounds"),
        }
    }

    fn add_at(&mut self, i: usize, j: usize, value: f64) {
        *self.entry_mut(i, j) += value;
        self.version += 1;
    }

    fn back_substitute(&self, _rhs: &mut DVector<f64>) {
        panic!("CSR storage does not factorize");
    }

    fn to_triplets(&self) -> SparseTriplets {
        let mut triplets = SparseTriplets::new(self.csr.nrows(), self.csr.ncols());
        for (i, j, v) in self.csr.triplet_iter() {
            if *v != 0.0 {
                triplets.push(i, j, *v);
            }
        }
        triplets
    }
}
