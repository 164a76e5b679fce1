//! Dense storage with in-place LU factorization.

use nalgebra::linalg::LU;
use nalgebra::{DMatrix, DVector, Dyn};

use ferro_model::matrix::{MatrixKind, SparseMtrx, SparseTriplets, next_matrix_id};
use ferro_model::model::EngineeringModel;
use ferro_model::numbering::EquationNumbering;

/// Dense square system matrix. Factorization support makes it the storage
/// the direct solver recommends; the factor is dropped on any content
/// change.
pub struct DenseMtrx {
    id: u64,
    version: u64,
    data: DMatrix<f64>,
    lu: Option<LU<f64, Dyn, Dyn>>,
}

impl DenseMtrx {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            id: next_matrix_id(),
            version: 0,
            data: DMatrix::zeros(nrows, ncols),
            lu: None,
        }
    }

    /// Wrap an existing dense matrix.
    pub fn from_dense(data: DMatrix<f64>) -> Self {
        Self {
            id: next_matrix_id(),
            version: 0,
            data,
            lu: None,
        }
    }

    pub fn as_dmatrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    fn touch(&mut self) {
        self.version += 1;
        self.lu = None;
    }
}

impl SparseMtrx for DenseMtrx {
    fn kind(&self) -> MatrixKind {
        MatrixKind::Dense
    }

    fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    fn n_columns(&self) -> usize {
        self.data.ncols()
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn build_internal_structure(
        &mut self,
        _model: &dyn EngineeringModel,
        _domain_index: usize,
        numbering: &dyn EquationNumbering,
    ) {
        let neq = numbering.required_count();
        self.data = DMatrix::zeros(neq, neq);
        self.touch();
    }

    fn zero(&mut self) {
        self.data.fill(0.0);
        self.touch();
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
                self.data[(ri - 1, rj - 1)] += block[(i, j)];
            }
        }
        self.touch();
    }

    fn times(&self, x: &DVector<f64>) -> DVector<f64> {
        &self.data * x
    }

    fn at(&self, i: usize, j: usize) -> f64 {
        self.data[(i, j)]
    }

    fn add_at(&mut self, i: usize, j: usize, value: f64) {
        self.data[(i, j)] += value;
        self.touch();
    }

    fn can_be_factorized(&self) -> bool {
        true
    }

    fn factorize(&mut self) -> bool {
        if self.lu.is_some() {
            return true;
        }
        let lu = LU::new(self.data.clone());
        if !lu.is_invertible() {
            return false;
        }
        self.lu = Some(lu);
        true
    }

    fn back_substitute(&self, rhs: &mut DVector<f64>) {
        let Some(lu) = &self.lu else {
            panic!("back substitution requested before factorization");
        };
        let solved = lu.solve_mut(rhs);
        assert!(solved, "factorized matrix lost invertibility");
    }

    fn to_triplets(&self) -> SparseTriplets {
        let mut triplets = SparseTriplets::new(self.data.nrows(), self.data.ncols());
        for j in 0..self.data.ncols() {
            for i in 0..self.data.nrows() {
                let v = self.data[(i, j)];
                if v != 0.0 {
                    triplets.push(i, j, v);
                }
            }
        }
        triplets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_skips_zero_locations() {
        let mut m = DenseMtrx::new(2, 2);
        let block = DMatrix::from_row_slice(2, 2, &[4.0, -4.0, -4.0, 4.0]);
        m.assemble(&[0, 1], &block);
        m.assemble(&[1, 2], &block);
        assert_eq!(m.at(0, 0), 8.0);
        assert_eq!(m.at(0, 1), -4.0);
        assert_eq!(m.at(1, 1), 4.0);
    }

    #[test]
    fn factorize_and_back_substitute() {
        let mut m = DenseMtrx::from_dense(DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]));
        assert!(m.can_be_factorized());
        assert!(m.factorize());
        let mut rhs = DVector::from_vec(vec![1.0, 2.0]);
        m.back_substitute(&mut rhs);
        let residual = m.times(&rhs) - DVector::from_vec(vec![1.0, 2.0]);
        assert!(residual.norm() < 1e-12);
    }

    #[test]
    fn singular_matrix_declines_factorization() {
        let mut m = DenseMtrx::from_dense(DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]));
        assert!(!m.factorize());
    }

    #[test]
    fn version_advances_on_change() {
        let mut m = DenseMtrx::new(2, 2);
        let v0 = m.version();
        m.add_at(0, 0, 1.0);
        assert!(m.version() > v0);
        let v1 = m.version();
        m.zero();
        assert!(m.version() > v1);
    }
}
