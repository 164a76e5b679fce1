//! Direct solution through the matrix's own factorization.

use nalgebra::DVector;

use ferro_model::matrix::{MatrixKind, SparseMtrx};

use crate::linear::LinearSolver;
use crate::method::NumericalMethod;
use crate::outcome::Outcome;

/// Solver that delegates to the matrix's factorization and back
/// substitution.
///
/// Which decomposition runs is the storage class's business; this solver
/// only orchestrates. A matrix whose storage cannot factorize, or whose
/// factorization breaks down, turns into [`Outcome::Failed`].
#[derive(Debug, Default)]
pub struct DirectSolver {
    domain_index: usize,
}

impl DirectSolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NumericalMethod for DirectSolver {
    fn state_kind(&self) -> &'static str {
        "direct"
    }

    fn set_domain(&mut self, domain_index: usize) {
        self.domain_index = domain_index;
    }

    fn domain_index(&self) -> usize {
        self.domain_index
    }
}

impl LinearSolver for DirectSolver {
    fn solve(
        &mut self,
        a: &mut dyn SparseMtrx,
        b: &DVector<f64>,
        x: &mut DVector<f64>,
    ) -> Outcome {
        assert_eq!(a.n_rows(), b.len());
        assert_eq!(b.len(), x.len());

        if !a.can_be_factorized() || !a.factorize() {
            return Outcome::Failed;
        }
        x.copy_from(b);
        a.back_substitute(x);
        Outcome::Converged
    }

    fn recommended_storage(&self, _symmetric: bool) -> MatrixKind {
        MatrixKind::Dense
    }
}
