//! Linear system solvers for `A·x = b`.
//!
//! Every solver works through the [`SparseMtrx`] contract and reports a
//! numerical [`Outcome`]; configuration problems surface as errors at
//! construction time instead. The trait ships a multi-right-hand-side
//! default that reuses the single solve column by column.

use nalgebra::{DMatrix, DVector};

use ferro_model::matrix::{MatrixKind, SparseMtrx};

use crate::method::NumericalMethod;
use crate::outcome::Outcome;

mod direct;
mod external;
mod iterative;

pub use direct::DirectSolver;
pub use external::{DistributedConfig, DistributedSolver};
pub use iterative::{IterativeConfig, IterativeSolver, KrylovMethod, PreconditionerKind};

/// A solver for sparse linear systems.
pub trait LinearSolver: NumericalMethod + Send + std::fmt::Debug {
    /// Solve `a · x = b`, leaving the solution in `x`.
    ///
    /// The incoming `x` serves as the initial guess where the method can
    /// use one. A matrix the solver cannot handle, because of its storage
    /// kind or because it declines factorization, yields
    /// [`Outcome::Failed`] rather than a panic.
    fn solve(&mut self, a: &mut dyn SparseMtrx, b: &DVector<f64>, x: &mut DVector<f64>)
    -> Outcome;

    /// Storage kind the caller should build for this solver.
    fn recommended_storage(&self, symmetric: bool) -> MatrixKind;

    /// Solve the same matrix against several right-hand sides.
    ///
    /// Columns are solved one at a time so factorizations and
    /// preconditioners are reused. The first column that does not converge
    /// stops the sweep and its outcome is returned; remaining columns of
    /// `x` are left untouched.
    fn solve_multiple(
        &mut self,
        a: &mut dyn SparseMtrx,
        b: &DMatrix<f64>,
        x: &mut DMatrix<f64>,
    ) -> Outcome {
        assert_eq!(b.nrows(), x.nrows());
        assert_eq!(b.ncols(), x.ncols());
        for j in 0..b.ncols() {
            let rhs = b.column(j).into_owned();
            let mut col = x.column(j).into_owned();
            let outcome = self.solve(a, &rhs, &mut col);
            if !outcome.is_converged() {
                return outcome;
            }
            x.set_column(j, &col);
        }
        Outcome::Converged
    }
}
