//! Distributed direct solver bound to an external library.
//!
//! Covers vendor packages of the MUMPS / SuperLU_DIST family that run a
//! parallel sparse factorization out of process. The binding exchanges the
//! matrix as compressed-row triplets, so the solver insists on
//! [`MatrixKind::Csr`] storage up front; wiring it to dense storage is a
//! configuration error, not something to retry at solve time.

use nalgebra::DVector;

use ferro_model::matrix::{MatrixKind, SparseMtrx};

use crate::error::{Result, SolverError};
use crate::linear::LinearSolver;
use crate::method::NumericalMethod;
use crate::outcome::Outcome;

/// Settings for the external binding.
#[derive(Debug, Clone)]
pub struct DistributedConfig {
    /// Storage kind the caller intends to assemble into.
    pub storage: MatrixKind,
    /// Worker processes the external factorization may use.
    pub processes: usize,
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            storage: DistributedSolver::REQUIRED_STORAGE,
            processes: 1,
        }
    }
}

impl DistributedConfig {
    /// Reject storage kinds the external library cannot ingest.
    pub fn validate(&self) -> Result<()> {
        if self.storage != DistributedSolver::REQUIRED_STORAGE {
            return Err(SolverError::StorageMismatch {
                expected: DistributedSolver::REQUIRED_STORAGE,
                got: self.storage,
            });
        }
        Ok(())
    }
}

/// Direct solver delegating factorization to an external distributed
/// library.
#[derive(Debug)]
pub struct DistributedSolver {
    domain_index: usize,
    config: DistributedConfig,
}

impl DistributedSolver {
    pub const REQUIRED_STORAGE: MatrixKind = MatrixKind::Csr;

    /// Validate the configuration and attach to the external runtime.
    ///
    /// The binding is not linked into this build, so after configuration
    /// checks this reports the backend as unavailable. A linked build
    /// would initialize the library's communicator here.
    pub fn new(config: DistributedConfig) -> Result<Self> {
        config.validate()?;
        Err(SolverError::BackendUnavailable(
            "distributed direct solver is not linked into this build; use the direct or iterative solvers".to_string(),
        ))
    }
}

impl NumericalMethod for DistributedSolver {
    fn state_kind(&self) -> &'static str {
        "distributed"
    }

    fn set_domain(&mut self, domain_index: usize) {
        self.domain_index = domain_index;
    }

    fn domain_index(&self) -> usize {
        self.domain_index
    }
}

impl LinearSolver for DistributedSolver {
    fn solve(
        &mut self,
        a: &mut dyn SparseMtrx,
        b: &DVector<f64>,
        x: &mut DVector<f64>,
    ) -> Outcome {
        assert_eq!(a.n_rows(), b.len());
        assert_eq!(b.len(), x.len());
        if a.kind() != self.config.storage {
            return Outcome::Failed;
        }

        // External solve workflow:
        //
        // 1. Export the matrix:
        //    let triplets = a.to_triplets();
        //    distribute row blocks over self.config.processes workers
        //
        // 2. Analyze + factorize (symbolic reordering, numeric LU)
        //
        // 3. Back-substitute b on the root process and gather into x
        Outcome::Failed
    }

    fn recommended_storage(&self, _symmetric: bool) -> MatrixKind {
        Self::REQUIRED_STORAGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_storage_is_a_configuration_error() {
        let config = DistributedConfig {
            storage: MatrixKind::Dense,
            ..DistributedConfig::default()
        };
        let err = DistributedSolver::new(config).unwrap_err();
        assert!(matches!(
            err,
            SolverError::StorageMismatch {
                expected: MatrixKind::Csr,
                got: MatrixKind::Dense,
            }
        ));
    }

    #[test]
    fn valid_config_reports_missing_backend() {
        let err = DistributedSolver::new(DistributedConfig::default()).unwrap_err();
        assert!(matches!(err, SolverError::BackendUnavailable(_)));
    }
}
