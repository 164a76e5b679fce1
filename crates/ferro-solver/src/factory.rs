//! Runtime solver creation by configuration key.
//!
//! Three process-wide registries, one per solver family, each a read-only
//! map from key to constructor built on first use. The keys equal the
//! [`crate::method::NumericalMethod::state_kind`] tags, so a checkpoint
//! record names the registry entry that restores it. Constructors hand back
//! defaults; callers reconfigure through the concrete types when the
//! defaults do not fit.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::eigen::{GJacobiSolver, GeneralizedEigenSolver, InverseIteration};
use crate::error::{Result, SolverError};
use crate::linear::{
    DirectSolver, DistributedConfig, DistributedSolver, IterativeConfig, IterativeSolver,
    LinearSolver,
};
use crate::nonlinear::{NonLinearSolver, NrSolver, RelaxationSolver, StaggeredSolver};

type LinearCtor = fn() -> Result<Box<dyn LinearSolver>>;
type EigenCtor = fn() -> Result<Box<dyn GeneralizedEigenSolver>>;
type NonLinearCtor = fn() -> Result<Box<dyn NonLinearSolver>>;

static LINEAR: LazyLock<HashMap<&'static str, LinearCtor>> = LazyLock::new(|| {
    let mut map: HashMap<&'static str, LinearCtor> = HashMap::new();
    map.insert("direct", || Ok(Box::new(DirectSolver::new())));
    map.insert("cg", || {
        Ok(Box::new(IterativeSolver::new(IterativeConfig::cg())))
    });
    map.insert("gmres", || {
        Ok(Box::new(IterativeSolver::new(IterativeConfig::gmres())))
    });
    // Construction performs the backend checks, so an unlinked build
    // surfaces as Err here rather than as a Failed solve later.
    map.insert("distributed", || {
        DistributedSolver::new(DistributedConfig::default())
            .map(|solver| Box::new(solver) as Box<dyn LinearSolver>)
    });
    map
});

static EIGEN: LazyLock<HashMap<&'static str, EigenCtor>> = LazyLock::new(|| {
    let mut map: HashMap<&'static str, EigenCtor> = HashMap::new();
    map.insert("jacobi", || Ok(Box::new(GJacobiSolver::new())));
    map.insert("inverseit", || Ok(Box::new(InverseIteration::new())));
    map
});

static NONLINEAR: LazyLock<HashMap<&'static str, NonLinearCtor>> = LazyLock::new(|| {
    let mut map: HashMap<&'static str, NonLinearCtor> = HashMap::new();
    map.insert("newton", || Ok(Box::new(NrSolver::default())));
    map.insert("staggered", || Ok(Box::new(StaggeredSolver::default())));
    map.insert("relaxation", || Ok(Box::new(RelaxationSolver::default())));
    map
});

pub fn create_linear_solver(key: &str) -> Result<Box<dyn LinearSolver>> {
    match LINEAR.get(key) {
        Some(ctor) => ctor(),
        None => Err(SolverError::UnknownSolver(key.to_string())),
    }
}

pub fn create_eigen_solver(key: &str) -> Result<Box<dyn GeneralizedEigenSolver>> {
    match EIGEN.get(key) {
        Some(ctor) => ctor(),
        None => Err(SolverError::UnknownSolver(key.to_string())),
    }
}

pub fn create_nonlinear_solver(key: &str) -> Result<Box<dyn NonLinearSolver>> {
    match NONLINEAR.get(key) {
        Some(ctor) => ctor(),
        None => Err(SolverError::UnknownSolver(key.to_string())),
    }
}

/// Registered linear-solver keys, sorted.
pub fn linear_solver_keys() -> Vec<&'static str> {
    sorted_keys(&LINEAR)
}

/// Registered eigen-solver keys, sorted.
pub fn eigen_solver_keys() -> Vec<&'static str> {
    sorted_keys(&EIGEN)
}

/// Registered nonlinear-solver keys, sorted.
pub fn nonlinear_solver_keys() -> Vec<&'static str> {
    sorted_keys(&NONLINEAR)
}

fn sorted_keys<V>(map: &HashMap<&'static str, V>) -> Vec<&'static str> {
    let mut keys: Vec<_> = map.keys().copied().collect();
    keys.sort_unstable();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::NumericalMethod;

    #[test]
    fn every_registered_key_matches_its_state_kind() {
        for key in linear_solver_keys() {
            if key == "distributed" {
                continue;
            }
            let solver = create_linear_solver(key).unwrap();
            assert_eq!(solver.state_kind(), key);
        }
        for key in eigen_solver_keys() {
            let solver = create_eigen_solver(key).unwrap();
            assert_eq!(solver.state_kind(), key);
        }
        for key in nonlinear_solver_keys() {
            let solver = create_nonlinear_solver(key).unwrap();
            assert_eq!(solver.state_kind(), key);
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = create_linear_solver("skyline").unwrap_err();
        assert!(matches!(err, SolverError::UnknownSolver(key) if key == "skyline"));
        assert!(create_eigen_solver("lanczos").is_err());
        assert!(create_nonlinear_solver("arclength").is_err());
    }

    #[test]
    fn unlinked_distributed_backend_fails_at_construction() {
        let err = create_linear_solver("distributed").unwrap_err();
        assert!(matches!(err, SolverError::BackendUnavailable(_)));
    }

    #[test]
    fn key_listings_are_sorted_and_complete() {
        assert_eq!(
            linear_solver_keys(),
            vec!["cg", "direct", "distributed", "gmres"]
        );
        assert_eq!(eigen_solver_keys(), vec!["inverseit", "jacobi"]);
        assert_eq!(
            nonlinear_solver_keys(),
            vec!["newton", "relaxation", "staggered"]
        );
    }
}
