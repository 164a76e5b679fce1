//! Pluggable equation-solving framework for structural finite-element
//! analysis.
//!
//! Linear systems, generalized eigenvalue problems and incremental
//! nonlinear systems are solved behind one capability contract: the caller
//! assembles through an [`ferro_model::EquationNumbering`] scheme, hands
//! matrices and vectors to a solver picked from the [`factory`] registries,
//! and receives an [`Outcome`] plus the updated unknowns. Numerical failure
//! is a value of that taxonomy; configuration and contract violations are
//! [`SolverError`]s. Solvers may be checkpointed mid-analysis and restored
//! through [`checkpoint`] streams.

pub mod assembly;
pub mod checkpoint;
pub mod eigen;
pub mod error;
pub mod factory;
pub mod linear;
pub mod matrix;
pub mod method;
pub mod nonlinear;
pub mod outcome;

pub use assembly::{ElementBlock, ElementForces, assemble_matrix_concurrent, assemble_vector_concurrent};
pub use eigen::{EigenPairSet, GJacobiSolver, GeneralizedEigenSolver, InverseIteration};
pub use error::{Result, SolverError};
pub use factory::{create_eigen_solver, create_linear_solver, create_nonlinear_solver};
pub use linear::{
    DirectSolver, DistributedConfig, DistributedSolver, IterativeConfig, IterativeSolver,
    KrylovMethod, LinearSolver, PreconditionerKind,
};
pub use matrix::{CsrMtrx, DenseMtrx};
pub use method::NumericalMethod;
pub use nonlinear::{
    ConvergenceChecker, ConvergenceReport, DampingPolicy, FixedDamping, GroupTolerance,
    IterationRecord, LineSearch, LineSearchConfig, LineSearchStatus, NewtonConfig,
    NonLinearSolver, NrSolver, ReferenceLoadMode, RelaxationConfig, RelaxationSolver,
    StaggeredSolver, StiffnessMode, ToleranceSet,
};
pub use outcome::Outcome;
