//! The engineering-model contract: what solvers ask of the surrounding
//! analysis code.
//!
//! A model owns domains, assembles characteristic vectors/matrices through a
//! numbering scheme, and recomputes state-dependent components (internal
//! forces, tangent stiffness) when a solver hands it an updated solution.

use nalgebra::DVector;
use thiserror::Error;

use crate::domain::Domain;
use crate::matrix::SparseMtrx;
use crate::numbering::EquationNumbering;
use crate::parallel::ParallelContext;

/// One solution step: external number plus target and intrinsic times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStep {
    pub number: u32,
    pub target_time: f64,
    pub intrinsic_time: f64,
}

impl TimeStep {
    pub fn new(number: u32, target_time: f64) -> Self {
        Self {
            number,
            target_time,
            intrinsic_time: target_time,
        }
    }
}

/// Whether an assembled quantity is a total value or this step's increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueMode {
    Total,
    Incremental,
}

/// Characteristic vectors a model can assemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorAssembler {
    /// Internal (resisting) nodal forces for the current solution.
    InternalForces,
    /// External reference loads.
    ExternalLoads,
    /// Row-sum lumped mass.
    LumpedMass,
}

/// Characteristic matrices a model can assemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixAssembler {
    /// Current linearization of the internal forces.
    TangentStiffness,
    /// Consistent mass.
    Mass,
}

/// State-dependent components a solver asks the model to refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    /// Internal forces must reflect the handed solution.
    InternalRhs,
    /// The tangent must reflect the handed solution.
    NonLinearLhs,
}

/// Contract failures on the model side of the boundary.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("domain {0} does not exist")]
    NoSuchDomain(usize),

    #[error("model does not provide the {0} assembler")]
    UnsupportedAssembler(&'static str),
}

/// The analysis code driving (and driven by) the solver framework.
///
/// Solvers never store model references; the model is passed into each solve
/// call, and a solver stays bound to one domain index between explicit
/// rebinds.
pub trait EngineeringModel: Send + Sync {
    fn n_domains(&self) -> usize {
        1
    }

    fn domain(&self, domain_index: usize) -> &Domain;

    /// Refresh a state-dependent component for the given total solution.
    fn update_component(&mut self, step: &TimeStep, kind: ComponentKind, x: &DVector<f64>);

    /// Assemble a characteristic vector into `dest`, which the caller sizes
    /// by `numbering.required_count()`.
    fn assemble_vector(
        &self,
        dest: &mut DVector<f64>,
        step: &TimeStep,
        assembler: VectorAssembler,
        mode: ValueMode,
        numbering: &dyn EquationNumbering,
        domain_index: usize,
    ) -> Result<(), ModelError>;

    /// Assemble a characteristic matrix into `dest`.
    fn assemble_matrix(
        &self,
        dest: &mut dyn SparseMtrx,
        step: &TimeStep,
        assembler: MatrixAssembler,
        numbering: &dyn EquationNumbering,
        domain_index: usize,
    ) -> Result<(), ModelError>;

    /// Partition context of one domain (serial contexts for single-process
    /// runs).
    fn parallel_context(&self, domain_index: usize) -> &ParallelContext;
}
