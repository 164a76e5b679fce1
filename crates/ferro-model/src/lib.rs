//! Boundary contracts between an engineering model and the solver framework.
//!
//! This crate holds everything a solver needs to know about the surrounding
//! analysis code, and nothing more: DOFs with stored equation numbers,
//! domains with element topology, the interchangeable equation-numbering
//! schemes, the sparse-matrix capability contract, the engineering-model
//! trait, and the partition context for distributed runs. A small
//! spring-chain model ships for tests and examples.

pub mod dof;
pub mod domain;
pub mod matrix;
pub mod model;
pub mod numbering;
pub mod parallel;
pub mod sample;

pub use dof::{Dof, DofId, DofManager};
pub use domain::{Domain, Element};
pub use matrix::{MatrixKind, SparseMtrx, SparseTriplets, next_matrix_id};
pub use model::{
    ComponentKind, EngineeringModel, MatrixAssembler, ModelError, TimeStep, ValueMode,
    VectorAssembler,
};
pub use numbering::{
    DefaultNumbering, DofGroupNumbering, EquationNumbering, FilteredNumbering,
    PrescribedNumbering, SelectiveNumbering, active_index,
};
pub use parallel::{ChannelComm, ParallelContext, PartitionComm, SerialComm};
pub use sample::SpringChain;
