//! System-matrix storages implementing the capability contract.
//!
//! `DenseMtrx` offers in-place LU factorization and serves direct solves of
//! reduced or small systems; `CsrMtrx` keeps a fixed sparsity profile built
//! from element location arrays and serves the iterative solvers. Both mint
//! a process-unique id and bump a version stamp on every content change, the
//! pair caches compare to detect staleness.

mod csr;
mod dense;

pub use csr::CsrMtrx;
pub use dense::DenseMtrx;
