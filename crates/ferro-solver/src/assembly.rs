//! Concurrent element-loop assembly.
//!
//! Per-element computation is read-only and runs lock-free across the
//! thread pool. The caller owns the lock wrapping the destination; the
//! guard is acquired only around the accumulation of one element's
//! contribution, never around the element computation itself.

use std::sync::Mutex;

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use ferro_model::matrix::SparseMtrx;

/// Location array plus dense block produced by one element.
pub struct ElementBlock {
    pub loc: Vec<usize>,
    pub block: DMatrix<f64>,
}

/// Location array plus local force values produced by one element.
pub struct ElementForces {
    pub loc: Vec<usize>,
    pub values: Vec<f64>,
}

/// Assemble element blocks into a shared matrix across the thread pool.
///
/// `dest` is the externally owned lock handle; `compute` maps an element to
/// its contribution and must be free of shared mutation.
pub fn assemble_matrix_concurrent<E, F>(
    dest: &Mutex<&mut dyn SparseMtrx>,
    elements: &[E],
    compute: F,
) where
    E: Sync,
    F: Fn(&E) -> ElementBlock + Sync,
{
    elements.par_iter().for_each(|element| {
        let contribution = compute(element);
        let mut guard = dest.lock().unwrap();
        guard.assemble(&contribution.loc, &contribution.block);
    });
}

/// Assemble element force contributions into a shared vector across the
/// thread pool. Location entries are 1-based, 0 skipped.
pub fn assemble_vector_concurrent<E, F>(
    dest: &Mutex<&mut DVector<f64>>,
    elements: &[E],
    compute: F,
) where
    E: Sync,
    F: Fn(&E) -> ElementForces + Sync,
{
    elements.par_iter().for_each(|element| {
        let contribution = compute(element);
        let mut guard = dest.lock().unwrap();
        for (k, &n) in contribution.loc.iter().enumerate() {
            if n > 0 {
                guard[n - 1] += contribution.values[k];
            }
        }
    });
}
