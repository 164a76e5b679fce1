//! Analytical validation of the generalized eigenvalue solvers.
//!
//! The fixture is the built-in spring chain: one end fixed, unit masses,
//! springs of stiffness `k`. Its generalized problem `K·x = λ·M·x` has a
//! closed-form spectrum for `n` free nodes:
//!
//!   λ_j = 4k·sin²((2j−1)·π / (2·(2n+1))),   j = 1..n
//!
//! Test cases:
//! 1. Dense simultaneous diagonalization against the closed form
//! 2. Inverse iteration against the closed form
//! 3. Mass orthonormality of the returned vectors
//! 4. Stiffness reconstruction K ≈ M·X·diag(λ)·Xᵗ·M
//! 5. Registry-created solvers driving the same assembled pair

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};

use ferro_model::{
    DefaultNumbering, EngineeringModel, MatrixAssembler, SparseMtrx, SpringChain, TimeStep,
};
use ferro_solver::eigen::EigenPairSet;
use ferro_solver::factory::create_eigen_solver;
use ferro_solver::matrix::DenseMtrx;
use ferro_solver::{GJacobiSolver, GeneralizedEigenSolver, InverseIteration, Outcome};

/// Stiffness and mass of the chain, assembled through the default
/// numbering like any other model matrix.
fn assembled_pair(n: usize, k: f64) -> (DenseMtrx, DenseMtrx) {
    let chain = SpringChain::uniform(n, k);
    let numbering = DefaultNumbering::from_domain(chain.domain(0));
    let step = TimeStep::new(1, 0.0);

    let mut stiffness = DenseMtrx::new(n, n);
    chain
        .assemble_matrix(
            &mut stiffness,
            &step,
            MatrixAssembler::TangentStiffness,
            &numbering,
            0,
        )
        .expect("stiffness assembly should succeed");

    let mut mass = DenseMtrx::new(n, n);
    chain
        .assemble_matrix(&mut mass, &step, MatrixAssembler::Mass, &numbering, 0)
        .expect("mass assembly should succeed");

    (stiffness, mass)
}

/// Closed-form mode `j` (1-based) of the fixed-free chain.
fn chain_mode(n: usize, k: f64, j: usize) -> f64 {
    let arg = (2 * j - 1) as f64 * PI / (2.0 * (2 * n + 1) as f64);
    4.0 * k * arg.sin().powi(2)
}

#[test]
fn dense_sweep_recovers_the_chain_spectrum() {
    let n = 3;
    let k = 100.0;
    let (mut stiffness, mut mass) = assembled_pair(n, k);
    let mut vals = DVector::zeros(0);
    let mut vecs = DMatrix::zeros(0, 0);

    let outcome = GJacobiSolver::new().solve(&mut stiffness, &mut mass, &mut vals, &mut vecs, 1e-12, n);
    assert_eq!(outcome, Outcome::Converged);

    for j in 0..n {
        let expected = chain_mode(n, k, j + 1);
        assert!(
            (vals[j] - expected).abs() < 1e-8 * expected,
            "mode {}: got {} expected {expected}",
            j + 1,
            vals[j]
        );
    }
    assert!(vals[0] <= vals[1] && vals[1] <= vals[2]);

    // each returned pair balances K·x = λ·M·x
    for j in 0..n {
        let x = vecs.column(j).into_owned();
        let residual = stiffness.times(&x) - mass.times(&x) * vals[j];
        assert!(
            residual.norm() < 1e-6 * k,
            "mode {} residual {}",
            j + 1,
            residual.norm()
        );
    }
}

#[test]
fn inverse_iteration_matches_the_lowest_modes() {
    let n = 6;
    let k = 100.0;
    let (mut stiffness, mut mass) = assembled_pair(n, k);
    let mut vals = DVector::zeros(0);
    let mut vecs = DMatrix::zeros(0, 0);

    let outcome =
        InverseIteration::new().solve(&mut stiffness, &mut mass, &mut vals, &mut vecs, 1e-9, 2);
    assert_eq!(outcome, Outcome::Converged);

    for j in 0..2 {
        let expected = chain_mode(n, k, j + 1);
        assert!(
            (vals[j] - expected).abs() < 1e-6 * expected,
            "mode {}: got {} expected {expected}",
            j + 1,
            vals[j]
        );
    }
}

#[test]
fn eigenvectors_are_mass_orthonormal_across_solvers() {
    let (mut stiffness, mut mass) = assembled_pair(4, 250.0);
    let mut vals = DVector::zeros(0);
    let mut vecs = DMatrix::zeros(0, 0);

    let outcome = GJacobiSolver::new().solve(&mut stiffness, &mut mass, &mut vals, &mut vecs, 1e-12, 4);
    assert_eq!(outcome, Outcome::Converged);
    let dense_pairs = EigenPairSet::new(vals, vecs);
    assert!(dense_pairs.orthonormality_error(&mass) < 1e-8);

    let mut vals = DVector::zeros(0);
    let mut vecs = DMatrix::zeros(0, 0);
    let outcome =
        InverseIteration::new().solve(&mut stiffness, &mut mass, &mut vals, &mut vecs, 1e-9, 2);
    assert_eq!(outcome, Outcome::Converged);
    let sparse_pairs = EigenPairSet::new(vals, vecs);
    assert!(sparse_pairs.orthonormality_error(&mass) < 1e-6);
}

#[test]
fn stiffness_reconstructs_from_the_full_spectrum() {
    let n = 3;
    let (mut stiffness, mut mass) = assembled_pair(n, 80.0);
    let mut vals = DVector::zeros(0);
    let mut vecs = DMatrix::zeros(0, 0);

    let outcome = GJacobiSolver::new().solve(&mut stiffness, &mut mass, &mut vals, &mut vecs, 1e-12, n);
    assert_eq!(outcome, Outcome::Converged);

    let m = mass.as_dmatrix();
    let rebuilt = m * &vecs * DMatrix::from_diagonal(&vals) * vecs.transpose() * m;
    let error = (&rebuilt - stiffness.as_dmatrix()).abs().max();
    let scale = stiffness.as_dmatrix().abs().max();
    assert!(error < 1e-8 * scale, "reconstruction error {error}");
}

#[test]
fn registry_solvers_handle_the_chain_pair() {
    for key in ["jacobi", "inverseit"] {
        let mut solver = create_eigen_solver(key).expect("registered key");
        let (mut stiffness, mut mass) = assembled_pair(5, 100.0);
        let mut vals = DVector::zeros(0);
        let mut vecs = DMatrix::zeros(0, 0);

        let outcome = solver.solve(&mut stiffness, &mut mass, &mut vals, &mut vecs, 1e-10, 1);
        assert_eq!(outcome, Outcome::Converged, "{key} should converge");

        let expected = chain_mode(5, 100.0, 1);
        assert!(
            (vals[0] - expected).abs() < 1e-6 * expected,
            "{key}: got {} expected {expected}",
            vals[0]
        );
    }
}
