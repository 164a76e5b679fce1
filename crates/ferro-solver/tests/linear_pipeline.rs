//! The assembled-matrix linear solve pipeline, storage choice included.
//!
//! A tip load `F` on a uniform chain of `n` springs with stiffness `k`
//! stretches every spring by `F/k`, so node `j` (1-based) sits at `j·F/k`.
//!
//! Test cases:
//! 1. Every registry solver resolves the chain through its recommended storage
//! 2. The direct solver declines sparse storage instead of panicking
//! 3. Several right-hand sides reuse one factorization
//! 4. Reassembly triggers exactly one preconditioner rebuild

use nalgebra::{DMatrix, DVector};

use ferro_model::{
    DefaultNumbering, EngineeringModel, MatrixAssembler, MatrixKind, SparseMtrx, SpringChain,
    TimeStep,
};
use ferro_solver::factory::create_linear_solver;
use ferro_solver::linear::{
    DirectSolver, IterativeConfig, IterativeSolver, LinearSolver, PreconditionerKind,
};
use ferro_solver::matrix::{CsrMtrx, DenseMtrx};
use ferro_solver::Outcome;

const N: usize = 4;
const K: f64 = 200.0;
const TIP_LOAD: f64 = 10.0;

fn empty_storage(kind: MatrixKind, chain: &SpringChain, numbering: &DefaultNumbering) -> Box<dyn SparseMtrx> {
    match kind {
        MatrixKind::Dense => Box::new(DenseMtrx::new(N, N)),
        MatrixKind::Csr => {
            let mut m = CsrMtrx::new(0, 0);
            m.build_internal_structure(chain, 0, numbering);
            Box::new(m)
        }
    }
}

fn assemble_stiffness(m: &mut dyn SparseMtrx, chain: &SpringChain, numbering: &DefaultNumbering) {
    let step = TimeStep::new(1, 0.0);
    chain
        .assemble_matrix(m, &step, MatrixAssembler::TangentStiffness, numbering, 0)
        .expect("stiffness assembly should succeed");
}

fn tip_load() -> DVector<f64> {
    let mut b = DVector::zeros(N);
    b[N - 1] = TIP_LOAD;
    b
}

#[test]
fn registry_solvers_resolve_a_tip_loaded_chain() {
    for key in ["cg", "direct", "gmres"] {
        let mut solver = create_linear_solver(key).expect("registered key");
        let chain = SpringChain::uniform(N, K);
        let numbering = DefaultNumbering::from_domain(chain.domain(0));

        let mut matrix = empty_storage(solver.recommended_storage(true), &chain, &numbering);
        assemble_stiffness(matrix.as_mut(), &chain, &numbering);

        let b = tip_load();
        let mut x = DVector::zeros(N);
        let outcome = solver.solve(matrix.as_mut(), &b, &mut x);
        assert_eq!(outcome, Outcome::Converged, "{key} should converge");

        for j in 0..N {
            let expected = (j + 1) as f64 * TIP_LOAD / K;
            assert!(
                (x[j] - expected).abs() < 1e-6,
                "{key} node {j}: got {} expected {expected}",
                x[j]
            );
        }
    }
}

#[test]
fn direct_solver_declines_sparse_storage() {
    let chain = SpringChain::uniform(N, K);
    let numbering = DefaultNumbering::from_domain(chain.domain(0));
    let mut matrix = CsrMtrx::new(0, 0);
    matrix.build_internal_structure(&chain, 0, &numbering);
    assemble_stiffness(&mut matrix, &chain, &numbering);

    let mut solver = DirectSolver::new();
    let b = tip_load();
    let mut x = DVector::zeros(N);
    assert_eq!(solver.solve(&mut matrix, &b, &mut x), Outcome::Failed);
}

#[test]
fn several_right_hand_sides_reuse_one_factorization() {
    let chain = SpringChain::uniform(N, K);
    let numbering = DefaultNumbering::from_domain(chain.domain(0));
    let mut matrix = DenseMtrx::new(N, N);
    assemble_stiffness(&mut matrix, &chain, &numbering);

    let mut b = DMatrix::zeros(N, 2);
    b[(N - 1, 0)] = TIP_LOAD;
    b[(N - 1, 1)] = 2.0 * TIP_LOAD;
    let mut x = DMatrix::zeros(N, 2);

    let mut solver = DirectSolver::new();
    let outcome = solver.solve_multiple(&mut matrix, &b, &mut x);
    assert_eq!(outcome, Outcome::Converged);

    for j in 0..N {
        let expected = (j + 1) as f64 * TIP_LOAD / K;
        assert!((x[(j, 0)] - expected).abs() < 1e-9, "column 0 node {j}");
        assert!((x[(j, 1)] - 2.0 * expected).abs() < 1e-9, "column 1 node {j}");
    }
}

#[test]
fn reassembly_triggers_exactly_one_preconditioner_rebuild() {
    let chain = SpringChain::uniform(N, K);
    let numbering = DefaultNumbering::from_domain(chain.domain(0));
    let mut matrix = CsrMtrx::new(0, 0);
    matrix.build_internal_structure(&chain, 0, &numbering);
    assemble_stiffness(&mut matrix, &chain, &numbering);

    let mut solver = IterativeSolver::new(IterativeConfig {
        preconditioner: PreconditionerKind::Ilu,
        ..IterativeConfig::cg()
    });
    let b = tip_load();

    let mut x = DVector::zeros(N);
    assert_eq!(solver.solve(&mut matrix, &b, &mut x), Outcome::Converged);
    assert_eq!(solver.preconditioner_rebuilds(), 1);

    // same matrix content, same stamp: the cached factors are reused
    let mut x = DVector::zeros(N);
    assert_eq!(solver.solve(&mut matrix, &b, &mut x), Outcome::Converged);
    assert_eq!(solver.preconditioner_rebuilds(), 1);

    matrix.zero();
    assemble_stiffness(&mut matrix, &chain, &numbering);
    let mut x = DVector::zeros(N);
    assert_eq!(solver.solve(&mut matrix, &b, &mut x), Outcome::Converged);
    assert_eq!(solver.preconditioner_rebuilds(), 2);
}
