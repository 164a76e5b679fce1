//! End-to-end validation of the incremental nonlinear solvers.
//!
//! All fixtures are built-in spring chains with closed-form equilibria, so
//! every assertion compares against hand-derived values.
//!
//! Test cases:
//! 1. Linear chain under every tangent rebuild policy
//! 2. Cubic hardening spring with an exact analytical root
//! 3. Line-search refinement of the hardening solve
//! 4. Direct displacement control with reaction recovery
//! 5. Staggered two-field solve against the monolithic answer
//! 6. Dynamic relaxation against the Newton answer
//! 7. Balanced entry and exhausted iteration budgets

use nalgebra::DVector;

use ferro_model::{SpringChain, TimeStep};
use ferro_solver::factory::create_nonlinear_solver;
use ferro_solver::matrix::DenseMtrx;
use ferro_solver::{
    IterationRecord, LineSearchConfig, NewtonConfig, NonLinearSolver, NrSolver, Outcome,
    ReferenceLoadMode, RelaxationConfig, RelaxationSolver, StaggeredSolver, StiffnessMode,
};

/// Drive one increment from the starting solution `start` under the total
/// reference load `loads`.
fn run(
    solver: &mut dyn NonLinearSolver,
    chain: &mut SpringChain,
    loads: &[f64],
    groups: usize,
    start: &[f64],
) -> (Outcome, IterationRecord, DVector<f64>, DVector<f64>) {
    let neq = loads.len();
    let mut k = DenseMtrx::new(neq, neq);
    let r = DVector::from_column_slice(loads);
    let mut x = DVector::from_column_slice(start);
    let mut dx = DVector::zeros(neq);
    let mut f = DVector::zeros(neq);
    let norms = DVector::zeros(groups);
    let mut level = 1.0;
    let step = TimeStep::new(1, 1.0);

    let (outcome, record) = solver
        .solve(
            chain,
            &mut k,
            &r,
            None,
            &mut x,
            &mut dx,
            &mut f,
            &norms,
            &mut level,
            ReferenceLoadMode::Total,
            &step,
        )
        .expect("solve should not hit a contract error");
    (outcome, record, x, dx)
}

/// A tip load `F` on a uniform chain of stiffness `k` puts the same force
/// through every spring, so node `j` settles at `j·F/k`. One correction
/// lands the answer and one more confirms stagnation, whatever the rebuild
/// policy.
#[test]
fn linear_chain_settles_under_every_rebuild_policy() {
    for mode in [
        StiffnessMode::Full,
        StiffnessMode::Modified,
        StiffnessMode::Accelerated,
    ] {
        let mut chain = SpringChain::uniform(3, 100.0);
        let mut solver = NrSolver::new(NewtonConfig {
            stiffness_mode: mode,
            ..NewtonConfig::default()
        });
        let (outcome, record, x, dx) =
            run(&mut solver, &mut chain, &[0.0, 0.0, 10.0], 1, &[0.0; 3]);

        assert_eq!(outcome, Outcome::Converged, "{mode:?} should converge");
        assert_eq!(record.iterations, 2, "{mode:?} took {} corrections", record.iterations);
        for (j, expected) in [0.1, 0.2, 0.3].iter().enumerate() {
            assert!(
                (x[j] - expected).abs() < 1e-9,
                "{mode:?} node {j}: got {} expected {expected}",
                x[j]
            );
            assert!((dx[j] - expected).abs() < 1e-9);
        }
    }
}

/// The registry's "newton" entry behaves like a hand-built default solver.
#[test]
fn registry_newton_solves_the_linear_chain() {
    let mut solver = create_nonlinear_solver("newton").expect("registered key");
    let mut chain = SpringChain::uniform(3, 100.0);
    let (outcome, _, x, _) = run(solver.as_mut(), &mut chain, &[0.0, 0.0, 10.0], 1, &[0.0; 3]);

    assert_eq!(outcome, Outcome::Converged);
    assert!((x[2] - 0.3).abs() < 1e-9, "tip displacement {}", x[2]);
}

/// A single hardening spring carries `f(x) = k·x + h·x³`. With `k = h = 10`
/// and a load of 20, the balance `10x + 10x³ = 20` factors as
/// `(x − 1)(x² + x + 2) = 0`, so the only real root is exactly `x = 1`.
#[test]
fn hardening_spring_finds_the_exact_root() {
    let mut chain = SpringChain::hardening(1, 10.0, 10.0);
    let mut solver = NrSolver::default();
    let (outcome, record, x, _) = run(&mut solver, &mut chain, &[20.0], 1, &[0.0]);

    assert_eq!(outcome, Outcome::Converged);
    assert!((x[0] - 1.0).abs() < 1e-8, "root {} after {} iterations", x[0], record.iterations);
    assert!(record.iterations >= 3, "a cubic needs several corrections");
}

/// The first full correction of the hardening solve overshoots badly
/// (`f(2) = 100` against a load of 20), which is exactly the case the line
/// search tempers. The refined solve still reaches the root and the last
/// accepted step stays inside the configured bracket.
#[test]
fn line_search_tempers_the_hardening_overshoot() {
    let config = LineSearchConfig::default();
    let eta_max = config.eta_max;
    let mut chain = SpringChain::hardening(1, 10.0, 10.0);
    let mut solver = NrSolver::new(NewtonConfig {
        line_search: Some(config),
        ..NewtonConfig::default()
    });
    let (outcome, record, x, _) = run(&mut solver, &mut chain, &[20.0], 1, &[0.0]);

    assert_eq!(outcome, Outcome::Converged);
    assert!((x[0] - 1.0).abs() < 1e-8, "root {}", x[0]);
    assert!(
        record.step_length > 0.0 && record.step_length <= eta_max,
        "step length {} outside the bracket",
        record.step_length
    );
}

/// Prescribing `x₂ = 0.5` on a two-spring chain with no applied load forces
/// the free node to the midpoint `x₁ = 0.25`, and the reaction needed at the
/// controlled node is the spring force `k·(x₂ − x₁) = 25`.
#[test]
fn displacement_control_recovers_the_reaction() {
    let mut chain = SpringChain::uniform(2, 100.0);
    chain.set_control_target(2, 0.5);
    let mut solver = NrSolver::default();
    let (outcome, _, x, _) = run(&mut solver, &mut chain, &[0.0, 0.0], 1, &[0.0; 2]);

    assert_eq!(outcome, Outcome::Converged);
    assert!((x[0] - 0.25).abs() < 1e-6, "free node at {}", x[0]);
    assert!((x[1] - 0.5).abs() < 1e-6, "controlled node at {}", x[1]);

    let reactions = solver.last_reactions();
    assert_eq!(reactions.len(), 1);
    assert_eq!(reactions[0].0, 1, "reaction at the controlled equation");
    assert!(
        (reactions[0].1 - 25.0).abs() < 1e-4,
        "reaction {} expected 25",
        reactions[0].1
    );
}

/// The two-field chain couples a mechanical and a thermal strand. Solving
/// the fields one group at a time must land on the same answer as the
/// monolithic Newton solve of the full system.
#[test]
fn staggered_solve_matches_the_monolithic_answer() {
    let loads = [0.0, 0.0, 10.0, 0.0, 0.0, 5.0];

    let mut mono_chain = SpringChain::two_field(3, 100.0, 50.0, 5.0);
    let mut monolithic = NrSolver::default();
    let (outcome, _, x_mono, _) =
        run(&mut monolithic, &mut mono_chain, &loads, 2, &[0.0; 6]);
    assert_eq!(outcome, Outcome::Converged);

    let mut stag_chain = SpringChain::two_field(3, 100.0, 50.0, 5.0);
    let mut staggered = StaggeredSolver::default();
    let (outcome, record, x_stag, _) =
        run(&mut staggered, &mut stag_chain, &loads, 2, &[0.0; 6]);
    assert_eq!(outcome, Outcome::Converged);
    assert!(record.iterations >= 1);

    for eq in 0..6 {
        assert!(
            (x_mono[eq] - x_stag[eq]).abs() < 1e-8,
            "equation {eq}: monolithic {} staggered {}",
            x_mono[eq],
            x_stag[eq]
        );
    }
}

/// Explicit pseudo-time marching reaches the same static equilibrium as the
/// tangent-based solve, just less precisely.
#[test]
fn dynamic_relaxation_agrees_with_newton() {
    let loads = [0.0, 10.0];

    let mut newton_chain = SpringChain::uniform(2, 100.0);
    let mut newton = NrSolver::default();
    let (outcome, _, x_newton, _) =
        run(&mut newton, &mut newton_chain, &loads, 1, &[0.0; 2]);
    assert_eq!(outcome, Outcome::Converged);

    let mut relax_chain = SpringChain::uniform(2, 100.0);
    let mut relaxation = RelaxationSolver::new(RelaxationConfig {
        density: 1.0,
        lame_lambda: 40.0,
        lame_mu: 40.0,
        max_iterations: 1500,
        ..RelaxationConfig::default()
    });
    let (outcome, record, x_relax, _) =
        run(&mut relaxation, &mut relax_chain, &loads, 1, &[0.0; 2]);
    assert_eq!(outcome, Outcome::Converged);
    assert!(record.iterations > 10, "marching takes many sub-steps");

    for eq in 0..2 {
        assert!(
            (x_newton[eq] - x_relax[eq]).abs() < 2e-4,
            "equation {eq}: newton {} relaxation {}",
            x_newton[eq],
            x_relax[eq]
        );
    }
}

/// A solution already in balance passes the entry check and returns without
/// spending a correction.
#[test]
fn balanced_entry_returns_immediately() {
    let mut chain = SpringChain::uniform(1, 50.0);
    let mut solver = NrSolver::default();
    let (outcome, record, x, dx) = run(&mut solver, &mut chain, &[5.0], 1, &[0.1]);

    assert_eq!(outcome, Outcome::Converged);
    assert_eq!(record.iterations, 0);
    assert!((x[0] - 0.1).abs() < 1e-15);
    assert_eq!(dx[0], 0.0);
}

/// Starving the solver of iterations reports the budget as exhausted while
/// keeping the best iterate.
#[test]
fn exhausted_budget_reports_divergence() {
    let mut chain = SpringChain::hardening(1, 10.0, 10.0);
    let mut solver = NrSolver::new(NewtonConfig {
        max_iterations: 2,
        ..NewtonConfig::default()
    });
    let (outcome, record, x, _) = run(&mut solver, &mut chain, &[20.0], 1, &[0.0]);

    assert_eq!(outcome, Outcome::DivergedIterations);
    assert_eq!(record.iterations, 2);
    assert!(x[0] != 0.0, "the last iterate survives");
}
