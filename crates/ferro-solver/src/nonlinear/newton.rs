//! Newton-Raphson solver for one load/time increment.
//!
//! Balances `F(X) = λ·R + R0` by repeated tangent corrections. The tangent
//! may be rebuilt every iteration, once per increment, or every few
//! iterations; corrections can be refined by a line search and damped by a
//! pluggable policy. Equations under direct displacement control are handled
//! with the Payne-Irons big-number substitution: an outsized value on the
//! diagonal and `penalty·(target − X)` on the right-hand side keep the system
//! symmetric without renumbering, and the residual at those equations (the
//! unknown reaction) is kept out of the convergence norms.

use std::io::{Read, Write};

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use ferro_model::matrix::SparseMtrx;
use ferro_model::model::{ComponentKind, EngineeringModel, MatrixAssembler, TimeStep};
use ferro_model::numbering::DefaultNumbering;

use crate::checkpoint;
use crate::error::Result;
use crate::linear::{DirectSolver, LinearSolver};
use crate::method::NumericalMethod;
use crate::nonlinear::{
    ConvergenceChecker, ConvergenceReport, IterationRecord, LineSearch, LineSearchConfig,
    NonLinearSolver, ReferenceLoadMode, SCALE_FLOOR, StiffnessMode, ToleranceSet,
    refresh_internal_forces, scaling_load, total_load,
};
use crate::outcome::Outcome;

/// Settings of [`NrSolver`].
#[derive(Debug, Clone)]
pub struct NewtonConfig {
    pub max_iterations: usize,
    /// Corrections forced even after the groups pass tolerance.
    pub min_iterations: usize,
    pub stiffness_mode: StiffnessMode,
    /// Iterations between rebuilds in [`StiffnessMode::Accelerated`].
    pub accelerated_refresh: usize,
    /// Build the tangent before the first residual evaluation.
    pub calc_stiff_before_res: bool,
    /// Scale of the displacement-control penalty, multiplied by the largest
    /// tangent diagonal magnitude.
    pub penalty_multiplier: f64,
    pub tolerances: ToleranceSet,
    /// Scaled-error ceiling; beyond it the increment is abandoned.
    pub out_of_range: f64,
    /// Line search applied to each correction when set.
    pub line_search: Option<LineSearchConfig>,
    /// Print a summary line per iteration.
    pub verbose: bool,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            min_iterations: 0,
            stiffness_mode: StiffnessMode::Full,
            accelerated_refresh: 5,
            calc_stiff_before_res: false,
            penalty_multiplier: 1e8,
            tolerances: ToleranceSet::default(),
            out_of_range: 1e20,
            line_search: None,
            verbose: false,
        }
    }
}

/// Caller-supplied damping of Newton corrections.
///
/// Invoked once per iteration after the linear solve (and after any line
/// search); the returned factor scales the correction.
pub trait DampingPolicy: Send {
    fn factor(&mut self, nite: usize, report: &ConvergenceReport) -> f64;
}

/// Constant damping engaged from a given iteration on.
#[derive(Debug, Clone, Copy)]
pub struct FixedDamping {
    pub alpha: f64,
    pub after_iteration: usize,
}

impl DampingPolicy for FixedDamping {
    fn factor(&mut self, nite: usize, _report: &ConvergenceReport) -> f64 {
        if nite >= self.after_iteration {
            self.alpha
        } else {
            1.0
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct NewtonState {
    step_length: f64,
}

/// Newton-Raphson incremental solver.
pub struct NrSolver {
    pub config: NewtonConfig,
    linear: Box<dyn LinearSolver>,
    damping: Option<Box<dyn DampingPolicy>>,
    domain_index: usize,
    step_length: f64,
    /// Reactions `(equation, force)` recovered at controlled equations by the
    /// last converged solve.
    last_reactions: Vec<(usize, f64)>,
    /// Penalty magnitude baked into the bound tangent, with the matrix stamp
    /// it belongs to.
    penalty: f64,
    penalty_stamp: Option<(u64, u64)>,
}

impl Default for NrSolver {
    fn default() -> Self {
        Self::new(NewtonConfig::default())
    }
}

impl NrSolver {
    pub fn new(config: NewtonConfig) -> Self {
        Self {
            config,
            linear: Box::new(DirectSolver::new()),
            damping: None,
            domain_index: 0,
            step_length: 1.0,
            last_reactions: Vec::new(),
            penalty: 0.0,
            penalty_stamp: None,
        }
    }

    /// Replace the inner linear solver.
    pub fn with_linear_solver(mut self, linear: Box<dyn LinearSolver>) -> Self {
        self.linear = linear;
        self
    }

    pub fn set_damping_policy(&mut self, policy: Box<dyn DampingPolicy>) {
        self.damping = Some(policy);
    }

    /// Reactions at displacement-controlled equations after the last
    /// converged solve.
    pub fn last_reactions(&self) -> &[(usize, f64)] {
        &self.last_reactions
    }

    fn rebuild_tangent(
        &mut self,
        model: &mut dyn EngineeringModel,
        k: &mut dyn SparseMtrx,
        x: &DVector<f64>,
        numbering: &DefaultNumbering,
        step: &TimeStep,
        controlled: &[(usize, f64)],
    ) -> Result<()> {
        model.update_component(step, ComponentKind::NonLinearLhs, x);
        k.zero();
        model.assemble_matrix(
            k,
            step,
            MatrixAssembler::TangentStiffness,
            numbering,
            self.domain_index,
        )?;
        self.apply_control_penalty(k, controlled);
        Ok(())
    }

    /// Add the Payne-Irons big number to controlled diagonals, unless the
    /// matrix stamp shows the current content already carries it.
    fn apply_control_penalty(&mut self, k: &mut dyn SparseMtrx, controlled: &[(usize, f64)]) {
        if controlled.is_empty() {
            self.penalty = 0.0;
            return;
        }
        if self.penalty_stamp == Some((k.id(), k.version())) {
            return;
        }
        let dmax = k.diagonal().amax();
        self.penalty = self.config.penalty_multiplier * if dmax > 0.0 { dmax } else { 1.0 };
        for &(eq, _) in controlled {
            k.add_at(eq, eq, self.penalty);
        }
        self.penalty_stamp = Some((k.id(), k.version()));
    }
}

impl NumericalMethod for NrSolver {
    fn state_kind(&self) -> &'static str {
        "newton"
    }

    fn set_domain(&mut self, domain_index: usize) {
        self.domain_index = domain_index;
        self.linear.set_domain(domain_index);
    }

    fn domain_index(&self) -> usize {
        self.domain_index
    }

    fn reinitialize(&mut self) {
        self.linear.reinitialize();
        self.penalty = 0.0;
        self.penalty_stamp = None;
        self.last_reactions.clear();
    }

    fn save_state(&self, w: &mut dyn Write) -> Result<()> {
        let state = NewtonState {
            step_length: self.step_length,
        };
        checkpoint::write_record(w, self.state_kind(), &state)
    }

    fn restore_state(&mut self, r: &mut dyn Read) -> Result<()> {
        let state: NewtonState = checkpoint::read_record(r, self.state_kind())?;
        self.step_length = state.step_length;
        Ok(())
    }
}

impl NonLinearSolver for NrSolver {
    fn solve(
        &mut self,
        model: &mut dyn EngineeringModel,
        k: &mut dyn SparseMtrx,
        r: &DVector<f64>,
        r0: Option<&DVector<f64>>,
        x: &mut DVector<f64>,
        dx: &mut DVector<f64>,
        f: &mut DVector<f64>,
        internal_force_norms: &DVector<f64>,
        load_level: &mut f64,
        mode: ReferenceLoadMode,
        step: &TimeStep,
    ) -> Result<(Outcome, IterationRecord)> {
        let di = self.domain_index;
        let neq = x.len();
        assert_eq!(r.len(), neq);
        assert_eq!(dx.len(), neq);
        assert_eq!(f.len(), neq);

        let (groups, group_count, controlled) = {
            let domain = model.domain(di);
            let controlled: Vec<(usize, f64)> = domain
                .dofs()
                .filter(|d| d.is_free() && d.eq_number > 0)
                .filter_map(|d| d.prescribed_value.map(|target| (d.eq_number - 1, target)))
                .collect();
            (domain.equation_groups(), domain.group_count(), controlled)
        };
        let mut excluded = vec![false; neq];
        for &(eq, _) in &controlled {
            excluded[eq] = true;
        }

        let numbering = DefaultNumbering::from_domain(model.domain(di));
        let rt = total_load(r, r0, *load_level);
        let reference = scaling_load(r, r0, *load_level, mode);
        let checker = ConvergenceChecker {
            tolerances: self.config.tolerances.clone(),
            out_of_range: self.config.out_of_range,
        };
        let line_search = self.config.line_search.clone().map(LineSearch::new);

        let mut record = IterationRecord::new(self.config.stiffness_mode);
        let mut since_rebuild: Option<usize> = None;
        if self.config.calc_stiff_before_res {
            self.rebuild_tangent(model, k, x, &numbering, step, &controlled)?;
            since_rebuild = Some(0);
        }

        let mut delta = DVector::zeros(neq);
        let mut last_delta = DVector::zeros(neq);
        let mut nite = 0usize;
        loop {
            refresh_internal_forces(model, f, x, &numbering, step, di)?;
            let residual = &rt - &*f;

            let report = checker.check(
                model.parallel_context(di),
                &groups,
                group_count,
                &residual,
                &reference,
                &last_delta,
                x,
                internal_force_norms,
                &excluded,
            );
            record.push_errors(&report);
            if self.config.verbose {
                let force = report.force_errors.iter().copied().fold(0.0_f64, f64::max);
                let disp = report.disp_errors.iter().copied().fold(0.0_f64, f64::max);
                println!("newton: iteration {nite} force {force:.3e} disp {disp:.3e}");
            }
            if report.out_of_range {
                x.fill(0.0);
                dx.fill(0.0);
                return Ok((Outcome::DivergedTolerance, record));
            }

            let controls_met = controlled.iter().all(|&(eq, target)| {
                let gap = (target - x[eq]).abs();
                let err = if target.abs() > SCALE_FLOOR {
                    gap / target.abs()
                } else {
                    gap
                };
                err <= checker.tolerances.entry(groups[eq]).disp_rtol
            });
            if report.converged && controls_met && nite >= self.config.min_iterations {
                break;
            }
            if nite >= self.config.max_iterations {
                return Ok((Outcome::DivergedIterations, record));
            }

            let rebuild = match self.config.stiffness_mode {
                StiffnessMode::Full => true,
                StiffnessMode::Modified => since_rebuild.is_none(),
                StiffnessMode::Accelerated => {
                    since_rebuild.is_none_or(|n| n >= self.config.accelerated_refresh.max(1))
                }
            };
            if rebuild {
                self.rebuild_tangent(model, k, x, &numbering, step, &controlled)?;
                since_rebuild = Some(0);
            }

            let mut rhs = residual;
            for &(eq, target) in &controlled {
                rhs[eq] = self.penalty * (target - x[eq]);
            }
            delta.fill(0.0);
            if self.linear.solve(k, &rhs, &mut delta) != Outcome::Converged {
                return Ok((Outcome::Failed, record));
            }

            let mut eta = 1.0;
            if let Some(search) = &line_search {
                let x_old = x.clone();
                let (found, _) = search.search(
                    model,
                    step,
                    &x_old,
                    &delta,
                    r,
                    r0,
                    *load_level,
                    &excluded,
                    di,
                )?;
                eta = found;
            }
            if let Some(policy) = self.damping.as_mut() {
                eta *= policy.factor(nite, &report);
            }

            x.axpy(eta, &delta, 1.0);
            dx.axpy(eta, &delta, 1.0);
            last_delta.copy_from(&delta);
            last_delta *= eta;
            record.step_length = eta;
            nite += 1;
            record.iterations = nite;
            since_rebuild = since_rebuild.map(|n| n + 1);
        }

        self.last_reactions = controlled
            .iter()
            .map(|&(eq, _)| (eq, f[eq] - rt[eq]))
            .collect();
        Ok((Outcome::Converged, record))
    }

    fn step_length(&self) -> f64 {
        self.step_length
    }

    fn set_step_length(&mut self, length: f64) {
        self.step_length = length;
    }
}
