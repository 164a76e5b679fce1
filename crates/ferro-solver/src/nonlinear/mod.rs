//! Nonlinear incremental solvers.
//!
//! The Newton-Raphson state machine drives one load/time increment; the
//! staggered variant partitions the unknowns by DOF identifier and solves
//! the groups sequentially, and the dynamic-relaxation variant replaces
//! the tangent correction with explicit pseudo-time marching. All three
//! share the per-group convergence check in [`ConvergenceChecker`].

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use ferro_model::matrix::SparseMtrx;
use ferro_model::model::{
    ComponentKind, EngineeringModel, TimeStep, ValueMode, VectorAssembler,
};
use ferro_model::numbering::DefaultNumbering;
use ferro_model::parallel::ParallelContext;

use crate::error::Result;
use crate::method::NumericalMethod;
use crate::outcome::Outcome;

mod line_search;
mod newton;
mod relaxation;
mod staggered;

pub use line_search::{LineSearch, LineSearchConfig, LineSearchStatus};
pub use newton::{DampingPolicy, FixedDamping, NewtonConfig, NrSolver};
pub use relaxation::{RelaxationConfig, RelaxationSolver};
pub use staggered::StaggeredSolver;

/// How the reference load is interpreted when scaling the residual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceLoadMode {
    /// `λ·R` is the total applied load.
    Total,
    /// `R` is one increment's reference; `λ` tracks the fraction applied.
    Incremental,
}

/// Convergence tolerances of one DOF group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GroupTolerance {
    pub force_rtol: f64,
    pub disp_rtol: f64,
}

impl Default for GroupTolerance {
    fn default() -> Self {
        Self {
            force_rtol: 1e-6,
            disp_rtol: 1e-6,
        }
    }
}

/// Per-group tolerance entries, fixed at configuration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToleranceSet {
    groups: Vec<GroupTolerance>,
}

impl Default for ToleranceSet {
    fn default() -> Self {
        Self::uniform(1)
    }
}

impl ToleranceSet {
    pub fn new(groups: Vec<GroupTolerance>) -> Self {
        assert!(!groups.is_empty());
        Self { groups }
    }

    /// The same default entry for `n` groups.
    pub fn uniform(n: usize) -> Self {
        Self::new(vec![GroupTolerance::default(); n.max(1)])
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Entry for a group; groups beyond the configured list reuse the last
    /// entry.
    pub fn entry(&self, group: usize) -> GroupTolerance {
        let last = self.groups.len() - 1;
        self.groups[group.min(last)]
    }
}

/// Tangent rebuild policy across Newton iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StiffnessMode {
    /// Rebuild every iteration.
    Full,
    /// Build once at increment entry, reuse afterwards.
    Modified,
    /// Rebuild every few iterations.
    Accelerated,
}

/// Progress summary of one nonlinear solve.
#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub iterations: usize,
    /// Last accepted step length (line-search η times any damping).
    pub step_length: f64,
    pub stiffness_mode: StiffnessMode,
    /// Per-group scaled errors of the last check: force errors for every
    /// group, then displacement errors.
    pub error_norms: Vec<f64>,
    /// The same layout, one check earlier.
    pub previous_error_norms: Vec<f64>,
}

impl IterationRecord {
    fn new(stiffness_mode: StiffnessMode) -> Self {
        Self {
            iterations: 0,
            step_length: 1.0,
            stiffness_mode,
            error_norms: Vec::new(),
            previous_error_norms: Vec::new(),
        }
    }

    fn push_errors(&mut self, report: &ConvergenceReport) {
        self.previous_error_norms = std::mem::take(&mut self.error_norms);
        self.error_norms = report
            .force_errors
            .iter()
            .chain(report.disp_errors.iter())
            .copied()
            .collect();
    }
}

/// A solver driving one load/time increment to equilibrium.
pub trait NonLinearSolver: NumericalMethod + Send {
    /// Balance `F(X) = λ·R + R0` for the bound domain.
    ///
    /// `x`, `dx` and `f` carry the previous totals in and the updated
    /// totals out. `internal_force_norms` holds per-group reference
    /// magnitudes of the internal forces, used to scale force errors.
    /// Numerical results come back in the [`Outcome`]; contract errors
    /// (unknown domain, assembler gaps, broken checkpoint streams) are
    /// `Err`.
    #[allow(clippy::too_many_arguments)]
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
    ) -> Result<(Outcome, IterationRecord)>;

    /// Step length the solver would apply to the next increment.
    fn step_length(&self) -> f64 {
        1.0
    }

    fn set_step_length(&mut self, _length: f64) {}
}

/// Scaled per-group errors of one convergence check.
#[derive(Debug, Clone)]
pub struct ConvergenceReport {
    pub converged: bool,
    /// Some scaled error exceeded the hard ceiling; the caller must abort
    /// and zero the solution.
    pub out_of_range: bool,
    pub force_errors: Vec<f64>,
    pub disp_errors: Vec<f64>,
}

/// Per-group force/displacement convergence check shared by the
/// incremental solvers.
///
/// Force errors are residual norms scaled by the larger of the total-load
/// norm and the internal-force reference magnitude of the group;
/// displacement errors are last-correction norms scaled by the total
/// solution norm. Groups with no meaningful scale fall back to absolute
/// norms. All norms run through the partition context so distributed runs
/// count every equation exactly once.
#[derive(Debug, Clone)]
pub struct ConvergenceChecker {
    pub tolerances: ToleranceSet,
    /// Scaled-error ceiling above which the solve is abandoned.
    pub out_of_range: f64,
}

impl Default for ConvergenceChecker {
    fn default() -> Self {
        Self {
            tolerances: ToleranceSet::default(),
            out_of_range: 1e20,
        }
    }
}

/// Scale below which a group's reference magnitude counts as zero.
const SCALE_FLOOR: f64 = 1e-12;

/// Exchange tag completing assembled internal forces at shared equations.
const FORCE_EXCHANGE_TAG: u32 = 1;

impl ConvergenceChecker {
    pub fn new(tolerances: ToleranceSet) -> Self {
        Self {
            tolerances,
            ..Self::default()
        }
    }

    /// Evaluate all groups.
    ///
    /// `groups` maps each 0-based equation to its group; `excluded`
    /// equations (displacement-controlled DOFs) are left out of every
    /// norm. `delta_x` is the last correction, not the accumulated
    /// increment.
    #[allow(clippy::too_many_arguments)]
    pub fn check(
        &self,
        ctx: &ParallelContext,
        groups: &[usize],
        group_count: usize,
        residual: &DVector<f64>,
        total_load: &DVector<f64>,
        delta_x: &DVector<f64>,
        x_total: &DVector<f64>,
        internal_force_norms: &DVector<f64>,
        excluded: &[bool],
    ) -> ConvergenceReport {
        let neq = residual.len();
        assert_eq!(groups.len(), neq);
        assert_eq!(total_load.len(), neq);
        assert_eq!(delta_x.len(), neq);
        assert_eq!(x_total.len(), neq);

        let ng = group_count.max(1);
        let mut residual_sq = vec![0.0_f64; ng];
        let mut load_sq = vec![0.0_f64; ng];
        let mut delta_sq = vec![0.0_f64; ng];
        let mut total_sq = vec![0.0_f64; ng];
        for eq in 0..neq {
            if excluded.get(eq).copied().unwrap_or(false) || !ctx.owns(eq) {
                continue;
            }
            let g = groups[eq];
            residual_sq[g] += residual[eq] * residual[eq];
            load_sq[g] += total_load[eq] * total_load[eq];
            delta_sq[g] += delta_x[eq] * delta_x[eq];
            total_sq[g] += x_total[eq] * x_total[eq];
        }

        let mut report = ConvergenceReport {
            converged: true,
            out_of_range: false,
            force_errors: Vec::with_capacity(ng),
            disp_errors: Vec::with_capacity(ng),
        };
        for g in 0..ng {
            let residual_norm = ctx.accumulate(residual_sq[g]).sqrt();
            let load_norm = ctx.accumulate(load_sq[g]).sqrt();
            let delta_norm = ctx.accumulate(delta_sq[g]).sqrt();
            let total_norm = ctx.accumulate(total_sq[g]).sqrt();

            let force_scale = load_norm.max(
                internal_force_norms
                    .get(g)
                    .copied()
                    .unwrap_or(0.0)
                    .abs(),
            );
            let force_err = if force_scale > SCALE_FLOOR {
                residual_norm / force_scale
            } else {
                residual_norm
            };
            let disp_err = if total_norm > SCALE_FLOOR {
                delta_norm / total_norm
            } else {
                delta_norm
            };

            let tolerance = self.tolerances.entry(g);
            if !force_err.is_finite()
                || !disp_err.is_finite()
                || force_err > self.out_of_range
                || disp_err > self.out_of_range
            {
                report.out_of_range = true;
                report.converged = false;
            } else if force_err > tolerance.force_rtol || disp_err > tolerance.disp_rtol {
                report.converged = false;
            }
            report.force_errors.push(force_err);
            report.disp_errors.push(disp_err);
        }
        report
    }
}

/// `λ·R + R0`, the load the residual is balanced against.
pub(crate) fn total_load(
    r: &DVector<f64>,
    r0: Option<&DVector<f64>>,
    load_level: f64,
) -> DVector<f64> {
    let mut rt = r * load_level;
    if let Some(r0) = r0 {
        rt += r0;
    }
    rt
}

/// Recompute internal forces for `x` into `f`, completed at shared
/// equations.
pub(crate) fn refresh_internal_forces(
    model: &mut dyn EngineeringModel,
    f: &mut DVector<f64>,
    x: &DVector<f64>,
    numbering: &DefaultNumbering,
    step: &TimeStep,
    domain_index: usize,
) -> Result<()> {
    model.update_component(step, ComponentKind::InternalRhs, x);
    f.fill(0.0);
    model.assemble_vector(
        f,
        step,
        VectorAssembler::InternalForces,
        ValueMode::Total,
        numbering,
        domain_index,
    )?;
    model
        .parallel_context(domain_index)
        .exchange_shared(f, FORCE_EXCHANGE_TAG);
    Ok(())
}

/// Load norm reference for convergence scaling under each reference-load
/// mode: the applied total under `Total`, the full reference increment
/// under `Incremental` (an early λ would otherwise deflate the scale and
/// inflate relative errors).
pub(crate) fn scaling_load(
    r: &DVector<f64>,
    r0: Option<&DVector<f64>>,
    load_level: f64,
    mode: ReferenceLoadMode,
) -> DVector<f64> {
    match mode {
        ReferenceLoadMode::Total => total_load(r, r0, load_level),
        ReferenceLoadMode::Incremental => total_load(r, r0, 1.0),
    }
}
