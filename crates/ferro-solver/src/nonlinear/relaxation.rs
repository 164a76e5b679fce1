//! Dynamic relaxation: an explicit central-difference march with artificial
//! mass-proportional damping, run until the static residual dies out.
//!
//! No tangent is ever assembled or factorized. Each sub-step costs one
//! internal-force evaluation and a diagonal solve against the lumped mass,
//! which makes the method attractive for problems whose tangent is
//! indefinite or too expensive to factorize.

use nalgebra::DVector;

use ferro_model::{
    DefaultNumbering, EngineeringModel, SparseMtrx, TimeStep, ValueMode, VectorAssembler,
};

use crate::error::Result;
use crate::method::NumericalMethod;
use crate::outcome::Outcome;

use super::{
    refresh_internal_forces, ConvergenceChecker, IterationRecord, NonLinearSolver,
    ReferenceLoadMode, StiffnessMode, ToleranceSet,
};

const MASS_EXCHANGE_TAG: u32 = 2;

/// Settings for the explicit march.
///
/// The stable step length is estimated from the smallest element size and
/// the dilatational wave speed of a fictitious elastic medium, so the Lame
/// constants and density here are algorithmic knobs rather than material
/// data. Stiffer fictitious media shorten the step.
#[derive(Debug, Clone)]
pub struct RelaxationConfig {
    /// Density of the fictitious medium.
    pub density: f64,
    /// First Lame constant of the fictitious medium.
    pub lame_lambda: f64,
    /// Second Lame constant (shear modulus) of the fictitious medium.
    pub lame_mu: f64,
    /// Fraction of the estimated stable step actually taken.
    pub dt_factor: f64,
    /// Damping coefficient premultiplied by the step length.
    pub damping_factor: f64,
    /// Sub-step budget before the march is abandoned.
    pub max_iterations: usize,
    /// Sub-steps to take even if the entry state already passes the check.
    pub min_iterations: usize,
    /// Per-group convergence tolerances.
    pub tolerances: ToleranceSet,
    /// Error ceiling treated as a lost solution.
    pub out_of_range: f64,
    /// Print the error norms of every sub-step.
    pub verbose: bool,
}

impl Default for RelaxationConfig {
    fn default() -> Self {
        Self {
            density: 1.0,
            lame_lambda: 210.0e9,
            lame_mu: 210.0e9,
            dt_factor: 0.25,
            damping_factor: 0.1,
            max_iterations: 500,
            min_iterations: 0,
            tolerances: ToleranceSet::default(),
            out_of_range: 1.0e20,
            verbose: false,
        }
    }
}

/// Explicit dynamic-relaxation solver for quasi-static equilibrium.
///
/// The whole reference load is applied at once; the load level is forced to
/// one and the stepping scheme ignores it afterwards. The lumped mass must
/// be strictly positive on every equation, otherwise the march cannot start
/// and the attempt fails outright.
#[derive(Debug, Default)]
pub struct RelaxationSolver {
    pub config: RelaxationConfig,
    domain_index: usize,
}

impl RelaxationSolver {
    pub fn new(config: RelaxationConfig) -> Self {
        Self {
            config,
            domain_index: 0,
        }
    }
}

impl NumericalMethod for RelaxationSolver {
    fn state_kind(&self) -> &'static str {
        "relaxation"
    }

    fn set_domain(&mut self, domain_index: usize) {
        self.domain_index = domain_index;
    }

    fn domain_index(&self) -> usize {
        self.domain_index
    }
}

impl NonLinearSolver for RelaxationSolver {
    fn solve(
        &mut self,
        model: &mut dyn EngineeringModel,
        _k: &mut dyn SparseMtrx,
        r: &DVector<f64>,
        r0: Option<&DVector<f64>>,
        x: &mut DVector<f64>,
        dx: &mut DVector<f64>,
        f: &mut DVector<f64>,
        internal_force_norms: &DVector<f64>,
        load_level: &mut f64,
        _mode: ReferenceLoadMode,
        step: &TimeStep,
    ) -> Result<(Outcome, IterationRecord)> {
        let di = self.domain_index;
        let neq = r.len();
        assert_eq!(x.len(), neq);
        assert_eq!(dx.len(), neq);
        assert_eq!(f.len(), neq);

        let (groups, group_count, min_size) = {
            let domain = model.domain(di);
            (
                domain.equation_groups(),
                domain.group_count(),
                domain.min_characteristic_size(),
            )
        };
        let numbering = DefaultNumbering::from_domain(model.domain(di));
        let excluded = vec![false; neq];
        let checker = ConvergenceChecker {
            tolerances: self.config.tolerances.clone(),
            out_of_range: self.config.out_of_range,
        };
        let mut record = IterationRecord::new(StiffnessMode::Full);

        *load_level = 1.0;
        let rt = super::total_load(r, r0, 1.0);

        let mut mass = DVector::zeros(neq);
        model.assemble_vector(
            &mut mass,
            step,
            VectorAssembler::LumpedMass,
            ValueMode::Total,
            &numbering,
            di,
        )?;
        model
            .parallel_context(di)
            .exchange_shared(&mut mass, MASS_EXCHANGE_TAG);
        if mass.iter().any(|&m| m <= 0.0) {
            eprintln!("warning: dynamic relaxation needs a positive lumped mass on every equation");
            return Ok((Outcome::Failed, record));
        }

        let wave_speed =
            ((self.config.lame_lambda + 2.0 * self.config.lame_mu) / self.config.density).sqrt();
        let dt = self.config.dt_factor * min_size / wave_speed;
        let alpha_dt = self.config.damping_factor;

        let x_entry = x.clone();
        let mut x_prev = x.clone();
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
                &rt,
                &last_delta,
                x,
                internal_force_norms,
                &excluded,
            );
            record.push_errors(&report);
            if self.config.verbose {
                let force = report.force_errors.iter().cloned().fold(0.0, f64::max);
                let disp = report.disp_errors.iter().cloned().fold(0.0, f64::max);
                println!("relaxation: sub-step {nite} force {force:.3e} disp {disp:.3e}");
            }
            if report.out_of_range {
                x.fill(0.0);
                dx.fill(0.0);
                return Ok((Outcome::DivergedTolerance, record));
            }
            if report.converged && nite >= self.config.min_iterations {
                break;
            }
            if nite >= self.config.max_iterations {
                return Ok((Outcome::DivergedIterations, record));
            }

            // Damped central difference on the lumped system
            //   x_next = residual dt^2 / m + 2 x - x_prev - alpha dt (x - x_prev).
            let mut x_next = DVector::zeros(neq);
            for j in 0..neq {
                x_next[j] = residual[j] * dt * dt / mass[j] + 2.0 * x[j] - x_prev[j]
                    - alpha_dt * (x[j] - x_prev[j]);
            }
            last_delta = &x_next - &*x;
            x_prev.copy_from(x);
            x.copy_from(&x_next);
            // The increment is rebuilt from scratch each sub-step.
            dx.copy_from(x);
            *dx -= &x_entry;

            nite += 1;
            record.iterations = nite;
        }

        Ok((Outcome::Converged, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::DenseMtrx;
    use ferro_model::SpringChain;

    fn slow_medium() -> RelaxationConfig {
        RelaxationConfig {
            density: 1.0,
            lame_lambda: 40.0,
            lame_mu: 40.0,
            max_iterations: 1500,
            ..RelaxationConfig::default()
        }
    }

    fn run(
        solver: &mut RelaxationSolver,
        mut chain: SpringChain,
        r: Vec<f64>,
        x0: Vec<f64>,
    ) -> (Outcome, IterationRecord, DVector<f64>, DVector<f64>) {
        let neq = r.len();
        let r = DVector::from_vec(r);
        let mut x = DVector::from_vec(x0);
        let mut dx = DVector::zeros(neq);
        let mut f = DVector::zeros(neq);
        let norms = DVector::zeros(1);
        let mut k = DenseMtrx::new(neq, neq);
        let mut level = 1.0;
        let step = TimeStep::new(1, 1.0);
        let (outcome, record) = solver
            .solve(
                &mut chain,
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
            .unwrap();
        (outcome, record, x, dx)
    }

    #[test]
    fn marches_a_linear_chain_to_static_equilibrium() {
        let chain = SpringChain::uniform(2, 100.0);
        let mut solver = RelaxationSolver::new(slow_medium());
        let (outcome, record, x, dx) = run(&mut solver, chain, vec![0.0, 10.0], vec![0.0, 0.0]);
        assert_eq!(outcome, Outcome::Converged);
        assert!(record.iterations > 1, "an explicit march takes many sub-steps");
        assert!((x[0] - 0.1).abs() < 1.0e-4);
        assert!((x[1] - 0.2).abs() < 1.0e-4);
        assert!((dx[0] - x[0]).abs() < 1.0e-12);
        assert!((dx[1] - x[1]).abs() < 1.0e-12);
    }

    #[test]
    fn nonpositive_mass_stops_the_march_before_it_starts() {
        let mut chain = SpringChain::uniform(2, 100.0);
        chain.set_mass(1, 0.0);
        let mut solver = RelaxationSolver::new(slow_medium());
        let (outcome, record, _, _) = run(&mut solver, chain, vec![0.0, 10.0], vec![0.0, 0.0]);
        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(record.iterations, 0);
    }

    #[test]
    fn exhausted_sub_step_budget_reports_divergence() {
        let chain = SpringChain::uniform(2, 100.0);
        let mut solver = RelaxationSolver::new(RelaxationConfig {
            max_iterations: 3,
            ..slow_medium()
        });
        let (outcome, record, x, _) = run(&mut solver, chain, vec![0.0, 10.0], vec![0.0, 0.0]);
        assert_eq!(outcome, Outcome::DivergedIterations);
        assert_eq!(record.iterations, 3);
        assert!(x.iter().any(|&v| v != 0.0), "partial march is kept");
    }

    #[test]
    fn runaway_error_zeroes_the_solution() {
        let chain = SpringChain::uniform(2, 100.0);
        let mut solver = RelaxationSolver::new(RelaxationConfig {
            out_of_range: 0.5,
            ..slow_medium()
        });
        let (outcome, _, x, dx) = run(&mut solver, chain, vec![0.0, 10.0], vec![5.0, 5.0]);
        assert_eq!(outcome, Outcome::DivergedTolerance);
        assert!(x.iter().all(|&v| v == 0.0));
        assert!(dx.iter().all(|&v| v == 0.0));
    }
}
