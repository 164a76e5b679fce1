//! Staggered Newton iterations over DOF-identifier groups.
//!
//! The unknowns are partitioned by [`DofId`] into independently numbered
//! sub-systems. Within one outer iteration each group is assembled under its
//! own compact numbering, corrected by inner Newton iterations against the
//! full coupled residual, and checked on its own equations; the outer check
//! then runs on the global residual. Heterogeneous fields (displacement vs
//! temperature) thereby iterate at their own rates while sharing one outer
//! iteration cap. Equations belonging to none of the configured groups are
//! never corrected and stay out of the outer norms.

use nalgebra::DVector;

use ferro_model::dof::DofId;
use ferro_model::matrix::{MatrixKind, SparseMtrx};
use ferro_model::model::{ComponentKind, EngineeringModel, MatrixAssembler, TimeStep};
use ferro_model::numbering::{DefaultNumbering, DofGroupNumbering};
use ferro_model::parallel::ParallelContext;

use crate::error::Result;
use crate::linear::{DirectSolver, LinearSolver};
use crate::matrix::{CsrMtrx, DenseMtrx};
use crate::method::NumericalMethod;
use crate::nonlinear::{
    ConvergenceChecker, IterationRecord, NewtonConfig, NonLinearSolver, ReferenceLoadMode,
    refresh_internal_forces, scaling_load, total_load,
};
use crate::outcome::Outcome;

/// Newton solver iterating staggered over DOF-identifier groups.
pub struct StaggeredSolver {
    pub config: NewtonConfig,
    group_ids: Vec<Vec<DofId>>,
    linear: Box<dyn LinearSolver>,
    domain_index: usize,
}

impl Default for StaggeredSolver {
    fn default() -> Self {
        Self::new(NewtonConfig::default())
    }
}

impl StaggeredSolver {
    /// Solver with the default split: structural identifiers in one group,
    /// scalar fields in the other.
    pub fn new(config: NewtonConfig) -> Self {
        Self {
            config,
            group_ids: vec![
                vec![
                    DofId::Dx,
                    DofId::Dy,
                    DofId::Dz,
                    DofId::Rx,
                    DofId::Ry,
                    DofId::Rz,
                ],
                vec![DofId::Temperature, DofId::Pressure],
            ],
            linear: Box::new(DirectSolver::new()),
            domain_index: 0,
        }
    }

    /// Replace the group split; groups are solved in the given order.
    pub fn with_groups(mut self, group_ids: Vec<Vec<DofId>>) -> Self {
        self.group_ids = group_ids;
        self
    }

    pub fn with_linear_solver(mut self, linear: Box<dyn LinearSolver>) -> Self {
        self.linear = linear;
        self
    }

    fn new_group_matrix(&self) -> Box<dyn SparseMtrx> {
        match self.linear.recommended_storage(true) {
            MatrixKind::Dense => Box::new(DenseMtrx::new(0, 0)),
            MatrixKind::Csr => Box::new(CsrMtrx::new(0, 0)),
        }
    }
}

impl NumericalMethod for StaggeredSolver {
    fn state_kind(&self) -> &'static str {
        "staggered"
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
    }
}

impl NonLinearSolver for StaggeredSolver {
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
        mode: ReferenceLoadMode,
        step: &TimeStep,
    ) -> Result<(Outcome, IterationRecord)> {
        let di = self.domain_index;
        let neq = x.len();
        assert_eq!(r.len(), neq);
        assert_eq!(dx.len(), neq);
        assert_eq!(f.len(), neq);

        let (groups, group_count) = {
            let domain = model.domain(di);
            (domain.equation_groups(), domain.group_count())
        };

        // per-group numberings, global maps, and the outer exclusion mask
        let mut numberings = Vec::with_capacity(self.group_ids.len());
        let mut global_maps = Vec::with_capacity(self.group_ids.len());
        let mut in_any_group = vec![false; neq];
        {
            let domain = model.domain(di);
            for ids in &self.group_ids {
                let mut numbering = DofGroupNumbering::new(ids.clone());
                numbering.init(domain);
                let map = numbering.global_equations(domain);
                for &eq in &map {
                    in_any_group[eq] = true;
                }
                numberings.push(numbering);
                global_maps.push(map);
            }
        }
        let excluded: Vec<bool> = in_any_group.iter().map(|&inside| !inside).collect();

        let mut matrices: Vec<Box<dyn SparseMtrx>> = Vec::with_capacity(numberings.len());
        for numbering in &numberings {
            let mut matrix = self.new_group_matrix();
            matrix.build_internal_structure(&*model, di, numbering);
            matrices.push(matrix);
        }

        let default_numbering = DefaultNumbering::from_domain(model.domain(di));
        let rt = total_load(r, r0, *load_level);
        let reference = scaling_load(r, r0, *load_level, mode);
        let checker = ConvergenceChecker {
            tolerances: self.config.tolerances.clone(),
            out_of_range: self.config.out_of_range,
        };
        // sub-checks run on gathered vectors whose indices are group-local,
        // so they stay partition-local
        let serial = ParallelContext::serial();

        let mut record = IterationRecord::new(self.config.stiffness_mode);
        let mut last_delta = DVector::zeros(neq);
        let mut outer = 0usize;
        loop {
            refresh_internal_forces(model, f, x, &default_numbering, step, di)?;
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
                println!("staggered: outer {outer} force {force:.3e}");
            }
            if report.out_of_range {
                x.fill(0.0);
                dx.fill(0.0);
                return Ok((Outcome::DivergedTolerance, record));
            }
            if report.converged && outer >= self.config.min_iterations {
                break;
            }
            if outer >= self.config.max_iterations {
                return Ok((Outcome::DivergedIterations, record));
            }

            last_delta.fill(0.0);
            for (g, numbering) in numberings.iter().enumerate() {
                let map = &global_maps[g];
                let ng = map.len();
                if ng == 0 {
                    continue;
                }
                let matrix = &mut matrices[g];
                let groups_sub: Vec<usize> = map.iter().map(|&eq| groups[eq]).collect();
                let excluded_sub = vec![false; ng];
                let mut delta_sub = DVector::zeros(ng);
                let mut last_sub = DVector::zeros(ng);

                for inner in 0.. {
                    refresh_internal_forces(model, f, x, &default_numbering, step, di)?;
                    let rhs_sub = DVector::from_fn(ng, |i, _| rt[map[i]] - f[map[i]]);
                    let load_sub = DVector::from_fn(ng, |i, _| reference[map[i]]);
                    let x_sub = DVector::from_fn(ng, |i, _| x[map[i]]);
                    let sub_report = checker.check(
                        &serial,
                        &groups_sub,
                        group_count,
                        &rhs_sub,
                        &load_sub,
                        &last_sub,
                        &x_sub,
                        internal_force_norms,
                        &excluded_sub,
                    );
                    if sub_report.out_of_range {
                        x.fill(0.0);
                        dx.fill(0.0);
                        return Ok((Outcome::DivergedTolerance, record));
                    }
                    if sub_report.converged || inner >= self.config.max_iterations {
                        break;
                    }

                    model.update_component(step, ComponentKind::NonLinearLhs, x);
                    matrix.zero();
                    model.assemble_matrix(
                        matrix.as_mut(),
                        step,
                        MatrixAssembler::TangentStiffness,
                        numbering,
                        di,
                    )?;
                    delta_sub.fill(0.0);
                    if self.linear.solve(matrix.as_mut(), &rhs_sub, &mut delta_sub)
                        != Outcome::Converged
                    {
                        return Ok((Outcome::Failed, record));
                    }
                    for (i, &eq) in map.iter().enumerate() {
                        x[eq] += delta_sub[i];
                        dx[eq] += delta_sub[i];
                        last_delta[eq] += delta_sub[i];
                    }
                    last_sub.copy_from(&delta_sub);
                }
            }
            outer += 1;
            record.iterations = outer;
        }
        Ok((Outcome::Converged, record))
    }
}
