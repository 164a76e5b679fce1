//! Built-in spring-chain model used by tests and examples.
//!
//! A chain of (optionally hardening) axial springs between single-DOF
//! managers. Internal force of a spring with elongation `e` is
//! `n = k·e + h·e³`, so the tangent is `k + 3·h·e²`. The chain covers every
//! model-contract feature the solvers need: nonlinear internal forces,
//! tangent/mass assembly, per-group fields, prescribed DOFs.
//!
//! # Example
//! ```
//! use ferro_model::sample::SpringChain;
//! use ferro_model::model::{EngineeringModel, TimeStep, ValueMode, VectorAssembler};
//! use ferro_model::numbering::DefaultNumbering;
//! use nalgebra::DVector;
//!
//! let chain = SpringChain::uniform(3, 100.0);
//! let numbering = DefaultNumbering::from_domain(chain.domain(0));
//! let step = TimeStep::new(1, 1.0);
//! let mut f = DVector::zeros(3);
//! chain
//!     .assemble_vector(&mut f, &step, VectorAssembler::InternalForces,
//!                      ValueMode::Total, &numbering, 0)
//!     .unwrap();
//! assert!(f.iter().all(|&v| v == 0.0)); // undeformed chain
//! ```

use nalgebra::{DMatrix, DVector};

use crate::dof::{Dof, DofId, DofManager};
use crate::domain::{Domain, Element};
use crate::matrix::SparseMtrx;
use crate::model::{
    ComponentKind, EngineeringModel, MatrixAssembler, ModelError, TimeStep, ValueMode,
    VectorAssembler,
};
use crate::numbering::EquationNumbering;
use crate::parallel::ParallelContext;

/// Stiffness and cubic-hardening coefficient of one spring.
#[derive(Debug, Clone, Copy)]
struct SpringLaw {
    stiffness: f64,
    hardening: f64,
}

/// Chain of axial springs; see the module docs.
pub struct SpringChain {
    domain: Domain,
    laws: Vec<SpringLaw>,
    masses: Vec<f64>,
    loads: Vec<f64>,
    state: DVector<f64>,
    context: ParallelContext,
}

impl SpringChain {
    /// Linear chain: ground manager plus `n` free managers, all springs `k`.
    pub fn uniform(n: usize, k: f64) -> Self {
        Self::build(n, k, 0.0)
    }

    /// Hardening chain: spring force `k·e + h·e³`.
    pub fn hardening(n: usize, k: f64, h: f64) -> Self {
        Self::build(n, k, h)
    }

    fn build(n: usize, k: f64, h: f64) -> Self {
        assert!(n > 0);
        let mut domain = Domain::new();
        let mut ground = DofManager::new(1);
        ground.dofs.push(Dof::fixed(DofId::Dx, 0, 0, 0.0));
        domain.add_manager(ground);
        for i in 1..=n {
            let mut m = DofManager::new(i + 1);
            m.dofs.push(Dof::new(DofId::Dx, i, 0));
            domain.add_manager(m);
        }
        let mut laws = Vec::new();
        for i in 0..n {
            domain.add_element(Element::new(i + 1, vec![i, i + 1]));
            laws.push(SpringLaw {
                stiffness: k,
                hardening: h,
            });
        }
        let (neq, _) = domain.number_equations();
        Self {
            domain,
            laws,
            masses: vec![1.0; n + 1],
            loads: vec![0.0; n + 1],
            state: DVector::zeros(neq),
            context: ParallelContext::serial(),
        }
    }

    /// Two weakly coupled fields: a mechanical chain (group 0, `Dx`) and a
    /// thermal chain (group 1, `Temperature`), plus a coupling spring between
    /// matching members when `coupling` is nonzero.
    pub fn two_field(n: usize, k_mech: f64, k_therm: f64, coupling: f64) -> Self {
        assert!(n > 0);
        let mut domain = Domain::new();

        let mut mech_ground = DofManager::new(1);
        mech_ground.dofs.push(Dof::fixed(DofId::Dx, 0, 0, 0.0));
        domain.add_manager(mech_ground);
        for i in 1..=n {
            let mut m = DofManager::new(i + 1);
            m.dofs.push(Dof::new(DofId::Dx, i, 0));
            domain.add_manager(m);
        }

        let therm_base = n + 1;
        let mut therm_ground = DofManager::new(therm_base + 1);
        therm_ground
            .dofs
            .push(Dof::fixed(DofId::Temperature, therm_base, 1, 0.0));
        domain.add_manager(therm_ground);
        for i in 1..=n {
            let mut m = DofManager::new(therm_base + i + 1);
            m.dofs
                .push(Dof::new(DofId::Temperature, therm_base + i, 1));
            domain.add_manager(m);
        }

        let mut laws = Vec::new();
        let mut number = 0;
        let mut link = |domain: &mut Domain, laws: &mut Vec<SpringLaw>, a: usize, b: usize, k| {
            number += 1;
            domain.add_element(Element::new(number, vec![a, b]));
            laws.push(SpringLaw {
                stiffness: k,
                hardening: 0.0,
            });
        };
        for i in 0..n {
            link(&mut domain, &mut laws, i, i + 1, k_mech);
        }
        for i in 0..n {
            link(&mut domain, &mut laws, therm_base + i, therm_base + i + 1, k_therm);
        }
        if coupling != 0.0 {
            for i in 1..=n {
                link(&mut domain, &mut laws, i, therm_base + i, coupling);
            }
        }

        let (neq, _) = domain.number_equations();
        let n_managers = domain.dof_managers.len();
        Self {
            domain,
            laws,
            masses: vec![1.0; n_managers],
            loads: vec![0.0; n_managers],
            state: DVector::zeros(neq),
            context: ParallelContext::serial(),
        }
    }

    /// Reference load applied at a manager's DOF.
    pub fn set_reference_load(&mut self, manager: usize, value: f64) {
        self.loads[manager] = value;
    }

    /// Lumped mass of a manager.
    pub fn set_mass(&mut self, manager: usize, mass: f64) {
        self.masses[manager] = mass;
    }

    /// Mark a free DOF as displacement-controlled with the given target.
    pub fn set_control_target(&mut self, manager: usize, target: f64) {
        self.domain.dof_managers[manager].dofs[0].set_control_target(target);
    }

    /// Current total solution.
    pub fn state(&self) -> &DVector<f64> {
        &self.state
    }

    pub fn domain_mut(&mut self) -> &mut Domain {
        &mut self.domain
    }

    /// Value of a manager's single DOF under the current state.
    fn dof_value(&self, manager: usize) -> f64 {
        let dof = &self.domain.dof_managers[manager].dofs[0];
        if dof.constrained {
            dof.prescribed_value.unwrap_or(0.0)
        } else if dof.eq_number > 0 {
            self.state[dof.eq_number - 1]
        } else {
            0.0
        }
    }

    fn scatter(
        &self,
        dest: &mut DVector<f64>,
        numbering: &dyn EquationNumbering,
        manager: usize,
        value: f64,
    ) {
        let dof = &self.domain.dof_managers[manager].dofs[0];
        let n = numbering.eq_number(dof);
        if n > 0 {
            dest[n as usize - 1] += value;
        }
    }
}

impl EngineeringModel for SpringChain {
    fn domain(&self, domain_index: usize) -> &Domain {
        assert_eq!(domain_index, 0, "spring chain has a single domain");
        &self.domain
    }

    fn update_component(&mut self, _step: &TimeStep, _kind: ComponentKind, x: &DVector<f64>) {
        assert_eq!(x.len(), self.state.len());
        self.state.copy_from(x);
    }

    fn assemble_vector(
        &self,
        dest: &mut DVector<f64>,
        _step: &TimeStep,
        assembler: VectorAssembler,
        _mode: ValueMode,
        numbering: &dyn EquationNumbering,
        domain_index: usize,
    ) -> Result<(), ModelError> {
        if domain_index != 0 {
            return Err(ModelError::NoSuchDomain(domain_index));
        }
        match assembler {
            VectorAssembler::InternalForces => {
                for (element, law) in self.domain.elements.iter().zip(&self.laws) {
                    let (a, b) = (element.managers[0], element.managers[1]);
                    let e = self.dof_value(b) - self.dof_value(a);
                    let n = law.stiffness * e + law.hardening * e * e * e;
                    self.scatter(dest, numbering, a, -n);
                    self.scatter(dest, numbering, b, n);
                }
            }
            VectorAssembler::ExternalLoads => {
                for (manager, &load) in self.loads.iter().enumerate() {
                    if load != 0.0 {
                        self.scatter(dest, numbering, manager, load);
                    }
                }
            }
            VectorAssembler::LumpedMass => {
                for (manager, &mass) in self.masses.iter().enumerate() {
                    self.scatter(dest, numbering, manager, mass);
                }
            }
        }
        Ok(())
    }

    fn assemble_matrix(
        &self,
        dest: &mut dyn SparseMtrx,
        _step: &TimeStep,
        assembler: MatrixAssembler,
        numbering: &dyn EquationNumbering,
        domain_index: usize,
    ) -> Result<(), ModelError> {
        if domain_index != 0 {
            return Err(ModelError::NoSuchDomain(domain_index));
        }
        match assembler {
            MatrixAssembler::TangentStiffness => {
                for (element, law) in self.domain.elements.iter().zip(&self.laws) {
                    let (a, b) = (element.managers[0], element.managers[1]);
                    let e = self.dof_value(b) - self.dof_value(a);
                    let kt = law.stiffness + 3.0 * law.hardening * e * e;
                    let block =
                        DMatrix::from_row_slice(2, 2, &[kt, -kt, -kt, kt]);
                    let loc = self.domain.location_array(element, numbering);
                    dest.assemble(&loc, &block);
                }
            }
            MatrixAssembler::Mass => {
                for (manager, &mass) in self.masses.iter().enumerate() {
                    let dof = &self.domain.dof_managers[manager].dofs[0];
                    let n = numbering.eq_number(dof);
                    if n > 0 {
                        let block = DMatrix::from_element(1, 1, mass);
                        dest.assemble(&[n as usize], &block);
                    }
                }
            }
        }
        Ok(())
    }

    fn parallel_context(&self, _domain_index: usize) -> &ParallelContext {
        &self.context
    }
}
