//! Domain: DOF managers, element topology and equation bookkeeping.

use crate::dof::{Dof, DofManager};
use crate::numbering::EquationNumbering;

/// Topological footprint of one element: which managers it touches.
///
/// Element formulations stay outside this crate; the solver framework only
/// needs connectivity for location arrays and a characteristic size for
/// explicit time-step estimates.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// 1-based external number.
    pub number: usize,
    /// 0-based indices into the domain's DOF-manager list.
    pub managers: Vec<usize>,
    /// Mean size used for critical-time-step estimates.
    pub characteristic_size: f64,
}

impl Element {
    pub fn new(number: usize, managers: Vec<usize>) -> Self {
        Self {
            number,
            managers,
            characteristic_size: 1.0,
        }
    }
}

/// One analysis domain: managers, elements and the active/prescribed
/// equation counts produced by [`Domain::number_equations`].
#[derive(Debug, Clone, Default)]
pub struct Domain {
    pub dof_managers: Vec<DofManager>,
    pub elements: Vec<Element>,
    neq: usize,
    pres_neq: usize,
    topology_version: u64,
}

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a manager, returning its 0-based index.
    pub fn add_manager(&mut self, manager: DofManager) -> usize {
        self.dof_managers.push(manager);
        self.dof_managers.len() - 1
    }

    pub fn add_element(&mut self, element: Element) {
        self.elements.push(element);
    }

    /// Assign stored equation numbers: active DOFs get 1..=neq, constrained
    /// DOFs get 1..=pres_neq on the prescribed side. Returns `(neq, pres_neq)`.
    ///
    /// Called once per configuration and again after any topology change.
    pub fn number_equations(&mut self) -> (usize, usize) {
        let mut neq = 0usize;
        let mut pres_neq = 0usize;
        for manager in &mut self.dof_managers {
            for dof in &mut manager.dofs {
                if dof.constrained {
                    pres_neq += 1;
                    dof.prescribed_eq_number = pres_neq;
                    dof.eq_number = 0;
                } else {
                    neq += 1;
                    dof.eq_number = neq;
                    dof.prescribed_eq_number = 0;
                }
            }
        }
        self.neq = neq;
        self.pres_neq = pres_neq;
        (neq, pres_neq)
    }

    /// Number of active equations.
    pub fn equation_count(&self) -> usize {
        self.neq
    }

    /// Number of prescribed equations.
    pub fn prescribed_equation_count(&self) -> usize {
        self.pres_neq
    }

    /// Monotone stamp bumped by every topology change; solvers compare it
    /// to decide when cached structures are stale.
    pub fn topology_version(&self) -> u64 {
        self.topology_version
    }

    /// Record a topology change (remeshing, activation of new elements).
    /// Stored equation numbers are cleared and must be reassigned.
    pub fn invalidate_topology(&mut self) {
        self.topology_version += 1;
        for manager in &mut self.dof_managers {
            for dof in &mut manager.dofs {
                dof.eq_number = 0;
                dof.prescribed_eq_number = 0;
            }
        }
        self.neq = 0;
        self.pres_neq = 0;
    }

    /// Location array of an element under the given numbering: one entry per
    /// DOF of each touched manager, 1-based, 0 for excluded DOFs.
    pub fn location_array(
        &self,
        element: &Element,
        numbering: &dyn EquationNumbering,
    ) -> Vec<usize> {
        let mut loc = Vec::new();
        for &m in &element.managers {
            for dof in &self.dof_managers[m].dofs {
                let n = numbering.eq_number(dof);
                loc.push(if n > 0 { n as usize } else { 0 });
            }
        }
        loc
    }

    /// Iterate over every DOF of the domain.
    pub fn dofs(&self) -> impl Iterator<Item = &Dof> {
        self.dof_managers.iter().flat_map(|m| m.dofs.iter())
    }

    /// Convergence-group index per active equation (0-based equation index).
    pub fn equation_groups(&self) -> Vec<usize> {
        let mut groups = vec![0usize; self.neq];
        for dof in self.dofs() {
            if dof.eq_number > 0 {
                groups[dof.eq_number - 1] = dof.group;
            }
        }
        groups
    }

    /// Number of distinct convergence groups (highest group index + 1).
    pub fn group_count(&self) -> usize {
        self.dofs().map(|d| d.group + 1).max().unwrap_or(1)
    }

    /// Smallest element characteristic size, used for explicit stable
    /// time-step estimates. Falls back to 1.0 on an empty domain.
    pub fn min_characteristic_size(&self) -> f64 {
        let smallest = self
            .elements
            .iter()
            .map(|e| e.characteristic_size)
            .fold(f64::INFINITY, f64::min);
        if smallest.is_finite() { smallest } else { 1.0 }
    }
}
