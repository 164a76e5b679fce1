//! Equation numbering schemes: the DOF → equation-index policies.
//!
//! A scheme answers three questions: is it the model's default numbering,
//! what number does a given DOF get, and how many equations a destination
//! sized by this scheme must hold. Returned numbers are 1-based; 0 excludes
//! the DOF; selective schemes additionally issue negative "shadow" numbers
//! for constrained DOFs, later negated into a prescribed-equation count.

use std::collections::HashMap;

use crate::dof::{Dof, DofId};
use crate::domain::Domain;

/// DOF → equation-index policy consumed by every assembly call.
pub trait EquationNumbering: Send + Sync {
    /// Whether this is the model's default numbering (schemes that merely
    /// forward the DOF's stored number).
    fn is_default(&self) -> bool {
        false
    }

    /// Equation number issued to `dof`: positive = active, 0 = excluded,
    /// negative = prescribed shadow number.
    fn eq_number(&self, dof: &Dof) -> i32;

    /// Number of equations a destination sized by this scheme must hold.
    fn required_count(&self) -> usize;
}

/// 0-based index of an active equation number, if any.
pub fn active_index(n: i32) -> Option<usize> {
    if n > 0 { Some(n as usize - 1) } else { None }
}

/// Forwards to the DOF's stored active-side number.
#[derive(Debug, Clone, Copy)]
pub struct DefaultNumbering {
    neq: usize,
}

impl DefaultNumbering {
    pub fn new(neq: usize) -> Self {
        Self { neq }
    }

    pub fn from_domain(domain: &Domain) -> Self {
        Self {
            neq: domain.equation_count(),
        }
    }
}

impl EquationNumbering for DefaultNumbering {
    fn is_default(&self) -> bool {
        true
    }

    fn eq_number(&self, dof: &Dof) -> i32 {
        dof.eq_number as i32
    }

    fn required_count(&self) -> usize {
        self.neq
    }
}

/// Forwards to the DOF's stored prescribed-side number.
#[derive(Debug, Clone, Copy)]
pub struct PrescribedNumbering {
    pres_neq: usize,
}

impl PrescribedNumbering {
    pub fn from_domain(domain: &Domain) -> Self {
        Self {
            pres_neq: domain.prescribed_equation_count(),
        }
    }
}

impl EquationNumbering for PrescribedNumbering {
    fn eq_number(&self, dof: &Dof) -> i32 {
        dof.prescribed_eq_number as i32
    }

    fn required_count(&self) -> usize {
        self.pres_neq
    }
}

/// Filtered view of the stored active numbers: only DOFs whose identifier is
/// in the allow-list are numbered; everything else is excluded. Destinations
/// keep the global size, so partial quantities (e.g. reactions of one
/// physical field) land at their global positions.
#[derive(Debug, Clone)]
pub struct FilteredNumbering {
    allowed: Vec<DofId>,
    neq: usize,
}

impl FilteredNumbering {
    pub fn new(allowed: Vec<DofId>, domain: &Domain) -> Self {
        Self {
            allowed,
            neq: domain.equation_count(),
        }
    }
}

impl EquationNumbering for FilteredNumbering {
    fn eq_number(&self, dof: &Dof) -> i32 {
        if self.allowed.contains(&dof.id) {
            dof.eq_number as i32
        } else {
            0
        }
    }

    fn required_count(&self) -> usize {
        self.neq
    }
}

/// Selective numbering over a node subset, with its own counters.
///
/// Only DOFs of selected managers participate. Active DOFs receive
/// increasing positive numbers through `neq`; constrained DOFs receive
/// decreasing negative numbers through `pres_neq`. `reset` zeroes both
/// counters so the subset can be renumbered from scratch.
#[derive(Debug, Clone, Default)]
pub struct SelectiveNumbering {
    selected: Vec<bool>,
    map: Vec<HashMap<DofId, i32>>,
    neq: i32,
    pres_neq: i32,
    initialized: bool,
}

impl SelectiveNumbering {
    /// `selected[m]` decides whether manager `m` participates.
    pub fn new(selected: Vec<bool>) -> Self {
        Self {
            selected,
            map: Vec::new(),
            neq: 0,
            pres_neq: 0,
            initialized: false,
        }
    }

    /// Walk the domain once and issue numbers to the selected subset.
    pub fn init(&mut self, domain: &Domain) {
        self.map = vec![HashMap::new(); domain.dof_managers.len()];
        for (m, manager) in domain.dof_managers.iter().enumerate() {
            if !self.selected.get(m).copied().unwrap_or(false) {
                continue;
            }
            for dof in &manager.dofs {
                let n = if dof.constrained {
                    self.pres_neq -= 1;
                    self.pres_neq
                } else {
                    self.neq += 1;
                    self.neq
                };
                self.map[m].insert(dof.id, n);
            }
        }
        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Zero both counters and drop issued numbers.
    pub fn reset(&mut self) {
        self.neq = 0;
        self.pres_neq = 0;
        self.map.clear();
        self.initialized = false;
    }

    /// Number of active equations issued so far.
    pub fn active_count(&self) -> usize {
        self.neq as usize
    }

    /// Number of prescribed equations issued so far (the negated counter).
    pub fn prescribed_count(&self) -> usize {
        (-self.pres_neq) as usize
    }
}

impl EquationNumbering for SelectiveNumbering {
    fn eq_number(&self, dof: &Dof) -> i32 {
        debug_assert!(self.initialized, "numbering queried before init");
        self.map
            .get(dof.manager)
            .and_then(|per_node| per_node.get(&dof.id))
            .copied()
            .unwrap_or(0)
    }

    fn required_count(&self) -> usize {
        self.active_count()
    }
}

/// Fresh numbering restricted to a DOF-identifier group.
///
/// Unlike [`FilteredNumbering`] this does not reuse the stored global
/// numbers: the group gets its own compact 1..=neq range, so group systems
/// can be assembled and solved independently.
#[derive(Debug, Clone, Default)]
pub struct DofGroupNumbering {
    ids: Vec<DofId>,
    map: HashMap<(usize, DofId), i32>,
    neq: i32,
    pres_neq: i32,
}

impl DofGroupNumbering {
    pub fn new(ids: Vec<DofId>) -> Self {
        Self {
            ids,
            map: HashMap::new(),
            neq: 0,
            pres_neq: 0,
        }
    }

    /// Issue compact numbers to every DOF of the group.
    pub fn init(&mut self, domain: &Domain) {
        for (m, manager) in domain.dof_managers.iter().enumerate() {
            for dof in &manager.dofs {
                if !self.ids.contains(&dof.id) {
                    continue;
                }
                let n = if dof.constrained {
                    self.pres_neq -= 1;
                    self.pres_neq
                } else {
                    self.neq += 1;
                    self.neq
                };
                self.map.insert((m, dof.id), n);
            }
        }
    }

    pub fn reset(&mut self) {
        self.neq = 0;
        self.pres_neq = 0;
        self.map.clear();
    }

    pub fn ids(&self) -> &[DofId] {
        &self.ids
    }

    /// Global 0-based equation index of each group equation, in group order.
    pub fn global_equations(&self, domain: &Domain) -> Vec<usize> {
        let mut global = vec![0usize; self.neq as usize];
        for dof in domain.dofs() {
            if let Some(&n) = self.map.get(&(dof.manager, dof.id))
                && n > 0
                && dof.eq_number > 0
            {
                global[n as usize - 1] = dof.eq_number - 1;
            }
        }
        global
    }
}

impl EquationNumbering for DofGroupNumbering {
    fn eq_number(&self, dof: &Dof) -> i32 {
        self.map.get(&(dof.manager, dof.id)).copied().unwrap_or(0)
    }

    fn required_count(&self) -> usize {
        self.neq as usize
    }
}
