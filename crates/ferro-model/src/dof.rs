//! Degrees of freedom and the equation numbers stored on them.
//!
//! Each scalar unknown (a [`Dof`]) lives on a [`DofManager`] (a node, rigid
//! arm, or similar) and carries two stored equation numbers: one in the
//! active set and one in the prescribed set. Numbering schemes decide which
//! side they read. Equation numbers are 1-based; 0 means "not assigned".

/// Physical identifier of a scalar unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DofId {
    /// Translation along x
    Dx,
    /// Translation along y
    Dy,
    /// Translation along z
    Dz,
    /// Rotation about x
    Rx,
    /// Rotation about y
    Ry,
    /// Rotation about z
    Rz,
    /// Temperature field unknown
    Temperature,
    /// Pressure field unknown
    Pressure,
}

/// A single scalar unknown.
#[derive(Debug, Clone, PartialEq)]
pub struct Dof {
    /// Physical identifier.
    pub id: DofId,
    /// Index of the owning DOF manager inside its domain.
    pub manager: usize,
    /// Convergence-group index (into a solver's tolerance set).
    pub group: usize,
    /// 1-based equation number in the active set, 0 if unassigned.
    pub eq_number: usize,
    /// 1-based equation number in the prescribed set, 0 if unassigned.
    pub prescribed_eq_number: usize,
    /// Dirichlet target. On a constrained DOF this is the boundary value;
    /// on an active DOF it marks direct displacement control.
    pub prescribed_value: Option<f64>,
    /// Constrained DOFs are numbered on the prescribed side only.
    pub constrained: bool,
}

impl Dof {
    /// New free (active) DOF with no equation number assigned yet.
    pub fn new(id: DofId, manager: usize, group: usize) -> Self {
        Self {
            id,
            manager,
            group,
            eq_number: 0,
            prescribed_eq_number: 0,
            prescribed_value: None,
            constrained: false,
        }
    }

    /// New constrained DOF holding a Dirichlet boundary value.
    pub fn fixed(id: DofId, manager: usize, group: usize, value: f64) -> Self {
        Self {
            id,
            manager,
            group,
            eq_number: 0,
            prescribed_eq_number: 0,
            prescribed_value: Some(value),
            constrained: true,
        }
    }

    /// Whether this DOF belongs to the active set.
    pub fn is_free(&self) -> bool {
        !self.constrained
    }

    /// Mark an active DOF as displacement-controlled with the given target.
    pub fn set_control_target(&mut self, target: f64) {
        self.prescribed_value = Some(target);
    }
}

/// A node-like entity owning a fixed list of DOFs.
///
/// Within one manager every DOF carries a distinct [`DofId`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DofManager {
    /// 1-based external number.
    pub number: usize,
    /// Owned DOFs, in creation order.
    pub dofs: Vec<Dof>,
}

impl DofManager {
    pub fn new(number: usize) -> Self {
        Self {
            number,
            dofs: Vec::new(),
        }
    }

    /// Find the DOF with the given identifier.
    pub fn find_dof(&self, id: DofId) -> Option<&Dof> {
        self.dofs.iter().find(|d| d.id == id)
    }

    pub fn find_dof_mut(&mut self, id: DofId) -> Option<&mut Dof> {
        self.dofs.iter_mut().find(|d| d.id == id)
    }
}
