//! Base contract shared by every solver in the framework.

use std::io::{Read, Write};

use crate::checkpoint;
use crate::error::Result;

/// Capabilities common to linear, eigenvalue and nonlinear solvers.
///
/// Solvers never hold a reference to the model; they remember the domain
/// index they operate on and receive the model afresh with each solve call.
/// `reinitialize` drops whatever the solver cached about a previous mesh,
/// and the state pair persists restart-relevant internals through a
/// checkpoint stream.
pub trait NumericalMethod {
    /// Tag written into checkpoint records, matching the factory key.
    fn state_kind(&self) -> &'static str;

    fn set_domain(&mut self, domain_index: usize);

    fn domain_index(&self) -> usize;

    /// Forget cached structures after the discretization changed.
    fn reinitialize(&mut self) {}

    /// Write internal state to the checkpoint stream.
    ///
    /// Stateless solvers keep the default, which writes an empty record so
    /// the stream stays aligned on restore.
    fn save_state(&self, w: &mut dyn Write) -> Result<()> {
        checkpoint::write_record(w, self.state_kind(), &())
    }

    /// Read internal state back from the checkpoint stream.
    fn restore_state(&mut self, r: &mut dyn Read) -> Result<()> {
        checkpoint::read_record::<()>(r, self.state_kind())
    }
}
