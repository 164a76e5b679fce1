//! The closed set of solve results shared by every solver.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result of one solve call.
///
/// `Failed` is always fatal for the call (a violated precondition);
/// `DivergedIterations` and `DivergedTolerance` are recoverable by the
/// caller through a new call with different parameters. Solvers never retry
/// themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Outcome {
    /// No solve attempted yet.
    #[default]
    Unknown,
    /// All convergence criteria satisfied.
    Converged,
    /// Iteration or sweep cap reached first.
    DivergedIterations,
    /// Error exceeded the hard ceiling; the solution was zeroed.
    DivergedTolerance,
    /// Precondition violated: non-factorizable matrix, indefinite pair,
    /// unsupported storage kind.
    Failed,
}

impl Outcome {
    pub fn is_converged(self) -> bool {
        self == Outcome::Converged
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::Unknown => "unknown",
            Outcome::Converged => "converged",
            Outcome::DivergedIterations => "diverged (iteration limit)",
            Outcome::DivergedTolerance => "diverged (error out of range)",
            Outcome::Failed => "failed",
        };
        f.write_str(name)
    }
}
