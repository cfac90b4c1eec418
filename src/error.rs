use std::error::Error;
use std::fmt;

/// Unified error type for all fallible operations in the crate.
///
/// Every solve returns `Result<T, BowError>`; a partially converged shape
/// is physically meaningless, so no operation falls back to a default or
/// last-known-good value.
#[derive(Debug, Clone, PartialEq)]
pub enum BowError {
    /// The ODE integrator could not maintain its tolerance: the step size
    /// underflowed, the step budget ran out, or the stiffness profile
    /// evaluated to a non-positive value (which makes phi' = M/W singular).
    NumericalDivergence {
        /// Arc length at which integration gave up
        s: f64,
        reason: String,
    },
    /// A root search exceeded its iteration budget, failed to bracket a
    /// sign change, or met a singular Jacobian.
    ConvergenceFailure {
        /// Which search failed ("equilibrium", "string length calibration")
        operation: &'static str,
        iterations: usize,
        /// Residual magnitude when the search stopped
        residual: f64,
    },
}

impl fmt::Display for BowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NumericalDivergence { s, reason } => {
                write!(f, "numerical divergence at s = {s:.6}: {reason}")
            }
            Self::ConvergenceFailure {
                operation,
                iterations,
                residual,
            } => {
                write!(
                    f,
                    "{operation} did not converge after {iterations} iterations \
                     (residual {residual:.3e})"
                )
            }
        }
    }
}

impl Error for BowError {}
