/// Numerical constants used throughout the solver

/// Default absolute tolerance for the adaptive integrator
///
/// Tight enough that the equilibrium residuals are limited by the root
/// search, not by integration error.
pub const INTEGRATION_ABS_TOL: f64 = 1e-9;

/// Default relative tolerance for the adaptive integrator
pub const INTEGRATION_REL_TOL: f64 = 1e-9;

/// Default number of output intervals along the limb arc length
///
/// The bending line is reported on a uniform grid of this many intervals
/// over [0, L]; contact detection operates on the same grid.
pub const DEFAULT_OUTPUT_STEPS: usize = 50;

/// Maximum number of accepted integrator steps per bending-line solve
pub const MAX_INTEGRATION_STEPS: usize = 100_000;

/// Tolerance for root finding on the equilibrium residuals
///
/// An order of magnitude above the integrator tolerance, so the searches
/// never chase integration noise.
pub const ROOT_FINDING_TOLERANCE: f64 = 1e-8;

/// Maximum iterations for any root search
pub const MAX_ROOT_ITERATIONS: usize = 100;

/// Bending stiffness at or below this value makes phi' = M/W singular
pub const MIN_STIFFNESS: f64 = 1e-12;

/// Step-size safety factor for the embedded error controller
pub const STEP_SAFETY: f64 = 0.9;

/// Smallest allowed ratio between successive step sizes
pub const MIN_STEP_SCALE: f64 = 0.2;

/// Largest allowed ratio between successive step sizes
pub const MAX_STEP_SCALE: f64 = 5.0;

/// Forward-difference increment for the Newton Jacobian
pub const JACOBIAN_FD_STEP: f64 = 1e-7;

/// Upper limit for string-force bracket expansion during calibration
pub const MAX_BRACKET_FORCE: f64 = 1e9;
