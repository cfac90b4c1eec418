//! # Bow Engine
//!
//! Static deformation solver for bow limbs, after B.W. Kooi and
//! J.A. Sparenberg, "On the static deformation of the bow", Journal of
//! Engineering Mathematics 14 (1980) 27-45.
//!
//! Given a limb's unstressed angle profile and bending-stiffness profile,
//! the solver finds the deformed shape, string tension, and string angle
//! at any draw length by shooting: an adaptive Runge-Kutta integration of
//! the bending line, nested inside a root search on the two geometric
//! closure conditions at the string-contact point. The string half-length
//! is calibrated from the brace height the same way.

// Re-export the main types and functions
pub use bending_line::{integrate_bending_line, IntegrationOptions, LimbShape};
pub use draw_curve::{draw_force_curve, stored_energy, uniform_draws, DrawCurvePoint};
pub use equilibrium::{
    calibrate_string_length, BowModel, EquilibriumSolution, SolverSettings,
};
pub use error::BowError;
pub use profile::{ArcLengthProfile, SampledProfile};
pub use root_finding::{brent_root_find, expand_bracket, RootResult};

// Module declarations
pub mod bending_line;
mod constants;
mod dopri5;
pub mod draw_curve;
pub mod equilibrium;
mod error;
pub mod profile;
pub mod root_finding;
