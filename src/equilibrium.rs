//! Equilibrium solver and bow model.
//!
//! Wraps the bending-line integrator in the outer root searches: the 2-D
//! Newton iteration over string force and string angle for a drawn bow,
//! and the 1-D calibration of the string half-length from a brace height.

use nalgebra::{Matrix2, Vector2};

use crate::bending_line::{integrate_bending_line, IntegrationOptions, LimbShape};
use crate::constants::{
    JACOBIAN_FD_STEP, MAX_BRACKET_FORCE, MAX_ROOT_ITERATIONS, ROOT_FINDING_TOLERANCE,
};
use crate::error::BowError;
use crate::profile::ArcLengthProfile;
use crate::root_finding::{brent_root_find, expand_bracket};

/// Largest Newton step in the string angle per iteration, radians.
const MAX_ANGLE_STEP: f64 = 0.5;

/// Settings shared by the equilibrium and calibration solves.
#[derive(Debug, Clone)]
pub struct SolverSettings {
    pub integration: IntegrationOptions,
    /// Convergence threshold on the residual infinity norm
    pub residual_tolerance: f64,
    /// Iteration budget for the Newton search and the scalar searches
    pub max_iterations: usize,
    /// Explicit starting point `(K, alpha)` for the equilibrium search.
    /// When `None` the solver seeds itself from the braced configuration
    /// (see [`BowModel::solve_equilibrium`]).
    pub initial_guess: Option<(f64, f64)>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            integration: IntegrationOptions::default(),
            residual_tolerance: ROOT_FINDING_TOLERANCE,
            max_iterations: MAX_ROOT_ITERATIONS,
            initial_guess: None,
        }
    }
}

/// Converged equilibrium state of the bow at one draw length.
#[derive(Debug, Clone)]
pub struct EquilibriumSolution {
    /// String tension K
    pub force: f64,
    /// String angle alpha, radians
    pub string_angle: f64,
    /// Deformed limb shape at the solution
    pub shape: LimbShape,
    /// Closure residuals (F1, F2) at the solution
    pub residual: [f64; 2],
    /// Newton iterations used
    pub iterations: usize,
}

impl EquilibriumSolution {
    /// Force on the archer along the draw axis, counting both limbs.
    ///
    /// The string tension acts on the nocking point at the string angle,
    /// so the axial component per limb is `K sin(alpha)`; it vanishes at
    /// brace and grows with draw even where the tension itself does not.
    pub fn draw_force(&self) -> f64 {
        2.0 * self.force * self.string_angle.sin()
    }
}

/// Calibrate the string half-length from a brace height.
///
/// Specializes the closure conditions to `alpha = 0` and `b = OH`: a
/// scalar search over the string force drives the contact point onto the
/// brace line, and the half-length follows from the string geometry at
/// that force. `BowModel::from_brace_height` runs this once at
/// construction.
pub fn calibrate_string_length(
    theta0: &dyn ArcLengthProfile,
    stiffness: &dyn ArcLengthProfile,
    limb_length: f64,
    brace_height: f64,
    settings: &SolverSettings,
) -> Result<f64, BowError> {
    let mut residual = |force: f64| -> Result<f64, BowError> {
        let shape = integrate_bending_line(
            theta0,
            stiffness,
            limb_length,
            brace_height,
            force,
            0.0,
            &settings.integration,
        )?;
        Ok(shape.x[shape.contact_index] - brace_height)
    };

    let (lo, hi) = expand_bracket(
        &mut residual,
        0.0,
        1.0,
        MAX_BRACKET_FORCE,
        "string length calibration",
    )?;
    let root = brent_root_find(
        &mut residual,
        lo,
        hi,
        settings.residual_tolerance,
        settings.max_iterations,
        "string length calibration",
    )?;

    let shape = integrate_bending_line(
        theta0,
        stiffness,
        limb_length,
        brace_height,
        root.root,
        0.0,
        &settings.integration,
    )?;
    let i = shape.contact_index;
    Ok(shape.y[i] + limb_length - shape.s[i])
}

/// Static bow model: limb profiles, geometry, and the calibrated string.
///
/// Immutable after construction; every solve is independent and the
/// model can be shared across threads.
pub struct BowModel {
    theta0: Box<dyn ArcLengthProfile>,
    stiffness: Box<dyn ArcLengthProfile>,
    limb_length: f64,
    string_half_length: f64,
    settings: SolverSettings,
}

impl BowModel {
    /// Build a model with a known string half-length.
    pub fn with_string_length(
        theta0: impl ArcLengthProfile + 'static,
        stiffness: impl ArcLengthProfile + 'static,
        limb_length: f64,
        string_half_length: f64,
        settings: SolverSettings,
    ) -> Self {
        assert!(limb_length > 0.0, "limb length must be positive");
        assert!(
            string_half_length > 0.0,
            "string half-length must be positive"
        );
        Self {
            theta0: Box::new(theta0),
            stiffness: Box::new(stiffness),
            limb_length,
            string_half_length,
            settings,
        }
    }

    /// Build a model by calibrating the string half-length so that the
    /// strung, undrawn bow sits at `brace_height`.
    pub fn from_brace_height(
        theta0: impl ArcLengthProfile + 'static,
        stiffness: impl ArcLengthProfile + 'static,
        limb_length: f64,
        brace_height: f64,
        settings: SolverSettings,
    ) -> Result<Self, BowError> {
        assert!(limb_length > 0.0, "limb length must be positive");
        assert!(brace_height > 0.0, "brace height must be positive");
        let string_half_length = calibrate_string_length(
            &theta0,
            &stiffness,
            limb_length,
            brace_height,
            &settings,
        )?;
        Ok(Self {
            theta0: Box::new(theta0),
            stiffness: Box::new(stiffness),
            limb_length,
            string_half_length,
            settings,
        })
    }

    pub fn limb_length(&self) -> f64 {
        self.limb_length
    }

    pub fn string_half_length(&self) -> f64 {
        self.string_half_length
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// Bending-line integration at a trial force and angle, exposed for
    /// callers that want raw shapes without the equilibrium search.
    pub fn integrate(
        &self,
        draw: f64,
        force: f64,
        string_angle: f64,
    ) -> Result<LimbShape, BowError> {
        integrate_bending_line(
            self.theta0.as_ref(),
            self.stiffness.as_ref(),
            self.limb_length,
            draw,
            force,
            string_angle,
            &self.settings.integration,
        )
    }

    /// Closure residuals (F1, F2) at a trial `(K, alpha)` for draw `b`.
    ///
    /// F1 anchors the string at the draw point along the direction the
    /// angle implies; F2 matches the free string segment beyond the
    /// contact point against the physical string length.
    fn residuals(
        &self,
        draw: f64,
        force: f64,
        string_angle: f64,
    ) -> Result<([f64; 2], LimbShape), BowError> {
        let shape = self.integrate(draw, force, string_angle)?;
        let i = shape.contact_index;
        let (sin_a, cos_a) = string_angle.sin_cos();
        let f1 = (shape.x[i] - draw) * cos_a + shape.y[i] * sin_a;
        let f2 = shape.y[i]
            - (self.string_half_length - self.limb_length + shape.s[i]) * cos_a;
        Ok(([f1, f2], shape))
    }

    /// Force at which the string geometry closes with the angle held at
    /// zero: the braced configuration for the draw arm `b`. Used to seed
    /// the 2-D search, where a cold start at `(0, 0)` has a degenerate
    /// Jacobian for straight limbs.
    fn braced_seed(&self, draw: f64) -> Result<f64, BowError> {
        let mut residual = |force: f64| -> Result<f64, BowError> {
            let shape = self.integrate(draw, force, 0.0)?;
            let i = shape.contact_index;
            Ok(shape.y[i] - (self.string_half_length - self.limb_length + shape.s[i]))
        };
        let (lo, hi) = expand_bracket(
            &mut residual,
            0.0,
            1.0,
            MAX_BRACKET_FORCE,
            "equilibrium seed",
        )?;
        let root = brent_root_find(
            &mut residual,
            lo,
            hi,
            self.settings.residual_tolerance,
            self.settings.max_iterations,
            "equilibrium seed",
        )?;
        Ok(root.root)
    }

    /// Solve the static equilibrium at draw length `draw`.
    ///
    /// Damped Newton iteration on the two closure residuals with a
    /// forward-difference Jacobian. Each residual evaluation is one full
    /// bending-line integration. Returns the converged force, angle, and
    /// shape; a search that exhausts its budget or meets a singular
    /// Jacobian fails with `ConvergenceFailure`.
    pub fn solve_equilibrium(&self, draw: f64) -> Result<EquilibriumSolution, BowError> {
        let (mut force, mut angle) = match self.settings.initial_guess {
            Some(guess) => guess,
            None => (self.braced_seed(draw)?, 0.0),
        };

        let (mut residual, mut shape) = self.residuals(draw, force, angle)?;
        let mut res_norm = residual[0].abs().max(residual[1].abs());

        for iteration in 1..=self.settings.max_iterations {
            if res_norm < self.settings.residual_tolerance {
                return Ok(EquilibriumSolution {
                    force,
                    string_angle: angle,
                    shape,
                    residual,
                    iterations: iteration - 1,
                });
            }

            // Forward-difference Jacobian, scaled to the current iterate
            let dk = JACOBIAN_FD_STEP * force.abs().max(1.0);
            let da = JACOBIAN_FD_STEP * angle.abs().max(1.0);
            let (res_k, _) = self.residuals(draw, force + dk, angle)?;
            let (res_a, _) = self.residuals(draw, force, angle + da)?;
            let jacobian = Matrix2::new(
                (res_k[0] - residual[0]) / dk,
                (res_a[0] - residual[0]) / da,
                (res_k[1] - residual[1]) / dk,
                (res_a[1] - residual[1]) / da,
            );

            let rhs = Vector2::new(residual[0], residual[1]);
            let mut delta = match jacobian.lu().solve(&rhs) {
                Some(d) if d[0].is_finite() && d[1].is_finite() => d,
                _ => {
                    return Err(BowError::ConvergenceFailure {
                        operation: "equilibrium",
                        iterations: iteration,
                        residual: res_norm,
                    })
                }
            };

            // Trust cap: never jump more than a factor in force or half a
            // radian in angle within one iteration
            let force_cap = 2.0 * force.abs().max(1.0);
            let scale = (delta[0].abs() / force_cap)
                .max(delta[1].abs() / MAX_ANGLE_STEP)
                .max(1.0);
            delta /= scale;

            // Backtracking: accept the first step that reduces the
            // residual norm; a trial that leaves the integrable region
            // only shortens the step
            let mut accepted = false;
            let mut lambda = 1.0;
            for _ in 0..8 {
                let force_try = force - lambda * delta[0];
                let angle_try = angle - lambda * delta[1];
                match self.residuals(draw, force_try, angle_try) {
                    Ok((res_try, shape_try)) => {
                        let norm_try = res_try[0].abs().max(res_try[1].abs());
                        if norm_try < res_norm {
                            force = force_try;
                            angle = angle_try;
                            residual = res_try;
                            shape = shape_try;
                            res_norm = norm_try;
                            accepted = true;
                            break;
                        }
                    }
                    Err(BowError::NumericalDivergence { .. }) => {}
                    Err(e) => return Err(e),
                }
                lambda *= 0.5;
            }

            if !accepted {
                return Err(BowError::ConvergenceFailure {
                    operation: "equilibrium",
                    iterations: iteration,
                    residual: res_norm,
                });
            }
        }

        // The budget may run out on the very step that converges
        if res_norm < self.settings.residual_tolerance {
            return Ok(EquilibriumSolution {
                force,
                string_angle: angle,
                shape,
                residual,
                iterations: self.settings.max_iterations,
            });
        }

        Err(BowError::ConvergenceFailure {
            operation: "equilibrium",
            iterations: self.settings.max_iterations,
            residual: res_norm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The worked reference bow: straight limb of length 0.8 with
    // stiffness falling linearly from 10 at the root to 5 at the tip.
    fn reference_bow(string_half_length: f64) -> BowModel {
        BowModel::with_string_length(
            |_s: f64| 0.0,
            |s: f64| 10.0 - (5.0 / 0.8) * s,
            0.8,
            string_half_length,
            SolverSettings::default(),
        )
    }

    #[test]
    fn test_reference_bow_at_half_draw() {
        let model = reference_bow(0.75);
        let solution = model.solve_equilibrium(0.5).unwrap();

        assert!(solution.residual[0].abs() < 1e-6);
        assert!(solution.residual[1].abs() < 1e-6);

        let (cx, cy) = solution.shape.contact_point();
        assert!(cy > 0.0);
        assert!(cx < 0.5);

        // Converged values pinned from the model itself
        assert!((solution.force - 23.4798).abs() < 1e-3);
        assert!((solution.string_angle - 0.26690).abs() < 1e-4);
    }

    #[test]
    fn test_residuals_vanish_at_solution() {
        let model = reference_bow(0.75);
        let solution = model.solve_equilibrium(0.4).unwrap();

        // Re-evaluate the closure conditions from the returned shape
        let shape = model
            .integrate(0.4, solution.force, solution.string_angle)
            .unwrap();
        let i = shape.contact_index;
        let (sin_a, cos_a) = solution.string_angle.sin_cos();
        let f1 = (shape.x[i] - 0.4) * cos_a + shape.y[i] * sin_a;
        let f2 = shape.y[i] - (0.75 - 0.8 + shape.s[i]) * cos_a;

        assert!(f1.abs() < 1e-6);
        assert!(f2.abs() < 1e-6);
    }

    #[test]
    fn test_brace_height_round_trip() {
        let brace_height = 0.2;
        let model = BowModel::from_brace_height(
            |_s: f64| 0.0,
            |s: f64| 10.0 - (5.0 / 0.8) * s,
            0.8,
            brace_height,
            SolverSettings::default(),
        )
        .unwrap();

        // The calibrated string puts the bow at rest exactly at the
        // brace height: solving there recovers a zero string angle.
        let solution = model.solve_equilibrium(brace_height).unwrap();
        assert!(solution.string_angle.abs() < 1e-6);
        assert!(solution.residual[0].abs() < 1e-6);
        assert!(solution.residual[1].abs() < 1e-6);
        assert!(solution.force > 0.0);
    }

    #[test]
    fn test_calibrated_string_is_shorter_than_limb() {
        let settings = SolverSettings::default();
        let length = calibrate_string_length(
            &|_s: f64| 0.0,
            &|s: f64| 10.0 - (5.0 / 0.8) * s,
            0.8,
            0.2,
            &settings,
        )
        .unwrap();
        assert!(length > 0.0);
        assert!(length < 0.8);
    }

    #[test]
    fn test_draw_force_vanishes_at_brace() {
        let model = BowModel::from_brace_height(
            |_s: f64| 0.0,
            |s: f64| 10.0 - (5.0 / 0.8) * s,
            0.8,
            0.25,
            SolverSettings::default(),
        )
        .unwrap();
        let solution = model.solve_equilibrium(0.25).unwrap();
        assert!(solution.draw_force().abs() < 1e-4);
    }

    #[test]
    fn test_curved_limb_converges() {
        let model = BowModel::with_string_length(
            |s: f64| 0.3 * s / 0.8,
            |s: f64| 10.0 - (5.0 / 0.8) * s,
            0.8,
            0.75,
            SolverSettings::default(),
        );
        let solution = model.solve_equilibrium(0.5).unwrap();
        assert!(solution.residual[0].abs() < 1e-6);
        assert!(solution.residual[1].abs() < 1e-6);
        assert!(solution.force > 0.0);
    }

    #[test]
    fn test_slack_string_fails_to_converge() {
        // A string no shorter than the limb can never be braced
        let model = reference_bow(0.85);
        let result = model.solve_equilibrium(0.5);
        assert!(matches!(
            result,
            Err(BowError::ConvergenceFailure { .. })
        ));
    }

    #[test]
    fn test_iteration_budget_is_enforced() {
        let settings = SolverSettings {
            max_iterations: 0,
            ..Default::default()
        };
        let model = BowModel::with_string_length(
            |_s: f64| 0.0,
            |s: f64| 10.0 - (5.0 / 0.8) * s,
            0.8,
            0.75,
            settings,
        );
        let result = model.solve_equilibrium(0.5);
        assert!(matches!(
            result,
            Err(BowError::ConvergenceFailure { .. })
        ));
    }

    #[test]
    fn test_explicit_initial_guess_is_honored() {
        // Seeding at the known solution converges immediately
        let settings = SolverSettings {
            initial_guess: Some((23.479_78, 0.266_904)),
            ..Default::default()
        };
        let model = BowModel::with_string_length(
            |_s: f64| 0.0,
            |s: f64| 10.0 - (5.0 / 0.8) * s,
            0.8,
            0.75,
            settings,
        );
        let solution = model.solve_equilibrium(0.5).unwrap();
        assert!(solution.iterations <= 2);
        assert!((solution.force - 23.4798).abs() < 1e-3);
    }

    #[test]
    fn test_full_contact_matches_default_for_straight_limb() {
        // The straight reference limb never separates, so skipping
        // detection must not change the answer.
        let mut settings = SolverSettings::default();
        settings.integration.full_contact = true;
        let simplified = BowModel::with_string_length(
            |_s: f64| 0.0,
            |s: f64| 10.0 - (5.0 / 0.8) * s,
            0.8,
            0.75,
            settings,
        );
        let full = reference_bow(0.75);

        let a = simplified.solve_equilibrium(0.5).unwrap();
        let b = full.solve_equilibrium(0.5).unwrap();
        assert!((a.force - b.force).abs() < 1e-6);
        assert!((a.string_angle - b.string_angle).abs() < 1e-8);
    }

    #[test]
    fn test_nonpositive_stiffness_surfaces_divergence() {
        let model = BowModel::with_string_length(
            |_s: f64| 0.0,
            |s: f64| 5.0 - 10.0 * s,
            0.8,
            0.75,
            SolverSettings::default(),
        );
        let result = model.solve_equilibrium(0.5);
        assert!(matches!(
            result,
            Err(BowError::NumericalDivergence { .. })
        ));
    }
}
