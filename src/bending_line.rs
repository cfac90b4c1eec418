//! Bending-line integrator.
//!
//! Integrates the limb's equilibrium ODE over arc length for a trial
//! string force and string angle, detecting on the fly where the string
//! separates from the limb. This is the inner loop of every equilibrium
//! and calibration solve.

use crate::constants::{
    DEFAULT_OUTPUT_STEPS, INTEGRATION_ABS_TOL, INTEGRATION_REL_TOL, MAX_INTEGRATION_STEPS,
    MIN_STIFFNESS,
};
use crate::dopri5::Dopri5;
use crate::error::BowError;
use crate::profile::ArcLengthProfile;

/// Options for a single bending-line integration.
#[derive(Debug, Clone)]
pub struct IntegrationOptions {
    /// Number of uniform output intervals over `[0, L]`
    pub output_steps: usize,
    /// Absolute tolerance of the adaptive stepper
    pub abs_tol: f64,
    /// Relative tolerance of the adaptive stepper
    pub rel_tol: f64,
    /// Step budget per integration
    pub max_steps: usize,
    /// Assume the string loads the whole limb and skip contact detection
    pub full_contact: bool,
}

impl Default for IntegrationOptions {
    fn default() -> Self {
        Self {
            output_steps: DEFAULT_OUTPUT_STEPS,
            abs_tol: INTEGRATION_ABS_TOL,
            rel_tol: INTEGRATION_REL_TOL,
            max_steps: MAX_INTEGRATION_STEPS,
            full_contact: false,
        }
    }
}

/// Deformed limb centerline sampled on a uniform arc-length grid.
///
/// `s` is strictly increasing from 0 to the limb length; `phi` is the
/// bending angle relative to the unstressed shape; `x`/`y` are the
/// centerline position in the draw-axis frame. `contact_index` points at
/// the sample where the string separates from the limb, or at the last
/// sample when the string loads the limb all the way to the tip.
#[derive(Debug, Clone)]
pub struct LimbShape {
    pub s: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub phi: Vec<f64>,
    pub contact_index: usize,
    pub contact_s: f64,
}

impl LimbShape {
    /// Number of samples along the limb.
    pub fn len(&self) -> usize {
        self.s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.s.is_empty()
    }

    /// Tip position `(x, y)` at `s = L`.
    pub fn tip(&self) -> (f64, f64) {
        (*self.x.last().unwrap(), *self.y.last().unwrap())
    }

    /// Position of the string-contact sample.
    pub fn contact_point(&self) -> (f64, f64) {
        (self.x[self.contact_index], self.y[self.contact_index])
    }
}

fn sign_of(g: f64) -> i8 {
    if g > 0.0 {
        1
    } else if g < 0.0 {
        -1
    } else {
        0
    }
}

/// Integrate the bending line for string force `force` and string angle
/// `string_angle` at draw length `draw`.
///
/// State is `[phi, x, y]` starting from the limb root at the origin:
///
/// ```text
/// phi' = M(s) / W(s),  M = K ((b - x) cos a - y sin a)  while in contact
/// x'   = sin(phi + theta0(s))
/// y'   = cos(phi + theta0(s))
/// ```
///
/// The contact point is found online: at every output sample the tangency
/// function `phi + alpha + theta0(s)` is inspected, and its first sign
/// change from positive to negative latches the separation point. From
/// there on the limb is free and the moment term is zero. Without a
/// crossing the string stays in contact up to the tip.
pub fn integrate_bending_line(
    theta0: &dyn ArcLengthProfile,
    stiffness: &dyn ArcLengthProfile,
    limb_length: f64,
    draw: f64,
    force: f64,
    string_angle: f64,
    options: &IntegrationOptions,
) -> Result<LimbShape, BowError> {
    let n = options.output_steps;
    assert!(n >= 1, "at least one output interval is required");
    let (sin_a, cos_a) = string_angle.sin_cos();

    let stepper = Dopri5 {
        abs_tol: options.abs_tol,
        rel_tol: options.rel_tol,
        min_step: limb_length * 1e-14,
    };

    let mut s_out = Vec::with_capacity(n + 1);
    let mut x_out = Vec::with_capacity(n + 1);
    let mut y_out = Vec::with_capacity(n + 1);
    let mut phi_out = Vec::with_capacity(n + 1);
    s_out.push(0.0);
    x_out.push(0.0);
    y_out.push(0.0);
    phi_out.push(0.0);

    let mut contact_s = limb_length;
    let mut contact_index = n;
    let mut loaded = true;
    let mut latched = false;
    let mut sign_next = sign_of(string_angle + theta0.value(0.0));

    let mut state = [0.0_f64; 3]; // [phi, x, y]
    let mut h = limb_length / n as f64;
    let mut budget = options.max_steps;

    for i in 0..n {
        let s0 = limb_length * i as f64 / n as f64;
        let s1 = limb_length * (i + 1) as f64 / n as f64;

        let loaded_now = loaded;
        let mut rhs = |s: f64, z: &[f64; 3]| -> Result<[f64; 3], BowError> {
            let w = stiffness.value(s);
            if !(w > MIN_STIFFNESS) {
                return Err(BowError::NumericalDivergence {
                    s,
                    reason: format!("stiffness W(s) = {w:.3e} is not positive"),
                });
            }
            let moment = if loaded_now {
                force * ((draw - z[1]) * cos_a - z[2] * sin_a)
            } else {
                0.0
            };
            let angle = z[0] + theta0.value(s);
            Ok([moment / w, angle.sin(), angle.cos()])
        };

        state = stepper.propagate(&mut rhs, s0, s1, state, &mut h, &mut budget)?;

        s_out.push(s1);
        phi_out.push(state[0]);
        x_out.push(state[1]);
        y_out.push(state[2]);

        if !options.full_contact && !latched {
            let sign_prev = sign_next;
            sign_next = sign_of(state[0] + string_angle + theta0.value(s1));
            if sign_prev == 1 && sign_next == -1 {
                contact_s = s1;
                contact_index = i + 1;
                latched = true;
                loaded = false;
            }
        }
    }

    Ok(LimbShape {
        s: s_out,
        x: x_out,
        y: y_out,
        phi: phi_out,
        contact_index,
        contact_s,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight(_s: f64) -> f64 {
        0.0
    }

    #[test]
    fn test_unloaded_straight_limb_identity() {
        // theta0 = 0 and K = 0 leave the limb on the y-axis
        let shape = integrate_bending_line(
            &straight,
            &|_s: f64| 1.0,
            1.0,
            0.0,
            0.0,
            0.0,
            &IntegrationOptions::default(),
        )
        .unwrap();

        for i in 0..shape.len() {
            assert!(shape.x[i].abs() < 1e-12);
            assert!(shape.phi[i].abs() < 1e-12);
            assert!((shape.y[i] - shape.s[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_arc_length_grid_is_monotone() {
        let shape = integrate_bending_line(
            &straight,
            &|_s: f64| 5.0,
            0.8,
            0.5,
            10.0,
            0.1,
            &IntegrationOptions::default(),
        )
        .unwrap();

        assert_eq!(shape.len(), DEFAULT_OUTPUT_STEPS + 1);
        assert_eq!(shape.s[0], 0.0);
        assert!((shape.s[shape.len() - 1] - 0.8).abs() < 1e-15);
        assert!(shape.s.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_contact_point_first_crossing() {
        // With K = 0 the limb stays unbent, so the tangency function is
        // alpha + theta0(s) = 0.35 - s; it crosses zero at s = 0.35 and
        // the latch lands on the first grid sample past it.
        let theta0 = |s: f64| 0.25 - s;
        let shape = integrate_bending_line(
            &theta0,
            &|_s: f64| 1.0,
            1.0,
            0.0,
            0.0,
            0.1,
            &IntegrationOptions::default(),
        )
        .unwrap();

        assert_eq!(shape.contact_index, 18);
        assert!((shape.contact_s - 0.36).abs() < 1e-12);
    }

    #[test]
    fn test_no_crossing_contact_defaults_to_tip() {
        let shape = integrate_bending_line(
            &straight,
            &|_s: f64| 5.0,
            0.8,
            0.5,
            5.0,
            0.2,
            &IntegrationOptions::default(),
        )
        .unwrap();

        assert_eq!(shape.contact_index, shape.len() - 1);
        assert!((shape.contact_s - 0.8).abs() < 1e-15);
    }

    #[test]
    fn test_full_contact_skips_detection() {
        let theta0 = |s: f64| 0.25 - s;
        let options = IntegrationOptions {
            full_contact: true,
            ..Default::default()
        };
        let shape =
            integrate_bending_line(&theta0, &|_s: f64| 1.0, 1.0, 0.0, 0.0, 0.1, &options)
                .unwrap();

        assert_eq!(shape.contact_index, shape.len() - 1);
        assert!((shape.contact_s - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_nonpositive_stiffness_diverges() {
        let result = integrate_bending_line(
            &straight,
            &|s: f64| 1.0 - 2.0 * s,
            1.0,
            0.0,
            0.0,
            0.0,
            &IntegrationOptions::default(),
        );
        assert!(matches!(
            result,
            Err(BowError::NumericalDivergence { .. })
        ));
    }

    #[test]
    fn test_bent_limb_pulls_toward_draw_axis() {
        // A positive string force bends the limb toward the nocking
        // point: x grows and the tip height drops below the arc length.
        let shape = integrate_bending_line(
            &straight,
            &|_s: f64| 7.0,
            0.8,
            0.5,
            10.0,
            0.0,
            &IntegrationOptions::default(),
        )
        .unwrap();

        let (tip_x, tip_y) = shape.tip();
        assert!(tip_x > 0.0);
        assert!(tip_y < 0.8);
        assert!(shape.phi.last().unwrap() > &0.0);
    }
}
