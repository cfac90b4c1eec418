//! Embedded Dormand-Prince 5(4) stepper.
//!
//! The bending line was classically integrated with dopri5-style adaptive
//! stepping; this module provides that pair with a fallible right-hand
//! side so singular stiffness profiles surface as errors instead of NaNs.

use crate::constants::{MAX_STEP_SCALE, MIN_STEP_SCALE, STEP_SAFETY};
use crate::error::BowError;

// Dormand & Prince (1980) tableau
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// Fifth-order weights; the seventh stage is the FSAL evaluation at the
// new state, so B7 = 0.
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// Difference between the fifth- and fourth-order weights, used for the
// embedded error estimate.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

/// Adaptive stepper configuration.
#[derive(Debug, Clone)]
pub(crate) struct Dopri5 {
    pub abs_tol: f64,
    pub rel_tol: f64,
    /// Steps shorter than this are treated as divergence.
    pub min_step: f64,
}

impl Dopri5 {
    /// Advance `y` from `s0` to `s1` (`s1 > s0`) with adaptive steps.
    ///
    /// `h` carries the trial step size across calls so consecutive
    /// intervals keep the controller's memory. `budget` counts attempted
    /// steps across an entire bending-line solve; exhausting it is a
    /// `NumericalDivergence`.
    pub fn propagate<const N: usize, F>(
        &self,
        rhs: &mut F,
        s0: f64,
        s1: f64,
        mut y: [f64; N],
        h: &mut f64,
        budget: &mut usize,
    ) -> Result<[f64; N], BowError>
    where
        F: FnMut(f64, &[f64; N]) -> Result<[f64; N], BowError>,
    {
        let mut s = s0;

        loop {
            let remaining = s1 - s;
            if remaining <= self.min_step {
                break;
            }
            if *budget == 0 {
                return Err(BowError::NumericalDivergence {
                    s,
                    reason: "step budget exhausted".to_string(),
                });
            }
            *budget -= 1;

            let step = h.min(remaining);
            if step < self.min_step {
                return Err(BowError::NumericalDivergence {
                    s,
                    reason: format!("step size underflow (h = {step:.3e})"),
                });
            }

            let (y_new, err_norm) = self.try_step(rhs, s, &y, step)?;

            if err_norm <= 1.0 {
                s += step;
                y = y_new;
                if y.iter().any(|v| !v.is_finite()) {
                    return Err(BowError::NumericalDivergence {
                        s,
                        reason: "state is not finite".to_string(),
                    });
                }
            }

            // Standard PI-free controller: scale by err^(-1/5), clamped.
            let scale = if err_norm.is_finite() && err_norm > 1e-30 {
                (STEP_SAFETY * err_norm.powf(-0.2)).clamp(MIN_STEP_SCALE, MAX_STEP_SCALE)
            } else if err_norm.is_finite() {
                MAX_STEP_SCALE
            } else {
                MIN_STEP_SCALE
            };
            *h = step * scale;
        }

        Ok(y)
    }

    /// One trial step of size `step`. Returns the fifth-order solution and
    /// the scaled RMS error norm of the embedded estimate.
    fn try_step<const N: usize, F>(
        &self,
        rhs: &mut F,
        s: f64,
        y: &[f64; N],
        step: f64,
    ) -> Result<([f64; N], f64), BowError>
    where
        F: FnMut(f64, &[f64; N]) -> Result<[f64; N], BowError>,
    {
        let k1 = rhs(s, y)?;

        let mut stage = [0.0; N];
        for i in 0..N {
            stage[i] = y[i] + step * A21 * k1[i];
        }
        let k2 = rhs(s + C2 * step, &stage)?;

        for i in 0..N {
            stage[i] = y[i] + step * (A31 * k1[i] + A32 * k2[i]);
        }
        let k3 = rhs(s + C3 * step, &stage)?;

        for i in 0..N {
            stage[i] = y[i] + step * (A41 * k1[i] + A42 * k2[i] + A43 * k3[i]);
        }
        let k4 = rhs(s + C4 * step, &stage)?;

        for i in 0..N {
            stage[i] = y[i] + step * (A51 * k1[i] + A52 * k2[i] + A53 * k3[i] + A54 * k4[i]);
        }
        let k5 = rhs(s + C5 * step, &stage)?;

        for i in 0..N {
            stage[i] = y[i]
                + step * (A61 * k1[i] + A62 * k2[i] + A63 * k3[i] + A64 * k4[i] + A65 * k5[i]);
        }
        let k6 = rhs(s + step, &stage)?;

        let mut y_new = [0.0; N];
        for i in 0..N {
            y_new[i] = y[i]
                + step * (B1 * k1[i] + B3 * k3[i] + B4 * k4[i] + B5 * k5[i] + B6 * k6[i]);
        }
        let k7 = rhs(s + step, &y_new)?;

        let mut err_sq = 0.0;
        for i in 0..N {
            let err_i = step
                * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i]
                    + E7 * k7[i]);
            let scale = self.abs_tol + self.rel_tol * y[i].abs().max(y_new[i].abs());
            err_sq += (err_i / scale) * (err_i / scale);
        }
        let err_norm = (err_sq / N as f64).sqrt();

        Ok((y_new, err_norm))
    }
}
