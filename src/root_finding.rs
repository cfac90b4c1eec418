//! Scalar root finding for the equilibrium searches.
//!
//! Brent's method with bisection fallback, plus geometric bracket
//! expansion for searches that start from a single guess. Objectives are
//! fallible so an integration failure inside a probe propagates out of
//! the search instead of being papered over with a sentinel value.

use crate::error::BowError;

/// Result of a scalar root search.
#[derive(Debug, Clone)]
pub struct RootResult {
    pub root: f64,
    pub iterations: usize,
    /// |f(root)| at the returned point
    pub residual: f64,
}

/// Brent's method for root finding.
///
/// Requires `f(a)` and `f(b)` to bracket a sign change. Converges when
/// `|f(b)| < tolerance` or the bracket collapses; exceeding
/// `max_iterations` is a `ConvergenceFailure`.
pub fn brent_root_find<F>(
    mut f: F,
    mut a: f64,
    mut b: f64,
    tolerance: f64,
    max_iterations: usize,
    operation: &'static str,
) -> Result<RootResult, BowError>
where
    F: FnMut(f64) -> Result<f64, BowError>,
{
    let mut fa = f(a)?;
    let mut fb = f(b)?;
    let mut iterations = 0;

    if fa * fb > 0.0 {
        return Err(BowError::ConvergenceFailure {
            operation,
            iterations,
            residual: fa.abs().min(fb.abs()),
        });
    }

    // Keep |f(b)| <= |f(a)|
    if fa.abs() < fb.abs() {
        std::mem::swap(&mut a, &mut b);
        std::mem::swap(&mut fa, &mut fb);
    }

    let mut c = a;
    let mut fc = fa;
    let mut d = b - a;
    let mut e = d;

    while iterations < max_iterations {
        iterations += 1;

        if fb.abs() < tolerance {
            return Ok(RootResult {
                root: b,
                iterations,
                residual: fb.abs(),
            });
        }

        if fa.abs() < fb.abs() {
            a = b;
            b = c;
            c = a;
            fa = fb;
            fb = fc;
            fc = fa;
        }

        let tolerance_scaled = 2.0 * f64::EPSILON * b.abs() + 0.5 * tolerance;
        let m = 0.5 * (c - b);

        if m.abs() <= tolerance_scaled {
            return Ok(RootResult {
                root: b,
                iterations,
                residual: fb.abs(),
            });
        }

        if e.abs() >= tolerance_scaled && fc.abs() > fb.abs() {
            // Fall back to bisection when the denominators get too small
            if fc.abs() < f64::EPSILON || fa.abs() < f64::EPSILON {
                d = m;
                e = m;
            } else {
                let s = fb / fc;
                let mut p;
                let mut q;

                if (a - c).abs() < f64::EPSILON {
                    // Linear interpolation
                    p = 2.0 * m * s;
                    q = 1.0 - s;
                } else {
                    // Inverse quadratic interpolation
                    q = fc / fa;
                    let r = fb / fa;
                    p = s * (2.0 * m * q * (q - r) - (b - a) * (r - 1.0));
                    q = (q - 1.0) * (r - 1.0) * (s - 1.0);
                }

                if p > 0.0 {
                    q = -q;
                } else {
                    p = -p;
                }

                let s = e;
                e = d;

                if q.abs() > f64::EPSILON
                    && 2.0 * p < 3.0 * m * q - (tolerance_scaled * q).abs()
                    && p < (0.5 * s * q).abs()
                {
                    d = p / q;
                } else {
                    d = m;
                    e = d;
                }
            }
        } else {
            d = m;
            e = d;
        }

        a = b;
        fa = fb;

        if d.abs() > tolerance_scaled {
            b += d;
        } else if m > 0.0 {
            b += tolerance_scaled;
        } else {
            b -= tolerance_scaled;
        }

        fb = f(b)?;

        if (fc * fb) > 0.0 {
            c = a;
            fc = fa;
            e = b - a;
            d = e;
        }
    }

    Err(BowError::ConvergenceFailure {
        operation,
        iterations,
        residual: fb.abs(),
    })
}

/// Expand a bracket geometrically from `start` until `f` changes sign.
///
/// Probes `start + step`, doubling the offset up to `cap`, then retries
/// in the negative direction. A probe that diverges numerically ends the
/// expansion in that direction. Returns the bracketing interval, or a
/// `ConvergenceFailure` when no sign change is found.
pub fn expand_bracket<F>(
    f: &mut F,
    start: f64,
    initial_step: f64,
    cap: f64,
    operation: &'static str,
) -> Result<(f64, f64), BowError>
where
    F: FnMut(f64) -> Result<f64, BowError>,
{
    let f_start = f(start)?;
    if f_start == 0.0 {
        return Ok((start, start));
    }

    let mut attempts = 0;
    for direction in [1.0, -1.0] {
        let mut offset = initial_step;
        while offset <= cap {
            attempts += 1;
            let probe = start + direction * offset;
            match f(probe) {
                Ok(f_probe) => {
                    if f_start * f_probe <= 0.0 {
                        return if direction > 0.0 {
                            Ok((start, probe))
                        } else {
                            Ok((probe, start))
                        };
                    }
                }
                // The probe left the region where the bending line can be
                // integrated; no bracket lies further out this way.
                Err(BowError::NumericalDivergence { .. }) => break,
                Err(e) => return Err(e),
            }
            offset *= 2.0;
        }
    }

    Err(BowError::ConvergenceFailure {
        operation,
        iterations: attempts,
        residual: f_start.abs(),
    })
}
