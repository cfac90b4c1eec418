//! Force-draw curve sweeps.
//!
//! Equilibrium solves at different draw lengths are independent, so a
//! sweep fans out across worker threads. This is the library-native
//! replacement for looping a plotting script over draw lengths.

use rayon::prelude::*;

use crate::equilibrium::BowModel;
use crate::error::BowError;

/// One point of a force-draw curve.
#[derive(Debug, Clone)]
pub struct DrawCurvePoint {
    /// Draw length b
    pub draw: f64,
    /// String tension K
    pub force: f64,
    /// String angle alpha, radians
    pub string_angle: f64,
    /// Axial force on the archer, both limbs
    pub draw_force: f64,
}

/// Uniformly spaced draw lengths over `[start, end]`, inclusive.
pub fn uniform_draws(start: f64, end: f64, count: usize) -> Vec<f64> {
    assert!(count >= 2, "a sweep needs at least two draw lengths");
    (0..count)
        .map(|i| start + (end - start) * i as f64 / (count - 1) as f64)
        .collect()
}

/// Solve the equilibrium at every draw length in parallel.
///
/// Results come back in input order; a failing solve aborts the sweep
/// and its error is returned.
pub fn draw_force_curve(
    model: &BowModel,
    draws: &[f64],
) -> Result<Vec<DrawCurvePoint>, BowError> {
    draws
        .par_iter()
        .map(|&draw| {
            let solution = model.solve_equilibrium(draw)?;
            Ok(DrawCurvePoint {
                draw,
                force: solution.force,
                string_angle: solution.string_angle,
                draw_force: solution.draw_force(),
            })
        })
        .collect()
}

/// Energy stored in the bow at each point of a force-draw curve,
/// relative to the first point, by trapezoidal integration of the draw
/// force over the draw length.
pub fn stored_energy(curve: &[DrawCurvePoint]) -> Vec<f64> {
    let mut energy = Vec::with_capacity(curve.len());
    let mut total = 0.0;
    for (i, point) in curve.iter().enumerate() {
        if i > 0 {
            let prev = &curve[i - 1];
            total += 0.5 * (prev.draw_force + point.draw_force) * (point.draw - prev.draw);
        }
        energy.push(total);
    }
    energy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equilibrium::SolverSettings;

    fn reference_bow() -> BowModel {
        BowModel::with_string_length(
            |_s: f64| 0.0,
            |s: f64| 10.0 - (5.0 / 0.8) * s,
            0.8,
            0.75,
            SolverSettings::default(),
        )
    }

    #[test]
    fn test_uniform_draws() {
        let draws = uniform_draws(0.25, 0.7, 5);
        assert_eq!(draws.len(), 5);
        assert!((draws[0] - 0.25).abs() < 1e-15);
        assert!((draws[4] - 0.7).abs() < 1e-15);
        assert!((draws[2] - 0.475).abs() < 1e-12);
    }

    #[test]
    fn test_draw_force_is_monotone() {
        let model = reference_bow();
        let curve = draw_force_curve(&model, &[0.3, 0.4, 0.5]).unwrap();

        assert_eq!(curve.len(), 3);
        assert!((curve[0].draw - 0.3).abs() < 1e-15);
        assert!(curve[0].draw_force <= curve[1].draw_force);
        assert!(curve[1].draw_force <= curve[2].draw_force);

        // Pinned from the model: the axial force roughly triples over
        // this range while the string tension itself relaxes.
        assert!((curve[0].draw_force - 3.8896).abs() < 1e-3);
        assert!((curve[2].draw_force - 12.3854).abs() < 1e-3);
        assert!(curve[0].force > curve[2].force);
    }

    #[test]
    fn test_stored_energy_accumulates() {
        let model = reference_bow();
        let curve = draw_force_curve(&model, &uniform_draws(0.3, 0.6, 4)).unwrap();
        let energy = stored_energy(&curve);

        assert_eq!(energy.len(), curve.len());
        assert_eq!(energy[0], 0.0);
        assert!(energy.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_sweep_propagates_failure() {
        // A slack string cannot reach equilibrium at any draw length
        let model = BowModel::with_string_length(
            |_s: f64| 0.0,
            |s: f64| 10.0 - (5.0 / 0.8) * s,
            0.8,
            0.85,
            SolverSettings::default(),
        );
        let result = draw_force_curve(&model, &[0.3, 0.4]);
        assert!(result.is_err());
    }
}
