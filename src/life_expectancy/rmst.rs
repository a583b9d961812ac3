//! Restricted mean survival time and life-years lost

use log::warn;
use serde::Serialize;

use super::curve::SurvivalCurve;
use crate::error::{AnalysisError, Result};

/// Residual life expectancy between `floor` and `horizon`, conditional on being alive at `floor`.
///
/// Trapezoidal integration over the curve's grid points inside the range,
/// with interpolated end points. Any undefined point inside the range is a
/// `MissingData` error; the integral is never silently shortened.
pub fn restricted_mean(curve: &SurvivalCurve, floor: f64, horizon: f64) -> Result<f64> {
    if !(horizon > floor) {
        return Err(AnalysisError::InvalidInput(format!(
            "life-expectancy horizon {} must exceed floor {}",
            horizon, floor
        )));
    }
    let missing = |age: f64| AnalysisError::MissingData { age, floor, horizon };

    if floor < curve.first_age() {
        return Err(missing(floor));
    }
    if horizon > curve.last_age() {
        return Err(missing(curve.last_age()));
    }

    let mut points: Vec<(f64, f64)> = Vec::with_capacity(curve.ages().len() + 2);
    points.push((floor, curve.value_at(floor).ok_or_else(|| missing(floor))?));
    for (&age, &s) in curve.ages().iter().zip(curve.survival()) {
        if age > floor && age < horizon {
            if s.is_nan() {
                return Err(missing(age));
            }
            points.push((age, s));
        }
    }
    points.push((horizon, curve.value_at(horizon).ok_or_else(|| missing(horizon))?));

    let at_floor = points[0].1;
    if at_floor <= 0.0 {
        return Err(AnalysisError::StatisticalUndefined {
            key: format!("age {}", floor),
            reason: "no survivors at the life-expectancy floor".to_string(),
        });
    }

    let area: f64 = points
        .windows(2)
        .map(|w| 0.5 * (w[0].1 + w[1].1) * (w[1].0 - w[0].0))
        .sum();
    Ok(area / at_floor)
}

/// Observed and expected curves for one group
#[derive(Debug, Clone)]
pub struct LifeExpectancyInput {
    pub key: String,
    pub observed: SurvivalCurve,
    pub expected: SurvivalCurve,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifeExpectancyRow {
    pub key: String,
    pub observed: Option<f64>,
    pub expected: Option<f64>,
    /// Expected minus observed; signed, never clamped
    pub years_lost: Option<f64>,
    /// "ok" or the reason this group has no estimate
    pub status: String,
}

/// Life expectancy for every group; a failing group is reported in its row without affecting the others
pub fn life_expectancy_table(inputs: &[LifeExpectancyInput], floor: f64, horizon: f64) -> Vec<LifeExpectancyRow> {
    inputs
        .iter()
        .map(|input| {
            let result = restricted_mean(&input.observed, floor, horizon)
                .and_then(|obs| restricted_mean(&input.expected, floor, horizon).map(|exp| (obs, exp)));
            match result {
                Ok((observed, expected)) => LifeExpectancyRow {
                    key: input.key.clone(),
                    observed: Some(observed),
                    expected: Some(expected),
                    years_lost: Some(expected - observed),
                    status: "ok".to_string(),
                },
                Err(err) => {
                    warn!("Life expectancy for {} unavailable: {}", input.key, err);
                    LifeExpectancyRow {
                        key: input.key.clone(),
                        observed: None,
                        expected: None,
                        years_lost: None,
                        status: err.to_string(),
                    }
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn gompertz(age: f64) -> f64 {
        // Smooth survival from age 0 with hazard 1e-4 * exp(0.09 a)
        (-(1e-4 / 0.09) * ((0.09 * age).exp() - 1.0)).exp()
    }

    #[test]
    fn test_constant_survival_gives_interval_length() {
        let curve = SurvivalCurve::from_fn(0.0, 80.0, 1.0, |_| 1.0).unwrap();
        assert_abs_diff_eq!(restricted_mean(&curve, 20.0, 80.0).unwrap(), 60.0, epsilon = 1e-9);
    }

    #[test]
    fn test_linear_curve_is_exact_with_interpolated_ends() {
        let curve = SurvivalCurve::from_fn(0.0, 100.0, 10.0, |a| 1.0 - a / 100.0).unwrap();
        // Conditional on S(15) = 0.85: integral of (1 - a/100) from 15 to 75 / 0.85
        let integral = (75.0 - 15.0) - (75.0_f64.powi(2) - 15.0_f64.powi(2)) / 200.0;
        assert_abs_diff_eq!(restricted_mean(&curve, 15.0, 75.0).unwrap(), integral / 0.85, epsilon = 1e-9);
    }

    #[test]
    fn test_stable_under_grid_refinement() {
        let coarse = SurvivalCurve::from_fn(0.0, 80.0, 0.5, gompertz).unwrap();
        let fine = SurvivalCurve::from_fn(0.0, 80.0, 0.25, gompertz).unwrap();
        let le_coarse = restricted_mean(&coarse, 10.0, 80.0).unwrap();
        let le_fine = restricted_mean(&fine, 10.0, 80.0).unwrap();
        assert!(((le_coarse - le_fine) / le_fine).abs() < 1e-3);
    }

    #[test]
    fn test_missing_data_is_an_error() {
        let curve = SurvivalCurve::new(vec![0.0, 10.0, 20.0, 30.0], vec![1.0, 0.9, f64::NAN, 0.7]).unwrap();
        assert!(matches!(
            restricted_mean(&curve, 0.0, 30.0),
            Err(AnalysisError::MissingData { .. })
        ));
        // Horizon past the end of the curve
        assert!(matches!(
            restricted_mean(&curve, 0.0, 40.0),
            Err(AnalysisError::MissingData { .. })
        ));
        assert!(restricted_mean(&curve, 0.0, 10.0).is_ok());
    }

    #[test]
    fn test_table_isolates_failures_and_keeps_sign() {
        let better = SurvivalCurve::from_fn(0.0, 80.0, 1.0, |a| 1.0 - a / 200.0).unwrap();
        let worse = SurvivalCurve::from_fn(0.0, 80.0, 1.0, |a| 1.0 - a / 100.0).unwrap();
        let truncated = SurvivalCurve::from_fn(0.0, 50.0, 1.0, |_| 1.0).unwrap();

        let rows = life_expectancy_table(
            &[
                LifeExpectancyInput { key: "loss".to_string(), observed: worse.clone(), expected: better.clone() },
                LifeExpectancyInput { key: "gain".to_string(), observed: better.clone(), expected: worse },
                LifeExpectancyInput { key: "short".to_string(), observed: truncated, expected: better },
            ],
            0.0,
            80.0,
        );

        assert!(rows[0].years_lost.unwrap() > 0.0);
        assert!(rows[1].years_lost.unwrap() < 0.0);
        assert_abs_diff_eq!(rows[0].years_lost.unwrap(), -rows[1].years_lost.unwrap(), epsilon = 1e-9);
        assert_eq!(rows[0].status, "ok");
        assert_eq!(rows[2].years_lost, None);
        assert!(rows[2].status.contains("undefined"));
    }
}
