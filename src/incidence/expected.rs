//! Expected cumulative mortality from reference hazards (Ederer I)
//!
//! Each subject contributes a reference profile (sex, birth time). For every
//! profile the reference all-cause and cause-specific hazards are integrated
//! over an attained-age grid assuming piecewise-constant hazards within each
//! step; the cohort curve is the unweighted mean across profiles.

use serde::Serialize;

use crate::cohort::{Sex, Subject, TargetCause};
use crate::error::{AnalysisError, Result};
use crate::reference::ReferenceRateTable;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReferenceProfile {
    pub sex: Sex,
    /// Decimal calendar year of birth
    pub birth_time: f64,
}

impl ReferenceProfile {
    pub fn from_subjects(subjects: &[Subject]) -> Vec<Self> {
        subjects
            .iter()
            .map(|s| ReferenceProfile {
                sex: s.sex,
                birth_time: s.birth_time(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpectedPoint {
    pub age: f64,
    /// Expected cumulative mortality from the target cause, percent
    pub incidence_pct: f64,
    /// Expected all-cause survival, percent
    pub survival_pct: f64,
}

/// Evaluation grid from `start` to `end` inclusive; the last step is shortened to land on `end`
pub fn age_grid(start: f64, end: f64, step: f64) -> Result<Vec<f64>> {
    if !(step > 0.0) || !(end > start) || !start.is_finite() || !end.is_finite() {
        return Err(AnalysisError::InvalidInput(format!(
            "invalid age grid {} to {} by {}",
            start, end, step
        )));
    }
    let steps = ((end - start) / step - 1e-9).ceil() as usize;
    let mut grid: Vec<f64> = (0..steps).map(|i| start + step * i as f64).collect();
    grid.push(end);
    Ok(grid)
}

/// Expected cumulative incidence of `cause` and all-cause survival on an age grid
pub fn expected_incidence(
    rates: &ReferenceRateTable,
    profiles: &[ReferenceProfile],
    cause: TargetCause,
    start_age: f64,
    end_age: f64,
    step: f64,
) -> Result<Vec<ExpectedPoint>> {
    if profiles.is_empty() {
        return Err(AnalysisError::InvalidInput("no reference profiles".to_string()));
    }
    let grid = age_grid(start_age, end_age, step)?;
    let mut incidence = vec![0.0; grid.len()];
    let mut survival = vec![0.0; grid.len()];

    for profile in profiles {
        let mut s = 1.0_f64;
        let mut f = 0.0_f64;
        incidence[0] += f;
        survival[0] += s;
        for (i, w) in grid.windows(2).enumerate() {
            let width = w[1] - w[0];
            let mid = 0.5 * (w[0] + w[1]);
            let year = profile.birth_time + mid;
            let h_all = rates.rate(profile.sex, TargetCause::AllCauses, mid, year)?;
            let h_cause = match cause {
                TargetCause::AllCauses => h_all,
                specific => rates.rate(profile.sex, specific, mid, year)?,
            };

            if h_all > 0.0 {
                f += s * (h_cause / h_all) * (1.0 - (-h_all * width).exp());
                s *= (-h_all * width).exp();
            } else {
                f += s * h_cause * width;
            }
            incidence[i + 1] += f;
            survival[i + 1] += s;
        }
    }

    let n = profiles.len() as f64;
    Ok(grid
        .into_iter()
        .zip(incidence.into_iter().zip(survival))
        .map(|(age, (f, s))| ExpectedPoint {
            age,
            incidence_pct: 100.0 * f / n,
            survival_pct: 100.0 * s / n,
        })
        .collect())
}
