//! Survival curves evaluated on an age grid

use serde::Serialize;

use crate::cohort::TargetCause;
use crate::error::{AnalysisError, Result};
use crate::incidence::{age_grid, expected_incidence, IncidenceCurve, ReferenceProfile};
use crate::reference::ReferenceRateTable;

/// Survival probabilities S(age) on an increasing age grid.
///
/// `NaN` marks ages where the curve is not defined (e.g. beyond the last
/// follow-up time); integration over such a point fails.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurvivalCurve {
    ages: Vec<f64>,
    survival: Vec<f64>,
}

impl SurvivalCurve {
    pub fn new(ages: Vec<f64>, survival: Vec<f64>) -> Result<Self> {
        if ages.is_empty() || ages.len() != survival.len() {
            return Err(AnalysisError::InvalidInput(format!(
                "survival curve needs matching non-empty grids ({} ages, {} values)",
                ages.len(),
                survival.len()
            )));
        }
        if ages.iter().any(|a| !a.is_finite()) || ages.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AnalysisError::InvalidInput("survival curve ages must be finite and strictly increasing".to_string()));
        }
        if survival.iter().any(|s| !s.is_nan() && !(0.0..=1.0).contains(s)) {
            return Err(AnalysisError::InvalidInput("survival values must lie in [0, 1]".to_string()));
        }
        Ok(Self { ages, survival })
    }

    /// Sample a closed-form survival function on a regular grid
    pub fn from_fn<F>(start: f64, end: f64, step: f64, f: F) -> Result<Self>
    where
        F: Fn(f64) -> f64,
    {
        let ages = age_grid(start, end, step)?;
        let survival = ages.iter().map(|&a| f(a)).collect();
        Self::new(ages, survival)
    }

    /// Evaluate the all-cause survival step function of an incidence curve on a grid.
    ///
    /// Grid ages before the curve's origin or after its last follow-up time are undefined.
    pub fn from_incidence(curve: &IncidenceCurve, start: f64, end: f64, step: f64) -> Result<Self> {
        let origin = curve.points[0].time;
        let ages = age_grid(start, end, step)?;
        let survival = ages
            .iter()
            .map(|&a| {
                if a < origin || a > curve.end {
                    f64::NAN
                } else {
                    curve.at(a).survival_pct / 100.0
                }
            })
            .collect();
        Self::new(ages, survival)
    }

    /// Expected all-cause survival of a set of reference profiles (cohort average)
    pub fn from_reference(
        rates: &ReferenceRateTable,
        profiles: &[ReferenceProfile],
        start: f64,
        end: f64,
        step: f64,
    ) -> Result<Self> {
        let points = expected_incidence(rates, profiles, TargetCause::AllCauses, start, end, step)?;
        let (ages, survival) = points
            .into_iter()
            .map(|p| (p.age, (p.survival_pct / 100.0).clamp(0.0, 1.0)))
            .unzip();
        Self::new(ages, survival)
    }

    pub fn ages(&self) -> &[f64] {
        &self.ages
    }

    pub fn survival(&self) -> &[f64] {
        &self.survival
    }

    pub fn first_age(&self) -> f64 {
        self.ages[0]
    }

    pub fn last_age(&self) -> f64 {
        self.ages[self.ages.len() - 1]
    }

    /// Linearly interpolated survival at `age`; `None` outside the grid or where undefined
    pub fn value_at(&self, age: f64) -> Option<f64> {
        if age < self.first_age() || age > self.last_age() {
            return None;
        }
        let idx = self.ages.partition_point(|&a| a < age);
        let value = if self.ages[idx] == age {
            self.survival[idx]
        } else {
            let (a0, a1) = (self.ages[idx - 1], self.ages[idx]);
            let (s0, s1) = (self.survival[idx - 1], self.survival[idx]);
            s0 + (s1 - s0) * (age - a0) / (a1 - a0)
        };
        if value.is_nan() {
            None
        } else {
            Some(value)
        }
    }
}
