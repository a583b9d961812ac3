//! Run configuration loaded from JSON

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cohort::{CauseOfDeath, InvalidRowPolicy, TargetCause};
use crate::error::{AnalysisError, Result};
use crate::estimates::{EstimateOptions, Grouping};
use crate::reference::{AgeBands, CutPoints, PeriodBands};

/// Everything a run needs besides the two input tables.
///
/// Every field has a default, so `{}` is a valid configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Attained-age cut points for episode splitting
    #[serde(default = "default_age_cuts")]
    pub age_cuts: AgeBands,

    /// Calendar-year cut points for episode splitting
    #[serde(default = "default_period_cuts")]
    pub period_cuts: PeriodBands,

    /// Target causes analysed; `all_causes` plus every specific cause by default
    #[serde(default = "default_causes")]
    pub causes: Vec<TargetCause>,

    /// Stratifications reported in the SMR/AER table
    #[serde(default = "default_groupings")]
    pub groupings: Vec<Grouping>,

    #[serde(default)]
    pub estimates: EstimateOptions,

    #[serde(default)]
    pub invalid_rows: InvalidRowPolicy,

    /// Subject-level stratification for incidence curves and life expectancy
    #[serde(default = "default_curve_grouping")]
    pub curve_grouping: Grouping,

    /// Grid step (years) for expected incidence and survival curves
    #[serde(default = "default_grid_step")]
    pub grid_step: f64,

    /// Age from which residual life expectancy is measured
    #[serde(default = "default_le_floor")]
    pub le_floor: f64,

    /// Upper age of the restricted mean
    #[serde(default = "default_le_horizon")]
    pub le_horizon: f64,
}

fn default_age_cuts() -> AgeBands {
    CutPoints::regular(0.0, 5.0, 20)
}
fn default_period_cuts() -> PeriodBands {
    CutPoints::regular(1950.0, 5.0, 16)
}
fn default_causes() -> Vec<TargetCause> {
    std::iter::once(TargetCause::AllCauses)
        .chain(CauseOfDeath::ALL.iter().map(|&c| TargetCause::Specific(c)))
        .collect()
}
fn default_groupings() -> Vec<Grouping> {
    vec![
        Grouping::Overall,
        Grouping::AttainedAge,
        Grouping::CalendarPeriod,
        Grouping::DiagnosisDecade,
        Grouping::Diagnosis,
    ]
}
fn default_curve_grouping() -> Grouping { Grouping::DiagnosisDecade }
fn default_grid_step() -> f64 { 0.5 }
fn default_le_floor() -> f64 { 20.0 }
fn default_le_horizon() -> f64 { 80.0 }

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            age_cuts: default_age_cuts(),
            period_cuts: default_period_cuts(),
            causes: default_causes(),
            groupings: default_groupings(),
            estimates: EstimateOptions::default(),
            invalid_rows: InvalidRowPolicy::default(),
            curve_grouping: default_curve_grouping(),
            grid_step: default_grid_step(),
            le_floor: default_le_floor(),
            le_horizon: default_le_horizon(),
        }
    }
}

impl AnalysisConfig {
    /// Read and validate a JSON config file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.causes.is_empty() {
            return Err(AnalysisError::InvalidInput("at least one target cause is required".to_string()));
        }
        if matches!(self.curve_grouping, Grouping::AttainedAge | Grouping::CalendarPeriod) {
            return Err(AnalysisError::InvalidInput(format!(
                "curve grouping '{}' changes during follow-up",
                self.curve_grouping.label()
            )));
        }
        if !(self.grid_step > 0.0) {
            return Err(AnalysisError::InvalidInput(format!("grid step must be positive, got {}", self.grid_step)));
        }
        if !(self.le_horizon > self.le_floor) || self.le_floor < 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "life-expectancy range [{}, {}] is empty",
                self.le_floor, self.le_horizon
            )));
        }
        if !(self.estimates.person_time_scale > 0.0) {
            return Err(AnalysisError::InvalidInput("person-time scale must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = AnalysisConfig::from_json_str("{}").unwrap();
        assert_eq!(config.age_cuts.first(), 0.0);
        assert_eq!(config.age_cuts.last(), 100.0);
        assert_eq!(config.causes.len(), 1 + CauseOfDeath::ALL.len());
        assert_eq!(config.causes[0], TargetCause::AllCauses);
        assert_eq!(config.estimates.person_time_scale, 10_000.0);
        assert_eq!(config.invalid_rows, InvalidRowPolicy::Abort);
        assert_eq!(config.le_horizon, 80.0);
    }

    #[test]
    fn test_overrides() {
        let json = r#"{
            "age_cuts": [0, 20, 40, 60],
            "causes": ["all_causes", "cardiac"],
            "groupings": ["overall", "sex"],
            "estimates": {"person_time_scale": 100000, "non_negative_display": true},
            "invalid_rows": "drop",
            "curve_grouping": "diagnosis",
            "le_floor": 15,
            "le_horizon": 60
        }"#;
        let config = AnalysisConfig::from_json_str(json).unwrap();
        assert_eq!(config.age_cuts.as_slice(), &[0.0, 20.0, 40.0, 60.0]);
        assert_eq!(
            config.causes,
            vec![TargetCause::AllCauses, TargetCause::Specific(CauseOfDeath::Cardiac)]
        );
        assert_eq!(config.groupings, vec![Grouping::Overall, Grouping::Sex]);
        assert_eq!(config.estimates.person_time_scale, 100_000.0);
        assert_eq!(config.estimates.smr_decimals, 2);
        assert!(config.estimates.non_negative_display);
        assert_eq!(config.invalid_rows, InvalidRowPolicy::Drop);
        assert_eq!(config.curve_grouping, Grouping::Diagnosis);
    }

    #[test]
    fn test_rejects_invalid_settings() {
        assert!(AnalysisConfig::from_json_str(r#"{"age_cuts": [10, 5]}"#).is_err());
        assert!(AnalysisConfig::from_json_str(r#"{"causes": []}"#).is_err());
        assert!(AnalysisConfig::from_json_str(r#"{"curve_grouping": "attained_age"}"#).is_err());
        assert!(AnalysisConfig::from_json_str(r#"{"le_floor": 80, "le_horizon": 60}"#).is_err());
        assert!(AnalysisConfig::from_json_str(r#"{"causes": ["heartache"]}"#).is_err());
    }
}
