//! Subject record and the categorical types shared across the pipeline

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Sex of a subject, also the first key of every reference-rate cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    #[serde(alias = "M", alias = "m", alias = "Male", alias = "1")]
    Male,
    #[serde(alias = "F", alias = "f", alias = "Female", alias = "2")]
    Female,
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sex::Male => write!(f, "male"),
            Sex::Female => write!(f, "female"),
        }
    }
}

/// Underlying cause-of-death category recorded for a deceased subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CauseOfDeath {
    /// Recurrence or progression of the primary cancer
    Recurrence,
    SubsequentNeoplasm,
    Cardiac,
    Cerebrovascular,
    Pulmonary,
    External,
    Other,
}

impl CauseOfDeath {
    pub const ALL: [CauseOfDeath; 7] = [
        CauseOfDeath::Recurrence,
        CauseOfDeath::SubsequentNeoplasm,
        CauseOfDeath::Cardiac,
        CauseOfDeath::Cerebrovascular,
        CauseOfDeath::Pulmonary,
        CauseOfDeath::External,
        CauseOfDeath::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CauseOfDeath::Recurrence => "recurrence",
            CauseOfDeath::SubsequentNeoplasm => "subsequent_neoplasm",
            CauseOfDeath::Cardiac => "cardiac",
            CauseOfDeath::Cerebrovascular => "cerebrovascular",
            CauseOfDeath::Pulmonary => "pulmonary",
            CauseOfDeath::External => "external",
            CauseOfDeath::Other => "other",
        }
    }
}

impl FromStr for CauseOfDeath {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        CauseOfDeath::ALL
            .iter()
            .copied()
            .find(|cause| cause.label() == normalized)
            .ok_or_else(|| AnalysisError::InvalidInput(format!("unknown cause of death '{}'", s)))
    }
}

/// The outcome an analysis counts as an event.
///
/// `AllCauses` matches any recorded death; `Specific` matches one category and
/// treats every other death as censoring (or as a competing event in the
/// cumulative incidence estimator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TargetCause {
    AllCauses,
    Specific(CauseOfDeath),
}

impl TargetCause {
    /// Does a recorded outcome count as an event for this target
    pub fn matches(&self, outcome: Option<CauseOfDeath>) -> bool {
        match (self, outcome) {
            (_, None) => false,
            (TargetCause::AllCauses, Some(_)) => true,
            (TargetCause::Specific(target), Some(cause)) => *target == cause,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TargetCause::AllCauses => "all_causes",
            TargetCause::Specific(cause) => cause.label(),
        }
    }
}

impl fmt::Display for TargetCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TargetCause {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "all_causes" | "any" | "any_cause" => Ok(TargetCause::AllCauses),
            other => other.parse().map(TargetCause::Specific),
        }
    }
}

impl TryFrom<String> for TargetCause {
    type Error = AnalysisError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TargetCause> for String {
    fn from(value: TargetCause) -> Self {
        value.label().to_string()
    }
}

/// Convert a calendar date to a decimal year (2005-01-01 -> 2005.0)
pub fn decimal_year(date: NaiveDate) -> f64 {
    let year = date.year();
    let days_in_year = if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366.0
    } else {
        365.0
    };
    year as f64 + (date.ordinal0() as f64) / days_in_year
}

/// One study participant, followed from diagnosis (entry) to death or censoring (exit)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub subject_id: String,
    pub sex: Sex,
    pub birth_date: NaiveDate,
    /// Date of diagnosis
    pub entry_date: NaiveDate,
    /// Date of death or censoring
    pub exit_date: NaiveDate,
    /// Diagnosis category (e.g. "leukaemia", "cns")
    pub diagnosis: String,
    /// Recorded cause if the subject died within the observation window
    pub cause_of_death: Option<CauseOfDeath>,
}

impl Subject {
    /// Check the date ordering invariant: birth <= entry <= exit
    pub fn validate(&self) -> Result<()> {
        if self.entry_date < self.birth_date {
            return Err(self.integrity("entry date precedes birth date"));
        }
        if self.exit_date < self.entry_date {
            return Err(self.integrity("exit date precedes entry date"));
        }
        Ok(())
    }

    pub fn died(&self) -> bool {
        self.cause_of_death.is_some()
    }

    /// Decimal calendar time of birth, the origin of the age scale
    pub fn birth_time(&self) -> f64 {
        decimal_year(self.birth_date)
    }

    pub fn entry_age(&self) -> f64 {
        decimal_year(self.entry_date) - self.birth_time()
    }

    pub fn exit_age(&self) -> f64 {
        decimal_year(self.exit_date) - self.birth_time()
    }

    /// Total follow-up in years
    pub fn follow_up(&self) -> f64 {
        self.exit_age() - self.entry_age()
    }

    pub fn diagnosis_year(&self) -> i32 {
        self.entry_date.year()
    }

    pub(crate) fn integrity(&self, reason: impl Into<String>) -> AnalysisError {
        AnalysisError::DataIntegrity {
            subject_id: self.subject_id.clone(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn subject(entry: NaiveDate, exit: NaiveDate) -> Subject {
        Subject {
            subject_id: "S1".to_string(),
            sex: Sex::Female,
            birth_date: date(2000, 1, 1),
            entry_date: entry,
            exit_date: exit,
            diagnosis: "leukaemia".to_string(),
            cause_of_death: None,
        }
    }

    #[test]
    fn test_decimal_year() {
        assert_eq!(decimal_year(date(2005, 1, 1)), 2005.0);
        assert_abs_diff_eq!(decimal_year(date(2001, 7, 2)), 2001.0 + 182.0 / 365.0, epsilon = 1e-12);
        // Leap year uses 366 days
        assert_abs_diff_eq!(decimal_year(date(2004, 12, 31)), 2004.0 + 365.0 / 366.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ages_and_follow_up() {
        let s = subject(date(2005, 1, 1), date(2010, 1, 1));
        assert_abs_diff_eq!(s.entry_age(), 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.exit_age(), 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.follow_up(), 5.0, epsilon = 1e-12);
        assert_eq!(s.diagnosis_year(), 2005);
    }

    #[test]
    fn test_validate_rejects_exit_before_entry() {
        let s = subject(date(2005, 1, 1), date(2004, 1, 1));
        match s.validate() {
            Err(AnalysisError::DataIntegrity { subject_id, .. }) => assert_eq!(subject_id, "S1"),
            other => panic!("expected data integrity error, got {:?}", other),
        }
    }

    #[test]
    fn test_target_cause_matching() {
        let cardiac = TargetCause::Specific(CauseOfDeath::Cardiac);
        assert!(cardiac.matches(Some(CauseOfDeath::Cardiac)));
        assert!(!cardiac.matches(Some(CauseOfDeath::Pulmonary)));
        assert!(!cardiac.matches(None));
        assert!(TargetCause::AllCauses.matches(Some(CauseOfDeath::Pulmonary)));
    }

    #[test]
    fn test_target_cause_parsing() {
        assert_eq!("all".parse::<TargetCause>().unwrap(), TargetCause::AllCauses);
        assert_eq!(
            "Subsequent neoplasm".parse::<TargetCause>().unwrap(),
            TargetCause::Specific(CauseOfDeath::SubsequentNeoplasm)
        );
        assert!("influenza".parse::<TargetCause>().is_err());
    }
}
