//! Observed, expected and person-time totals per stratum

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cohort::{Subject, TargetCause};
use crate::episodes::Episode;

/// How episodes are grouped into strata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    Overall,
    AttainedAge,
    CalendarPeriod,
    DiagnosisDecade,
    Diagnosis,
    Sex,
}

impl Grouping {
    /// Sort value and display label of the stratum an episode belongs to
    pub fn key(&self, ep: &Episode) -> (f64, String) {
        match self {
            Grouping::Overall => (0.0, "overall".to_string()),
            Grouping::AttainedAge => match ep.age_band {
                Some(band) => (band, format!("{}", band)),
                None => (f64::NEG_INFINITY, "below first band".to_string()),
            },
            Grouping::CalendarPeriod => (ep.period_band, format!("{}", ep.period_band)),
            Grouping::DiagnosisDecade => {
                let decade = ep.diagnosis_year.div_euclid(10) * 10;
                (decade as f64, format!("{}s", decade))
            }
            Grouping::Diagnosis => (0.0, ep.diagnosis.clone()),
            Grouping::Sex => (0.0, ep.sex.to_string()),
        }
    }

    /// Stratum label for a whole subject; `None` for groupings that vary over follow-up
    pub fn subject_key(&self, subject: &Subject) -> Option<String> {
        match self {
            Grouping::Overall => Some("overall".to_string()),
            Grouping::DiagnosisDecade => {
                Some(format!("{}s", subject.diagnosis_year().div_euclid(10) * 10))
            }
            Grouping::Diagnosis => Some(subject.diagnosis.clone()),
            Grouping::Sex => Some(subject.sex.to_string()),
            Grouping::AttainedAge | Grouping::CalendarPeriod => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Grouping::Overall => "overall",
            Grouping::AttainedAge => "attained_age",
            Grouping::CalendarPeriod => "calendar_period",
            Grouping::DiagnosisDecade => "diagnosis_decade",
            Grouping::Diagnosis => "diagnosis",
            Grouping::Sex => "sex",
        }
    }
}

/// Totals for one (grouping key, cause) stratum
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StratumAggregate {
    pub grouping: Grouping,
    pub key: String,
    pub cause: TargetCause,
    /// Observed deaths (d)
    pub observed: u64,
    /// Expected deaths (e)
    pub expected: f64,
    /// Person-years at risk (y)
    pub person_years: f64,
}

/// Aggregate episodes per cause and stratum.
///
/// Output is ordered by cause, then by the stratum's natural order (numeric
/// for age, period and decade groupings, alphabetical otherwise).
pub fn aggregate(episodes: &[Episode], grouping: Grouping) -> Vec<StratumAggregate> {
    let mut strata: HashMap<(TargetCause, String), (f64, StratumAggregate)> = HashMap::new();

    for ep in episodes {
        let (order, key) = grouping.key(ep);
        let (_, agg) = strata
            .entry((ep.cause, key.clone()))
            .or_insert_with(|| {
                (
                    order,
                    StratumAggregate {
                        grouping,
                        key,
                        cause: ep.cause,
                        observed: 0,
                        expected: 0.0,
                        person_years: 0.0,
                    },
                )
            });
        agg.observed += ep.events();
        agg.expected += ep.expected();
        agg.person_years += ep.duration();
    }

    let mut rows: Vec<(f64, StratumAggregate)> = strata.into_values().collect();
    rows.sort_by(|(oa, a), (ob, b)| {
        a.cause
            .cmp(&b.cause)
            .then_with(|| oa.total_cmp(ob))
            .then_with(|| a.key.cmp(&b.key))
    });
    rows.into_iter().map(|(_, agg)| agg).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::{CauseOfDeath, Sex};
    use approx::assert_abs_diff_eq;

    fn episode(id: &str, cause: TargetCause, start: f64, end: f64, band: f64, event: bool) -> Episode {
        Episode {
            subject_id: id.to_string(),
            sex: Sex::Female,
            diagnosis: "wilms".to_string(),
            diagnosis_year: 1987,
            cause,
            start_age: start,
            end_age: end,
            calendar_start: 1990.0 + start,
            age_band: Some(band),
            period_band: 1990.0,
            event,
            rate: 0.01,
        }
    }

    #[test]
    fn test_attained_age_strata_sorted_numerically() {
        let all = TargetCause::AllCauses;
        let eps = vec![
            episode("A", all, 10.0, 12.0, 10.0, true),
            episode("A", all, 5.0, 10.0, 5.0, false),
            episode("B", all, 6.0, 10.0, 5.0, false),
        ];
        let aggs = aggregate(&eps, Grouping::AttainedAge);
        assert_eq!(aggs.len(), 2);
        assert_eq!(aggs[0].key, "5");
        assert_eq!(aggs[1].key, "10");

        assert_eq!(aggs[0].observed, 0);
        assert_abs_diff_eq!(aggs[0].person_years, 9.0, epsilon = 1e-12);
        assert_abs_diff_eq!(aggs[0].expected, 0.09, epsilon = 1e-12);
        assert_eq!(aggs[1].observed, 1);
    }

    #[test]
    fn test_causes_are_kept_apart() {
        let cardiac = TargetCause::Specific(CauseOfDeath::Cardiac);
        let eps = vec![
            episode("A", TargetCause::AllCauses, 5.0, 10.0, 5.0, true),
            episode("A", cardiac, 5.0, 10.0, 5.0, false),
        ];
        let aggs = aggregate(&eps, Grouping::Overall);
        assert_eq!(aggs.len(), 2);
        assert_eq!(aggs[0].cause, TargetCause::AllCauses);
        assert_eq!(aggs[0].observed, 1);
        assert_eq!(aggs[1].cause, cardiac);
        assert_eq!(aggs[1].observed, 0);
    }

    #[test]
    fn test_diagnosis_decade_label() {
        let ep = episode("A", TargetCause::AllCauses, 5.0, 10.0, 5.0, false);
        assert_eq!(Grouping::DiagnosisDecade.key(&ep), (1980.0, "1980s".to_string()));
    }
}
