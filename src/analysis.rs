//! One full pass over a cohort: episodes, SMR/AER, incidence curves and life expectancy

use std::collections::{BTreeMap, HashSet};

use log::info;
use rayon::prelude::*;
use serde::Serialize;

use crate::cohort::{RejectedSubject, Subject, TargetCause};
use crate::config::AnalysisConfig;
use crate::episodes::EpisodeBuilder;
use crate::error::{AnalysisError, Result};
use crate::estimates::{aggregate, estimate_all, Estimate};
use crate::incidence::{
    competing_observations, expected_incidence, stratified_incidence, ExpectedPoint, ReferenceProfile,
    StratifiedIncidence,
};
use crate::life_expectancy::{life_expectancy_table, LifeExpectancyInput, LifeExpectancyRow, SurvivalCurve};
use crate::reference::ReferenceRateTable;

/// Reference-expected incidence for one group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpectedCurve {
    pub group: String,
    pub points: Vec<ExpectedPoint>,
}

/// Observed and expected cumulative incidence for one target cause
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CauseIncidence {
    pub cause: TargetCause,
    pub observed: StratifiedIncidence,
    pub expected: Vec<ExpectedCurve>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutput {
    /// Subjects excluded because their follow-up could not be split
    pub excluded: Vec<RejectedSubject>,
    pub subjects: usize,
    /// Total follow-up of the included subjects
    pub person_years: f64,
    pub estimates: Vec<Estimate>,
    pub incidence: Vec<CauseIncidence>,
    pub life_expectancy: Vec<LifeExpectancyRow>,
}

fn curve_key(config: &AnalysisConfig, subject: &Subject) -> String {
    config
        .curve_grouping
        .subject_key(subject)
        .unwrap_or_else(|| "overall".to_string())
}

fn group_subjects<'s>(config: &AnalysisConfig, subjects: &[&'s Subject]) -> BTreeMap<String, Vec<&'s Subject>> {
    let mut groups: BTreeMap<String, Vec<&Subject>> = BTreeMap::new();
    for &s in subjects {
        groups.entry(curve_key(config, s)).or_default().push(s);
    }
    groups
}

fn profiles(members: &[&Subject]) -> Vec<ReferenceProfile> {
    members
        .iter()
        .map(|s| ReferenceProfile { sex: s.sex, birth_time: s.birth_time() })
        .collect()
}

/// Run every configured analysis over a validated cohort.
///
/// Lookup failures abort the run; subjects with unusable follow-up are
/// excluded and listed; undefined strata and groups carry their own status.
pub fn run_analysis(
    subjects: &[Subject],
    rates: &ReferenceRateTable,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput> {
    config.validate()?;
    if subjects.is_empty() {
        return Err(AnalysisError::InvalidInput("cohort is empty".to_string()));
    }

    let builder = EpisodeBuilder::new(rates, config.age_cuts.clone(), config.period_cuts.clone());
    let episodes = builder.stack(subjects, &config.causes)?;
    info!(
        "Built {} episodes for {} causes ({} subjects excluded)",
        episodes.episodes.len(),
        config.causes.len(),
        episodes.failures.len()
    );

    let excluded_ids: HashSet<&str> = episodes.failures.iter().map(|f| f.subject_id.as_str()).collect();
    let included: Vec<&Subject> = subjects
        .iter()
        .filter(|s| !excluded_ids.contains(s.subject_id.as_str()))
        .collect();
    if included.is_empty() {
        return Err(AnalysisError::InvalidInput("no subject has usable follow-up".to_string()));
    }
    let included_owned: Vec<Subject> = included.iter().map(|&s| s.clone()).collect();

    let mut estimates = Vec::new();
    for &grouping in &config.groupings {
        estimates.extend(estimate_all(&aggregate(&episodes.episodes, grouping), &config.estimates));
    }
    info!("Estimated {} strata", estimates.len());

    let groups = group_subjects(config, &included);

    let incidence: Vec<CauseIncidence> = config
        .causes
        .par_iter()
        .map(|&cause| {
            let observations = competing_observations(&included_owned, cause, |s| curve_key(config, s));
            let observed = stratified_incidence(&observations)?;
            let expected = groups
                .iter()
                .map(|(group, members)| {
                    let start = members.iter().map(|s| s.entry_age()).fold(f64::INFINITY, f64::min);
                    let end = members.iter().map(|s| s.exit_age()).fold(f64::NEG_INFINITY, f64::max);
                    let points = expected_incidence(rates, &profiles(members), cause, start, end, config.grid_step)?;
                    Ok(ExpectedCurve { group: group.clone(), points })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(CauseIncidence { cause, observed, expected })
        })
        .collect::<Result<Vec<_>>>()?;
    info!("Computed cumulative incidence for {} causes", incidence.len());

    let all_cause = competing_observations(&included_owned, TargetCause::AllCauses, |s| curve_key(config, s));
    let survival = stratified_incidence(&all_cause)?;
    let inputs = survival
        .curves
        .iter()
        .filter_map(|curve| groups.get(&curve.group).map(|members| (curve, members)))
        .map(|(curve, members)| {
            Ok(LifeExpectancyInput {
                key: curve.group.clone(),
                observed: SurvivalCurve::from_incidence(curve, config.le_floor, config.le_horizon, config.grid_step)?,
                expected: SurvivalCurve::from_reference(
                    rates,
                    &profiles(members),
                    config.le_floor,
                    config.le_horizon,
                    config.grid_step,
                )?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let life_expectancy = life_expectancy_table(&inputs, config.le_floor, config.le_horizon);

    Ok(AnalysisOutput {
        subjects: included.len(),
        person_years: included.iter().map(|s| s.follow_up()).sum(),
        excluded: episodes.failures,
        estimates,
        incidence,
        life_expectancy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::{CauseOfDeath, Sex};
    use crate::estimates::Grouping;
    use crate::reference::RateRow;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn subject(id: &str, birth: i32, exit: NaiveDate, cause: Option<CauseOfDeath>) -> Subject {
        Subject {
            subject_id: id.to_string(),
            sex: Sex::Female,
            birth_date: date(birth, 1, 1),
            entry_date: date(birth + 5, 1, 1),
            exit_date: exit,
            diagnosis: "leukaemia".to_string(),
            cause_of_death: cause,
        }
    }

    fn flat_rates() -> ReferenceRateTable {
        let mut rows = Vec::new();
        for cause in [TargetCause::AllCauses, TargetCause::Specific(CauseOfDeath::Cardiac)] {
            rows.push(RateRow { sex: Sex::Female, cause, age_start: 0.0, year_start: 1950.0, rate: 0.001 });
        }
        ReferenceRateTable::from_rows(&rows).unwrap()
    }

    #[test]
    fn test_full_pass_reports_every_section() {
        let subjects = vec![
            subject("A", 1970, date(1990, 1, 1), Some(CauseOfDeath::Cardiac)),
            subject("B", 1972, date(2000, 1, 1), None),
            subject("C", 1985, date(2005, 1, 1), Some(CauseOfDeath::External)),
            // Exit before entry: excluded, not fatal
            subject("D", 1980, date(1984, 1, 1), None),
        ];
        let config = AnalysisConfig {
            causes: vec![TargetCause::AllCauses, TargetCause::Specific(CauseOfDeath::Cardiac)],
            groupings: vec![Grouping::Overall],
            le_floor: 10.0,
            le_horizon: 20.0,
            ..AnalysisConfig::default()
        };

        let output = run_analysis(&subjects, &flat_rates(), &config).unwrap();
        assert_eq!(output.excluded.len(), 1);
        assert_eq!(output.excluded[0].subject_id, "D");
        assert_eq!(output.subjects, 3);
        assert!((output.person_years - 53.0).abs() < 0.01);

        let overall_all = output
            .estimates
            .iter()
            .find(|e| e.cause == TargetCause::AllCauses)
            .unwrap();
        assert_eq!(overall_all.observed, 2);

        assert_eq!(output.incidence.len(), 2);
        let cardiac = &output.incidence[1];
        assert_eq!(cardiac.cause, TargetCause::Specific(CauseOfDeath::Cardiac));
        // Entry decades 1970s and 1990s
        assert_eq!(cardiac.observed.curves.len(), 2);
        assert_eq!(cardiac.expected.len(), 2);

        assert_eq!(output.life_expectancy.len(), 2);
        assert_eq!(output.life_expectancy[0].key, "1970s");
    }

    #[test]
    fn test_missing_reference_cause_is_fatal() {
        let subjects = vec![subject("A", 1970, date(1990, 1, 1), None)];
        let config = AnalysisConfig {
            causes: vec![TargetCause::Specific(CauseOfDeath::Pulmonary)],
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            run_analysis(&subjects, &flat_rates(), &config),
            Err(AnalysisError::Lookup { .. })
        ));
    }
}
