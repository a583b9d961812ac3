//! Split each subject's follow-up into age × calendar-period episodes
//!
//! Time origin is birth: every episode is an interval of attained age. A
//! calendar cut point `Y` maps to age `Y - birth_time` for a given subject, so
//! splitting on both scales is a single merge of two sets of age cut points.
//! The reference table's own age and year band starts are merged in as well,
//! so an episode never straddles two reference cells.

use std::collections::BTreeMap;

use log::{debug, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::cohort::{RejectedSubject, Sex, Subject, TargetCause};
use crate::error::{AnalysisError, Result};
use crate::reference::{AgeBands, PeriodBands, ReferenceRateTable};

/// Boundaries closer than this (in years) are treated as the same instant
pub const TIME_EPSILON: f64 = 1e-9;

/// One sub-interval of a subject's follow-up for a given target cause
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Episode {
    pub subject_id: String,
    pub sex: Sex,
    pub diagnosis: String,
    pub diagnosis_year: i32,
    pub cause: TargetCause,
    /// Attained age at the start of the episode
    pub start_age: f64,
    /// Attained age at the end of the episode
    pub end_age: f64,
    /// Decimal calendar year at the start of the episode
    pub calendar_start: f64,
    /// Lower bound of the attained-age band, `None` below the first age cut
    pub age_band: Option<f64>,
    /// Lower bound of the calendar-period band (years before the first cut are clamped into it)
    pub period_band: f64,
    /// Death from the target cause at the end of this episode
    pub event: bool,
    /// Reference hazard for this episode's (sex, age band, year band) cell
    pub rate: f64,
}

impl Episode {
    /// Person-time in years
    pub fn duration(&self) -> f64 {
        self.end_age - self.start_age
    }

    /// Expected deaths under the reference hazard
    pub fn expected(&self) -> f64 {
        self.rate * self.duration()
    }

    pub fn events(&self) -> u64 {
        u64::from(self.event)
    }
}

/// Episodes for a batch of subjects plus the subjects that could not be split
#[derive(Debug, Clone, Default)]
pub struct EpisodeSet {
    pub episodes: Vec<Episode>,
    pub failures: Vec<RejectedSubject>,
}

impl EpisodeSet {
    pub fn person_years(&self) -> f64 {
        self.episodes.iter().map(Episode::duration).sum()
    }

    pub fn observed(&self) -> u64 {
        self.episodes.iter().map(Episode::events).sum()
    }

    pub fn expected(&self) -> f64 {
        self.episodes.iter().map(Episode::expected).sum()
    }
}

/// Splits subjects against fixed band definitions and a reference table
#[derive(Debug, Clone)]
pub struct EpisodeBuilder<'a> {
    rates: &'a ReferenceRateTable,
    age_bands: AgeBands,
    period_bands: PeriodBands,
}

impl<'a> EpisodeBuilder<'a> {
    pub fn new(rates: &'a ReferenceRateTable, age_bands: AgeBands, period_bands: PeriodBands) -> Self {
        Self {
            rates,
            age_bands,
            period_bands,
        }
    }

    pub fn age_bands(&self) -> &AgeBands {
        &self.age_bands
    }

    pub fn period_bands(&self) -> &PeriodBands {
        &self.period_bands
    }

    /// Ordered episodes covering `[entry, exit)` of one subject.
    ///
    /// Fails with `DataIntegrity` for invalid dates or zero follow-up and with
    /// `Lookup` if the reference table has no cell for an episode.
    pub fn split_subject(&self, subject: &Subject, cause: TargetCause) -> Result<Vec<Episode>> {
        subject.validate()?;

        let birth = subject.birth_time();
        let entry = subject.entry_age();
        let exit = subject.exit_age();
        if exit - entry <= TIME_EPSILON {
            return Err(subject.integrity("no follow-up time between entry and exit"));
        }

        // Reporting bands plus the reference table's own cells, so every episode sits in one rate cell
        let table_ages = self.rates.age_starts().iter().copied();
        let table_years = self.rates.year_starts().iter().map(|&y| y - birth);
        let mut cuts: Vec<f64> = self
            .age_bands
            .interior(entry, exit)
            .chain(self.period_bands.interior(birth + entry, birth + exit).map(|y| y - birth))
            .chain(table_ages)
            .chain(table_years)
            .filter(|&c| c > entry + TIME_EPSILON && c < exit - TIME_EPSILON)
            .collect();
        cuts.sort_by(|a, b| a.total_cmp(b));
        cuts.dedup_by(|a, b| (*a - *b).abs() < TIME_EPSILON);

        let mut boundaries = Vec::with_capacity(cuts.len() + 2);
        boundaries.push(entry);
        boundaries.extend(cuts);
        boundaries.push(exit);

        let event = cause.matches(subject.cause_of_death);
        let last = boundaries.len() - 2;
        let mut episodes = Vec::with_capacity(boundaries.len() - 1);
        for (i, w) in boundaries.windows(2).enumerate() {
            let (start, end) = (w[0], w[1]);
            // Midpoint lookup keeps float noise at a boundary from selecting the neighbouring cell
            let mid_age = 0.5 * (start + end);
            let mid_year = birth + mid_age;
            let rate = self.rates.rate(subject.sex, cause, mid_age, mid_year)?;
            let period_band = self
                .period_bands
                .band_start(self.period_bands.clamp(mid_year))
                .unwrap_or_else(|| self.period_bands.first());

            episodes.push(Episode {
                subject_id: subject.subject_id.clone(),
                sex: subject.sex,
                diagnosis: subject.diagnosis.clone(),
                diagnosis_year: subject.diagnosis_year(),
                cause,
                start_age: start,
                end_age: end,
                calendar_start: birth + start,
                age_band: self.age_bands.band_start(mid_age),
                period_band,
                event: event && i == last,
                rate,
            });
        }

        Ok(episodes)
    }

    /// Split every subject for one target cause.
    ///
    /// Subjects failing integrity checks are collected in `failures`; a
    /// reference lookup failure aborts the whole build.
    pub fn build(&self, subjects: &[Subject], cause: TargetCause) -> Result<EpisodeSet> {
        let mut set = EpisodeSet::default();
        for subject in subjects {
            match self.split_subject(subject, cause) {
                Ok(episodes) => set.episodes.extend(episodes),
                Err(AnalysisError::DataIntegrity { subject_id, reason }) => {
                    set.failures.push(RejectedSubject { subject_id, reason })
                }
                Err(err) => return Err(err),
            }
        }

        if !set.failures.is_empty() {
            warn!(
                "{} subject(s) could not be split for cause {}",
                set.failures.len(),
                cause
            );
        }
        debug!(
            "Built {} episodes for cause {} ({:.1} person-years)",
            set.episodes.len(),
            cause,
            set.person_years()
        );
        Ok(set)
    }

    /// Build an independent episode set per cause and concatenate them in cause order
    pub fn stack(&self, subjects: &[Subject], causes: &[TargetCause]) -> Result<EpisodeSet> {
        let sets = causes
            .par_iter()
            .map(|&cause| self.build(subjects, cause))
            .collect::<Result<Vec<_>>>()?;

        let mut stacked = EpisodeSet::default();
        for set in sets {
            stacked.episodes.extend(set.episodes);
            for failure in set.failures {
                if !stacked.failures.iter().any(|f| f.subject_id == failure.subject_id) {
                    stacked.failures.push(failure);
                }
            }
        }
        Ok(stacked)
    }
}

/// Follow-up and event count re-aggregated per subject and cause
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectSummary {
    pub subject_id: String,
    pub cause: TargetCause,
    pub follow_up: f64,
    pub events: u64,
    pub episodes: usize,
}

/// Fold episodes back to one row per (subject, cause)
pub fn summarize_by_subject(episodes: &[Episode]) -> Vec<SubjectSummary> {
    let mut grouped: BTreeMap<(String, TargetCause), SubjectSummary> = BTreeMap::new();
    for ep in episodes {
        let entry = grouped
            .entry((ep.subject_id.clone(), ep.cause))
            .or_insert_with(|| SubjectSummary {
                subject_id: ep.subject_id.clone(),
                cause: ep.cause,
                follow_up: 0.0,
                events: 0,
                episodes: 0,
            });
        entry.follow_up += ep.duration();
        entry.events += ep.events();
        entry.episodes += 1;
    }
    grouped.into_values().collect()
}
