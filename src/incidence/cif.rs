//! Aalen–Johansen cumulative incidence with a competing risk
//!
//! Time scale is attained age with delayed entry: a subject is at risk at age
//! `t` when `entry < t <= exit`. All deaths at the same age (event of interest
//! and competing) are handled in one risk-set update, so the cause-specific
//! increments always add up to the all-cause drop in survival.

use std::collections::BTreeMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::heterogeneity::{log_rank_test, HeterogeneityTest};
use crate::cohort::{Subject, TargetCause};
use crate::error::{AnalysisError, Result};

/// Outcome at exit: 0 = censored, 1 = event of interest, 2 = competing event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetingStatus {
    Censored,
    Event,
    Competing,
}

impl CompetingStatus {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(CompetingStatus::Censored),
            1 => Ok(CompetingStatus::Event),
            2 => Ok(CompetingStatus::Competing),
            other => Err(AnalysisError::InvalidInput(format!("unknown competing-risk status {}", other))),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            CompetingStatus::Censored => 0,
            CompetingStatus::Event => 1,
            CompetingStatus::Competing => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetingObservation {
    /// Age at entry to the risk set
    pub entry: f64,
    /// Age at event or censoring
    pub exit: f64,
    pub status: CompetingStatus,
    /// Stratum label (e.g. decade of diagnosis)
    pub group: String,
}

/// Recode subjects for a target cause: deaths from the target are events,
/// any other death is a competing event.
pub fn competing_observations<F>(subjects: &[Subject], cause: TargetCause, group_of: F) -> Vec<CompetingObservation>
where
    F: Fn(&Subject) -> String,
{
    subjects
        .iter()
        .map(|s| {
            let status = match s.cause_of_death {
                None => CompetingStatus::Censored,
                Some(_) if cause.matches(s.cause_of_death) => CompetingStatus::Event,
                Some(_) => CompetingStatus::Competing,
            };
            CompetingObservation {
                entry: s.entry_age(),
                exit: s.exit_age(),
                status,
                group: group_of(s),
            }
        })
        .collect()
}

/// One step of the curve, values in percent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidencePoint {
    pub time: f64,
    pub event_pct: f64,
    pub competing_pct: f64,
    /// All-cause survival
    pub survival_pct: f64,
    pub at_risk: usize,
    pub events: usize,
    pub competing: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidenceCurve {
    pub group: String,
    pub points: Vec<IncidencePoint>,
    /// Largest follow-up time; the curve is undefined beyond it
    pub end: f64,
}

impl IncidenceCurve {
    /// Right-continuous step value at `time`; before the first point the origin values apply
    pub fn at(&self, time: f64) -> &IncidencePoint {
        let idx = self.points.partition_point(|p| p.time <= time);
        &self.points[idx.saturating_sub(1)]
    }

    /// Event-of-interest cumulative incidence (percent) at `time`
    pub fn incidence_at(&self, time: f64) -> f64 {
        self.at(time).event_pct
    }

    pub fn final_point(&self) -> &IncidencePoint {
        &self.points[self.points.len() - 1]
    }
}

fn validate(observations: &[CompetingObservation]) -> Result<()> {
    if observations.is_empty() {
        return Err(AnalysisError::InvalidInput("no observations for cumulative incidence".to_string()));
    }
    if let Some(bad) = observations
        .iter()
        .find(|o| !o.entry.is_finite() || !o.exit.is_finite() || o.exit <= o.entry)
    {
        return Err(AnalysisError::InvalidInput(format!(
            "observation needs finite entry < exit (entry={}, exit={})",
            bad.entry, bad.exit
        )));
    }
    Ok(())
}

/// Number at risk at `t` given sorted entry and exit ages
pub(crate) fn at_risk(entries: &[f64], exits: &[f64], t: f64) -> usize {
    let entered = entries.partition_point(|&e| e < t);
    let left = exits.partition_point(|&x| x < t);
    entered - left
}

pub(crate) fn sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut v: Vec<f64> = values.collect();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Cumulative incidence of the event of interest and the competing event, pooled over groups
pub fn cumulative_incidence(observations: &[CompetingObservation]) -> Result<IncidenceCurve> {
    validate(observations)?;

    let entries = sorted(observations.iter().map(|o| o.entry));
    let exits = sorted(observations.iter().map(|o| o.exit));

    // Deaths per distinct age: (events, competing)
    let mut deaths: BTreeMap<u64, (f64, usize, usize)> = BTreeMap::new();
    for o in observations {
        let (events, competing) = match o.status {
            CompetingStatus::Censored => continue,
            CompetingStatus::Event => (1, 0),
            CompetingStatus::Competing => (0, 1),
        };
        let slot = deaths.entry(o.exit.to_bits()).or_insert((o.exit, 0, 0));
        slot.1 += events;
        slot.2 += competing;
    }
    let mut death_times: Vec<(f64, usize, usize)> = deaths.into_values().collect();
    death_times.sort_by(|a, b| a.0.total_cmp(&b.0));

    let origin = entries[0];
    let mut points = Vec::with_capacity(death_times.len() + 1);
    points.push(IncidencePoint {
        time: origin,
        event_pct: 0.0,
        competing_pct: 0.0,
        survival_pct: 100.0,
        at_risk: entries.partition_point(|&e| e <= origin),
        events: 0,
        competing: 0,
    });

    let mut survival = 1.0_f64;
    let mut event_ci = 0.0_f64;
    let mut competing_ci = 0.0_f64;
    for (t, d_event, d_competing) in death_times {
        let n = at_risk(&entries, &exits, t);
        let d_all = d_event + d_competing;
        if n == 0 || d_all > n {
            return Err(AnalysisError::InvalidInput(format!(
                "risk set of {} at age {} cannot hold {} deaths",
                n, t, d_all
            )));
        }
        let nf = n as f64;
        event_ci += survival * d_event as f64 / nf;
        competing_ci += survival * d_competing as f64 / nf;
        survival *= 1.0 - d_all as f64 / nf;

        points.push(IncidencePoint {
            time: t,
            event_pct: 100.0 * event_ci,
            competing_pct: 100.0 * competing_ci,
            survival_pct: 100.0 * survival,
            at_risk: n,
            events: d_event,
            competing: d_competing,
        });
    }

    Ok(IncidenceCurve {
        group: String::new(),
        points,
        end: exits[exits.len() - 1],
    })
}

/// Curves per group plus the heterogeneity test across groups
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StratifiedIncidence {
    pub curves: Vec<IncidenceCurve>,
    pub heterogeneity: Option<HeterogeneityTest>,
}

/// Independent curves for every group (sorted by label) and a log-rank test across them
pub fn stratified_incidence(observations: &[CompetingObservation]) -> Result<StratifiedIncidence> {
    validate(observations)?;

    let mut groups: BTreeMap<&str, Vec<CompetingObservation>> = BTreeMap::new();
    for o in observations {
        groups.entry(o.group.as_str()).or_default().push(o.clone());
    }

    let mut curves = Vec::with_capacity(groups.len());
    for (label, members) in &groups {
        let mut curve = cumulative_incidence(members)?;
        curve.group = label.to_string();
        debug!(
            "Group {}: {} subjects, final incidence {:.2}%",
            label,
            members.len(),
            curve.final_point().event_pct
        );
        curves.push(curve);
    }

    let heterogeneity = if groups.len() < 2 {
        None
    } else {
        match log_rank_test(observations) {
            Ok(test) => Some(test),
            Err(err) => {
                warn!("Heterogeneity test unavailable: {}", err);
                None
            }
        }
    };

    Ok(StratifiedIncidence { curves, heterogeneity })
}
