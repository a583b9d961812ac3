//! Load subject records from CSV
//!
//! Expected columns: `subject_id, sex, birth_date, entry_date, exit_date,
//! diagnosis, died` followed by one `death_<cause>` flag per cause of death.
//! `died` is the catch-all flag; the per-cause flags are mutually exclusive.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::data::{CauseOfDeath, Sex, Subject};
use crate::error::{AnalysisError, Result};

/// What to do with subject rows that fail validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidRowPolicy {
    /// Fail the load, reporting how many rows were invalid
    #[default]
    Abort,
    /// Drop invalid rows and list them in the load report
    Drop,
}

/// A subject row that did not make it into the cohort
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedSubject {
    pub subject_id: String,
    pub reason: String,
}

/// Validated cohort plus any rows dropped under [`InvalidRowPolicy::Drop`]
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub subjects: Vec<Subject>,
    pub rejected: Vec<RejectedSubject>,
}

#[derive(Debug, Deserialize)]
struct SubjectRow {
    subject_id: String,
    sex: Sex,
    birth_date: Option<NaiveDate>,
    entry_date: Option<NaiveDate>,
    exit_date: Option<NaiveDate>,
    #[serde(default)]
    diagnosis: String,
    #[serde(default)]
    died: u8,
    #[serde(default)]
    death_recurrence: u8,
    #[serde(default)]
    death_subsequent_neoplasm: u8,
    #[serde(default)]
    death_cardiac: u8,
    #[serde(default)]
    death_cerebrovascular: u8,
    #[serde(default)]
    death_pulmonary: u8,
    #[serde(default)]
    death_external: u8,
    #[serde(default)]
    death_other: u8,
}

impl SubjectRow {
    fn into_subject(self) -> Result<Subject> {
        let integrity = |reason: &str| AnalysisError::DataIntegrity {
            subject_id: self.subject_id.clone(),
            reason: reason.to_string(),
        };

        let birth_date = self.birth_date.ok_or_else(|| integrity("missing birth date"))?;
        let entry_date = self.entry_date.ok_or_else(|| integrity("missing entry date"))?;
        let exit_date = self.exit_date.ok_or_else(|| integrity("missing exit date"))?;

        let flagged: Vec<CauseOfDeath> = [
            (CauseOfDeath::Recurrence, self.death_recurrence),
            (CauseOfDeath::SubsequentNeoplasm, self.death_subsequent_neoplasm),
            (CauseOfDeath::Cardiac, self.death_cardiac),
            (CauseOfDeath::Cerebrovascular, self.death_cerebrovascular),
            (CauseOfDeath::Pulmonary, self.death_pulmonary),
            (CauseOfDeath::External, self.death_external),
            (CauseOfDeath::Other, self.death_other),
        ]
        .into_iter()
        .filter(|(_, flag)| *flag != 0)
        .map(|(cause, _)| cause)
        .collect();

        let cause_of_death = match (self.died != 0, flagged.as_slice()) {
            (false, []) => None,
            (true, [cause]) => Some(*cause),
            (true, []) => return Err(integrity("died without a cause-of-death flag")),
            (false, _) => return Err(integrity("cause-of-death flag set on a surviving subject")),
            (true, _) => return Err(integrity("more than one cause-of-death flag set")),
        };

        let subject = Subject {
            subject_id: self.subject_id,
            sex: self.sex,
            birth_date,
            entry_date,
            exit_date,
            diagnosis: self.diagnosis,
            cause_of_death,
        };
        subject.validate()?;
        Ok(subject)
    }
}

/// Load subjects from a CSV file
pub fn load_subjects<P: AsRef<Path>>(path: P, policy: InvalidRowPolicy) -> Result<LoadReport> {
    let file = File::open(path.as_ref())?;
    let report = load_subjects_from_reader(file, policy)?;
    info!(
        "Loaded {} subjects from {} ({} rejected)",
        report.subjects.len(),
        path.as_ref().display(),
        report.rejected.len()
    );
    Ok(report)
}

/// Load subjects from any CSV reader
pub fn load_subjects_from_reader<R: Read>(reader: R, policy: InvalidRowPolicy) -> Result<LoadReport> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let id_column = headers.iter().position(|h| h == "subject_id");

    let mut outcomes = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let id = id_column
            .and_then(|i| record.get(i))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("row {}", line + 1));
        // A row whose fields do not parse is an invalid record, subject to the row policy
        let outcome = record
            .deserialize::<SubjectRow>(Some(&headers))
            .map_err(|err| AnalysisError::DataIntegrity {
                subject_id: id.clone(),
                reason: format!("malformed record: {}", err),
            })
            .and_then(SubjectRow::into_subject);
        outcomes.push((id, outcome));
    }
    collect_valid(outcomes, policy)
}

/// Validate already-constructed subjects under the given policy
pub fn validate_subjects(subjects: Vec<Subject>, policy: InvalidRowPolicy) -> Result<LoadReport> {
    let outcomes = subjects
        .into_iter()
        .map(|s| {
            let id = s.subject_id.clone();
            let checked = s.validate().map(|_| s);
            (id, checked)
        })
        .collect();
    collect_valid(outcomes, policy)
}

fn collect_valid(outcomes: Vec<(String, Result<Subject>)>, policy: InvalidRowPolicy) -> Result<LoadReport> {
    let mut report = LoadReport::default();
    for (subject_id, outcome) in outcomes {
        match outcome {
            Ok(subject) => report.subjects.push(subject),
            Err(err) => report.rejected.push(RejectedSubject {
                subject_id,
                reason: err.to_string(),
            }),
        }
    }

    if let Some(first) = report.rejected.first() {
        match policy {
            InvalidRowPolicy::Abort => {
                return Err(AnalysisError::InvalidSubjects {
                    count: report.rejected.len(),
                    first: first.reason.clone(),
                });
            }
            InvalidRowPolicy::Drop => {
                for rejected in &report.rejected {
                    warn!("Dropping subject {}: {}", rejected.subject_id, rejected.reason);
                }
            }
        }
    }

    Ok(report)
}
