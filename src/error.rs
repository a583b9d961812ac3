//! Error taxonomy for the analysis pipeline

use thiserror::Error;

/// Errors raised while loading cohort data or computing estimates.
///
/// `DataIntegrity`, `Lookup` and `InvalidSubjects` are fatal for the run (or for
/// the subject's contribution). `StatisticalUndefined` and `MissingData` are
/// scoped to a single stratum or group and are normally recorded as a status
/// rather than propagated.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("subject '{subject_id}': {reason}")]
    DataIntegrity { subject_id: String, reason: String },

    #[error("{count} invalid subject record(s), first: {first}")]
    InvalidSubjects { count: usize, first: String },

    #[error("no reference rate for sex={sex}, cause={cause}, age={age:.3}, year={year:.3}")]
    Lookup {
        sex: String,
        cause: String,
        age: f64,
        year: f64,
    },

    #[error("stratum '{key}' is undefined: {reason}")]
    StatisticalUndefined { key: String, reason: String },

    #[error("survival curve undefined at age {age:.3} within [{floor}, {horizon}]")]
    MissingData { age: f64, floor: f64, horizon: f64 },

    #[error("invalid cut points: {0}")]
    InvalidBands(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
