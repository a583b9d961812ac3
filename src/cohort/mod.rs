//! Cohort data structures and subject loading

mod data;
pub mod loader;

pub use data::{decimal_year, CauseOfDeath, Sex, Subject, TargetCause};
pub use loader::{
    load_subjects, load_subjects_from_reader, validate_subjects, InvalidRowPolicy, LoadReport,
    RejectedSubject,
};
