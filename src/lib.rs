//! Late-mortality analysis for childhood cancer survivor cohorts
//!
//! This crate provides:
//! - Cohort loading and validation from CSV (one row per subject)
//! - Reference population rate tables keyed by sex, cause, age band and calendar period
//! - Lexis splitting of follow-up into age × period episodes with expected deaths
//! - Standardized mortality ratios with exact Poisson intervals and absolute excess risk
//! - Competing-risks cumulative incidence with a log-rank heterogeneity test
//! - Expected incidence and survival from reference rates
//! - Restricted-mean life expectancy and life-years lost

pub mod analysis;
pub mod cohort;
pub mod config;
pub mod episodes;
pub mod error;
pub mod estimates;
pub mod incidence;
pub mod life_expectancy;
pub mod reference;

pub use analysis::{run_analysis, AnalysisOutput, CauseIncidence, ExpectedCurve};
pub use cohort::{load_subjects, CauseOfDeath, InvalidRowPolicy, Sex, Subject, TargetCause};
pub use config::AnalysisConfig;
pub use episodes::{Episode, EpisodeBuilder, EpisodeSet};
pub use error::{AnalysisError, Result};
pub use estimates::{Estimate, EstimateOptions, Grouping};
pub use incidence::{IncidenceCurve, StratifiedIncidence};
pub use life_expectancy::{LifeExpectancyRow, SurvivalCurve};
pub use reference::{load_reference_rates, CutPoints, ReferenceRateTable};
