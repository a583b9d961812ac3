//! Competing-risks cumulative incidence over attained age

mod cif;
mod expected;
mod heterogeneity;

pub use cif::{
    competing_observations, cumulative_incidence, stratified_incidence, CompetingObservation,
    CompetingStatus, IncidenceCurve, IncidencePoint, StratifiedIncidence,
};
pub use expected::{age_grid, expected_incidence, ExpectedPoint, ReferenceProfile};
pub use heterogeneity::{log_rank_test, GroupCount, HeterogeneityTest};
