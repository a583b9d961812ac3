//! Stratum aggregation and SMR/AER estimation

mod aggregate;
pub mod format;
mod smr;

pub use aggregate::{aggregate, Grouping, StratumAggregate};
pub use smr::{
    aer_with_ci, chi2_quantile, estimate, estimate_all, rank_by_smr, smr_with_ci, Estimate,
    EstimateOptions, EstimateStatus, Z_95,
};
