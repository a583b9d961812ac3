//! Life expectancy as restricted mean survival and life-years lost

mod curve;
mod rmst;

pub use curve::SurvivalCurve;
pub use rmst::{life_expectancy_table, restricted_mean, LifeExpectancyInput, LifeExpectancyRow};
