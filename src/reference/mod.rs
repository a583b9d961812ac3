//! Reference population mortality: band definitions and rate lookup

mod bands;
pub mod rates;

pub use bands::{AgeBands, CutPoints, PeriodBands};
pub use rates::{load_reference_rates, load_reference_rates_from_reader, RateRow, ReferenceRateTable};
