//! General-population reference mortality rates
//!
//! Rates are deaths per person-year keyed by (sex, cause, age band, calendar
//! year band). Calendar years outside the table are clamped to the nearest
//! available year band; there is no extrapolation.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::cohort::{Sex, TargetCause};
use crate::error::{AnalysisError, Result};

/// One cell of the reference table as it appears on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRow {
    pub sex: Sex,
    pub cause: TargetCause,
    /// Lower bound of the age band (years)
    pub age_start: f64,
    /// Lower bound of the calendar-year band
    pub year_start: f64,
    /// Deaths per person-year
    pub rate: f64,
}

/// Fully loaded, read-only reference rate table
#[derive(Debug, Clone)]
pub struct ReferenceRateTable {
    age_starts: Vec<f64>,
    year_starts: Vec<f64>,
    cells: HashMap<(Sex, TargetCause, usize, usize), f64>,
}

fn distinct_sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.collect();
    out.sort_by(|a, b| a.total_cmp(b));
    out.dedup();
    out
}

fn last_at_or_below(starts: &[f64], value: f64) -> Option<usize> {
    starts.partition_point(|&s| s <= value).checked_sub(1)
}

impl ReferenceRateTable {
    /// Build the table from rows, rejecting invalid rates and duplicate cells
    pub fn from_rows(rows: &[RateRow]) -> Result<Self> {
        if rows.is_empty() {
            return Err(AnalysisError::InvalidInput("reference rate table is empty".to_string()));
        }
        if let Some(row) = rows
            .iter()
            .find(|r| !r.rate.is_finite() || r.rate < 0.0 || !r.age_start.is_finite() || !r.year_start.is_finite())
        {
            return Err(AnalysisError::InvalidInput(format!(
                "invalid reference rate row {:?}",
                row
            )));
        }

        let age_starts = distinct_sorted(rows.iter().map(|r| r.age_start));
        let year_starts = distinct_sorted(rows.iter().map(|r| r.year_start));

        let mut cells = HashMap::with_capacity(rows.len());
        for row in rows {
            let age_idx = age_starts.partition_point(|&a| a < row.age_start);
            let year_idx = year_starts.partition_point(|&y| y < row.year_start);
            let key = (row.sex, row.cause, age_idx, year_idx);
            if cells.insert(key, row.rate).is_some() {
                return Err(AnalysisError::InvalidInput(format!(
                    "duplicate reference rate for sex={}, cause={}, age={}, year={}",
                    row.sex, row.cause, row.age_start, row.year_start
                )));
            }
        }

        Ok(Self {
            age_starts,
            year_starts,
            cells,
        })
    }

    /// Lower bounds of the table's age bands, ascending
    pub fn age_starts(&self) -> &[f64] {
        &self.age_starts
    }

    /// Lower bounds of the table's calendar-year bands, ascending
    pub fn year_starts(&self) -> &[f64] {
        &self.year_starts
    }

    /// Earliest and latest year-band starts; lookups are clamped to this range
    pub fn year_range(&self) -> (f64, f64) {
        (self.year_starts[0], self.year_starts[self.year_starts.len() - 1])
    }

    pub fn clamp_year(&self, year: f64) -> f64 {
        let (min, max) = self.year_range();
        year.clamp(min, max)
    }

    /// Reference hazard for a sex and cause at a given age and calendar year.
    ///
    /// A missing cell after year clamping means the table has a gap; callers
    /// treat this as fatal.
    pub fn rate(&self, sex: Sex, cause: TargetCause, age: f64, year: f64) -> Result<f64> {
        let clamped = self.clamp_year(year);
        let missing = || AnalysisError::Lookup {
            sex: sex.to_string(),
            cause: cause.to_string(),
            age,
            year: clamped,
        };

        let age_idx = last_at_or_below(&self.age_starts, age).ok_or_else(missing)?;
        let year_idx = last_at_or_below(&self.year_starts, clamped).ok_or_else(missing)?;
        self.cells
            .get(&(sex, cause, age_idx, year_idx))
            .copied()
            .ok_or_else(missing)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Load reference rates from a CSV file with columns `sex,cause,age_start,year_start,rate`
pub fn load_reference_rates<P: AsRef<Path>>(path: P) -> Result<ReferenceRateTable> {
    let file = File::open(path.as_ref())?;
    let table = load_reference_rates_from_reader(file)?;
    info!(
        "Loaded {} reference rate cells from {}",
        table.len(),
        path.as_ref().display()
    );
    Ok(table)
}

pub fn load_reference_rates_from_reader<R: Read>(reader: R) -> Result<ReferenceRateTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let rows = rdr.deserialize().collect::<std::result::Result<Vec<RateRow>, _>>()?;
    ReferenceRateTable::from_rows(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::CauseOfDeath;

    const CSV: &str = "\
sex,cause,age_start,year_start,rate
male,all_causes,0,1990,0.001
male,all_causes,0,2000,0.0008
male,all_causes,10,1990,0.002
male,all_causes,10,2000,0.0015
female,all_causes,0,1990,0.0009
female,cardiac,0,1990,0.0001
";

    fn table() -> ReferenceRateTable {
        load_reference_rates_from_reader(CSV.as_bytes()).unwrap()
    }

    #[test]
    fn test_band_lookup() {
        let t = table();
        assert_eq!(t.rate(Sex::Male, TargetCause::AllCauses, 5.5, 1995.0).unwrap(), 0.001);
        assert_eq!(t.rate(Sex::Male, TargetCause::AllCauses, 10.0, 2003.2).unwrap(), 0.0015);
        // Open-ended top age band
        assert_eq!(t.rate(Sex::Male, TargetCause::AllCauses, 64.0, 1991.0).unwrap(), 0.002);
    }

    #[test]
    fn test_years_are_clamped() {
        let t = table();
        assert_eq!(t.year_range(), (1990.0, 2000.0));
        // Before the table: clamp to 1990
        assert_eq!(t.rate(Sex::Male, TargetCause::AllCauses, 3.0, 1975.0).unwrap(), 0.001);
        // After the table: clamp to 2000
        assert_eq!(t.rate(Sex::Male, TargetCause::AllCauses, 12.0, 2030.0).unwrap(), 0.0015);
    }

    #[test]
    fn test_missing_cell_is_lookup_error() {
        let t = table();
        let cardiac = TargetCause::Specific(CauseOfDeath::Cardiac);
        assert_eq!(t.rate(Sex::Female, cardiac, 1.0, 1990.0).unwrap(), 0.0001);
        assert!(matches!(
            t.rate(Sex::Male, cardiac, 1.0, 1990.0),
            Err(AnalysisError::Lookup { .. })
        ));
        // Female table has no 2000 band
        assert!(matches!(
            t.rate(Sex::Female, TargetCause::AllCauses, 1.0, 2005.0),
            Err(AnalysisError::Lookup { .. })
        ));
        // Below the first age band
        assert!(t.rate(Sex::Male, TargetCause::AllCauses, -1.0, 1995.0).is_err());
    }

    #[test]
    fn test_rejects_duplicates_and_negative_rates() {
        let dup = "sex,cause,age_start,year_start,rate\nmale,all,0,1990,0.1\nmale,all,0,1990,0.2\n";
        assert!(load_reference_rates_from_reader(dup.as_bytes()).is_err());

        let neg = "sex,cause,age_start,year_start,rate\nmale,all,0,1990,-0.1\n";
        assert!(load_reference_rates_from_reader(neg.as_bytes()).is_err());
    }
}
