//! Ordered cut points for age bands and calendar-period bands

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Strictly increasing set of band boundaries.
///
/// Band `i` covers `[cuts[i], cuts[i + 1])`; the last band is open-ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct CutPoints {
    cuts: Vec<f64>,
}

/// Attained-age band boundaries, in years since birth
pub type AgeBands = CutPoints;

/// Calendar-period band boundaries, in decimal calendar years
pub type PeriodBands = CutPoints;

impl CutPoints {
    pub fn new(cuts: Vec<f64>) -> Result<Self> {
        if cuts.is_empty() {
            return Err(AnalysisError::InvalidBands("at least one cut point is required".to_string()));
        }
        if let Some(bad) = cuts.iter().find(|c| !c.is_finite()) {
            return Err(AnalysisError::InvalidBands(format!("non-finite cut point {}", bad)));
        }
        if let Some(pair) = cuts.windows(2).find(|w| w[1] <= w[0]) {
            return Err(AnalysisError::InvalidBands(format!(
                "cut points must be strictly increasing ({} then {})",
                pair[0], pair[1]
            )));
        }
        Ok(Self { cuts })
    }

    /// Evenly spaced cut points `start, start + step, ...` up to and including `end`
    pub fn every(start: f64, end: f64, step: f64) -> Result<Self> {
        if !(step > 0.0) || end < start {
            return Err(AnalysisError::InvalidBands(format!(
                "cannot build bands from {} to {} by {}",
                start, end, step
            )));
        }
        let count = ((end - start) / step + 1e-9).floor() as usize;
        Self::new((0..=count).map(|i| start + step * i as f64).collect())
    }

    /// `count + 1` cut points from `start` by a positive `step`
    pub(crate) fn regular(start: f64, step: f64, count: usize) -> Self {
        debug_assert!(step > 0.0);
        Self {
            cuts: (0..=count).map(|i| start + step * i as f64).collect(),
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.cuts
    }

    pub fn first(&self) -> f64 {
        self.cuts[0]
    }

    pub fn last(&self) -> f64 {
        self.cuts[self.cuts.len() - 1]
    }

    /// Cut points strictly inside the open interval `(lo, hi)`
    pub fn interior(&self, lo: f64, hi: f64) -> impl Iterator<Item = f64> + '_ {
        self.cuts.iter().copied().filter(move |&c| c > lo && c < hi)
    }

    /// Index of the band containing `value`, or `None` below the first cut
    pub fn band_index(&self, value: f64) -> Option<usize> {
        self.cuts.partition_point(|&c| c <= value).checked_sub(1)
    }

    /// Lower boundary of the band containing `value`
    pub fn band_start(&self, value: f64) -> Option<f64> {
        self.band_index(value).map(|i| self.cuts[i])
    }

    /// Clamp a value into `[first, last]`
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.first(), self.last())
    }
}

impl TryFrom<Vec<f64>> for CutPoints {
    type Error = AnalysisError;

    fn try_from(cuts: Vec<f64>) -> Result<Self> {
        Self::new(cuts)
    }
}

impl From<CutPoints> for Vec<f64> {
    fn from(value: CutPoints) -> Self {
        value.cuts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unordered_cuts() {
        assert!(CutPoints::new(vec![0.0, 5.0, 5.0]).is_err());
        assert!(CutPoints::new(vec![10.0, 5.0]).is_err());
        assert!(CutPoints::new(vec![]).is_err());
        assert!(CutPoints::new(vec![0.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_every() {
        let bands = CutPoints::every(0.0, 20.0, 5.0).unwrap();
        assert_eq!(bands.as_slice(), &[0.0, 5.0, 10.0, 15.0, 20.0]);
    }

    #[test]
    fn test_band_lookup() {
        let bands = CutPoints::new(vec![0.0, 5.0, 10.0]).unwrap();
        assert_eq!(bands.band_start(-1.0), None);
        assert_eq!(bands.band_start(0.0), Some(0.0));
        assert_eq!(bands.band_start(4.999), Some(0.0));
        assert_eq!(bands.band_start(5.0), Some(5.0));
        // Open-ended last band
        assert_eq!(bands.band_start(80.0), Some(10.0));
    }

    #[test]
    fn test_interior_excludes_endpoints() {
        let bands = CutPoints::new(vec![0.0, 5.0, 10.0, 15.0]).unwrap();
        let inside: Vec<f64> = bands.interior(5.0, 15.0).collect();
        assert_eq!(inside, vec![10.0]);
    }
}
