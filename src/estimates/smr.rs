//! Standardized mortality ratio and absolute excess risk
//!
//! SMR = d / e with an exact Poisson interval from chi-square quantiles.
//! AER = (d - e) / y scaled to a caller-chosen number of person-years. The AER
//! interval uses SE ≈ sqrt(d) / y, which ignores the variance of the expected
//! count; it is an approximation for display, not an exact interval.

use std::collections::HashMap;

use log::warn;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use super::aggregate::{Grouping, StratumAggregate};
use super::format::{format_aer, format_share, format_smr};
use crate::cohort::TargetCause;
use crate::error::{AnalysisError, Result};

/// Two-sided 95% normal quantile used for the AER interval
pub const Z_95: f64 = 1.96;

/// Presentation and scaling options for the estimator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateOptions {
    /// Person-years per AER unit (10,000 or 100,000)
    #[serde(default = "default_person_time_scale")]
    pub person_time_scale: f64,

    #[serde(default = "default_smr_decimals")]
    pub smr_decimals: usize,

    #[serde(default = "default_aer_decimals")]
    pub aer_decimals: usize,

    /// Floor negative AER and excess-share values at zero in display strings
    #[serde(default)]
    pub non_negative_display: bool,
}

fn default_person_time_scale() -> f64 { 10_000.0 }
fn default_smr_decimals() -> usize { 2 }
fn default_aer_decimals() -> usize { 1 }

impl Default for EstimateOptions {
    fn default() -> Self {
        Self {
            person_time_scale: 10_000.0,
            smr_decimals: 2,
            aer_decimals: 1,
            non_negative_display: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateStatus {
    Defined,
    Undefined,
}

/// SMR/AER estimate for one stratum, numeric fields alongside display strings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Estimate {
    pub grouping: Grouping,
    pub key: String,
    pub cause: TargetCause,
    pub observed: u64,
    pub expected: f64,
    pub person_years: f64,
    pub smr: Option<f64>,
    pub smr_lo: Option<f64>,
    pub smr_hi: Option<f64>,
    pub aer: Option<f64>,
    pub aer_lo: Option<f64>,
    pub aer_hi: Option<f64>,
    /// Percentage of the stratum's total excess deaths due to this cause
    pub excess_share: Option<f64>,
    pub status: EstimateStatus,
    pub note: Option<String>,
    pub smr_display: String,
    pub aer_display: String,
    pub share_display: String,
}

/// Quantile of the chi-square distribution
pub fn chi2_quantile(p: f64, df: f64) -> Result<f64> {
    if !(0.0..1.0).contains(&p) || df <= 0.0 {
        return Err(AnalysisError::InvalidInput(format!(
            "chi-square quantile needs 0 <= p < 1 and df > 0 (p={}, df={})",
            p, df
        )));
    }
    if p == 0.0 {
        return Ok(0.0);
    }
    let dist = ChiSquared::new(df).map_err(|e| AnalysisError::InvalidInput(e.to_string()))?;
    Ok(dist.inverse_cdf(p))
}

/// SMR with exact Poisson 95% interval: `(smr, lower, upper)`.
///
/// With no observed deaths the lower bound is 0 and the upper bound falls
/// back to `-ln(0.05) / e`.
pub fn smr_with_ci(observed: u64, expected: f64) -> Result<(f64, f64, f64)> {
    if !(expected > 0.0) {
        return Err(AnalysisError::StatisticalUndefined {
            key: String::new(),
            reason: "zero expected deaths".to_string(),
        });
    }
    let d = observed as f64;
    let smr = d / expected;
    if observed == 0 {
        return Ok((0.0, 0.0, -(0.05_f64.ln()) / expected));
    }
    let lower = chi2_quantile(0.025, 2.0 * d)? / (2.0 * expected);
    let upper = chi2_quantile(0.975, 2.0 * (d + 1.0))? / (2.0 * expected);
    Ok((smr, lower, upper))
}

/// AER per `scale` person-years with approximate 95% interval: `(aer, lower, upper)`
pub fn aer_with_ci(observed: u64, expected: f64, person_years: f64, scale: f64) -> Result<(f64, f64, f64)> {
    if !(person_years > 0.0) {
        return Err(AnalysisError::StatisticalUndefined {
            key: String::new(),
            reason: "zero person-time".to_string(),
        });
    }
    let d = observed as f64;
    let aer = (d - expected) / person_years * scale;
    let se = d.sqrt() / person_years * scale;
    Ok((aer, aer - Z_95 * se, aer + Z_95 * se))
}

/// Estimate a single stratum. Never fails: undefined quantities are flagged in `status`.
pub fn estimate(agg: &StratumAggregate, options: &EstimateOptions) -> Estimate {
    let smr = smr_with_ci(agg.observed, agg.expected);
    let aer = aer_with_ci(agg.observed, agg.expected, agg.person_years, options.person_time_scale);

    let notes: Vec<String> = [&smr, &aer]
        .iter()
        .filter_map(|r| match r {
            Err(AnalysisError::StatisticalUndefined { reason, .. }) => Some(reason.clone()),
            Err(other) => Some(other.to_string()),
            Ok(_) => None,
        })
        .collect();
    let status = if notes.is_empty() {
        EstimateStatus::Defined
    } else {
        warn!(
            "Stratum {}={} ({}) undefined: {}",
            agg.grouping.label(),
            agg.key,
            agg.cause,
            notes.join(", ")
        );
        EstimateStatus::Undefined
    };

    let smr = smr.ok();
    let aer = aer.ok();
    Estimate {
        grouping: agg.grouping,
        key: agg.key.clone(),
        cause: agg.cause,
        observed: agg.observed,
        expected: agg.expected,
        person_years: agg.person_years,
        smr: smr.map(|s| s.0),
        smr_lo: smr.map(|s| s.1),
        smr_hi: smr.map(|s| s.2),
        aer: aer.map(|a| a.0),
        aer_lo: aer.map(|a| a.1),
        aer_hi: aer.map(|a| a.2),
        excess_share: None,
        status,
        note: if notes.is_empty() { None } else { Some(notes.join("; ")) },
        smr_display: format_smr(smr, options.smr_decimals),
        aer_display: format_aer(aer, options.aer_decimals, options.non_negative_display),
        share_display: format_share(None, options.aer_decimals, options.non_negative_display),
    }
}

/// Estimate every stratum and attach each specific cause's share of excess deaths
pub fn estimate_all(aggregates: &[StratumAggregate], options: &EstimateOptions) -> Vec<Estimate> {
    let mut estimates: Vec<Estimate> = aggregates.iter().map(|a| estimate(a, options)).collect();

    let mut total_excess: HashMap<(Grouping, String), f64> = HashMap::new();
    for agg in aggregates {
        if let TargetCause::Specific(_) = agg.cause {
            *total_excess.entry((agg.grouping, agg.key.clone())).or_insert(0.0) +=
                agg.observed as f64 - agg.expected;
        }
    }

    for est in &mut estimates {
        if est.cause == TargetCause::AllCauses {
            continue;
        }
        let total = total_excess
            .get(&(est.grouping, est.key.clone()))
            .copied()
            .unwrap_or(0.0);
        if total != 0.0 {
            let share = (est.observed as f64 - est.expected) / total * 100.0;
            est.excess_share = Some(share);
            est.share_display = format_share(Some(share), options.aer_decimals, options.non_negative_display);
        }
    }

    estimates
}

/// Defined strata ordered by descending SMR; undefined strata are left out
pub fn rank_by_smr(estimates: &[Estimate]) -> Vec<&Estimate> {
    let mut ranked: Vec<&Estimate> = estimates
        .iter()
        .filter(|e| e.status == EstimateStatus::Defined)
        .filter(|e| e.smr.is_some())
        .collect();
    ranked.sort_by(|a, b| {
        b.smr
            .unwrap_or(f64::NEG_INFINITY)
            .total_cmp(&a.smr.unwrap_or(f64::NEG_INFINITY))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::CauseOfDeath;
    use approx::assert_abs_diff_eq;

    fn agg(key: &str, cause: TargetCause, d: u64, e: f64, y: f64) -> StratumAggregate {
        StratumAggregate {
            grouping: Grouping::Diagnosis,
            key: key.to_string(),
            cause,
            observed: d,
            expected: e,
            person_years: y,
        }
    }

    #[test]
    fn test_chi2_quantile() {
        // Reference values from standard chi-square tables
        assert_abs_diff_eq!(chi2_quantile(0.975, 1.0).unwrap(), 5.0239, epsilon = 1e-3);
        assert_abs_diff_eq!(chi2_quantile(0.025, 20.0).unwrap(), 9.5908, epsilon = 1e-3);
        assert_abs_diff_eq!(chi2_quantile(0.975, 22.0).unwrap(), 36.7807, epsilon = 1e-3);
        assert!(chi2_quantile(1.0, 3.0).is_err());
    }

    #[test]
    fn test_smr_point_and_exact_interval() {
        let (smr, lo, hi) = smr_with_ci(10, 5.0).unwrap();
        assert_abs_diff_eq!(smr, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(lo, 0.9591, epsilon = 1e-3);
        assert_abs_diff_eq!(hi, 3.6781, epsilon = 1e-3);
    }

    #[test]
    fn test_smr_zero_observed() {
        let (smr, lo, hi) = smr_with_ci(0, 5.0).unwrap();
        assert_eq!(smr, 0.0);
        assert_eq!(lo, 0.0);
        assert_abs_diff_eq!(hi, 0.5991, epsilon = 1e-4);
    }

    #[test]
    fn test_smr_undefined_without_expected() {
        assert!(matches!(
            smr_with_ci(3, 0.0),
            Err(AnalysisError::StatisticalUndefined { .. })
        ));
    }

    #[test]
    fn test_aer() {
        let (aer, lo, hi) = aer_with_ci(100, 80.0, 1000.0, 10_000.0).unwrap();
        assert_abs_diff_eq!(aer, 200.0, epsilon = 1e-9);
        // SE = sqrt(100) / 1000 * 10000 = 100
        assert_abs_diff_eq!(lo, 200.0 - 196.0, epsilon = 1e-9);
        assert_abs_diff_eq!(hi, 200.0 + 196.0, epsilon = 1e-9);

        let (per_100k, _, _) = aer_with_ci(100, 80.0, 1000.0, 100_000.0).unwrap();
        assert_abs_diff_eq!(per_100k, 2000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_undefined_stratum_is_flagged_not_zero() {
        let e = estimate(&agg("cns", TargetCause::AllCauses, 2, 0.0, 0.0), &EstimateOptions::default());
        assert_eq!(e.status, EstimateStatus::Undefined);
        assert_eq!(e.smr, None);
        assert_eq!(e.aer, None);
        assert_eq!(e.smr_display, "undefined");
        assert!(e.note.as_deref().unwrap().contains("zero expected deaths"));
    }

    #[test]
    fn test_negative_aer_kept_signed_but_floored_for_display() {
        let options = EstimateOptions {
            non_negative_display: true,
            ..Default::default()
        };
        let e = estimate(&agg("cns", TargetCause::AllCauses, 1, 4.0, 1000.0), &options);
        assert_abs_diff_eq!(e.aer.unwrap(), -30.0, epsilon = 1e-9);
        assert!(e.aer_display.starts_with("0.0 ("));
    }

    #[test]
    fn test_excess_share_and_ranking() {
        let cardiac = TargetCause::Specific(CauseOfDeath::Cardiac);
        let sn = TargetCause::Specific(CauseOfDeath::SubsequentNeoplasm);
        let aggs = vec![
            agg("cns", TargetCause::AllCauses, 20, 5.0, 1000.0),
            agg("cns", cardiac, 4, 1.0, 1000.0),
            agg("cns", sn, 10, 1.0, 1000.0),
            agg("wilms", cardiac, 1, 0.0, 500.0),
        ];
        let estimates = estimate_all(&aggs, &EstimateOptions::default());

        assert_eq!(estimates[0].excess_share, None);
        assert_abs_diff_eq!(estimates[1].excess_share.unwrap(), 25.0, epsilon = 1e-9);
        assert_abs_diff_eq!(estimates[2].excess_share.unwrap(), 75.0, epsilon = 1e-9);
        assert_eq!(estimates[2].share_display, "75.0%");

        let ranked = rank_by_smr(&estimates);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].cause, sn);
        assert!(ranked.iter().all(|e| e.key != "wilms"));
    }
}
