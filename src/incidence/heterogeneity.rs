//! K-sample log-rank test of the event-of-interest hazard across groups

use std::collections::BTreeMap;

use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};

use super::cif::{at_risk, sorted, CompetingObservation, CompetingStatus};
use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupCount {
    pub group: String,
    pub observed: f64,
    pub expected: f64,
}

/// Chi-square heterogeneity statistic with `groups - 1` degrees of freedom
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeterogeneityTest {
    pub statistic: f64,
    pub df: usize,
    pub p_value: f64,
    pub groups: Vec<GroupCount>,
}

/// Solve `a x = b` in place by Gaussian elimination with partial pivoting
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

/// Log-rank test comparing the event-of-interest hazard between groups.
///
/// Competing events and censoring both remove subjects from the risk set.
/// Delayed entry is honoured the same way as in the incidence estimator.
pub fn log_rank_test(observations: &[CompetingObservation]) -> Result<HeterogeneityTest> {
    let mut members: BTreeMap<&str, Vec<&CompetingObservation>> = BTreeMap::new();
    for o in observations {
        members.entry(o.group.as_str()).or_default().push(o);
    }
    let k = members.len();
    if k < 2 {
        return Err(AnalysisError::InvalidInput("heterogeneity test needs at least two groups".to_string()));
    }

    let labels: Vec<&str> = members.keys().copied().collect();
    let risk: Vec<(Vec<f64>, Vec<f64>)> = members
        .values()
        .map(|obs| {
            (
                sorted(obs.iter().map(|o| o.entry)),
                sorted(obs.iter().map(|o| o.exit)),
            )
        })
        .collect();

    let mut event_times: Vec<f64> = observations
        .iter()
        .filter(|o| o.status == CompetingStatus::Event)
        .map(|o| o.exit)
        .collect();
    event_times.sort_by(|a, b| a.total_cmp(b));
    event_times.dedup();

    let mut observed = vec![0.0; k];
    let mut expected = vec![0.0; k];
    let mut variance = vec![vec![0.0; k]; k];

    for &t in &event_times {
        let n_g: Vec<f64> = risk.iter().map(|(e, x)| at_risk(e, x, t) as f64).collect();
        let d_g: Vec<f64> = members
            .values()
            .map(|obs| {
                obs.iter()
                    .filter(|o| o.status == CompetingStatus::Event && o.exit == t)
                    .count() as f64
            })
            .collect();
        let n: f64 = n_g.iter().sum();
        let d: f64 = d_g.iter().sum();
        if n <= 0.0 {
            continue;
        }

        for g in 0..k {
            observed[g] += d_g[g];
            expected[g] += d * n_g[g] / n;
        }
        if n > 1.0 {
            let spread = d * (n - d) / (n - 1.0);
            for g in 0..k {
                for h in 0..k {
                    let delta = if g == h { 1.0 } else { 0.0 };
                    variance[g][h] += spread * (n_g[g] / n) * (delta - n_g[h] / n);
                }
            }
        }
    }

    // Drop the last group: the full covariance matrix is singular
    let df = k - 1;
    let u: Vec<f64> = (0..df).map(|g| observed[g] - expected[g]).collect();
    let v: Vec<Vec<f64>> = (0..df).map(|g| variance[g][..df].to_vec()).collect();
    let x = solve(v, u.clone()).ok_or_else(|| AnalysisError::StatisticalUndefined {
        key: "heterogeneity".to_string(),
        reason: "singular log-rank variance (no informative events)".to_string(),
    })?;
    let statistic: f64 = u.iter().zip(&x).map(|(a, b)| a * b).sum();

    let dist = ChiSquared::new(df as f64).map_err(|e| AnalysisError::InvalidInput(e.to_string()))?;
    let p_value = dist.sf(statistic);

    let groups = labels
        .iter()
        .enumerate()
        .map(|(g, label)| GroupCount {
            group: label.to_string(),
            observed: observed[g],
            expected: expected[g],
        })
        .collect();

    Ok(HeterogeneityTest {
        statistic,
        df,
        p_value,
        groups,
    })
}
