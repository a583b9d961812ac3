//! Run the full late-mortality analysis for a cohort file
//!
//! Writes estimates.csv, incidence.csv, heterogeneity.csv and
//! life_expectancy.csv to the output directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use survivor_mortality::{
    estimates::rank_by_smr, load_reference_rates, load_subjects, run_analysis, AnalysisConfig, AnalysisOutput,
};

#[derive(Parser, Debug)]
#[command(name = "run_analysis", about = "SMR, AER, cumulative incidence and life-years lost for a survivor cohort")]
struct Args {
    /// Subject CSV (one row per subject)
    #[arg(long)]
    subjects: PathBuf,

    /// Reference rate CSV (sex, cause, age_start, year_start, rate)
    #[arg(long)]
    rates: PathBuf,

    /// JSON config; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "output")]
    out_dir: PathBuf,
}

/// One line of incidence.csv; `source` is "observed" or "expected"
#[derive(Debug, Serialize)]
struct IncidenceRow<'a> {
    cause: &'a str,
    group: &'a str,
    source: &'static str,
    age: f64,
    incidence_pct: f64,
    competing_pct: Option<f64>,
    survival_pct: f64,
    at_risk: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HeterogeneityRow<'a> {
    cause: &'a str,
    statistic: f64,
    df: usize,
    p_value: f64,
}

fn write_csv<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    let mut count = 0;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

fn incidence_rows(output: &AnalysisOutput) -> Vec<IncidenceRow<'_>> {
    let mut rows = Vec::new();
    for cause in &output.incidence {
        let label = cause.cause.label();
        for curve in &cause.observed.curves {
            rows.extend(curve.points.iter().map(|p| IncidenceRow {
                cause: label,
                group: &curve.group,
                source: "observed",
                age: p.time,
                incidence_pct: p.event_pct,
                competing_pct: Some(p.competing_pct),
                survival_pct: p.survival_pct,
                at_risk: Some(p.at_risk),
            }));
        }
        for curve in &cause.expected {
            rows.extend(curve.points.iter().map(|p| IncidenceRow {
                cause: label,
                group: &curve.group,
                source: "expected",
                age: p.age,
                incidence_pct: p.incidence_pct,
                competing_pct: None,
                survival_pct: p.survival_pct,
                at_risk: None,
            }));
        }
    }
    rows
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let start = Instant::now();

    let config = match &args.config {
        Some(path) => AnalysisConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };

    println!("Loading subjects from {}...", args.subjects.display());
    let report = load_subjects(&args.subjects, config.invalid_rows)
        .with_context(|| format!("loading subjects {}", args.subjects.display()))?;
    println!(
        "Loaded {} subjects ({} rejected) in {:?}",
        report.subjects.len(),
        report.rejected.len(),
        start.elapsed()
    );

    let rates = load_reference_rates(&args.rates)
        .with_context(|| format!("loading reference rates {}", args.rates.display()))?;
    println!("Loaded {} reference rate cells", rates.len());

    println!("Running analysis...");
    let run_start = Instant::now();
    let output = run_analysis(&report.subjects, &rates, &config)?;
    println!("Analysis complete in {:?}", run_start.elapsed());

    fs::create_dir_all(&args.out_dir).with_context(|| format!("creating {}", args.out_dir.display()))?;
    let n = write_csv(&args.out_dir.join("estimates.csv"), &output.estimates)?;
    println!("  estimates.csv: {} strata", n);
    let n = write_csv(&args.out_dir.join("incidence.csv"), incidence_rows(&output))?;
    println!("  incidence.csv: {} points", n);
    let tests = output.incidence.iter().filter_map(|c| {
        c.observed.heterogeneity.as_ref().map(|t| HeterogeneityRow {
            cause: c.cause.label(),
            statistic: t.statistic,
            df: t.df,
            p_value: t.p_value,
        })
    });
    let n = write_csv(&args.out_dir.join("heterogeneity.csv"), tests)?;
    println!("  heterogeneity.csv: {} tests", n);
    let n = write_csv(&args.out_dir.join("life_expectancy.csv"), &output.life_expectancy)?;
    println!("  life_expectancy.csv: {} groups", n);

    println!("\nCohort Summary:");
    println!("  Subjects: {} ({} excluded from episodes)", output.subjects, output.excluded.len());
    println!("  Person-years: {:.1}", output.person_years);
    println!("  Highest SMRs:");
    for est in rank_by_smr(&output.estimates).into_iter().take(5) {
        println!(
            "    {:<20} {:<20} {:<22} SMR {}",
            est.cause.label(),
            est.grouping.label(),
            est.key,
            est.smr_display
        );
    }
    for row in &output.life_expectancy {
        match row.years_lost {
            Some(lost) => println!("  Life-years lost ({}): {:.2}", row.key, lost),
            None => println!("  Life-years lost ({}): {}", row.key, row.status),
        }
    }

    println!("\nTotal time: {:?}", start.elapsed());
    Ok(())
}
