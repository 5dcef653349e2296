//! Output table and run report writers

use crate::error::EngineResult;
use crate::pipeline::pipeline_engine::{PipelineOutput, RunReport};
use julius_common::config::ensure_directory_exists;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DAILY_FILE: &str = "top_level_daily.csv";
pub const AD_SET_FILE: &str = "ad_set_level.csv";
pub const AD_FILE: &str = "ad_level.csv";
pub const REPORT_FILE: &str = "run_report.json";

/// Paths written for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFiles {
    pub daily: PathBuf,
    pub ad_sets: PathBuf,
    pub ads: PathBuf,
    pub report: Option<PathBuf>,
}

/// Serialize `rows` to a CSV file, header taken from the first row
///
/// An empty slice produces an empty file. Returns the number of rows written.
pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> EngineResult<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(rows.len())
}

/// Pretty-printed JSON run report
pub fn write_report_json(path: &Path, report: &RunReport) -> EngineResult<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Write all output tables (and optionally the run report) into `dir`
pub fn write_outputs(dir: &Path, output: &PipelineOutput, include_report: bool) -> EngineResult<OutputFiles> {
    ensure_directory_exists(dir)?;

    let files = OutputFiles {
        daily: dir.join(DAILY_FILE),
        ad_sets: dir.join(AD_SET_FILE),
        ads: dir.join(AD_FILE),
        report: include_report.then(|| dir.join(REPORT_FILE)),
    };

    let daily = write_rows(&files.daily, &output.daily)?;
    let ad_sets = write_rows(&files.ad_sets, &output.ad_sets)?;
    let ads = write_rows(&files.ads, &output.ads)?;
    if let Some(report_path) = &files.report {
        write_report_json(report_path, &output.report)?;
    }

    info!(
        run_id = %output.run_id,
        dir = %dir.display(),
        daily,
        ad_sets,
        ads,
        "Outputs written"
    );

    Ok(files)
}
