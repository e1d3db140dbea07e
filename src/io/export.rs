//! Export analysis results to JSON.
//!
//! The document carries the settings that produced it and a UTC timestamp so
//! exported runs can be compared later.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::AnalysisReport;
use crate::domain::AnalysisConfig;
use crate::error::AnalysisError;

#[derive(Debug, Serialize)]
pub struct ExportDocument<'a> {
    pub tool: &'static str,
    pub version: &'static str,
    pub generated_at: DateTime<Utc>,
    pub config: &'a AnalysisConfig,
    pub report: &'a AnalysisReport,
}

impl<'a> ExportDocument<'a> {
    pub fn new(config: &'a AnalysisConfig, report: &'a AnalysisReport) -> Self {
        Self {
            tool: "pspec",
            version: env!("CARGO_PKG_VERSION"),
            generated_at: Utc::now(),
            config,
            report,
        }
    }
}

/// Write the report as pretty-printed JSON.
pub fn write_report_json(
    path: &Path,
    config: &AnalysisConfig,
    report: &AnalysisReport,
) -> Result<(), AnalysisError> {
    let file = File::create(path).map_err(|e| {
        AnalysisError::Io(format!("Failed to create export JSON '{}': {e}", path.display()))
    })?;
    serde_json::to_writer_pretty(BufWriter::new(file), &ExportDocument::new(config, report))
        .map_err(|e| AnalysisError::Io(format!("Failed to write export JSON: {e}")))?;
    log::info!("wrote results to {}", path.display());
    Ok(())
}
