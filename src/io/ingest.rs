//! Spectrum file ingest.
//!
//! Two formats are accepted:
//!
//! - `.json`: `{ "rows": R, "cols": C, "values": [...] }`, row-major
//! - anything else: a text grid, one spectrum row per line, values separated
//!   by whitespace and/or commas; blank lines and `#` comments are skipped
//!
//! The grid is expected to be fft-shifted (zero frequency at `(R/2, C/2)`).
//! Non-finite values are kept; the binner and fitters skip them.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::Spectrum2D;
use crate::error::AnalysisError;

/// JSON schema for a spectrum file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumFile {
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<f64>,
}

/// Load a spectrum, picking the format from the file extension.
pub fn read_spectrum(path: &Path) -> Result<Spectrum2D, AnalysisError> {
    let text = fs::read_to_string(path).map_err(|e| {
        AnalysisError::Io(format!("Failed to read spectrum '{}': {e}", path.display()))
    })?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let spectrum = if is_json {
        parse_spectrum_json(&text)?
    } else {
        parse_spectrum_text(&text)?
    };
    let (rows, cols) = spectrum.shape();
    log::info!("loaded {rows}x{cols} spectrum from {}", path.display());
    Ok(spectrum)
}

pub fn parse_spectrum_json(text: &str) -> Result<Spectrum2D, AnalysisError> {
    let file: SpectrumFile = serde_json::from_str(text)
        .map_err(|e| AnalysisError::invalid(format!("Invalid spectrum JSON: {e}")))?;
    Spectrum2D::new(file.rows, file.cols, file.values)
}

pub fn parse_spectrum_text(text: &str) -> Result<Spectrum2D, AnalysisError> {
    let mut values = Vec::new();
    let mut cols: Option<usize> = None;
    let mut rows = 0;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let row = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|tok| !tok.is_empty())
            .map(|tok| parse_value(tok, line_no))
            .collect::<Result<Vec<f64>, _>>()?;

        match cols {
            None => cols = Some(row.len()),
            Some(c) if c != row.len() => {
                return Err(AnalysisError::invalid(format!(
                    "Line {line_no}: expected {c} values, found {}.",
                    row.len()
                )));
            }
            Some(_) => {}
        }
        values.extend(row);
        rows += 1;
    }

    let cols = cols.ok_or_else(|| AnalysisError::invalid("Spectrum file contains no data rows."))?;
    Spectrum2D::new(rows, cols, values)
}

fn parse_value(tok: &str, line_no: usize) -> Result<f64, AnalysisError> {
    match tok.to_ascii_lowercase().as_str() {
        "nan" => Ok(f64::NAN),
        _ => tok.parse::<f64>().map_err(|_| {
            AnalysisError::invalid(format!("Line {line_no}: could not parse '{tok}' as a number."))
        }),
    }
}
