//! Shared pipeline used by the CLI subcommands:
//! load/generate spectrum -> analysis object -> profile / fits.

use std::path::PathBuf;

use crate::analysis::{AnalysisReport, PowerSpectrumAnalysis};
use crate::data::{SyntheticSpectrum, generate_spectrum};
use crate::domain::{AnalysisConfig, BinningOptions, RadialBinning, ScaleConfig, Spectrum2D};
use crate::error::AnalysisError;

#[derive(Debug, Clone, PartialEq)]
pub enum SpectrumSource {
    File(PathBuf),
    Synthetic(SyntheticSpectrum),
}

impl SpectrumSource {
    pub fn load(&self) -> Result<Spectrum2D, AnalysisError> {
        match self {
            SpectrumSource::File(path) => crate::io::read_spectrum(path),
            SpectrumSource::Synthetic(cfg) => {
                log::info!(
                    "no input file; generating {}x{} synthetic spectrum (seed {})",
                    cfg.rows,
                    cfg.cols,
                    cfg.seed
                );
                generate_spectrum(cfg)
            }
        }
    }
}

/// All computed outputs of a single `pspec fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub analysis: PowerSpectrumAnalysis,
    pub report: AnalysisReport,
}

pub fn run_fit(
    source: &SpectrumSource,
    scale: ScaleConfig,
    config: &AnalysisConfig,
) -> Result<RunOutput, AnalysisError> {
    let analysis = PowerSpectrumAnalysis::new(source.load()?, scale)?;
    let report = analysis.run(config)?;
    Ok(RunOutput { analysis, report })
}

pub fn run_profile(
    source: &SpectrumSource,
    scale: ScaleConfig,
    opts: &BinningOptions,
) -> Result<RadialBinning, AnalysisError> {
    let analysis = PowerSpectrumAnalysis::new(source.load()?, scale)?;
    analysis.bin_radially(opts)
}
