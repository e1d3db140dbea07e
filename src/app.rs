//! Top-level application orchestration.
//!
//! `src/main.rs` only sets up logging and maps errors to exit codes; this
//! module is the "real main" that:
//! - parses CLI arguments
//! - loads or generates the spectrum
//! - runs binning and fitting
//! - prints the report
//! - writes optional exports

use clap::Parser;

use crate::cli::{BinArgs, Command, CutUnit, FitArgs, InputArgs, ProfileArgs};
use crate::data::{SyntheticBreak, SyntheticSpectrum};
use crate::domain::{
    AnalysisConfig, AzimuthalSector, BinningOptions, BreakGuess, EllipticalFitOptions,
    ScaleConfig, SegmentedFitOptions, SpatialFrequency,
};
use crate::error::AnalysisError;
use crate::math::LmConfig;

pub mod pipeline;

/// Entry point for the `pspec` binary.
pub fn run() -> Result<(), AnalysisError> {
    let cli = crate::cli::Cli::parse();
    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Profile(args) => handle_profile(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AnalysisError> {
    let config = analysis_config_from_args(&args);
    let source = spectrum_source_from_args(&args.input);
    let run = pipeline::run_fit(&source, scale_from_args(&args.input), &config)?;

    println!("{}", crate::report::format_run_summary(&run.report));
    if args.table {
        println!(
            "{}",
            crate::report::format_profile_table(&run.report.profile, Some(&run.report.segmented))
        );
    }

    if let Some(path) = &args.export {
        crate::io::write_report_json(path, &config, &run.report)?;
    }
    Ok(())
}

fn handle_profile(args: ProfileArgs) -> Result<(), AnalysisError> {
    let source = spectrum_source_from_args(&args.input);
    let binning = pipeline::run_profile(
        &source,
        scale_from_args(&args.input),
        &binning_options_from_args(&args.bins),
    )?;
    println!("{}", crate::report::format_profile_table(&binning.profile, None));
    Ok(())
}

pub fn spectrum_source_from_args(args: &InputArgs) -> pipeline::SpectrumSource {
    match &args.input {
        Some(path) => pipeline::SpectrumSource::File(path.clone()),
        None => pipeline::SpectrumSource::Synthetic(SyntheticSpectrum {
            rows: args.size,
            cols: args.size,
            slope: args.synth_slope,
            broken: args.synth_break.map(|wavenumber| SyntheticBreak {
                wavenumber,
                slope_above: args.synth_slope_above,
            }),
            ellipticity: args.synth_ellipticity,
            orientation: args.synth_orientation,
            noise: args.noise,
            seed: args.seed,
            ..SyntheticSpectrum::default()
        }),
    }
}

pub fn scale_from_args(args: &InputArgs) -> ScaleConfig {
    ScaleConfig {
        pixel_scale_deg: args.pixel_scale_deg,
        distance_pc: args.distance_pc,
    }
}

pub fn binning_options_from_args(args: &BinArgs) -> BinningOptions {
    let sector = match (args.sector_theta, args.sector_width) {
        (Some(theta_0), Some(delta_theta)) => Some(AzimuthalSector {
            theta_0,
            delta_theta,
        }),
        _ => None,
    };
    BinningOptions {
        return_stddev: !args.no_stddev,
        logspacing: args.logspacing,
        max_bin: args.max_bin,
        min_bin: args.min_bin,
        nbins: args.nbins,
        binsize: args.binsize,
        sector,
    }
}

fn with_unit(value: f64, unit: CutUnit) -> SpatialFrequency {
    match unit {
        CutUnit::Pixel => SpatialFrequency::PerPixel(value),
        CutUnit::Deg => SpatialFrequency::PerDegree(value),
        CutUnit::Pc => SpatialFrequency::PerParsec(value),
    }
}

pub fn analysis_config_from_args(args: &FitArgs) -> AnalysisConfig {
    let break_guess = if let Some(f) = args.break_freq {
        Some(BreakGuess::Frequency(f))
    } else if let Some(l) = args.break_log {
        Some(BreakGuess::Log10(l))
    } else if args.search_break {
        Some(BreakGuess::Search)
    } else {
        None
    };

    let elliptical = (!args.no_2d).then(|| EllipticalFitOptions {
        bootstrap: !args.no_bootstrap,
        n_iters: args.n_iters,
        seed: args.boot_seed,
        fix_ellipticity: args.fix_ellipticity,
        radial_weighting: args.radial_weighting,
        lm: LmConfig {
            max_iterations: args.max_iterations,
            ..LmConfig::default()
        },
    });

    AnalysisConfig {
        binning: binning_options_from_args(&args.bins),
        low_cut: args.low_cut.map(|v| with_unit(v, args.cut_unit)),
        high_cut: args.high_cut.map(|v| with_unit(v, args.cut_unit)),
        segmented: SegmentedFitOptions {
            break_guess,
            weighted: args.weighted,
            min_fit_points: args.min_fit_points,
            break_validation: args.break_validation,
            ..SegmentedFitOptions::default()
        },
        elliptical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;

    fn fit_args(argv: &[&str]) -> FitArgs {
        let mut full = vec!["pspec", "fit"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Command::Fit(args) => args,
            Command::Profile(_) => panic!("expected fit"),
        }
    }

    #[test]
    fn cli_defaults_match_library_defaults() {
        let config = analysis_config_from_args(&fit_args(&[]));
        assert_eq!(config.binning, BinningOptions::default());
        assert_eq!(config.segmented, SegmentedFitOptions::default());
        assert_eq!(config.elliptical, Some(EllipticalFitOptions::default()));
        assert!(config.low_cut.is_none() && config.high_cut.is_none());
    }

    #[test]
    fn cut_unit_and_break_flags_map_through() {
        let config = analysis_config_from_args(&fit_args(&[
            "--low-cut",
            "0.5",
            "--cut-unit",
            "pc",
            "--search-break",
            "--no-2d",
        ]));
        assert_eq!(config.low_cut, Some(SpatialFrequency::PerParsec(0.5)));
        assert_eq!(config.segmented.break_guess, Some(BreakGuess::Search));
        assert!(config.elliptical.is_none());
    }

    #[test]
    fn synthetic_source_without_input() {
        let args = fit_args(&["--size", "64", "--synth-break", "8"]);
        let pipeline::SpectrumSource::Synthetic(cfg) = spectrum_source_from_args(&args.input) else {
            panic!("expected synthetic source");
        };
        assert_eq!((cfg.rows, cfg.cols), (64, 64));
        assert_eq!(cfg.broken.map(|b| b.wavenumber), Some(8.0));
    }
}
