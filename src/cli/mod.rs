//! Command-line parsing for the power-spectrum fitter.
//!
//! Argument parsing and command dispatch stay separate from the analysis code;
//! `app` turns these structs into library option structs.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::domain::BreakValidation;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "pspec", version, about = "Radial profile and power-law fits for 2D power spectra")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bin the spectrum, fit the 1D profile and the 2D elliptical model.
    Fit(FitArgs),
    /// Print the radial profile only.
    Profile(ProfileArgs),
}

/// Where the spectrum comes from. Without `--input` a synthetic power law is
/// generated.
#[derive(Debug, Args, Clone)]
pub struct InputArgs {
    /// Spectrum file: `.json` ({rows, cols, values}) or a whitespace/comma text grid.
    #[arg(short = 'i', long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Synthetic spectrum size (square).
    #[arg(long, default_value_t = 128)]
    pub size: usize,

    /// Synthetic power-law slope.
    #[arg(long, default_value_t = -3.0, allow_negative_numbers = true)]
    pub synth_slope: f64,

    /// Synthetic ellipticity in [0, 1).
    #[arg(long, default_value_t = 0.0)]
    pub synth_ellipticity: f64,

    /// Synthetic orientation (radians).
    #[arg(long, default_value_t = std::f64::consts::FRAC_PI_2)]
    pub synth_orientation: f64,

    /// Synthetic break wavenumber (pixels), with `--synth-slope-above`.
    #[arg(long)]
    pub synth_break: Option<f64>,

    /// Slope above the synthetic break.
    #[arg(long, default_value_t = -5.0, allow_negative_numbers = true)]
    pub synth_slope_above: f64,

    /// Log-normal noise σ for the synthetic spectrum.
    #[arg(long, default_value_t = 0.05)]
    pub noise: f64,

    /// Seed for the synthetic spectrum.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Angular pixel size in degrees (enables `--cut-unit deg`).
    #[arg(long)]
    pub pixel_scale_deg: Option<f64>,

    /// Distance in parsecs (enables `--cut-unit pc`).
    #[arg(long)]
    pub distance_pc: Option<f64>,
}

#[derive(Debug, Args, Clone)]
pub struct BinArgs {
    /// Logarithmically spaced bins.
    #[arg(long)]
    pub logspacing: bool,

    /// Skip per-bin standard deviations.
    #[arg(long)]
    pub no_stddev: bool,

    /// Upper binning edge (cycles/pixel).
    #[arg(long)]
    pub max_bin: Option<f64>,

    /// Lower binning edge (cycles/pixel).
    #[arg(long)]
    pub min_bin: Option<f64>,

    /// Number of bins.
    #[arg(long)]
    pub nbins: Option<usize>,

    /// Bin width in pixels (used when `--nbins` is not given).
    #[arg(long, default_value_t = 1.0)]
    pub binsize: f64,

    /// Azimuthal sector centre (radians), with `--sector-width`.
    #[arg(long, requires = "sector_width")]
    pub sector_theta: Option<f64>,

    /// Azimuthal sector opening angle (radians).
    #[arg(long, requires = "sector_theta")]
    pub sector_width: Option<f64>,
}

/// Unit of `--low-cut` / `--high-cut` / `--break-freq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CutUnit {
    Pixel,
    Deg,
    Pc,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub bins: BinArgs,

    /// Lower fit cutoff (default: 1 / (0.5 max(shape)) per pixel).
    #[arg(long)]
    pub low_cut: Option<f64>,

    /// Upper fit cutoff (default: largest profile frequency).
    #[arg(long)]
    pub high_cut: Option<f64>,

    #[arg(long, value_enum, default_value_t = CutUnit::Pixel)]
    pub cut_unit: CutUnit,

    /// Initial break frequency (cycles/pixel).
    #[arg(long, conflicts_with_all = ["break_log", "search_break"])]
    pub break_freq: Option<f64>,

    /// Initial break as log10 frequency.
    #[arg(long, allow_negative_numbers = true, conflicts_with = "search_break")]
    pub break_log: Option<f64>,

    /// Search for a break with the spline-knot heuristic.
    #[arg(long)]
    pub search_break: bool,

    /// Weight the 1D fit by the bin scatter (unbroken model only).
    #[arg(long)]
    pub weighted: bool,

    /// Minimum samples per checked segment for a break to be kept.
    #[arg(long, default_value_t = 10)]
    pub min_fit_points: usize,

    #[arg(long, value_enum, default_value_t = BreakValidation::BothSegments)]
    pub break_validation: BreakValidation,

    /// Skip the 2D elliptical fit.
    #[arg(long)]
    pub no_2d: bool,

    /// Use covariance errors instead of the bootstrap.
    #[arg(long)]
    pub no_bootstrap: bool,

    /// Bootstrap iterations.
    #[arg(long, default_value_t = 100)]
    pub n_iters: usize,

    /// Base seed for the bootstrap.
    #[arg(long, default_value_t = 0)]
    pub boot_seed: u64,

    /// Hold the 2D model isotropic.
    #[arg(long)]
    pub fix_ellipticity: bool,

    /// Weight 2D pixels by 1/radius.
    #[arg(long)]
    pub radial_weighting: bool,

    /// Optimizer iteration cap.
    #[arg(long, default_value_t = 200)]
    pub max_iterations: usize,

    /// Print the per-bin profile table.
    #[arg(long)]
    pub table: bool,

    /// Export results to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ProfileArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub bins: BinArgs,
}
