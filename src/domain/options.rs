//! Option structs for each analysis step.
//!
//! Defaults mirror the values used by the `pspec` binary so that library callers
//! and CLI runs behave the same unless told otherwise.

use serde::{Deserialize, Serialize};

use crate::math::LmConfig;

/// Angular sector restricting which pixels enter the radial average.
///
/// The sector is symmetric under rotation by π because the power spectrum of
/// a real field is point-symmetric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AzimuthalSector {
    /// Sector centre in radians.
    pub theta_0: f64,
    /// Full opening angle in radians.
    pub delta_theta: f64,
}

/// Options for [`crate::spectrum::bin_radially`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinningOptions {
    pub return_stddev: bool,
    pub logspacing: bool,
    /// Upper edge of the binned range (cycles/pixel). Defaults to 0.5.
    pub max_bin: Option<f64>,
    /// Lower edge of the binned range. Defaults to `1 / min(shape)`.
    pub min_bin: Option<f64>,
    /// Number of bins. Defaults to `round(max pixel radius / binsize) + 1`.
    pub nbins: Option<usize>,
    pub binsize: f64,
    pub sector: Option<AzimuthalSector>,
}

impl Default for BinningOptions {
    fn default() -> Self {
        Self {
            return_stddev: true,
            logspacing: false,
            max_bin: None,
            min_bin: None,
            nbins: None,
            binsize: 1.0,
            sector: None,
        }
    }
}

/// Initial break location for the segmented fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BreakGuess {
    /// Break frequency in cycles/pixel.
    Frequency(f64),
    /// log10 of the break frequency.
    Log10(f64),
    /// Propose breaks from the knots of a smoothing spline.
    Search,
}

/// Which segment(s) must hold at least `min_fit_points` samples for a break
/// fit to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BreakValidation {
    /// Only the samples below the break are counted.
    BelowBreak,
    /// Only the samples at or above the break are counted.
    AboveBreak,
    /// Both segments are checked.
    #[default]
    BothSegments,
}

/// Options for [`crate::fit::fit_segmented`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentedFitOptions {
    pub break_guess: Option<BreakGuess>,
    /// Weight by inverse-squared log-space errors derived from the bin scatter.
    pub weighted: bool,
    pub min_fit_points: usize,
    pub break_validation: BreakValidation,
    /// Iteration cap for the break-location update.
    pub max_break_iterations: usize,
    /// Convergence tolerance on the log10 break location.
    pub break_tolerance: f64,
    /// Spline smoothing factor for break search (sum of squared residuals).
    /// Defaults to `n · σ²` with σ estimated from successive differences.
    pub spline_smoothing: Option<f64>,
    /// log10 location the break search prefers when several knots are found.
    /// Defaults to the centre of the fit range.
    pub expected_break: Option<f64>,
}

impl Default for SegmentedFitOptions {
    fn default() -> Self {
        Self {
            break_guess: None,
            weighted: false,
            min_fit_points: 10,
            break_validation: BreakValidation::default(),
            max_break_iterations: 50,
            break_tolerance: 1e-6,
            spline_smoothing: None,
            expected_break: None,
        }
    }
}

/// Starting point for the elliptical fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialParams {
    /// log10 amplitude.
    pub amplitude: f64,
    /// Unbounded ellipticity coordinate (0 maps to ellipticity 0.5).
    pub ellipticity_raw: f64,
    pub orientation: f64,
    pub slope: f64,
}

impl InitialParams {
    /// Generic guess used when no 1D fit is available.
    pub fn from_peak(peak_power: f64) -> Self {
        Self {
            amplitude: peak_power.log10(),
            ellipticity_raw: 0.0,
            orientation: std::f64::consts::FRAC_PI_2,
            slope: -2.0,
        }
    }

    /// Seed slope and amplitude from a 1D fit.
    pub fn from_segmented(outcome: &crate::domain::SegmentedFitOutcome) -> Self {
        Self {
            amplitude: outcome.intercept(),
            ellipticity_raw: 0.0,
            orientation: std::f64::consts::FRAC_PI_2,
            slope: outcome.slope(),
        }
    }
}

/// Options for [`crate::fit::fit_elliptical`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EllipticalFitOptions {
    pub bootstrap: bool,
    pub n_iters: usize,
    /// Base seed; bootstrap iteration `i` uses `seed + i`.
    pub seed: u64,
    /// Hold the ellipticity at 0 (isotropic) and only fit amplitude and slope.
    pub fix_ellipticity: bool,
    /// Weight each pixel by `1 / radius`.
    pub radial_weighting: bool,
    pub lm: LmConfig,
}

impl Default for EllipticalFitOptions {
    fn default() -> Self {
        Self {
            bootstrap: true,
            n_iters: 100,
            seed: 0,
            fix_ellipticity: false,
            radial_weighting: false,
            lm: LmConfig::default(),
        }
    }
}

/// Pixel/angular/physical scale of the image the spectrum was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScaleConfig {
    /// Angular size of one pixel in degrees.
    pub pixel_scale_deg: Option<f64>,
    /// Distance to the emitting region in parsecs.
    pub distance_pc: Option<f64>,
}

/// A spatial frequency expressed in one of the supported units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum SpatialFrequency {
    PerPixel(f64),
    PerDegree(f64),
    PerParsec(f64),
}

/// Settings for a full profile + 1D + 2D run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub binning: BinningOptions,
    /// Defaults to `1 / (0.5 · max(shape))`.
    pub low_cut: Option<SpatialFrequency>,
    /// Defaults to the highest profile frequency.
    pub high_cut: Option<SpatialFrequency>,
    pub segmented: SegmentedFitOptions,
    /// `None` skips the 2D fit.
    pub elliptical: Option<EllipticalFitOptions>,
}
