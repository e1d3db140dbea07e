//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - passed between the masking, binning and fitting steps by value
//! - exported to JSON
//! - handed to a plotting/reporting sink without further conversion
//!
//! Every result type is an immutable value produced by exactly one call. Optional
//! quantities are `Option` fields with accessors returning
//! [`AnalysisError::NotComputedYet`] instead of silently defaulting.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Two-dimensional power spectrum, stored row-major with the zero-frequency
/// pixel at `(rows / 2, cols / 2)` (fft-shifted layout).
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum2D {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl Spectrum2D {
    pub fn new(rows: usize, cols: usize, values: Vec<f64>) -> Result<Self, AnalysisError> {
        if rows == 0 || cols == 0 {
            return Err(AnalysisError::invalid("Spectrum must have at least one row and column."));
        }
        if values.len() != rows * cols {
            return Err(AnalysisError::invalid(format!(
                "Spectrum has {} values but shape {rows}x{cols} needs {}.",
                values.len(),
                rows * cols
            )));
        }
        Ok(Self { rows, cols, values })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.values[row * self.cols + col])
        } else {
            None
        }
    }

    /// Largest finite value in the spectrum.
    pub fn peak(&self) -> Option<f64> {
        self.values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
    }
}

/// Per-pixel spatial frequencies (cycles/pixel) matching a [`Spectrum2D`].
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyGrid {
    pub rows: usize,
    pub cols: usize,
    /// Frequency along the column axis.
    pub kx: Vec<f64>,
    /// Frequency along the row axis.
    pub ky: Vec<f64>,
    /// `hypot(kx, ky)`.
    pub radial: Vec<f64>,
}

impl FrequencyGrid {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.radial.len()
    }

    pub fn is_empty(&self) -> bool {
        self.radial.is_empty()
    }

    /// Largest radial frequency present on the grid.
    pub fn max_radial(&self) -> f64 {
        self.radial.iter().copied().fold(0.0, f64::max)
    }
}

/// Boolean inclusion mask over a frequency grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyMask {
    rows: usize,
    cols: usize,
    included: Vec<bool>,
}

impl FrequencyMask {
    pub fn new(rows: usize, cols: usize, included: Vec<bool>) -> Result<Self, AnalysisError> {
        if included.len() != rows * cols {
            return Err(AnalysisError::invalid(format!(
                "Mask has {} entries but shape {rows}x{cols} needs {}.",
                included.len(),
                rows * cols
            )));
        }
        Ok(Self { rows, cols, included })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.included
    }

    pub fn is_included(&self, index: usize) -> bool {
        self.included.get(index).copied().unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.included.iter().filter(|&&b| b).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.included.iter().any(|&b| b)
    }
}

/// One radial bin of the 1D power spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadialBin {
    /// Bin centre in cycles/pixel.
    pub frequency: f64,
    pub mean_power: f64,
    /// Within-bin scatter of the pixel powers (only when requested).
    pub stddev: Option<f64>,
    pub count: usize,
}

/// Radially averaged power spectrum. Frequencies are strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadialProfile {
    bins: Vec<RadialBin>,
}

impl RadialProfile {
    pub(crate) fn from_bins(bins: Vec<RadialBin>) -> Self {
        Self { bins }
    }

    pub fn bins(&self) -> &[RadialBin] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn frequencies(&self) -> Vec<f64> {
        self.bins.iter().map(|b| b.frequency).collect()
    }

    pub fn powers(&self) -> Vec<f64> {
        self.bins.iter().map(|b| b.mean_power).collect()
    }

    pub fn has_stddev(&self) -> bool {
        !self.bins.is_empty() && self.bins.iter().all(|b| b.stddev.is_some())
    }

    /// Per-bin standard deviations.
    pub fn stddevs(&self) -> Result<Vec<f64>, AnalysisError> {
        self.bins
            .iter()
            .map(|b| b.stddev.ok_or(AnalysisError::NotComputedYet("ps1D_stddev")))
            .collect()
    }

    pub fn max_frequency(&self) -> Option<f64> {
        self.bins.last().map(|b| b.frequency)
    }
}

/// Output of a radial binning call.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialBinning {
    pub profile: RadialProfile,
    /// Sector mask, present only when an azimuthal constraint was requested.
    pub azimuthal_mask: Option<FrequencyMask>,
}

/// Inclusive fit range in cycles/pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitRange {
    pub low: f64,
    pub high: f64,
}

impl FitRange {
    pub fn new(low: f64, high: f64) -> Result<Self, AnalysisError> {
        if !(low.is_finite() && high.is_finite() && low >= 0.0 && high > low) {
            return Err(AnalysisError::invalid(format!(
                "Invalid frequency cuts: low={low}, high={high} (need finite, >=0, high>low)."
            )));
        }
        Ok(Self { low, high })
    }

    pub fn contains(&self, freq: f64) -> bool {
        freq >= self.low && freq <= self.high
    }
}

/// Non-fatal conditions retained alongside a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitWarning {
    /// A converged break fit left too few points on a segment and was discarded.
    InsufficientSegmentPoints {
        below: usize,
        above: usize,
        required: usize,
    },
    /// The break model could not be fit; the unbroken model was used instead.
    BreakFitFailed { reason: String },
    /// Fitted ellipticity sits at the edge of its range; a re-fit with the
    /// ellipticity fixed is recommended.
    Isotropy { ellipticity: f64 },
    /// Inverse-radius weighting was combined with a free ellipticity.
    RadialWeightingBias,
    /// Some bootstrap re-fits did not converge and were skipped.
    BootstrapIterationsDropped { failed: usize, total: usize },
}

impl std::fmt::Display for FitWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitWarning::InsufficientSegmentPoints { below, above, required } => write!(
                f,
                "Not enough points to fit to (below={below}, above={above}, need {required}). Ignoring break."
            ),
            FitWarning::BreakFitFailed { reason } => {
                write!(f, "Model with break failed ({reason}); reverting to model without break.")
            }
            FitWarning::Isotropy { ellipticity } => write!(
                f,
                "Ellipticity {ellipticity:.3} is close to 1; the fit converges poorly there. \
                 Consider re-fitting with the ellipticity fixed."
            ),
            FitWarning::RadialWeightingBias => write!(
                f,
                "Radial weighting with a free ellipticity biases the anisotropy estimate."
            ),
            FitWarning::BootstrapIterationsDropped { failed, total } => {
                write!(f, "{failed} of {total} bootstrap re-fits did not converge and were skipped.")
            }
        }
    }
}

/// Single power-law fit in log10-log10 space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub slope: f64,
    pub slope_stderr: f64,
    pub intercept: f64,
    pub intercept_stderr: f64,
    pub n_points: usize,
    pub weighted: bool,
}

/// Two-segment power law meeting at a fitted break.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakFitResult {
    /// Break frequency in cycles/pixel.
    pub break_freq: f64,
    pub break_stderr: f64,
    /// log10 of `break_freq`.
    pub log_break: f64,
    /// `[pre, post]` slopes.
    pub slopes: [f64; 2],
    pub slope_stderrs: [f64; 2],
    pub intercept: f64,
    pub intercept_stderr: f64,
    pub n_below: usize,
    pub n_above: usize,
    /// False when the fit converged but failed segment validation.
    pub valid: bool,
}

/// Authoritative model after a segmented fit call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum SegmentedFit {
    Unbroken(FitResult),
    Broken(BreakFitResult),
}

/// Result of [`crate::fit::fit_segmented`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentedFitOutcome {
    pub fit: SegmentedFit,
    pub range: FitRange,
    /// Whether a break model was requested (explicitly or via search).
    pub break_requested: bool,
    /// Converged break fit that failed validation, kept for diagnostics.
    pub rejected_break: Option<BreakFitResult>,
    pub warnings: Vec<FitWarning>,
}

impl SegmentedFitOutcome {
    pub fn is_broken(&self) -> bool {
        matches!(self.fit, SegmentedFit::Broken(_))
    }

    /// True when a break was requested but the unbroken model was used.
    pub fn was_downgraded(&self) -> bool {
        self.break_requested && !self.is_broken()
    }

    /// Slope of the unbroken model, or the pre-break slope.
    pub fn slope(&self) -> f64 {
        match &self.fit {
            SegmentedFit::Unbroken(f) => f.slope,
            SegmentedFit::Broken(b) => b.slopes[0],
        }
    }

    pub fn intercept(&self) -> f64 {
        match &self.fit {
            SegmentedFit::Unbroken(f) => f.intercept,
            SegmentedFit::Broken(b) => b.intercept,
        }
    }

    pub fn break_fit(&self) -> Result<&BreakFitResult, AnalysisError> {
        match &self.fit {
            SegmentedFit::Broken(b) => Ok(b),
            SegmentedFit::Unbroken(_) => Err(AnalysisError::NotComputedYet("brk")),
        }
    }

    /// Fitted log10 power at a log10 frequency.
    pub fn predict_log(&self, log_freq: f64) -> f64 {
        match &self.fit {
            SegmentedFit::Unbroken(f) => f.intercept + f.slope * log_freq,
            SegmentedFit::Broken(b) => {
                let above = (log_freq - b.log_break).max(0.0);
                b.intercept + b.slopes[0] * log_freq + (b.slopes[1] - b.slopes[0]) * above
            }
        }
    }

    /// Fitted power at a linear frequency (for plotting sinks).
    pub fn predict(&self, freq: f64) -> f64 {
        10f64.powf(self.predict_log(freq.log10()))
    }
}

/// How the elliptical-fit standard errors were estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum StderrMethod {
    Bootstrap { successful: usize, requested: usize },
    Covariance,
}

/// Anisotropic power-law fit to the 2D spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EllipticalFitResult {
    /// log10 amplitude.
    pub amplitude: f64,
    pub amplitude_stderr: f64,
    pub slope: f64,
    pub slope_stderr: f64,
    /// Bounded ellipticity in `[0, 1)`, 0 = isotropic.
    pub ellipticity: f64,
    pub ellipticity_stderr: f64,
    /// Unbounded optimizer coordinate behind `ellipticity` (None when fixed).
    pub ellipticity_raw: Option<f64>,
    /// Position angle in `[0, π)`.
    pub orientation: f64,
    pub orientation_stderr: f64,
    pub fixed_ellipticity: bool,
    pub n_points: usize,
    pub iterations: usize,
    pub stderr_method: StderrMethod,
    pub warnings: Vec<FitWarning>,
}

impl EllipticalFitResult {
    pub fn isotropy_warning(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, FitWarning::Isotropy { .. }))
    }

    /// Model log10 power at `(kx, ky)` in cycles/pixel.
    pub fn predict_log(&self, kx: f64, ky: f64) -> f64 {
        crate::fit::elliptical::model_log_power(
            kx,
            ky,
            self.amplitude,
            self.ellipticity,
            self.orientation,
            self.slope,
        )
    }
}
