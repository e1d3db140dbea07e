//! Per-spectrum analysis object.
//!
//! [`PowerSpectrumAnalysis`] owns one read-only spectrum with its frequency
//! grid and scale, and exposes the masking, binning and fitting steps. Each
//! step returns an immutable value that the caller threads into the next one;
//! nothing is cached between calls.

use serde::Serialize;

use crate::domain::{
    AnalysisConfig, BinningOptions, EllipticalFitOptions, EllipticalFitResult, FitRange,
    FrequencyGrid, FrequencyMask, InitialParams, RadialBinning, RadialProfile, ScaleConfig,
    SegmentedFitOptions, SegmentedFitOutcome, SpatialFrequency, Spectrum2D,
};
use crate::error::AnalysisError;
use crate::fit::{fit_elliptical, fit_segmented};
use crate::spectrum::{bin_radially, frequency_mask, make_frequency_grids, to_pixel_frequency};

#[derive(Debug, Clone)]
pub struct PowerSpectrumAnalysis {
    spectrum: Spectrum2D,
    grid: FrequencyGrid,
    scale: ScaleConfig,
}

/// Everything produced by [`PowerSpectrumAnalysis::run`].
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub shape: (usize, usize),
    pub profile: RadialProfile,
    pub fit_range: FitRange,
    pub segmented: SegmentedFitOutcome,
    pub elliptical: Option<EllipticalFitResult>,
    /// Pixels inside the 2D fit mask (0 when the 2D fit was skipped).
    pub mask_pixels: usize,
}

impl PowerSpectrumAnalysis {
    pub fn new(spectrum: Spectrum2D, scale: ScaleConfig) -> Result<Self, AnalysisError> {
        let (rows, cols) = spectrum.shape();
        let grid = make_frequency_grids(rows, cols)?;
        Ok(Self {
            spectrum,
            grid,
            scale,
        })
    }

    /// Use a caller-supplied frequency grid.
    pub fn with_grid(
        spectrum: Spectrum2D,
        grid: FrequencyGrid,
        scale: ScaleConfig,
    ) -> Result<Self, AnalysisError> {
        if spectrum.shape() != grid.shape() || grid.kx.len() != grid.len() || grid.ky.len() != grid.len() {
            return Err(AnalysisError::invalid(format!(
                "Spectrum shape {:?} does not match frequency grid shape {:?}.",
                spectrum.shape(),
                grid.shape()
            )));
        }
        Ok(Self {
            spectrum,
            grid,
            scale,
        })
    }

    pub fn spectrum(&self) -> &Spectrum2D {
        &self.spectrum
    }

    pub fn grid(&self) -> &FrequencyGrid {
        &self.grid
    }

    pub fn scale(&self) -> &ScaleConfig {
        &self.scale
    }

    /// `1 / (0.5 · max(shape))`: drops the lowest non-zero mode.
    pub fn default_low_cut(&self) -> f64 {
        let (rows, cols) = self.spectrum.shape();
        1.0 / (0.5 * rows.max(cols) as f64)
    }

    /// Resolve optional cutoffs in any unit to a pixel-frequency range.
    pub fn resolve_range(
        &self,
        low_cut: Option<SpatialFrequency>,
        high_cut: Option<SpatialFrequency>,
        default_high: f64,
    ) -> Result<FitRange, AnalysisError> {
        let low = match low_cut {
            Some(f) => to_pixel_frequency(f, &self.scale)?,
            None => self.default_low_cut(),
        };
        let high = match high_cut {
            Some(f) => to_pixel_frequency(f, &self.scale)?,
            None => default_high,
        };
        FitRange::new(low, high)
    }

    /// Inclusion mask for `[low_cut, high_cut]`, optionally intersected with
    /// `aux`. The high cut defaults to the largest frequency on the grid.
    pub fn set_mask(
        &self,
        low_cut: Option<SpatialFrequency>,
        high_cut: Option<SpatialFrequency>,
        aux: Option<&FrequencyMask>,
    ) -> Result<FrequencyMask, AnalysisError> {
        let range = self.resolve_range(low_cut, high_cut, self.grid.max_radial())?;
        frequency_mask(&self.grid, range, aux)
    }

    pub fn bin_radially(&self, opts: &BinningOptions) -> Result<RadialBinning, AnalysisError> {
        bin_radially(&self.spectrum, &self.grid, opts)
    }

    /// Fit the profile between the cuts. The high cut defaults to the
    /// highest profile frequency.
    pub fn fit_segmented(
        &self,
        profile: &RadialProfile,
        low_cut: Option<SpatialFrequency>,
        high_cut: Option<SpatialFrequency>,
        opts: &SegmentedFitOptions,
    ) -> Result<SegmentedFitOutcome, AnalysisError> {
        let max_freq = profile
            .max_frequency()
            .ok_or_else(|| AnalysisError::empty_selection("The radial profile has no bins."))?;
        let range = self.resolve_range(low_cut, high_cut, max_freq)?;
        fit_segmented(profile, range, opts)
    }

    /// Starting parameters for the 2D fit, seeded from a 1D fit when given.
    pub fn initial_params(
        &self,
        seed: Option<&SegmentedFitOutcome>,
    ) -> Result<InitialParams, AnalysisError> {
        match seed {
            Some(outcome) => Ok(InitialParams::from_segmented(outcome)),
            None => {
                let peak = self
                    .spectrum
                    .peak()
                    .filter(|p| *p > 0.0)
                    .ok_or_else(|| AnalysisError::invalid("Spectrum has no positive finite values."))?;
                Ok(InitialParams::from_peak(peak))
            }
        }
    }

    pub fn fit_elliptical(
        &self,
        mask: &FrequencyMask,
        initial: InitialParams,
        opts: &EllipticalFitOptions,
    ) -> Result<EllipticalFitResult, AnalysisError> {
        fit_elliptical(&self.spectrum, &self.grid, mask, initial, opts)
    }

    /// Profile, 1D fit and (optionally) 2D fit in sequence.
    ///
    /// The 2D mask shares the 1D fit range and, when a sector was binned, the
    /// sector mask. The 1D result seeds the 2D starting point.
    pub fn run(&self, config: &AnalysisConfig) -> Result<AnalysisReport, AnalysisError> {
        let binning = self.bin_radially(&config.binning)?;
        log::info!("radial profile: {} bins", binning.profile.len());

        let segmented = self.fit_segmented(
            &binning.profile,
            config.low_cut,
            config.high_cut,
            &config.segmented,
        )?;
        let fit_range = segmented.range;
        log::info!(
            "1D fit on [{:.4}, {:.4}]: slope {:.3}{}",
            fit_range.low,
            fit_range.high,
            segmented.slope(),
            if segmented.is_broken() { " (broken)" } else { "" }
        );

        let (elliptical, mask_pixels) = match &config.elliptical {
            Some(opts) => {
                let mask = frequency_mask(&self.grid, fit_range, binning.azimuthal_mask.as_ref())?;
                let initial = self.initial_params(Some(&segmented))?;
                let fit = self.fit_elliptical(&mask, initial, opts)?;
                log::info!(
                    "2D fit: slope {:.3}, ellipticity {:.3}, theta {:.3}",
                    fit.slope,
                    fit.ellipticity,
                    fit.orientation
                );
                (Some(fit), mask.count())
            }
            None => (None, 0),
        };

        Ok(AnalysisReport {
            shape: self.spectrum.shape(),
            profile: binning.profile,
            fit_range,
            segmented,
            elliptical,
            mask_pixels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SyntheticSpectrum, generate_spectrum};
    use crate::domain::BreakGuess;

    fn isotropic_analysis() -> PowerSpectrumAnalysis {
        let spectrum = generate_spectrum(&SyntheticSpectrum::default()).unwrap();
        PowerSpectrumAnalysis::new(spectrum, ScaleConfig::default()).unwrap()
    }

    #[test]
    fn isotropic_power_law_end_to_end() {
        let analysis = isotropic_analysis();
        let binning = analysis.bin_radially(&BinningOptions::default()).unwrap();

        let outcome = analysis
            .fit_segmented(
                &binning.profile,
                None,
                Some(SpatialFrequency::PerPixel(0.5)),
                &SegmentedFitOptions::default(),
            )
            .unwrap();
        assert!(!outcome.is_broken());
        assert!((outcome.slope() + 3.0).abs() < 0.2, "1D slope={}", outcome.slope());

        let mask = analysis
            .set_mask(None, Some(SpatialFrequency::PerPixel(0.5)), None)
            .unwrap();
        let opts = EllipticalFitOptions {
            bootstrap: false,
            ..EllipticalFitOptions::default()
        };
        let initial = analysis.initial_params(Some(&outcome)).unwrap();
        let fit = analysis.fit_elliptical(&mask, initial, &opts).unwrap();
        assert!(fit.ellipticity < 0.1, "e={}", fit.ellipticity);
        assert!((fit.slope + 3.0).abs() < 0.3, "2D slope={}", fit.slope);
        assert!((0.0..std::f64::consts::PI).contains(&fit.orientation));
    }

    #[test]
    fn anisotropic_spectrum_is_detected() {
        let cfg = SyntheticSpectrum {
            rows: 64,
            cols: 64,
            ellipticity: 0.5,
            orientation: 1.0,
            noise: 0.02,
            ..SyntheticSpectrum::default()
        };
        let analysis =
            PowerSpectrumAnalysis::new(generate_spectrum(&cfg).unwrap(), ScaleConfig::default())
                .unwrap();
        let mask = analysis
            .set_mask(None, Some(SpatialFrequency::PerPixel(0.5)), None)
            .unwrap();
        let initial = InitialParams {
            orientation: 1.2,
            ..analysis.initial_params(None).unwrap()
        };
        let opts = EllipticalFitOptions {
            bootstrap: false,
            ..EllipticalFitOptions::default()
        };
        let fit = analysis.fit_elliptical(&mask, initial, &opts).unwrap();
        assert!((fit.ellipticity - 0.5).abs() < 0.05, "e={}", fit.ellipticity);
        assert!((fit.orientation - 1.0).abs() < 0.05, "theta={}", fit.orientation);
        assert!((fit.slope + 3.0).abs() < 0.1, "slope={}", fit.slope);
    }

    #[test]
    fn default_low_cut_skips_first_mode() {
        let analysis = isotropic_analysis();
        assert!((analysis.default_low_cut() - 1.0 / 64.0).abs() < 1e-15);
    }

    #[test]
    fn angular_cut_needs_pixel_scale() {
        let analysis = isotropic_analysis();
        let err = analysis
            .set_mask(Some(SpatialFrequency::PerDegree(1.0)), None, None)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput(_)));

        let scaled = PowerSpectrumAnalysis::new(
            analysis.spectrum().clone(),
            ScaleConfig {
                pixel_scale_deg: Some(0.01),
                distance_pc: None,
            },
        )
        .unwrap();
        // 2 cycles/deg at 0.01 deg/pixel is 0.02 cycles/pixel.
        let range = scaled
            .resolve_range(Some(SpatialFrequency::PerDegree(2.0)), None, 0.5)
            .unwrap();
        assert!((range.low - 0.02).abs() < 1e-12);
    }

    #[test]
    fn restrictive_cuts_give_empty_selection() {
        let analysis = isotropic_analysis();
        let err = analysis
            .set_mask(
                Some(SpatialFrequency::PerPixel(0.9)),
                Some(SpatialFrequency::PerPixel(0.95)),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, AnalysisError::EmptySelection(_)));
    }

    #[test]
    fn weighted_break_fit_is_rejected_before_fitting() {
        let analysis = isotropic_analysis();
        let binning = analysis.bin_radially(&BinningOptions::default()).unwrap();
        let opts = SegmentedFitOptions {
            weighted: true,
            break_guess: Some(BreakGuess::Frequency(0.1)),
            ..SegmentedFitOptions::default()
        };
        let err = analysis
            .fit_segmented(&binning.profile, None, None, &opts)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::IncompatibleOptions(_)));
    }

    #[test]
    fn run_threads_results_forward() {
        let cfg = SyntheticSpectrum {
            rows: 64,
            cols: 64,
            ..SyntheticSpectrum::default()
        };
        let analysis =
            PowerSpectrumAnalysis::new(generate_spectrum(&cfg).unwrap(), ScaleConfig::default())
                .unwrap();
        let config = AnalysisConfig {
            elliptical: Some(EllipticalFitOptions {
                bootstrap: true,
                n_iters: 4,
                fix_ellipticity: true,
                ..EllipticalFitOptions::default()
            }),
            ..AnalysisConfig::default()
        };
        let report = analysis.run(&config).unwrap();
        assert_eq!(report.shape, (64, 64));
        assert!(report.mask_pixels > 0);
        assert_eq!(report.fit_range.low, analysis.default_low_cut());
        let fit = report.elliptical.unwrap();
        assert!(fit.fixed_ellipticity);
        assert!((fit.slope - report.segmented.slope()).abs() < 0.3);
    }
}
