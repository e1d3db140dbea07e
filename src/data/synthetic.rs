//! Synthetic 2D power spectra with known parameters.
//!
//! Power follows `P = amplitude · k^slope` in pixel wavenumbers
//! `k = min(shape) · |f|`, optionally broken at `break_wavenumber` (continuous
//! at the break) and stretched by an elliptical rotation of the frequency
//! plane. Each pixel gets multiplicative log-normal noise `exp(σ z)`.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::domain::Spectrum2D;
use crate::error::AnalysisError;
use crate::spectrum::make_frequency_grids;

/// Second power-law segment above `wavenumber`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyntheticBreak {
    pub wavenumber: f64,
    pub slope_above: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSpectrum {
    pub rows: usize,
    pub cols: usize,
    /// Power at `k = 1`.
    pub amplitude: f64,
    pub slope: f64,
    pub broken: Option<SyntheticBreak>,
    /// In `[0, 1)`; 0 is isotropic.
    pub ellipticity: f64,
    pub orientation: f64,
    /// σ of the log-normal noise (natural log).
    pub noise: f64,
    pub seed: u64,
}

impl Default for SyntheticSpectrum {
    fn default() -> Self {
        Self {
            rows: 128,
            cols: 128,
            amplitude: 100.0,
            slope: -3.0,
            broken: None,
            ellipticity: 0.0,
            orientation: std::f64::consts::FRAC_PI_2,
            noise: 0.05,
            seed: 42,
        }
    }
}

impl SyntheticSpectrum {
    fn validate(&self) -> Result<(), AnalysisError> {
        if !(self.amplitude.is_finite() && self.amplitude > 0.0) {
            return Err(AnalysisError::invalid("Synthetic amplitude must be > 0."));
        }
        if !self.slope.is_finite() || !self.orientation.is_finite() {
            return Err(AnalysisError::invalid("Synthetic slope and orientation must be finite."));
        }
        if !(0.0..1.0).contains(&self.ellipticity) {
            return Err(AnalysisError::invalid(format!(
                "Synthetic ellipticity {} is outside [0, 1).",
                self.ellipticity
            )));
        }
        if !(self.noise.is_finite() && self.noise >= 0.0) {
            return Err(AnalysisError::invalid("Synthetic noise must be >= 0."));
        }
        if let Some(b) = self.broken {
            if !(b.wavenumber.is_finite() && b.wavenumber > 0.0 && b.slope_above.is_finite()) {
                return Err(AnalysisError::invalid(format!("Invalid synthetic break: {b:?}.")));
            }
        }
        Ok(())
    }

    /// Noise-free power at pixel wavenumber `k`.
    pub fn power_at(&self, k: f64) -> f64 {
        match self.broken {
            Some(b) if k > b.wavenumber => {
                self.amplitude
                    * b.wavenumber.powf(self.slope - b.slope_above)
                    * k.powf(b.slope_above)
            }
            _ => self.amplitude * k.powf(self.slope),
        }
    }
}

/// Generate the spectrum described by `cfg`.
///
/// The zero-frequency pixel is set to `amplitude`.
pub fn generate_spectrum(cfg: &SyntheticSpectrum) -> Result<Spectrum2D, AnalysisError> {
    cfg.validate()?;
    let grid = make_frequency_grids(cfg.rows, cfg.cols)?;

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| AnalysisError::invalid(format!("Noise distribution error: {e}")))?;

    let scale = cfg.rows.min(cfg.cols) as f64;
    let (sin, cos) = cfg.orientation.sin_cos();
    let axis = 1.0 - cfg.ellipticity;

    let values = (0..grid.len())
        .map(|i| {
            let xr = grid.kx[i] * cos + grid.ky[i] * sin;
            let yr = -grid.kx[i] * sin + grid.ky[i] * cos;
            let k = scale * (xr * xr + yr * yr / (axis * axis)).sqrt();
            let z = normal.sample(&mut rng);
            if k == 0.0 {
                cfg.amplitude
            } else {
                cfg.power_at(k) * (cfg.noise * z).exp()
            }
        })
        .collect();

    log::debug!(
        "synthetic {}x{} spectrum: slope {}, e {}, noise {}",
        cfg.rows,
        cfg.cols,
        cfg.slope,
        cfg.ellipticity,
        cfg.noise
    );
    Spectrum2D::new(cfg.rows, cfg.cols, values)
}
