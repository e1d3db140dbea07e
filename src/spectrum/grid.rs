//! Frequency grids for fft-shifted spectra.
//!
//! Along an axis of length `n` the shifted sample frequencies are
//! `(i - floor(n/2)) / n` for `i = 0..n`, so the zero-frequency pixel sits at
//! index `n / 2` and the Nyquist frequency `-0.5` (even `n`) at index 0.

use crate::domain::FrequencyGrid;
use crate::error::AnalysisError;

/// Shifted sample frequencies (cycles/pixel) along one axis.
pub fn shifted_frequencies(n: usize) -> Vec<f64> {
    let centre = (n / 2) as f64;
    (0..n).map(|i| (i as f64 - centre) / n as f64).collect()
}

/// Build the `(kx, ky, radial)` grids for a spectrum of the given shape.
pub fn make_frequency_grids(rows: usize, cols: usize) -> Result<FrequencyGrid, AnalysisError> {
    if rows == 0 || cols == 0 {
        return Err(AnalysisError::invalid("Frequency grid shape must be non-zero."));
    }
    let fy = shifted_frequencies(rows);
    let fx = shifted_frequencies(cols);

    let mut kx = Vec::with_capacity(rows * cols);
    let mut ky = Vec::with_capacity(rows * cols);
    let mut radial = Vec::with_capacity(rows * cols);
    for &y in &fy {
        for &x in &fx {
            kx.push(x);
            ky.push(y);
            radial.push(x.hypot(y));
        }
    }

    Ok(FrequencyGrid {
        rows,
        cols,
        kx,
        ky,
        radial,
    })
}

/// Distance of each pixel from the zero-frequency pixel, in pixels.
pub fn pixel_radii(rows: usize, cols: usize) -> Vec<f64> {
    let cy = (rows / 2) as f64;
    let cx = (cols / 2) as f64;
    let mut out = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            out.push((r as f64 - cy).hypot(c as f64 - cx));
        }
    }
    out
}
