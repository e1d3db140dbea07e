//! Radial averaging of a 2D power spectrum.
//!
//! Pixels are assigned to frequency bins by their radial frequency; each bin
//! reports the mean power, optionally the within-bin standard deviation, and the
//! number of contributing pixels. Bins with no contributing pixel are dropped.
//!
//! Binning rules:
//! - edges are `nbins + 1` points from `min_bin` to `max_bin`, linearly or
//!   geometrically spaced
//! - bins are half-open `[e_i, e_{i+1})` except the last, which includes its
//!   upper edge
//! - the zero-frequency pixel is placed at half the smallest non-zero
//!   frequency so it has a finite logarithm
//! - non-finite pixel values are ignored

use crate::domain::{BinningOptions, FrequencyGrid, RadialBin, RadialBinning, RadialProfile, Spectrum2D};
use crate::error::AnalysisError;
use crate::math::{mean, std_dev};
use crate::spectrum::grid::pixel_radii;
use crate::spectrum::mask::azimuthal_mask;

/// Collapse `spectrum` into a radial profile.
pub fn bin_radially(
    spectrum: &Spectrum2D,
    grid: &FrequencyGrid,
    opts: &BinningOptions,
) -> Result<RadialBinning, AnalysisError> {
    if spectrum.shape() != grid.shape() {
        return Err(AnalysisError::invalid(format!(
            "Spectrum shape {:?} does not match frequency grid shape {:?}.",
            spectrum.shape(),
            grid.shape()
        )));
    }
    let (rows, cols) = spectrum.shape();

    let edges = bin_edges(rows, cols, opts)?;
    let nbins = edges.len() - 1;

    let azim = match opts.sector {
        Some(sector) => Some(azimuthal_mask(grid, sector)?),
        None => None,
    };

    let dists = with_dc_offset(&grid.radial);

    let mut members: Vec<Vec<f64>> = vec![Vec::new(); nbins];
    for (i, (&f, &p)) in dists.iter().zip(spectrum.values().iter()).enumerate() {
        if !p.is_finite() {
            continue;
        }
        if let Some(mask) = &azim {
            if !mask.is_included(i) {
                continue;
            }
        }
        if let Some(b) = locate_bin(&edges, f) {
            members[b].push(p);
        }
    }

    let mut bins = Vec::with_capacity(nbins);
    for (b, values) in members.iter().enumerate() {
        let Some(mean_power) = mean(values) else {
            continue;
        };
        let stddev = if opts.return_stddev {
            Some(std_dev(values, 1).unwrap_or(0.0))
        } else {
            None
        };
        bins.push(RadialBin {
            frequency: 0.5 * (edges[b] + edges[b + 1]),
            mean_power,
            stddev,
            count: values.len(),
        });
    }

    if bins.is_empty() {
        return Err(AnalysisError::empty_selection(
            "No pixels fell inside the radial binning range.",
        ));
    }

    log::debug!(
        "binned {}x{} spectrum into {} of {} bins (logspacing={})",
        rows,
        cols,
        bins.len(),
        nbins,
        opts.logspacing
    );

    Ok(RadialBinning {
        profile: RadialProfile::from_bins(bins),
        azimuthal_mask: azim,
    })
}

fn bin_edges(rows: usize, cols: usize, opts: &BinningOptions) -> Result<Vec<f64>, AnalysisError> {
    let max_bin = opts.max_bin.unwrap_or(0.5);
    let min_bin = opts.min_bin.unwrap_or(1.0 / rows.min(cols) as f64);
    if !(min_bin.is_finite() && max_bin.is_finite() && min_bin > 0.0 && max_bin > min_bin) {
        return Err(AnalysisError::invalid(format!(
            "Invalid binning range: min_bin={min_bin}, max_bin={max_bin}."
        )));
    }

    let nbins = match opts.nbins {
        Some(n) => n,
        None => {
            if !(opts.binsize.is_finite() && opts.binsize > 0.0) {
                return Err(AnalysisError::invalid("binsize must be positive."));
            }
            let max_radius = pixel_radii(rows, cols).into_iter().fold(0.0, f64::max);
            (max_radius / opts.binsize).round() as usize + 1
        }
    };
    if nbins == 0 {
        return Err(AnalysisError::invalid("nbins must be at least 1."));
    }

    let n = nbins as f64;
    let edges = if opts.logspacing {
        let (lo, hi) = (min_bin.log10(), max_bin.log10());
        (0..=nbins)
            .map(|i| 10f64.powf(lo + (hi - lo) * i as f64 / n))
            .collect()
    } else {
        (0..=nbins)
            .map(|i| min_bin + (max_bin - min_bin) * i as f64 / n)
            .collect()
    };
    Ok(edges)
}

fn locate_bin(edges: &[f64], value: f64) -> Option<usize> {
    let last = edges.len() - 1;
    if value < edges[0] || value > edges[last] {
        return None;
    }
    if value == edges[last] {
        return Some(last - 1);
    }
    // First edge strictly greater than `value`, minus one.
    let idx = edges.partition_point(|&e| e <= value);
    Some(idx - 1)
}

fn with_dc_offset(radial: &[f64]) -> Vec<f64> {
    let min_nonzero = radial
        .iter()
        .copied()
        .filter(|&f| f > 0.0)
        .fold(f64::INFINITY, f64::min);
    let dc = if min_nonzero.is_finite() { min_nonzero / 2.0 } else { 0.0 };
    radial.iter().map(|&f| if f == 0.0 { dc } else { f }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AzimuthalSector;
    use crate::spectrum::make_frequency_grids;

    fn power_law(rows: usize, cols: usize) -> (Spectrum2D, FrequencyGrid) {
        let grid = make_frequency_grids(rows, cols).unwrap();
        let values = grid
            .radial
            .iter()
            .map(|&f| if f > 0.0 { f.powf(-3.0) } else { 1e6 })
            .collect();
        (Spectrum2D::new(rows, cols, values).unwrap(), grid)
    }

    #[test]
    fn frequencies_increase_and_counts_are_positive() {
        let (spec, grid) = power_law(32, 32);
        for logspacing in [false, true] {
            let opts = BinningOptions {
                logspacing,
                ..BinningOptions::default()
            };
            let out = bin_radially(&spec, &grid, &opts).unwrap();
            let bins = out.profile.bins();
            assert!(!bins.is_empty());
            for w in bins.windows(2) {
                assert!(w[1].frequency > w[0].frequency);
            }
            assert!(bins.iter().all(|b| b.count >= 1));
            assert!(out.azimuthal_mask.is_none());
        }
    }

    #[test]
    fn binning_is_bit_identical_on_repeat() {
        let (spec, grid) = power_law(24, 20);
        let opts = BinningOptions::default();
        let a = bin_radially(&spec, &grid, &opts).unwrap();
        let b = bin_radially(&spec, &grid, &opts).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn max_bin_discards_high_frequencies() {
        let (spec, grid) = power_law(32, 32);
        let opts = BinningOptions {
            max_bin: Some(0.25),
            ..BinningOptions::default()
        };
        let out = bin_radially(&spec, &grid, &opts).unwrap();
        assert!(out.profile.max_frequency().unwrap() <= 0.25);
    }

    #[test]
    fn stddev_is_optional() {
        let (spec, grid) = power_law(16, 16);
        let opts = BinningOptions {
            return_stddev: false,
            ..BinningOptions::default()
        };
        let out = bin_radially(&spec, &grid, &opts).unwrap();
        assert!(out.profile.stddevs().is_err());

        let out = bin_radially(&spec, &grid, &BinningOptions::default()).unwrap();
        let stds = out.profile.stddevs().unwrap();
        assert!(stds.iter().all(|s| s.is_finite() && *s >= 0.0));
    }

    #[test]
    fn constant_spectrum_has_zero_scatter() {
        let grid = make_frequency_grids(16, 16).unwrap();
        let spec = Spectrum2D::new(16, 16, vec![2.5; 256]).unwrap();
        let out = bin_radially(&spec, &grid, &BinningOptions::default()).unwrap();
        for bin in out.profile.bins() {
            assert_eq!(bin.mean_power, 2.5);
            assert_eq!(bin.stddev, Some(0.0));
        }
    }

    #[test]
    fn sector_constraint_returns_mask_and_fewer_pixels() {
        let (spec, grid) = power_law(32, 32);
        let full = bin_radially(&spec, &grid, &BinningOptions::default()).unwrap();
        let opts = BinningOptions {
            sector: Some(AzimuthalSector {
                theta_0: 0.0,
                delta_theta: std::f64::consts::FRAC_PI_4,
            }),
            ..BinningOptions::default()
        };
        let sect = bin_radially(&spec, &grid, &opts).unwrap();
        assert!(sect.azimuthal_mask.is_some());
        let total = |p: &RadialProfile| p.bins().iter().map(|b| b.count).sum::<usize>();
        assert!(total(&sect.profile) < total(&full.profile));
    }

    #[test]
    fn locate_bin_handles_edges() {
        let edges = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(locate_bin(&edges, 0.0), Some(0));
        assert_eq!(locate_bin(&edges, 1.0), Some(1));
        assert_eq!(locate_bin(&edges, 2.5), Some(2));
        assert_eq!(locate_bin(&edges, 3.0), Some(2));
        assert_eq!(locate_bin(&edges, 3.5), None);
        assert_eq!(locate_bin(&edges, -0.1), None);
    }
}
