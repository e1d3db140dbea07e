//! Frequency-range and azimuthal-sector masks.

use std::f64::consts::PI;

use crate::domain::{AzimuthalSector, FitRange, FrequencyGrid, FrequencyMask};
use crate::error::AnalysisError;

/// Inclusive range test used for every cut in the crate.
pub fn clip(value: f64, low: f64, high: f64) -> bool {
    value >= low && value <= high
}

/// Mask pixels whose radial frequency lies in `range`, optionally ANDed with
/// an auxiliary mask.
///
/// Fails with `EmptySelection` when nothing survives.
pub fn frequency_mask(
    grid: &FrequencyGrid,
    range: FitRange,
    aux: Option<&FrequencyMask>,
) -> Result<FrequencyMask, AnalysisError> {
    if let Some(aux) = aux {
        if aux.shape() != grid.shape() {
            return Err(AnalysisError::invalid(format!(
                "Auxiliary mask shape {:?} does not match grid shape {:?}.",
                aux.shape(),
                grid.shape()
            )));
        }
    }

    let included: Vec<bool> = grid
        .radial
        .iter()
        .enumerate()
        .map(|(i, &f)| clip(f, range.low, range.high) && aux.is_none_or(|m| m.is_included(i)))
        .collect();

    let mask = FrequencyMask::new(grid.rows, grid.cols, included)?;
    if mask.is_empty() {
        return Err(AnalysisError::empty_selection(format!(
            "Limits [{:.4}, {:.4}] have removed all points to fit. Make low_cut and high_cut less restrictive.",
            range.low, range.high
        )));
    }
    Ok(mask)
}

/// Mask pixels whose position angle lies within `delta_theta / 2` of
/// `theta_0`, treating angles modulo π. The zero-frequency pixel is kept.
pub fn azimuthal_mask(
    grid: &FrequencyGrid,
    sector: AzimuthalSector,
) -> Result<FrequencyMask, AnalysisError> {
    if !(sector.theta_0.is_finite() && sector.delta_theta.is_finite() && sector.delta_theta > 0.0) {
        return Err(AnalysisError::invalid(format!(
            "Invalid azimuthal sector: theta_0={}, delta_theta={}.",
            sector.theta_0, sector.delta_theta
        )));
    }

    let centre = sector.theta_0.rem_euclid(PI);
    let half_width = sector.delta_theta / 2.0;

    let included = grid
        .kx
        .iter()
        .zip(grid.ky.iter())
        .map(|(&x, &y)| {
            if x == 0.0 && y == 0.0 {
                return true;
            }
            let angle = y.atan2(x).rem_euclid(PI);
            let diff = (angle - centre).abs();
            diff.min(PI - diff) <= half_width
        })
        .collect();

    FrequencyMask::new(grid.rows, grid.cols, included)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::make_frequency_grids;

    #[test]
    fn mask_respects_inclusive_cuts() {
        let grid = make_frequency_grids(16, 16).unwrap();
        let range = FitRange::new(0.125, 0.25).unwrap();
        let mask = frequency_mask(&grid, range, None).unwrap();
        for (i, &f) in grid.radial.iter().enumerate() {
            assert_eq!(mask.is_included(i), (0.125..=0.25).contains(&f));
        }
        // (0, 2/16) lies exactly on the low edge.
        let idx = 8 * 16 + 10;
        assert!((grid.radial[idx] - 0.125).abs() < 1e-15);
        assert!(mask.is_included(idx));
    }

    #[test]
    fn empty_selection_is_an_error() {
        let grid = make_frequency_grids(8, 8).unwrap();
        let range = FitRange::new(0.9, 1.0).unwrap();
        let err = frequency_mask(&grid, range, None).unwrap_err();
        assert!(matches!(err, AnalysisError::EmptySelection(_)));
    }

    #[test]
    fn auxiliary_mask_is_intersected() {
        let grid = make_frequency_grids(8, 8).unwrap();
        let mut aux = vec![false; 64];
        aux[8 * 4 + 6] = true; // (kx, ky) = (0.25, 0)
        let aux = FrequencyMask::new(8, 8, aux).unwrap();
        let mask = frequency_mask(&grid, FitRange::new(0.0, 0.5).unwrap(), Some(&aux)).unwrap();
        assert_eq!(mask.count(), 1);

        aux_mismatch_is_rejected(&grid);
    }

    fn aux_mismatch_is_rejected(grid: &FrequencyGrid) {
        let aux = FrequencyMask::new(4, 4, vec![true; 16]).unwrap();
        let err = frequency_mask(grid, FitRange::new(0.0, 0.5).unwrap(), Some(&aux)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn sector_is_point_symmetric() {
        let grid = make_frequency_grids(16, 16).unwrap();
        let sector = AzimuthalSector {
            theta_0: 0.0,
            delta_theta: PI / 4.0,
        };
        let mask = azimuthal_mask(&grid, sector).unwrap();
        // +kx axis and -kx axis are both inside; +ky axis is outside.
        assert!(mask.is_included(8 * 16 + 12));
        assert!(mask.is_included(8 * 16 + 4));
        assert!(!mask.is_included(12 * 16 + 8));
        assert!(mask.is_included(8 * 16 + 8));
    }
}
