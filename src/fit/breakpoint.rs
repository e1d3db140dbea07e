//! Break-point proposals from a smoothing linear spline.
//!
//! A linear spline is grown by knot insertion until its residual sum of squares
//! falls below the smoothing factor `s`:
//!
//! 1. start with knots at the first and last `x`
//! 2. fit the spline by least squares on the basis `1, x, (x - t_j)₊`
//! 3. while `SSR > s`, split the interval with the largest residual sum at the
//!    sample where its cumulative squared residual reaches half of the total
//!
//! The knots are then turned into break guesses:
//!
//! - more than 3 knots: the interior knot nearest the expected location
//! - exactly 2 knots (no interior knot): the first `x`
//! - otherwise: the sole interior knot
//!
//! This only seeds the segmented fit; it is not a global optimum.

use nalgebra::{DMatrix, DVector};

use crate::math::solve_least_squares;

/// Each spline interval must keep at least this many samples.
const MIN_INTERVAL_POINTS: usize = 3;

/// Ordered break guesses (log10 frequency).
#[derive(Debug, Clone, PartialEq)]
pub struct BreakProposal {
    pub primary: f64,
    /// Remaining interior knots, nearest to the expected location first.
    pub alternates: Vec<f64>,
    /// All knots, boundaries included.
    pub knots: Vec<f64>,
}

impl BreakProposal {
    pub fn candidates(&self) -> impl Iterator<Item = f64> + '_ {
        std::iter::once(self.primary).chain(self.alternates.iter().copied())
    }
}

/// Propose break locations for the log-log curve `(x, y)`.
///
/// `x` must be sorted ascending. Returns `None` for fewer than two samples.
pub fn propose_breaks(
    x: &[f64],
    y: &[f64],
    smoothing: Option<f64>,
    expected: Option<f64>,
) -> Option<BreakProposal> {
    if x.len() < 2 || x.len() != y.len() {
        return None;
    }
    let s = smoothing.unwrap_or_else(|| default_smoothing(y));
    let knots = spline_knots(x, y, s);

    let first = x[0];
    let last = x[x.len() - 1];
    let expected = expected.unwrap_or(0.5 * (first + last));
    let mut interior: Vec<f64> = knots[1..knots.len() - 1].to_vec();
    interior.sort_by(|a, b| {
        (a - expected)
            .abs()
            .partial_cmp(&(b - expected).abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let proposal = match knots.len() {
        2 => BreakProposal {
            primary: first,
            alternates: Vec::new(),
            knots,
        },
        3 => BreakProposal {
            primary: knots[1],
            alternates: Vec::new(),
            knots,
        },
        _ => BreakProposal {
            primary: interior[0],
            alternates: interior[1..].to_vec(),
            knots,
        },
    };
    log::debug!(
        "break search: {} knots, primary log break {:.4}",
        proposal.knots.len(),
        proposal.primary
    );
    Some(proposal)
}

/// `n · σ²` with σ from successive differences (von Neumann estimator).
fn default_smoothing(y: &[f64]) -> f64 {
    let n = y.len();
    if n < 2 {
        return 0.0;
    }
    let ss: f64 = y.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
    n as f64 * ss / (2.0 * (n - 1) as f64)
}

/// Knots (boundaries included, ascending) of the smoothing linear spline.
pub fn spline_knots(x: &[f64], y: &[f64], smoothing: f64) -> Vec<f64> {
    let n = x.len();
    let mut knots = vec![x[0], x[n - 1]];
    let max_interior = n / (2 * MIN_INTERVAL_POINTS);

    loop {
        let Some(residuals) = spline_residuals(x, y, &knots) else {
            break;
        };
        let ssr: f64 = residuals.iter().map(|r| r * r).sum();
        if ssr <= smoothing || knots.len() - 2 >= max_interior {
            break;
        }
        let Some(new_knot) = next_knot(x, &residuals, &knots) else {
            break;
        };
        let pos = knots.partition_point(|&k| k < new_knot);
        knots.insert(pos, new_knot);
    }
    knots
}

fn spline_residuals(x: &[f64], y: &[f64], knots: &[f64]) -> Option<Vec<f64>> {
    let n = x.len();
    let interior = &knots[1..knots.len() - 1];
    let p = 2 + interior.len();
    let mut design = DMatrix::<f64>::zeros(n, p);
    for (i, &xi) in x.iter().enumerate() {
        design[(i, 0)] = 1.0;
        design[(i, 1)] = xi;
        for (j, &t) in interior.iter().enumerate() {
            design[(i, 2 + j)] = (xi - t).max(0.0);
        }
    }
    let yv = DVector::from_column_slice(y);
    let beta = solve_least_squares(&design, &yv)?;
    let fitted = &design * &beta;
    Some((0..n).map(|i| y[i] - fitted[i]).collect())
}

fn next_knot(x: &[f64], residuals: &[f64], knots: &[f64]) -> Option<f64> {
    // Sample index ranges per interval; the last interval includes its end.
    let mut best: Option<(f64, usize, usize)> = None;
    for w in knots.windows(2) {
        let lo = x.partition_point(|&v| v < w[0]);
        let hi = x.partition_point(|&v| v < w[1]);
        if hi - lo < 2 * MIN_INTERVAL_POINTS {
            continue;
        }
        let ss: f64 = residuals[lo..hi].iter().map(|r| r * r).sum();
        if best.is_none_or(|(b, _, _)| ss > b) {
            best = Some((ss, lo, hi));
        }
    }

    let (total, lo, hi) = best?;
    let mut acc = 0.0;
    for i in lo..hi {
        acc += residuals[i] * residuals[i];
        if acc >= 0.5 * total {
            let i = i.clamp(lo + MIN_INTERVAL_POINTS, hi - MIN_INTERVAL_POINTS);
            return Some(x[i]);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_has_no_interior_knot() {
        let x: Vec<f64> = (0..40).map(|i| i as f64 * 0.05).collect();
        let y: Vec<f64> = x.iter().map(|&v| 2.0 - 3.0 * v).collect();
        let proposal = propose_breaks(&x, &y, Some(1e-8), None).unwrap();
        assert_eq!(proposal.knots.len(), 2);
        assert_eq!(proposal.primary, x[0]);
        assert!(proposal.alternates.is_empty());
    }

    #[test]
    fn kinked_line_gets_knot_near_kink() {
        let x: Vec<f64> = (0..60).map(|i| -2.0 + i as f64 * 0.025).collect();
        let kink = -1.25;
        let y: Vec<f64> = x
            .iter()
            .map(|&v| if v < kink { -2.0 * v } else { -2.0 * kink - 4.0 * (v - kink) })
            .collect();
        let proposal = propose_breaks(&x, &y, Some(1e-6), None).unwrap();
        assert!(proposal.knots.len() >= 3);
        assert!(
            (proposal.primary - kink).abs() < 0.2,
            "primary={} knots={:?}",
            proposal.primary,
            proposal.knots
        );
    }

    #[test]
    fn expected_location_orders_candidates() {
        let x: Vec<f64> = (0..80).map(|i| i as f64 * 0.0125).collect();
        // Two kinks so the spline needs several knots.
        let y: Vec<f64> = x
            .iter()
            .map(|&v| {
                let mut out = -v;
                if v > 0.25 {
                    out -= 3.0 * (v - 0.25);
                }
                if v > 0.75 {
                    out += 5.0 * (v - 0.75);
                }
                out
            })
            .collect();
        let proposal = propose_breaks(&x, &y, Some(1e-6), Some(0.75)).unwrap();
        assert!(proposal.knots.len() > 3, "knots={:?}", proposal.knots);
        let cands: Vec<f64> = proposal.candidates().collect();
        for w in cands.windows(2) {
            assert!((w[0] - 0.75).abs() <= (w[1] - 0.75).abs());
        }
    }
}
