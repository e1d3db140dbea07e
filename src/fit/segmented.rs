//! Power-law fits to the radial profile in log10-log10 space.
//!
//! Two models are available:
//!
//! - unbroken: `y = a + b·x`, ordinary or weighted least squares
//! - broken: `y = a + b₁·x + (b₂ - b₁)·(x - ψ)₊`, fit jointly over `ψ` and both
//!   slopes by iterative segmented regression
//!
//! The break location is updated with Muggeo's linearisation: for a current
//! `ψ` we regress on `1, x, U = (x - ψ)₊, V = -1[x > ψ]` and move
//! `ψ ← ψ + γ / β_U` until the update is negligible. The `V` coefficient at
//! convergence also yields the break standard error.
//!
//! A converged break is only kept if the segment(s) selected by
//! [`BreakValidation`] hold at least `min_fit_points` samples; otherwise the
//! unbroken model is fit instead and a warning is attached to the outcome.

use nalgebra::{DMatrix, DVector};

use crate::domain::{
    BreakFitResult, BreakGuess, BreakValidation, FitRange, FitResult, FitWarning, RadialProfile,
    SegmentedFit, SegmentedFitOptions, SegmentedFitOutcome,
};
use crate::error::AnalysisError;
use crate::fit::breakpoint::propose_breaks;
use crate::math::{regress, solve_least_squares};

/// Smallest slope change treated as a real break.
const MIN_SLOPE_CHANGE: f64 = 1e-12;

/// Log-space samples taken from a profile.
#[derive(Debug, Clone, Default)]
struct LogSamples {
    x: Vec<f64>,
    y: Vec<f64>,
    /// log10-space 1σ errors (weighted fits only).
    err: Vec<f64>,
}

/// Fit the radial profile inside `range` with an unbroken or broken power law.
pub fn fit_segmented(
    profile: &RadialProfile,
    range: FitRange,
    opts: &SegmentedFitOptions,
) -> Result<SegmentedFitOutcome, AnalysisError> {
    if opts.weighted && opts.break_guess.is_some() {
        return Err(AnalysisError::incompatible(
            "Weighted least-squares fitting cannot be used when fitting a break-point.",
        ));
    }
    if opts.weighted && !profile.has_stddev() {
        return Err(AnalysisError::incompatible(
            "Weighted fitting needs per-bin standard deviations; bin with return_stddev enabled.",
        ));
    }

    let samples = collect_samples(profile, range, opts.weighted);
    if samples.x.len() < 3 {
        return Err(AnalysisError::empty_selection(format!(
            "Only {} usable profile points in [{:.4}, {:.4}]; at least 3 are needed.",
            samples.x.len(),
            range.low,
            range.high
        )));
    }

    let mut warnings = Vec::new();
    let mut rejected_break = None;

    if let Some(guess) = opts.break_guess {
        let candidates = break_candidates(guess, &samples, opts)?;
        for psi0 in candidates {
            match fit_broken_line(&samples.x, &samples.y, psi0, opts) {
                Ok(mut brk) => {
                    if passes_validation(&brk, opts.min_fit_points, opts.break_validation) {
                        brk.valid = true;
                        log::info!(
                            "break fit accepted at f={:.4} (slopes {:.3}, {:.3})",
                            brk.break_freq,
                            brk.slopes[0],
                            brk.slopes[1]
                        );
                        return Ok(SegmentedFitOutcome {
                            fit: SegmentedFit::Broken(brk),
                            range,
                            break_requested: true,
                            rejected_break: None,
                            warnings: Vec::new(),
                        });
                    }
                    warnings.push(FitWarning::InsufficientSegmentPoints {
                        below: brk.n_below,
                        above: brk.n_above,
                        required: opts.min_fit_points,
                    });
                    if rejected_break.is_none() {
                        rejected_break = Some(brk);
                    }
                }
                Err(reason) => warnings.push(FitWarning::BreakFitFailed { reason }),
            }
        }
        for w in &warnings {
            log::warn!("{w}");
        }
    }

    let weights = if opts.weighted {
        Some(samples.err.iter().map(|e| 1.0 / (e * e)).collect::<Vec<_>>())
    } else {
        None
    };
    let line = fit_line(&samples.x, &samples.y, weights.as_deref())?;

    Ok(SegmentedFitOutcome {
        fit: SegmentedFit::Unbroken(line),
        range,
        break_requested: opts.break_guess.is_some(),
        rejected_break,
        warnings,
    })
}

/// Ordinary (or weighted) straight-line fit with standard errors.
pub fn fit_line(x: &[f64], y: &[f64], weights: Option<&[f64]>) -> Result<FitResult, AnalysisError> {
    let n = x.len();
    let mut design = DMatrix::<f64>::zeros(n, 2);
    for (i, &xi) in x.iter().enumerate() {
        design[(i, 0)] = 1.0;
        design[(i, 1)] = xi;
    }
    let fit = regress(&design, &DVector::from_column_slice(y), weights).ok_or_else(|| {
        AnalysisError::empty_selection("Degenerate profile: cannot fit a line to these points.")
    })?;

    Ok(FitResult {
        slope: fit.coeffs[1],
        slope_stderr: fit.stderr(1),
        intercept: fit.coeffs[0],
        intercept_stderr: fit.stderr(0),
        n_points: n,
        weighted: weights.is_some(),
    })
}

fn collect_samples(profile: &RadialProfile, range: FitRange, weighted: bool) -> LogSamples {
    let mut out = LogSamples::default();
    for bin in profile.bins() {
        if !range.contains(bin.frequency) {
            continue;
        }
        let x = bin.frequency.log10();
        let y = bin.mean_power.log10();
        if !(x.is_finite() && y.is_finite()) {
            continue;
        }
        if weighted {
            // σ_log10(P) = σ_P / (P ln 10)
            let err = bin
                .stddev
                .map(|s| s / (bin.mean_power * std::f64::consts::LN_10))
                .unwrap_or(f64::NAN);
            if !(err.is_finite() && err > 0.0) {
                continue;
            }
            out.err.push(err);
        }
        out.x.push(x);
        out.y.push(y);
    }
    out
}

fn break_candidates(
    guess: BreakGuess,
    samples: &LogSamples,
    opts: &SegmentedFitOptions,
) -> Result<Vec<f64>, AnalysisError> {
    match guess {
        BreakGuess::Frequency(f) => {
            if !(f.is_finite() && f > 0.0) {
                return Err(AnalysisError::invalid(format!("Break guess {f} must be positive.")));
            }
            Ok(vec![f.log10()])
        }
        BreakGuess::Log10(v) => {
            if !v.is_finite() {
                return Err(AnalysisError::invalid("Log break guess must be finite."));
            }
            Ok(vec![v])
        }
        BreakGuess::Search => Ok(propose_breaks(
            &samples.x,
            &samples.y,
            opts.spline_smoothing,
            opts.expected_break,
        )
        .map(|p| p.candidates().collect())
        .unwrap_or_default()),
    }
}

fn passes_validation(brk: &BreakFitResult, min_points: usize, policy: BreakValidation) -> bool {
    match policy {
        BreakValidation::BelowBreak => brk.n_below >= min_points,
        BreakValidation::AboveBreak => brk.n_above >= min_points,
        BreakValidation::BothSegments => brk.n_below >= min_points && brk.n_above >= min_points,
    }
}

fn segmented_design(x: &[f64], psi: f64, with_step: bool) -> DMatrix<f64> {
    let cols = if with_step { 4 } else { 3 };
    let mut design = DMatrix::<f64>::zeros(x.len(), cols);
    for (i, &xi) in x.iter().enumerate() {
        let above = xi > psi;
        design[(i, 0)] = 1.0;
        design[(i, 1)] = xi;
        design[(i, 2)] = if above { xi - psi } else { 0.0 };
        if with_step {
            design[(i, 3)] = if above { -1.0 } else { 0.0 };
        }
    }
    design
}

/// Fit the two-segment model starting from log10 break `psi0`.
///
/// Errors are returned as human-readable reasons; the caller turns them into a
/// fallback warning.
fn fit_broken_line(
    x: &[f64],
    y: &[f64],
    psi0: f64,
    opts: &SegmentedFitOptions,
) -> Result<BreakFitResult, String> {
    let n = x.len();
    let (x_min, x_max) = (x[0], x[n - 1]);
    let yv = DVector::from_column_slice(y);
    let enough_each_side = |psi: f64| {
        let below = x.iter().filter(|&&v| v <= psi).count();
        below >= 2 && n - below >= 2
    };

    if !(psi0 > x_min && psi0 < x_max) {
        return Err(format!(
            "initial break {psi0:.4} outside the fitted range [{x_min:.4}, {x_max:.4}]"
        ));
    }

    let mut psi = psi0;
    let mut converged = false;
    for _ in 0..opts.max_break_iterations {
        if !enough_each_side(psi) {
            return Err(format!("break {psi:.4} leaves fewer than two points on a segment"));
        }
        let design = segmented_design(x, psi, true);
        let beta = solve_least_squares(&design, &yv)
            .ok_or_else(|| "singular segmented design".to_string())?;
        let slope_change = beta[2];
        let gamma = beta[3];
        if slope_change.abs() < MIN_SLOPE_CHANGE {
            return Err("no slope change across the break".to_string());
        }

        let next = psi + gamma / slope_change;
        if !(next.is_finite() && next > x_min && next < x_max) {
            return Err(format!("break moved outside the fitted range ({next:.4})"));
        }
        let step = (next - psi).abs();
        psi = next;
        if step <= opts.break_tolerance * (1.0 + psi.abs()) {
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(format!(
            "break location did not converge in {} iterations",
            opts.max_break_iterations
        ));
    }
    if !enough_each_side(psi) {
        return Err(format!("break {psi:.4} leaves fewer than two points on a segment"));
    }

    let with_step = regress(&segmented_design(x, psi, true), &yv, None)
        .ok_or_else(|| "singular covariance for the break location".to_string())?;
    let plain = regress(&segmented_design(x, psi, false), &yv, None)
        .ok_or_else(|| "singular covariance for the segment slopes".to_string())?;

    // Delta method on ψ + γ/β: se(ψ) ≈ sqrt(var γ + (γ/β)² var β - 2 (γ/β) cov) / |β|
    let b = with_step.coeffs[2];
    let g = with_step.coeffs[3];
    let ratio = g / b;
    let cov = &with_step.covariance;
    let var_log_break =
        (cov[(3, 3)] + ratio * ratio * cov[(2, 2)] - 2.0 * ratio * cov[(2, 3)]).max(0.0);
    let log_break_stderr = var_log_break.sqrt() / b.abs();

    let pcov = &plain.covariance;
    let pre = plain.coeffs[1];
    let post = plain.coeffs[1] + plain.coeffs[2];
    let post_var = (pcov[(1, 1)] + pcov[(2, 2)] + 2.0 * pcov[(1, 2)]).max(0.0);

    let n_below = x.iter().filter(|&&v| v < psi).count();
    let break_freq = 10f64.powf(psi);

    Ok(BreakFitResult {
        break_freq,
        break_stderr: std::f64::consts::LN_10 * break_freq * log_break_stderr,
        log_break: psi,
        slopes: [pre, post],
        slope_stderrs: [plain.stderr(1), post_var.sqrt()],
        intercept: plain.coeffs[0],
        intercept_stderr: plain.stderr(0),
        n_below,
        n_above: n - n_below,
        valid: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RadialBin;
    use rand::prelude::*;
    use rand::rngs::StdRng;
    use rand_distr::Normal;

    /// Profile with log-spaced frequencies and `log10 P = f(log10 freq) + noise`.
    fn profile_from(n: usize, noise: f64, seed: u64, law: impl Fn(f64) -> f64) -> RadialProfile {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let bins = (0..n)
            .map(|i| {
                let logf = -2.0 + 1.6 * i as f64 / (n - 1) as f64;
                let logp = law(logf) + noise * normal.sample(&mut rng);
                let p = 10f64.powf(logp);
                RadialBin {
                    frequency: 10f64.powf(logf),
                    mean_power: p,
                    stddev: Some(0.1 * p),
                    count: 8,
                }
            })
            .collect();
        RadialProfile::from_bins(bins)
    }

    fn wide_range() -> FitRange {
        FitRange::new(1e-3, 1.0).unwrap()
    }

    #[test]
    fn weighted_with_break_is_rejected_before_fitting() {
        // The range selects nothing, so any computation would fail differently.
        let profile = profile_from(20, 0.0, 1, |x| 1.0 - 3.0 * x);
        let opts = SegmentedFitOptions {
            weighted: true,
            break_guess: Some(BreakGuess::Log10(-1.0)),
            ..SegmentedFitOptions::default()
        };
        let range = FitRange::new(0.6, 0.9).unwrap();
        let err = fit_segmented(&profile, range, &opts).unwrap_err();
        assert!(matches!(err, AnalysisError::IncompatibleOptions(_)), "{err}");
    }

    #[test]
    fn unbroken_fit_recovers_slope() {
        let profile = profile_from(50, 0.01, 7, |x| 2.0 - 3.0 * x);
        let out = fit_segmented(&profile, wide_range(), &SegmentedFitOptions::default()).unwrap();
        assert!(!out.is_broken());
        assert!(!out.break_requested);
        assert!((out.slope() + 3.0).abs() < 0.05, "slope={}", out.slope());
        let SegmentedFit::Unbroken(fit) = out.fit else {
            panic!("expected unbroken fit");
        };
        assert!(fit.slope_stderr > 0.0 && fit.slope_stderr < 0.05);
        assert_eq!(fit.n_points, 50);
    }

    #[test]
    fn break_on_short_profile_falls_back_with_warning() {
        // 15 samples cannot give 10 on both sides of any break.
        let profile = profile_from(15, 0.01, 3, |x| 2.0 - 3.0 * x);
        let opts = SegmentedFitOptions {
            break_guess: Some(BreakGuess::Log10(-0.6)),
            ..SegmentedFitOptions::default()
        };
        let out = fit_segmented(&profile, wide_range(), &opts).unwrap();
        assert!(!out.is_broken());
        assert!(out.was_downgraded());
        assert!(!out.warnings.is_empty());
        assert!((out.slope() + 3.0).abs() < 0.1);
        assert!(out.break_fit().is_err());
    }

    #[test]
    fn broken_fit_recovers_both_slopes() {
        let brk = -1.0;
        let law = move |x: f64| {
            if x < brk { 1.0 - 2.0 * x } else { 1.0 - 2.0 * brk - 4.0 * (x - brk) }
        };
        let profile = profile_from(60, 0.002, 11, law);
        let opts = SegmentedFitOptions {
            break_guess: Some(BreakGuess::Frequency(0.05)),
            ..SegmentedFitOptions::default()
        };
        let out = fit_segmented(&profile, wide_range(), &opts).unwrap();
        let fit = out.break_fit().unwrap();
        assert!(fit.valid);
        assert!((fit.log_break - brk).abs() < 0.05, "log_break={}", fit.log_break);
        assert!((fit.slopes[0] + 2.0).abs() < 0.05);
        assert!((fit.slopes[1] + 4.0).abs() < 0.05);
        assert!(fit.break_stderr > 0.0 && fit.break_stderr.is_finite());
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn break_search_finds_kink() {
        let brk = -1.0;
        let law = move |x: f64| {
            if x < brk { 1.0 - 1.5 * x } else { 1.0 - 1.5 * brk - 4.0 * (x - brk) }
        };
        let profile = profile_from(60, 0.001, 5, law);
        let opts = SegmentedFitOptions {
            break_guess: Some(BreakGuess::Search),
            ..SegmentedFitOptions::default()
        };
        let out = fit_segmented(&profile, wide_range(), &opts).unwrap();
        let fit = out.break_fit().unwrap();
        assert!((fit.log_break - brk).abs() < 0.05, "log_break={}", fit.log_break);
    }

    #[test]
    fn validation_policy_is_configurable() {
        // Break three quarters of the way along: 45 below, 15 above.
        let brk = -0.8;
        let law = move |x: f64| {
            if x < brk { 1.0 - 2.0 * x } else { 1.0 - 2.0 * brk - 5.0 * (x - brk) }
        };
        let profile = profile_from(60, 0.0, 2, law);
        let base = SegmentedFitOptions {
            break_guess: Some(BreakGuess::Log10(-0.85)),
            min_fit_points: 20,
            ..SegmentedFitOptions::default()
        };

        let below = SegmentedFitOptions {
            break_validation: BreakValidation::BelowBreak,
            ..base.clone()
        };
        assert!(fit_segmented(&profile, wide_range(), &below).unwrap().is_broken());

        let above = SegmentedFitOptions {
            break_validation: BreakValidation::AboveBreak,
            ..base.clone()
        };
        let out = fit_segmented(&profile, wide_range(), &above).unwrap();
        assert!(!out.is_broken());
        let rejected = out.rejected_break.expect("rejected break retained");
        assert!(!rejected.valid);
        assert!(matches!(
            out.warnings[0],
            FitWarning::InsufficientSegmentPoints { required: 20, .. }
        ));

        assert!(!fit_segmented(&profile, wide_range(), &base).unwrap().is_broken());
    }

    #[test]
    fn weighted_fit_uses_bin_scatter() {
        let profile = profile_from(30, 0.01, 9, |x| 0.5 - 2.5 * x);
        let opts = SegmentedFitOptions {
            weighted: true,
            ..SegmentedFitOptions::default()
        };
        let out = fit_segmented(&profile, wide_range(), &opts).unwrap();
        let SegmentedFit::Unbroken(fit) = out.fit else {
            panic!("expected unbroken fit");
        };
        assert!(fit.weighted);
        assert!((fit.slope + 2.5).abs() < 0.05);
    }

    #[test]
    fn weighted_without_stddev_is_incompatible() {
        let bins = (1..10)
            .map(|i| RadialBin {
                frequency: i as f64 * 0.05,
                mean_power: 1.0 / i as f64,
                stddev: None,
                count: 1,
            })
            .collect();
        let profile = RadialProfile::from_bins(bins);
        let opts = SegmentedFitOptions {
            weighted: true,
            ..SegmentedFitOptions::default()
        };
        let err = fit_segmented(&profile, wide_range(), &opts).unwrap_err();
        assert!(matches!(err, AnalysisError::IncompatibleOptions(_)));
    }

    #[test]
    fn non_positive_powers_are_excluded() {
        let mut bins: Vec<RadialBin> = (1..=12)
            .map(|i| {
                let f = i as f64 * 0.03;
                RadialBin {
                    frequency: f,
                    mean_power: f.powf(-3.0),
                    stddev: None,
                    count: 4,
                }
            })
            .collect();
        bins[4].mean_power = 0.0;
        bins[7].mean_power = -1.0;
        let profile = RadialProfile::from_bins(bins);
        let out = fit_segmented(&profile, wide_range(), &SegmentedFitOptions::default()).unwrap();
        let SegmentedFit::Unbroken(fit) = out.fit else {
            panic!("expected unbroken fit");
        };
        assert_eq!(fit.n_points, 10);
        assert!((fit.slope + 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_range_is_reported() {
        let profile = profile_from(20, 0.0, 1, |x| -x);
        let range = FitRange::new(0.6, 0.9).unwrap();
        let err = fit_segmented(&profile, range, &SegmentedFitOptions::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::EmptySelection(_)));
    }
}
