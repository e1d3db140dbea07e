//! Formatted terminal output for an analysis run.

use std::fmt::Write as _;

use crate::analysis::AnalysisReport;
use crate::domain::{
    EllipticalFitResult, RadialProfile, SegmentedFit, SegmentedFitOutcome, StderrMethod,
};

/// One profile bin compared against the 1D fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileResidual {
    pub frequency: f64,
    pub log_power: f64,
    pub log_fit: f64,
    /// `log_power - log_fit`.
    pub residual: f64,
    pub in_range: bool,
}

/// log10 residuals of each profile bin against the fitted curve.
pub fn profile_residuals(profile: &RadialProfile, fit: &SegmentedFitOutcome) -> Vec<ProfileResidual> {
    profile
        .bins()
        .iter()
        .filter(|b| b.frequency > 0.0 && b.mean_power > 0.0)
        .map(|b| {
            let log_power = b.mean_power.log10();
            let log_fit = fit.predict_log(b.frequency.log10());
            ProfileResidual {
                frequency: b.frequency,
                log_power,
                log_fit,
                residual: log_power - log_fit,
                in_range: fit.range.contains(b.frequency),
            }
        })
        .collect()
}

/// Full run summary: profile, 1D fit and (if present) 2D fit.
pub fn format_run_summary(report: &AnalysisReport) -> String {
    let mut out = String::new();

    out.push_str("=== pspec - power spectrum fit ===\n");
    let _ = writeln!(out, "Spectrum: {}x{}", report.shape.0, report.shape.1);
    let _ = writeln!(
        out,
        "Profile: {} bins | fit range [{:.4}, {:.4}] cycles/pixel",
        report.profile.len(),
        report.fit_range.low,
        report.fit_range.high
    );

    out.push('\n');
    out.push_str(&format_segmented(&report.segmented));

    if let Some(fit) = &report.elliptical {
        out.push('\n');
        out.push_str(&format_elliptical(fit, report.mask_pixels));
    }
    out
}

pub fn format_segmented(fit: &SegmentedFitOutcome) -> String {
    let mut out = String::new();
    out.push_str("1D fit:\n");
    match &fit.fit {
        SegmentedFit::Unbroken(f) => {
            let _ = writeln!(
                out,
                "- model: unbroken{} (n={})",
                if f.weighted { ", weighted" } else { "" },
                f.n_points
            );
            let _ = writeln!(out, "- slope    : {:.4} ± {:.4}", f.slope, f.slope_stderr);
            let _ = writeln!(out, "- intercept: {:.4} ± {:.4}", f.intercept, f.intercept_stderr);
        }
        SegmentedFit::Broken(b) => {
            let _ = writeln!(out, "- model: broken (n={} below, {} above)", b.n_below, b.n_above);
            let _ = writeln!(out, "- break    : {:.5} ± {:.5}", b.break_freq, b.break_stderr);
            let _ = writeln!(out, "- slope 1  : {:.4} ± {:.4}", b.slopes[0], b.slope_stderrs[0]);
            let _ = writeln!(out, "- slope 2  : {:.4} ± {:.4}", b.slopes[1], b.slope_stderrs[1]);
            let _ = writeln!(out, "- intercept: {:.4} ± {:.4}", b.intercept, b.intercept_stderr);
        }
    }
    if fit.was_downgraded() {
        out.push_str("- break requested but not used\n");
    }
    for w in &fit.warnings {
        let _ = writeln!(out, "! {w}");
    }
    out
}

pub fn format_elliptical(fit: &EllipticalFitResult, mask_pixels: usize) -> String {
    let mut out = String::new();
    out.push_str("2D fit:\n");
    let method = match fit.stderr_method {
        StderrMethod::Bootstrap {
            successful,
            requested,
        } => format!("bootstrap {successful}/{requested}"),
        StderrMethod::Covariance => "covariance".to_string(),
    };
    let _ = writeln!(
        out,
        "- pixels: {} of {mask_pixels} masked | iterations: {} | errors: {method}",
        fit.n_points, fit.iterations
    );
    let _ = writeln!(out, "- amplitude  : {:.4} ± {:.4}", fit.amplitude, fit.amplitude_stderr);
    let _ = writeln!(out, "- slope      : {:.4} ± {:.4}", fit.slope, fit.slope_stderr);
    if fit.fixed_ellipticity {
        out.push_str("- ellipticity: fixed (isotropic)\n");
    } else {
        let _ = writeln!(
            out,
            "- ellipticity: {:.4} ± {:.4}",
            fit.ellipticity, fit.ellipticity_stderr
        );
        let _ = writeln!(
            out,
            "- orientation: {:.4} ± {:.4} rad",
            fit.orientation, fit.orientation_stderr
        );
    }
    for w in &fit.warnings {
        let _ = writeln!(out, "! {w}");
    }
    out
}

/// Per-bin table of the profile with the 1D fit.
pub fn format_profile_table(profile: &RadialProfile, fit: Option<&SegmentedFitOutcome>) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:>10} {:>14} {:>14} {:>7} {:>10}",
            "freq", "power", "stddev", "count", "resid"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<10} {:-<14} {:-<14} {:-<7} {:-<10}", "", "", "", "", "").trim_end());
    out.push('\n');

    for bin in profile.bins() {
        let stddev = bin.stddev.map(|s| format!("{s:.6e}")).unwrap_or_else(|| "-".to_string());
        let resid = fit
            .filter(|f| bin.frequency > 0.0 && bin.mean_power > 0.0 && f.range.contains(bin.frequency))
            .map(|f| format!("{:+.4}", bin.mean_power.log10() - f.predict_log(bin.frequency.log10())))
            .unwrap_or_default();
        out.push_str(
            format!(
                "{:>10.5} {:>14.6e} {:>14} {:>7} {:>10}",
                bin.frequency, bin.mean_power, stddev, bin.count, resid
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::PowerSpectrumAnalysis;
    use crate::data::{SyntheticSpectrum, generate_spectrum};
    use crate::domain::{AnalysisConfig, EllipticalFitOptions, ScaleConfig};

    fn report() -> AnalysisReport {
        let cfg = SyntheticSpectrum {
            rows: 32,
            cols: 32,
            noise: 0.0,
            ..SyntheticSpectrum::default()
        };
        let analysis =
            PowerSpectrumAnalysis::new(generate_spectrum(&cfg).unwrap(), ScaleConfig::default())
                .unwrap();
        let config = AnalysisConfig {
            elliptical: Some(EllipticalFitOptions {
                bootstrap: false,
                fix_ellipticity: true,
                ..EllipticalFitOptions::default()
            }),
            ..AnalysisConfig::default()
        };
        analysis.run(&config).unwrap()
    }

    #[test]
    fn summary_mentions_both_fits() {
        let text = format_run_summary(&report());
        assert!(text.contains("Spectrum: 32x32"));
        assert!(text.contains("1D fit:"));
        assert!(text.contains("model: unbroken"));
        assert!(text.contains("ellipticity: fixed"));
        assert!(text.contains("errors: covariance"));
    }

    #[test]
    fn residuals_are_small_for_clean_power_law() {
        let report = report();
        let residuals = profile_residuals(&report.profile, &report.segmented);
        assert!(!residuals.is_empty());
        // Bin averaging of a steep power law biases the mean upward a little.
        for r in residuals.iter().filter(|r| r.in_range) {
            assert!(r.residual.abs() < 0.3, "{r:?}");
        }
    }

    #[test]
    fn table_has_one_line_per_bin() {
        let report = report();
        let table = format_profile_table(&report.profile, Some(&report.segmented));
        assert_eq!(table.lines().count(), report.profile.len() + 2);
    }
}
