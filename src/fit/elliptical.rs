//! Anisotropic power-law fit to the full 2D spectrum.
//!
//! Model (log10 power at frequency `(kx, ky)`):
//!
//! ```text
//! log10 P = A + (γ / 2) · log10(kx'² + ky'² / (1 - e)²)
//! kx' =  kx cos θ + ky sin θ
//! ky' = -kx sin θ + ky cos θ
//! ```
//!
//! with log-amplitude `A`, slope `γ`, ellipticity `e ∈ [0, 1)` (0 = isotropic)
//! and orientation `θ`. The optimizer sees `e` through the unbounded coordinate
//! `e_raw` (see [`crate::math::transform`]); the reported ellipticity error is
//! the raw error scaled by the transform's derivative at the fitted `e_raw`.
//!
//! Standard errors come either from the covariance of the Levenberg–Marquardt
//! solution or, when bootstrapping, from the spread of re-fits to synthetic
//! observations built as `best-fit model + resampled residuals`.

use std::f64::consts::{LN_10, PI};

use nalgebra::{DMatrix, DVector};
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::domain::{
    EllipticalFitOptions, EllipticalFitResult, FitWarning, FrequencyGrid, FrequencyMask,
    InitialParams, Spectrum2D, StderrMethod,
};
use crate::error::AnalysisError;
use crate::math::{
    interval_transform_derivative, inverse_interval_transform, inverse_interval_transform_stderr,
    levenberg_marquardt, std_dev, LeastSquaresProblem,
};

/// Ellipticity above which the fit is flagged as sitting on its boundary.
pub const ISOTROPY_THRESHOLD: f64 = 0.97;

/// Floor on `1 - e` so the model stays finite as `e → 1`.
const MIN_AXIS_RATIO: f64 = 1e-12;

/// Minimum number of converged bootstrap re-fits.
const MIN_BOOTSTRAP_SUCCESSES: usize = 2;

/// Model log10 power at `(kx, ky)` for bounded ellipticity `e`.
pub fn model_log_power(kx: f64, ky: f64, amplitude: f64, e: f64, theta: f64, slope: f64) -> f64 {
    let (q, _, _) = quadratic_form(kx, ky, e, theta);
    amplitude + 0.5 * slope * q.log10()
}

/// Reduce an orientation into `[0, π)`.
pub fn normalize_orientation(theta: f64) -> f64 {
    let t = theta.rem_euclid(PI);
    if t >= PI { 0.0 } else { t }
}

/// Advisory for ellipticities pressed against the top of `[0, 1)`.
pub fn isotropy_advisory(ellipticity: f64) -> Option<FitWarning> {
    (ellipticity > ISOTROPY_THRESHOLD).then_some(FitWarning::Isotropy { ellipticity })
}

/// Returns `(q, kx', ky')`.
fn quadratic_form(kx: f64, ky: f64, e: f64, theta: f64) -> (f64, f64, f64) {
    let (sin, cos) = theta.sin_cos();
    let xr = kx * cos + ky * sin;
    let yr = -kx * sin + ky * cos;
    let ratio = (1.0 - e).max(MIN_AXIS_RATIO);
    (xr * xr + yr * yr / (ratio * ratio), xr, yr)
}

/// Masked samples in the form the optimizer consumes.
#[derive(Debug, Clone)]
struct EllipticalData {
    kx: Vec<f64>,
    ky: Vec<f64>,
    log_power: Vec<f64>,
    sqrt_weights: Option<Vec<f64>>,
}

fn collect_data(
    spectrum: &Spectrum2D,
    grid: &FrequencyGrid,
    mask: &FrequencyMask,
    radial_weighting: bool,
) -> Result<EllipticalData, AnalysisError> {
    if spectrum.shape() != grid.shape() || mask.shape() != grid.shape() {
        return Err(AnalysisError::invalid(format!(
            "Shape mismatch: spectrum {:?}, grid {:?}, mask {:?}.",
            spectrum.shape(),
            grid.shape(),
            mask.shape()
        )));
    }
    if mask.is_empty() {
        return Err(AnalysisError::empty_selection(
            "The mask selects no pixels for the 2D fit.",
        ));
    }

    let mut data = EllipticalData {
        kx: Vec::new(),
        ky: Vec::new(),
        log_power: Vec::new(),
        sqrt_weights: radial_weighting.then(Vec::new),
    };
    for (i, &p) in spectrum.values().iter().enumerate() {
        if !mask.is_included(i) {
            continue;
        }
        let r = grid.radial[i];
        let logp = p.log10();
        if !(r > 0.0 && logp.is_finite()) {
            continue;
        }
        data.kx.push(grid.kx[i]);
        data.ky.push(grid.ky[i]);
        data.log_power.push(logp);
        if let Some(w) = data.sqrt_weights.as_mut() {
            w.push((1.0 / r).sqrt());
        }
    }

    if data.log_power.is_empty() {
        return Err(AnalysisError::empty_selection(
            "No finite, positive power values inside the mask.",
        ));
    }
    Ok(data)
}

/// Least-squares problem over either all four parameters
/// `[A, e_raw, θ, γ]` or, with the ellipticity fixed, `[A, γ]`.
struct EllipticalProblem<'a> {
    data: &'a EllipticalData,
    observed: &'a [f64],
    /// Orientation used when the ellipticity is held at zero.
    fixed_orientation: Option<f64>,
}

impl EllipticalProblem<'_> {
    /// `(A, e, θ, γ)` from the optimizer vector.
    fn unpack(&self, p: &DVector<f64>) -> (f64, f64, f64, f64) {
        match self.fixed_orientation {
            Some(theta) => (p[0], 0.0, theta, p[1]),
            None => (p[0], inverse_interval_transform(p[1], 0.0, 1.0), p[2], p[3]),
        }
    }

    fn weight(&self, i: usize) -> f64 {
        self.data.sqrt_weights.as_ref().map_or(1.0, |w| w[i])
    }
}

impl LeastSquaresProblem for EllipticalProblem<'_> {
    fn n_params(&self) -> usize {
        if self.fixed_orientation.is_some() { 2 } else { 4 }
    }

    fn n_residuals(&self) -> usize {
        self.observed.len()
    }

    fn residuals(&self, p: &DVector<f64>) -> DVector<f64> {
        let (amp, e, theta, slope) = self.unpack(p);
        DVector::from_iterator(
            self.observed.len(),
            (0..self.observed.len()).map(|i| {
                let model = model_log_power(self.data.kx[i], self.data.ky[i], amp, e, theta, slope);
                self.weight(i) * (model - self.observed[i])
            }),
        )
    }

    fn jacobian(&self, p: &DVector<f64>) -> DMatrix<f64> {
        let (_, e, theta, slope) = self.unpack(p);
        let n = self.observed.len();
        let mut jac = DMatrix::<f64>::zeros(n, self.n_params());
        let ratio = (1.0 - e).max(MIN_AXIS_RATIO);
        let de_draw = match self.fixed_orientation {
            Some(_) => 0.0,
            None => interval_transform_derivative(p[1], 0.0, 1.0),
        };

        for i in 0..n {
            let w = self.weight(i);
            let (q, xr, yr) = quadratic_form(self.data.kx[i], self.data.ky[i], e, theta);
            let scale = slope / (q * LN_10);
            match self.fixed_orientation {
                Some(_) => {
                    jac[(i, 0)] = w;
                    jac[(i, 1)] = w * 0.5 * q.log10();
                }
                None => {
                    let d_e = scale * yr * yr / ratio.powi(3);
                    let d_theta = scale * xr * yr * (1.0 - 1.0 / (ratio * ratio));
                    jac[(i, 0)] = w;
                    jac[(i, 1)] = w * d_e * de_draw;
                    jac[(i, 2)] = w * d_theta;
                    jac[(i, 3)] = w * 0.5 * q.log10();
                }
            }
        }
        jac
    }
}

/// Fit the elliptical power law to the masked spectrum.
pub fn fit_elliptical(
    spectrum: &Spectrum2D,
    grid: &FrequencyGrid,
    mask: &FrequencyMask,
    initial: InitialParams,
    opts: &EllipticalFitOptions,
) -> Result<EllipticalFitResult, AnalysisError> {
    let data = collect_data(spectrum, grid, mask, opts.radial_weighting)?;
    let n = data.log_power.len();

    let fixed_orientation = opts
        .fix_ellipticity
        .then(|| normalize_orientation(initial.orientation));
    let start = match fixed_orientation {
        Some(_) => DVector::from_vec(vec![initial.amplitude, initial.slope]),
        None => DVector::from_vec(vec![
            initial.amplitude,
            initial.ellipticity_raw,
            initial.orientation,
            initial.slope,
        ]),
    };
    if start.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::invalid(format!("Non-finite initial parameters: {initial:?}.")));
    }

    let problem = EllipticalProblem {
        data: &data,
        observed: &data.log_power,
        fixed_orientation,
    };
    if n <= problem.n_params() {
        return Err(AnalysisError::empty_selection(format!(
            "{n} usable pixels cannot constrain {} parameters.",
            problem.n_params()
        )));
    }

    let solution = levenberg_marquardt(&problem, start, &opts.lm)?;
    log::debug!(
        "elliptical fit converged in {} iterations (cost {:.4e}, n={n})",
        solution.iterations,
        solution.cost
    );

    let mut warnings = Vec::new();
    let (raw_stderrs, stderr_method) = if opts.bootstrap {
        let (stderrs, successful) = bootstrap_stderrs(&problem, &solution.params, opts)?;
        if successful < opts.n_iters {
            warnings.push(FitWarning::BootstrapIterationsDropped {
                failed: opts.n_iters - successful,
                total: opts.n_iters,
            });
        }
        (
            stderrs,
            StderrMethod::Bootstrap {
                successful,
                requested: opts.n_iters,
            },
        )
    } else {
        let stderrs = solution
            .stderrs()
            .unwrap_or_else(|| vec![f64::NAN; solution.params.len()]);
        (stderrs, StderrMethod::Covariance)
    };

    let p = &solution.params;
    let result = match fixed_orientation {
        Some(theta) => EllipticalFitResult {
            amplitude: p[0],
            amplitude_stderr: raw_stderrs[0],
            slope: p[1],
            slope_stderr: raw_stderrs[1],
            ellipticity: 0.0,
            ellipticity_stderr: 0.0,
            ellipticity_raw: None,
            orientation: theta,
            orientation_stderr: 0.0,
            fixed_ellipticity: true,
            n_points: n,
            iterations: solution.iterations,
            stderr_method,
            warnings,
        },
        None => {
            let ellipticity = inverse_interval_transform(p[1], 0.0, 1.0);
            if let Some(w) = isotropy_advisory(ellipticity) {
                warnings.push(w);
            }
            if opts.radial_weighting {
                warnings.push(FitWarning::RadialWeightingBias);
            }
            EllipticalFitResult {
                amplitude: p[0],
                amplitude_stderr: raw_stderrs[0],
                slope: p[3],
                slope_stderr: raw_stderrs[3],
                ellipticity,
                ellipticity_stderr: inverse_interval_transform_stderr(raw_stderrs[1], p[1], 0.0, 1.0),
                ellipticity_raw: Some(p[1]),
                orientation: normalize_orientation(p[2]),
                orientation_stderr: raw_stderrs[2],
                fixed_ellipticity: false,
                n_points: n,
                iterations: solution.iterations,
                stderr_method,
                warnings,
            }
        }
    };

    for w in &result.warnings {
        log::warn!("{w}");
    }
    Ok(result)
}

/// Residual bootstrap. Returns per-parameter standard deviations (optimizer
/// coordinates) and the number of converged re-fits.
fn bootstrap_stderrs(
    problem: &EllipticalProblem<'_>,
    best: &DVector<f64>,
    opts: &EllipticalFitOptions,
) -> Result<(Vec<f64>, usize), AnalysisError> {
    let n = problem.observed.len();
    let data = problem.data;
    let (amp, e, theta, slope) = problem.unpack(best);
    let fitted: Vec<f64> = (0..n)
        .map(|i| model_log_power(data.kx[i], data.ky[i], amp, e, theta, slope))
        .collect();
    let residuals: Vec<f64> = problem
        .observed
        .iter()
        .zip(fitted.iter())
        .map(|(o, f)| o - f)
        .collect();

    let refits: Vec<DVector<f64>> = (0..opts.n_iters)
        .into_par_iter()
        .filter_map(|iter| {
            let mut rng = StdRng::seed_from_u64(opts.seed.wrapping_add(iter as u64));
            let observed: Vec<f64> = fitted
                .iter()
                .map(|f| f + residuals[rng.gen_range(0..n)])
                .collect();
            let resampled = EllipticalProblem {
                data,
                observed: &observed,
                fixed_orientation: problem.fixed_orientation,
            };
            match levenberg_marquardt(&resampled, best.clone(), &opts.lm) {
                Ok(sol) => Some(sol.params),
                Err(err) => {
                    log::debug!("bootstrap iteration {iter} skipped: {err}");
                    None
                }
            }
        })
        .collect();

    if refits.len() < MIN_BOOTSTRAP_SUCCESSES {
        return Err(AnalysisError::FitNonConvergence {
            iterations: opts.lm.max_iterations,
        });
    }

    let stderrs = (0..best.len())
        .map(|j| {
            let column: Vec<f64> = refits.iter().map(|p| p[j]).collect();
            std_dev(&column, 1).unwrap_or(f64::NAN)
        })
        .collect();
    Ok((stderrs, refits.len()))
}
