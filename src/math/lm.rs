//! Levenberg–Marquardt nonlinear least squares.
//!
//! Minimises `Σ r_i(p)²` for a problem that can report its residual vector and
//! Jacobian. Each iteration solves
//!
//! ```text
//! (JᵀJ + λ D) δ = -Jᵀr,   D = diag(max(JᵀJ_ii, floor))
//! ```
//!
//! accepting the step when the cost drops (λ shrinks) and retrying with a larger
//! λ otherwise. Convergence is declared on a small relative cost reduction, a
//! small step, or a vanishing gradient. Hitting `max_iterations` without any of
//! those is reported as [`AnalysisError::FitNonConvergence`].

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Largest damping before we conclude no downhill step exists.
const LAMBDA_MAX: f64 = 1e16;

/// Floor for the Marquardt scaling diagonal (keeps flat directions damped).
const DIAG_FLOOR: f64 = 1e-12;

/// A residual model the optimizer can drive.
pub trait LeastSquaresProblem {
    fn n_params(&self) -> usize;

    fn n_residuals(&self) -> usize;

    /// Residual vector `r(p)` (already weighted if the problem is weighted).
    fn residuals(&self, params: &DVector<f64>) -> DVector<f64>;

    /// Jacobian `∂r/∂p`, shape `n_residuals × n_params`.
    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64>;
}

/// Optimizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LmConfig {
    pub max_iterations: usize,
    /// Relative cost reduction below which an accepted step ends the fit.
    pub ftol: f64,
    /// Relative step size below which the fit ends.
    pub xtol: f64,
    /// Max-norm of the gradient below which the fit ends.
    pub gtol: f64,
    pub initial_lambda: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-10,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
        }
    }
}

/// Converged optimizer state.
#[derive(Debug, Clone)]
pub struct LmSolution {
    pub params: DVector<f64>,
    /// Sum of squared residuals at `params`.
    pub cost: f64,
    pub iterations: usize,
    /// Pseudo-inverse of `JᵀJ` at the solution (unscaled covariance).
    pub normal_inverse: Option<DMatrix<f64>>,
    pub n_residuals: usize,
}

impl LmSolution {
    /// Covariance-based standard errors `sqrt(diag((JᵀJ)⁺) · cost / (n - p))`.
    pub fn stderrs(&self) -> Option<Vec<f64>> {
        let inv = self.normal_inverse.as_ref()?;
        let p = self.params.len();
        if self.n_residuals <= p {
            return None;
        }
        let s2 = self.cost / (self.n_residuals - p) as f64;
        Some((0..p).map(|i| (inv[(i, i)].max(0.0) * s2).sqrt()).collect())
    }
}

/// Run Levenberg–Marquardt from `initial`.
pub fn levenberg_marquardt<P>(
    problem: &P,
    initial: DVector<f64>,
    config: &LmConfig,
) -> Result<LmSolution, AnalysisError>
where
    P: LeastSquaresProblem + ?Sized,
{
    let p = problem.n_params();
    if initial.len() != p {
        return Err(AnalysisError::invalid(format!(
            "Expected {p} initial parameters, got {}.",
            initial.len()
        )));
    }
    if problem.n_residuals() < p {
        return Err(AnalysisError::empty_selection(format!(
            "{} residuals cannot constrain {p} parameters.",
            problem.n_residuals()
        )));
    }

    let mut params = initial;
    let mut residuals = problem.residuals(&params);
    let mut cost = residuals.dot(&residuals);
    if !cost.is_finite() {
        return Err(AnalysisError::invalid("Non-finite residuals at the initial parameters."));
    }

    let mut lambda = config.initial_lambda;
    let mut converged = false;
    let mut iterations = 0;

    'outer: for iter in 1..=config.max_iterations {
        iterations = iter;
        let jac = problem.jacobian(&params);
        let gradient = jac.transpose() * &residuals;
        if gradient.amax() <= config.gtol {
            converged = true;
            break;
        }
        let normal = jac.transpose() * &jac;

        loop {
            let mut damped = normal.clone();
            for i in 0..p {
                damped[(i, i)] += lambda * normal[(i, i)].max(DIAG_FLOOR);
            }

            let step = match damped.cholesky() {
                Some(chol) => chol.solve(&(-&gradient)),
                None => {
                    lambda *= config.lambda_up;
                    if lambda > LAMBDA_MAX {
                        break 'outer;
                    }
                    continue;
                }
            };

            let candidate = &params + &step;
            let cand_residuals = problem.residuals(&candidate);
            let cand_cost = cand_residuals.dot(&cand_residuals);

            if cand_cost.is_finite() && cand_cost < cost {
                let reduction = cost - cand_cost;
                let small_step =
                    step.norm() <= config.xtol * (params.norm() + config.xtol);
                params = candidate;
                residuals = cand_residuals;
                let prev_cost = cost;
                cost = cand_cost;
                lambda = (lambda * config.lambda_down).max(1e-15);

                if reduction <= config.ftol * prev_cost || small_step {
                    converged = true;
                    break 'outer;
                }
                break;
            }

            lambda *= config.lambda_up;
            if lambda > LAMBDA_MAX {
                // No downhill direction left at machine precision.
                break 'outer;
            }
        }
    }

    if lambda > LAMBDA_MAX {
        log::debug!("LM stopped with saturated damping after {iterations} iterations");
        converged = true;
    }

    if !converged {
        return Err(AnalysisError::FitNonConvergence {
            iterations: config.max_iterations,
        });
    }

    let jac = problem.jacobian(&params);
    let normal_inverse = (jac.transpose() * &jac).pseudo_inverse(1e-12).ok();

    Ok(LmSolution {
        params,
        cost,
        iterations,
        normal_inverse,
        n_residuals: problem.n_residuals(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y = a · exp(b · x)
    struct ExpDecay {
        x: Vec<f64>,
        y: Vec<f64>,
    }

    impl LeastSquaresProblem for ExpDecay {
        fn n_params(&self) -> usize {
            2
        }

        fn n_residuals(&self) -> usize {
            self.x.len()
        }

        fn residuals(&self, p: &DVector<f64>) -> DVector<f64> {
            DVector::from_iterator(
                self.x.len(),
                self.x
                    .iter()
                    .zip(self.y.iter())
                    .map(|(&x, &y)| p[0] * (p[1] * x).exp() - y),
            )
        }

        fn jacobian(&self, p: &DVector<f64>) -> DMatrix<f64> {
            let mut j = DMatrix::zeros(self.x.len(), 2);
            for (i, &x) in self.x.iter().enumerate() {
                let e = (p[1] * x).exp();
                j[(i, 0)] = e;
                j[(i, 1)] = p[0] * x * e;
            }
            j
        }
    }

    #[test]
    fn recovers_exponential_parameters() {
        let x: Vec<f64> = (0..30).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&x| 3.0 * (-1.2 * x).exp()).collect();
        let problem = ExpDecay { x, y };

        let sol = levenberg_marquardt(
            &problem,
            DVector::from_vec(vec![1.0, -0.5]),
            &LmConfig::default(),
        )
        .unwrap();
        assert!((sol.params[0] - 3.0).abs() < 1e-6, "a={}", sol.params[0]);
        assert!((sol.params[1] + 1.2).abs() < 1e-6, "b={}", sol.params[1]);
        assert!(sol.cost < 1e-12);
    }

    #[test]
    fn iteration_cap_is_reported() {
        let x: Vec<f64> = (0..30).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&x| 3.0 * (-1.2 * x).exp()).collect();
        let problem = ExpDecay { x, y };
        let config = LmConfig {
            max_iterations: 1,
            ..LmConfig::default()
        };

        let err = levenberg_marquardt(&problem, DVector::from_vec(vec![1.0, 0.5]), &config)
            .unwrap_err();
        assert_eq!(err, AnalysisError::FitNonConvergence { iterations: 1 });
    }

    #[test]
    fn rejects_underdetermined_problem() {
        let problem = ExpDecay {
            x: vec![0.0],
            y: vec![1.0],
        };
        let err = levenberg_marquardt(&problem, DVector::from_vec(vec![1.0, 0.0]), &LmConfig::default())
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
