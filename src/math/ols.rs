//! Weighted least squares solver.
//!
//! Every linear fit in the crate reduces to:
//!
//! ```text
//! minimize Σ w_i (y_i - x_i^T β)^2
//! ```
//!
//! (a straight line in log-log space, the segmented-line linearisation, and
//! the linear spline used for break search).
//!
//! Implementation choices:
//! - We scale rows by `sqrt(w_i)` and solve an ordinary least squares problem.
//! - We use SVD to solve the least-squares problem robustly even when the design
//!   matrix is tall (more rows than columns).
//! - Standard errors follow the usual `s² (XᵀWX)⁻¹` estimate with
//!   `s² = Σ w r² / (n - p)`.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Coefficients and their standard errors from a (weighted) linear regression.
#[derive(Debug, Clone)]
pub struct Regression {
    pub coeffs: DVector<f64>,
    pub covariance: DMatrix<f64>,
    /// Weighted residual sum of squares.
    pub rss: f64,
    pub dof: usize,
}

impl Regression {
    pub fn stderr(&self, i: usize) -> f64 {
        self.covariance[(i, i)].max(0.0).sqrt()
    }
}

/// Fit `y ≈ X β` with optional per-row weights and return the covariance too.
///
/// Returns `None` when there are no residual degrees of freedom or the normal
/// matrix is singular.
pub fn regress(x: &DMatrix<f64>, y: &DVector<f64>, weights: Option<&[f64]>) -> Option<Regression> {
    let (n, p) = x.shape();
    if n != y.len() || n <= p {
        return None;
    }
    if let Some(w) = weights {
        if w.len() != n || w.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return None;
        }
    }

    let mut xw = x.clone();
    let mut yw = y.clone();
    if let Some(w) = weights {
        for i in 0..n {
            let sw = w[i].sqrt();
            for j in 0..p {
                xw[(i, j)] *= sw;
            }
            yw[i] *= sw;
        }
    }

    let coeffs = solve_least_squares(&xw, &yw)?;
    let resid = &yw - &xw * &coeffs;
    let rss = resid.dot(&resid);
    let dof = n - p;

    let normal = xw.transpose() * &xw;
    let inv = normal.try_inverse()?;
    let scale = rss / dof as f64;
    let covariance = inv * scale;
    if covariance.iter().any(|v| !v.is_finite()) {
        return None;
    }

    Some(Regression {
        coeffs,
        covariance,
        rss,
        dof,
    })
}
