//! Bounded-to-unbounded parameter transform.
//!
//! The optimizer works on an unconstrained coordinate `x ∈ ℝ`; the physical
//! parameter lives in `(a, b)`:
//!
//! - forward: `x = ln((v - a) / (b - v))`
//! - inverse: `v = a + (b - a) / (1 + e^{-x})`
//!
//! Because the map is non-linear, a standard error on `x` is pushed through its
//! derivative `dv/dx = (b - a) e^{-x} / (1 + e^{-x})²` at the fitted point.

/// Map a bounded value in `(a, b)` to the real line.
pub fn interval_transform(value: f64, a: f64, b: f64) -> f64 {
    ((value - a) / (b - value)).ln()
}

/// Map an unbounded value back into `(a, b)`.
pub fn inverse_interval_transform(x: f64, a: f64, b: f64) -> f64 {
    a + (b - a) / (1.0 + (-x).exp())
}

/// Propagate a standard error on the unbounded coordinate into `(a, b)`.
pub fn inverse_interval_transform_stderr(stderr: f64, x: f64, a: f64, b: f64) -> f64 {
    interval_transform_derivative(x, a, b) * stderr.abs()
}

/// `dv/dx` of [`inverse_interval_transform`].
pub fn interval_transform_derivative(x: f64, a: f64, b: f64) -> f64 {
    // Written via the logistic value to stay finite for large |x|.
    let s = 1.0 / (1.0 + (-x).exp());
    (b - a) * s * (1.0 - s)
}
