//! Mathematical utilities: least squares (linear and nonlinear), the bounded
//! parameter transform, and summary statistics.

pub mod lm;
pub mod ols;
pub mod stats;
pub mod transform;

pub use lm::*;
pub use ols::*;
pub use stats::*;
pub use transform::*;
