//! Reporting: profile residuals and formatted terminal output.

pub mod format;

pub use format::*;
