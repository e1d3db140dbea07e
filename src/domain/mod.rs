//! Domain types used throughout the analysis.
//!
//! This module defines:
//!
//! - input grids and masks (`Spectrum2D`, `FrequencyGrid`, `FrequencyMask`)
//! - the radial profile (`RadialProfile`)
//! - fit outputs (`SegmentedFitOutcome`, `EllipticalFitResult`, `FitWarning`)
//! - per-step option structs

pub mod options;
pub mod types;

pub use options::*;
pub use types::*;
