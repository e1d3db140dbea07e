//! Frequency-domain plumbing: grids, masks, radial binning and unit
//! conversion. Everything here is a pure function of its inputs.

pub mod binning;
pub mod grid;
pub mod mask;
pub mod units;

pub use binning::*;
pub use grid::*;
pub use mask::*;
pub use units::*;
