//! Power-law fitting.
//!
//! Responsibilities:
//!
//! - fit the 1D radial profile with one or two power-law segments
//! - propose break locations when none is supplied
//! - fit the anisotropic power-law model to the 2D spectrum

pub mod breakpoint;
pub mod elliptical;
pub mod segmented;

pub use breakpoint::*;
pub use elliptical::*;
pub use segmented::*;
