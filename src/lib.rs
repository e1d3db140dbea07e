//! `pspec-fit` library crate.
//!
//! Radial profiles and power-law fits for 2D spatial power spectra. The
//! binary (`pspec`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the analysis can be driven directly from other Rust code

pub mod analysis;
pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod report;
pub mod spectrum;
