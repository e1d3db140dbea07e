//! Test and demo data.

pub mod synthetic;

pub use synthetic::*;
