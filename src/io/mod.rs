//! Input/output helpers.
//!
//! - spectrum files (text grid or JSON) (`ingest`)
//! - JSON result export (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
