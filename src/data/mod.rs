//! Data sources other than user CSVs.

pub mod synthetic;

pub use synthetic::*;
