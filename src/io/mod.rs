//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - report exports to CSV (`export`)
//! - JSON run bundle read/write (`results`)

pub mod export;
pub mod ingest;
pub mod results;

pub use export::*;
pub use ingest::*;
pub use results::*;
