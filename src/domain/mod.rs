//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - configuration enums (`GroupKey`, `ModelKind`)
//! - observations and partitionable datasets (`Observation`, `Dataset`)
//! - fit outputs (`FitResult`, `ParamInterval`, `DerivedMetric`, `ComparisonResult`)

pub mod types;

pub use types::*;
