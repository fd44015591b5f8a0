//! Curve fitting orchestration.
//!
//! Responsibilities:
//!
//! - fit one sigmoid to one dataset from many random starts (`multistart`)
//! - derive parameter covariance and intervals at the optimum (`intervals`)
//! - turn parameters into clinical quantities (`derived`)
//! - fit every group independently (`grouped`)
//! - fit nested joint parameterizations and F-test them (`nested`, `compare`)

pub mod compare;
pub mod derived;
pub mod grouped;
pub mod intervals;
pub mod multistart;
pub mod nested;

pub use compare::*;
pub use derived::*;
pub use grouped::*;
pub use intervals::*;
pub use multistart::*;
pub use nested::*;
