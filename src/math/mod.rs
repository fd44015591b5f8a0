//! Numerical utilities: SVD least squares and bounded Levenberg–Marquardt.

pub mod lm;
pub mod ols;

pub use lm::*;
pub use ols::*;
