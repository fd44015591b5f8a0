//! Linear least squares via SVD.
//!
//! Every Levenberg–Marquardt step solves a small damped linear problem
//!
//! ```text
//! minimize ‖ [J; √λ·D] δ − [r; 0] ‖²
//! ```
//!
//! which is tall (observations plus one damping row per parameter) and has
//! only a handful of columns, so an SVD solve is cheap and robust.
//! (Nalgebra's `QR::solve` is intended for square systems and will panic for
//! non-square matrices.)

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Ratio of smallest to largest singular value (`0` for a zero matrix).
///
/// A tiny ratio means the columns are (numerically) collinear.
pub fn inverse_condition(x: &DMatrix<f64>) -> f64 {
    let sv = x.clone().svd(false, false).singular_values;
    let max = sv.iter().copied().fold(0.0_f64, f64::max);
    let min = sv.iter().copied().fold(f64::INFINITY, f64::min);
    if !(max.is_finite() && max > 0.0 && min.is_finite()) {
        return 0.0;
    }
    min / max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn collinear_columns_have_zero_inverse_condition() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 2.0, 4.0, 3.0, 6.0]);
        assert!(inverse_condition(&x) < 1e-12);
        let id = DMatrix::<f64>::identity(3, 3);
        assert!((inverse_condition(&id) - 1.0).abs() < 1e-12);
    }
}
