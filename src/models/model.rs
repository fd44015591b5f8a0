//! Saturating sigmoid (logistic) growth model.
//!
//! The fitter relies on three primitive operations:
//! - predict `y(age)` given parameters (for residuals)
//! - fill the gradient of `y(age)` with respect to the parameters (Jacobian rows)
//! - invert the curve at a threshold (onset ages)
//!
//! Parameter order is `[scale, midpoint]` for the two-parameter model and
//! `[scale, midpoint, asymptote]` for the three-parameter model.

use crate::domain::ModelKind;
use crate::error::FitError;

/// Hard lower bound on `scale` during optimization.
pub const SCALE_MIN: f64 = 0.001;
/// Hard lower bound on `midpoint` during optimization (years).
pub const MIDPOINT_MIN: f64 = 5.0;
/// Hard lower bound on a free asymptote (dB).
pub const ASYMPTOTE_MIN: f64 = 1.0;

/// Default fixed asymptote (dB), the top of the clinical audiometric range.
pub const DEFAULT_ASYMPTOTE: f64 = 130.0;

/// Logistic fraction `1 / (1 + exp(-z))`, evaluated without overflow.
fn unit_logistic(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `A / (1 + exp(-scale·(age − midpoint)))`.
pub fn logistic(age: f64, scale: f64, midpoint: f64, asymptote: f64) -> f64 {
    asymptote * unit_logistic(scale * (age - midpoint))
}

/// Gradient of [`logistic`] with respect to `(scale, midpoint, asymptote)`.
pub fn logistic_gradient(age: f64, scale: f64, midpoint: f64, asymptote: f64) -> [f64; 3] {
    let s = unit_logistic(scale * (age - midpoint));
    let core = asymptote * s * (1.0 - s);
    [core * (age - midpoint), -core * scale, s]
}

/// Age at which the curve crosses `y`; `None` outside `(0, A)`.
pub fn logistic_inverse(y: f64, scale: f64, midpoint: f64, asymptote: f64) -> Option<f64> {
    if !(y.is_finite() && scale.is_finite() && midpoint.is_finite() && asymptote.is_finite()) {
        return None;
    }
    if !(y > 0.0 && y < asymptote) || scale == 0.0 {
        return None;
    }
    let age = midpoint - ((asymptote - y) / y).ln() / scale;
    age.is_finite().then_some(age)
}

/// A concrete member of the sigmoid family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SigmoidModel {
    pub kind: ModelKind,
    /// Fixed asymptote for `Logistic2`; ignored by `Logistic3`, which reads it
    /// from the parameter vector.
    pub asymptote: f64,
}

impl SigmoidModel {
    pub fn new(kind: ModelKind, asymptote: f64) -> Result<Self, FitError> {
        if !(asymptote.is_finite() && asymptote >= ASYMPTOTE_MIN) {
            return Err(FitError::InvalidSettings(format!(
                "asymptote must be finite and >= {ASYMPTOTE_MIN}, got {asymptote}"
            )));
        }
        Ok(Self { kind, asymptote })
    }

    pub fn param_count(&self) -> usize {
        self.kind.param_count()
    }

    pub fn param_names(&self) -> &'static [&'static str] {
        self.kind.param_names()
    }

    /// Asymptote in effect for the given parameter vector.
    pub fn asymptote_for(&self, params: &[f64]) -> f64 {
        match self.kind {
            ModelKind::Logistic2 => self.asymptote,
            ModelKind::Logistic3 => params[2],
        }
    }

    pub fn forward(&self, age: f64, params: &[f64]) -> f64 {
        logistic(age, params[0], params[1], self.asymptote_for(params))
    }

    pub fn inverse(&self, y: f64, params: &[f64]) -> Option<f64> {
        logistic_inverse(y, params[0], params[1], self.asymptote_for(params))
    }

    /// Fill one Jacobian row (`∂y/∂θ`) for the given age.
    ///
    /// # Panics
    /// Panics if `out` is shorter than `self.param_count()`.
    pub fn fill_gradient(&self, age: f64, params: &[f64], out: &mut [f64]) {
        let g = logistic_gradient(age, params[0], params[1], self.asymptote_for(params));
        out[0] = g[0];
        out[1] = g[1];
        if self.kind == ModelKind::Logistic3 {
            out[2] = g[2];
        }
    }

    pub fn lower_bounds(&self) -> Vec<f64> {
        match self.kind {
            ModelKind::Logistic2 => vec![SCALE_MIN, MIDPOINT_MIN],
            ModelKind::Logistic3 => vec![SCALE_MIN, MIDPOINT_MIN, ASYMPTOTE_MIN],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_inverts_inverse_across_range() {
        let model = SigmoidModel::new(ModelKind::Logistic2, 130.0).unwrap();
        for &scale in &[0.005, 0.05, 0.2, 1.0] {
            for &midpoint in &[5.0, 30.0, 75.0] {
                let params = [scale, midpoint];
                for i in 1..100 {
                    let y = 130.0 * i as f64 / 100.0;
                    let age = model.inverse(y, &params).unwrap();
                    let back = model.forward(age, &params);
                    assert!((back - y).abs() < 1e-6, "y={y} scale={scale} mid={midpoint} back={back}");
                }
            }
        }
    }

    #[test]
    fn inverse_is_undefined_outside_open_range() {
        let model = SigmoidModel::new(ModelKind::Logistic2, 100.0).unwrap();
        let params = [0.1, 40.0];
        assert!(model.inverse(0.0, &params).is_none());
        assert!(model.inverse(100.0, &params).is_none());
        assert!(model.inverse(120.0, &params).is_none());
        assert!(model.inverse(-5.0, &params).is_none());
    }

    #[test]
    fn midpoint_gives_half_asymptote() {
        let model = SigmoidModel::new(ModelKind::Logistic3, 130.0).unwrap();
        let params = [0.1, 40.0, 90.0];
        assert!((model.forward(40.0, &params) - 45.0).abs() < 1e-12);
        assert_eq!(model.asymptote_for(&params), 90.0);
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let model = SigmoidModel::new(ModelKind::Logistic3, 130.0).unwrap();
        let params = [0.08, 35.0, 110.0];
        let age = 28.0;
        let mut grad = [0.0; 3];
        model.fill_gradient(age, &params, &mut grad);
        for j in 0..3 {
            let h = 1e-6 * params[j].abs().max(1.0);
            let mut up = params;
            let mut dn = params;
            up[j] += h;
            dn[j] -= h;
            let fd = (model.forward(age, &up) - model.forward(age, &dn)) / (2.0 * h);
            assert!((fd - grad[j]).abs() < 1e-5, "param {j}: fd={fd} analytic={}", grad[j]);
        }
    }

    #[test]
    fn extreme_arguments_stay_finite() {
        assert_eq!(logistic(0.0, 50.0, 80.0, 130.0), 0.0);
        assert!((logistic(200.0, 50.0, 5.0, 130.0) - 130.0).abs() < 1e-12);
        let g = logistic_gradient(0.0, 50.0, 80.0, 130.0);
        assert!(g.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn rejects_non_positive_asymptote() {
        assert!(SigmoidModel::new(ModelKind::Logistic2, 0.0).is_err());
        assert!(SigmoidModel::new(ModelKind::Logistic2, f64::NAN).is_err());
    }
}
