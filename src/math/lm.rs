//! Bounded Levenberg–Marquardt for small nonlinear least-squares problems.
//!
//! Each iteration linearizes the model around the current parameters and
//! solves the damped system
//!
//! ```text
//! [J; √λ·D] δ ≈ [r; 0]
//! ```
//!
//! where `J` is the Jacobian of the *prediction*, `r = y − f` the residuals and
//! `D` the Jacobian column norms (Marquardt scaling). Proposed steps are
//! projected onto the box bounds. Accepted steps shrink `λ`, rejected steps
//! grow it; when no damping yields a decrease the iterate is a local minimum.

use nalgebra::{DMatrix, DVector};

use crate::math::ols::{inverse_condition, solve_least_squares};

const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e12;
/// Below this inverse condition number the Jacobian is treated as singular.
const RANK_TOL: f64 = 1e-10;

/// A residual model the optimizer can drive.
///
/// Implementations must be pure: the same parameters always give the same
/// residuals and Jacobian.
pub trait LeastSquaresProblem {
    fn n_obs(&self) -> usize;
    fn n_params(&self) -> usize;
    /// Write `observed − predicted` into `out` (length `n_obs`).
    fn residuals(&self, params: &[f64], out: &mut [f64]);
    /// Write `∂predicted/∂θ` into `jac` (`n_obs × n_params`).
    fn jacobian(&self, params: &[f64], jac: &mut DMatrix<f64>);
}

/// Box constraints. Use `f64::INFINITY` for an open upper side.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    pub fn lower_only(lower: Vec<f64>) -> Self {
        let upper = vec![f64::INFINITY; lower.len()];
        Self { lower, upper }
    }

    pub fn project(&self, params: &mut [f64]) {
        for (j, p) in params.iter_mut().enumerate() {
            *p = p.max(self.lower[j]).min(self.upper[j]);
        }
    }

    /// Whether any component sits on its lower bound.
    pub fn touches_lower(&self, params: &[f64]) -> bool {
        params
            .iter()
            .zip(&self.lower)
            .any(|(&p, &lo)| p <= lo + 1e-9 * (1.0 + lo.abs()))
    }
}

#[derive(Debug, Clone)]
pub struct LmOptions {
    pub max_iterations: usize,
    /// Relative RSS reduction below which an accepted step counts as converged.
    pub ftol: f64,
    /// Relative step length below which an accepted step counts as converged.
    pub xtol: f64,
    pub lambda_init: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-10,
            xtol: 1e-10,
            lambda_init: 1e-3,
        }
    }
}

/// A converged solution.
#[derive(Debug, Clone)]
pub struct LmSolution {
    pub params: Vec<f64>,
    pub rss: f64,
    pub iterations: usize,
    /// Prediction Jacobian at `params`.
    pub jacobian: DMatrix<f64>,
}

/// Why a single run was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmFailure {
    NonFinite,
    RankDeficient,
    IterationCap,
}

impl std::fmt::Display for LmFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            LmFailure::NonFinite => "objective is not finite",
            LmFailure::RankDeficient => "singular Jacobian at optimum",
            LmFailure::IterationCap => "iteration cap reached",
        };
        f.write_str(msg)
    }
}

/// Minimize `Σ r_i²` from `start` within `bounds`.
pub fn minimize<P: LeastSquaresProblem + ?Sized>(
    problem: &P,
    start: &[f64],
    bounds: &Bounds,
    opts: &LmOptions,
) -> Result<LmSolution, LmFailure> {
    let n = problem.n_obs();
    let k = problem.n_params();

    let mut params = start.to_vec();
    bounds.project(&mut params);

    let mut r = vec![0.0; n];
    problem.residuals(&params, &mut r);
    let mut rss = sum_sq(&r);
    if !rss.is_finite() {
        return Err(LmFailure::NonFinite);
    }

    let mut jac = DMatrix::<f64>::zeros(n, k);
    let mut trial = vec![0.0; k];
    let mut r_trial = vec![0.0; n];
    let mut lambda = opts.lambda_init;

    for iter in 1..=opts.max_iterations {
        problem.jacobian(&params, &mut jac);
        if jac.iter().any(|v| !v.is_finite()) {
            return Err(LmFailure::NonFinite);
        }

        let scale: Vec<f64> = (0..k).map(|j| jac.column(j).norm().max(1e-8)).collect();

        let mut a = DMatrix::<f64>::zeros(n + k, k);
        a.rows_mut(0, n).copy_from(&jac);
        let mut b = DVector::<f64>::zeros(n + k);
        b.rows_mut(0, n).copy_from_slice(&r);

        loop {
            let damp = lambda.sqrt();
            for j in 0..k {
                a[(n + j, j)] = damp * scale[j];
            }

            let step = solve_least_squares(&a, &b);
            let Some(step) = step else {
                lambda *= 10.0;
                if lambda > LAMBDA_MAX {
                    return finish(params, rss, iter, jac);
                }
                continue;
            };

            for j in 0..k {
                trial[j] = params[j] + step[j];
            }
            bounds.project(&mut trial);
            problem.residuals(&trial, &mut r_trial);
            let rss_trial = sum_sq(&r_trial);

            if rss_trial.is_finite() && rss_trial < rss {
                let reduction = (rss - rss_trial) / rss.max(f64::MIN_POSITIVE);
                let step_len = distance(&trial, &params);
                let size = norm(&params);

                params.copy_from_slice(&trial);
                r.copy_from_slice(&r_trial);
                rss = rss_trial;
                lambda = (lambda / 10.0).max(LAMBDA_MIN);

                if reduction < opts.ftol || step_len < opts.xtol * (size + opts.xtol) {
                    problem.jacobian(&params, &mut jac);
                    return finish(params, rss, iter, jac);
                }
                break;
            }

            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                // No damping gives a decrease: local minimum (possibly on a bound).
                return finish(params, rss, iter, jac);
            }
        }
    }

    Err(LmFailure::IterationCap)
}

fn finish(
    params: Vec<f64>,
    rss: f64,
    iterations: usize,
    jacobian: DMatrix<f64>,
) -> Result<LmSolution, LmFailure> {
    if !rss.is_finite() || params.iter().any(|p| !p.is_finite()) {
        return Err(LmFailure::NonFinite);
    }
    if inverse_condition(&jacobian) < RANK_TOL {
        return Err(LmFailure::RankDeficient);
    }
    Ok(LmSolution {
        params,
        rss,
        iterations,
        jacobian,
    })
}

fn sum_sq(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

fn norm(v: &[f64]) -> f64 {
    sum_sq(v).sqrt()
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y = a·exp(−b·x)
    struct ExpDecay {
        x: Vec<f64>,
        y: Vec<f64>,
    }

    impl LeastSquaresProblem for ExpDecay {
        fn n_obs(&self) -> usize {
            self.x.len()
        }
        fn n_params(&self) -> usize {
            2
        }
        fn residuals(&self, p: &[f64], out: &mut [f64]) {
            for i in 0..self.x.len() {
                out[i] = self.y[i] - p[0] * (-p[1] * self.x[i]).exp();
            }
        }
        fn jacobian(&self, p: &[f64], jac: &mut DMatrix<f64>) {
            for i in 0..self.x.len() {
                let e = (-p[1] * self.x[i]).exp();
                jac[(i, 0)] = e;
                jac[(i, 1)] = -p[0] * self.x[i] * e;
            }
        }
    }

    fn decay_problem() -> ExpDecay {
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.25).collect();
        let y = x.iter().map(|&t| 3.0 * (-0.7 * t).exp()).collect();
        ExpDecay { x, y }
    }

    #[test]
    fn recovers_exact_parameters() {
        let problem = decay_problem();
        let bounds = Bounds::lower_only(vec![0.0, 0.0]);
        let sol = minimize(&problem, &[1.0, 0.1], &bounds, &LmOptions::default()).unwrap();
        assert!((sol.params[0] - 3.0).abs() < 1e-6, "a={}", sol.params[0]);
        assert!((sol.params[1] - 0.7).abs() < 1e-6, "b={}", sol.params[1]);
        assert!(sol.rss < 1e-10);
    }

    #[test]
    fn respects_lower_bounds() {
        let problem = decay_problem();
        let bounds = Bounds::lower_only(vec![0.0, 1.0]);
        let sol = minimize(&problem, &[1.0, 2.0], &bounds, &LmOptions::default()).unwrap();
        assert!(sol.params[1] >= 1.0);
        assert!(bounds.touches_lower(&sol.params));
    }

    #[test]
    fn iteration_cap_is_reported() {
        let problem = decay_problem();
        let bounds = Bounds::lower_only(vec![0.0, 0.0]);
        let opts = LmOptions {
            max_iterations: 1,
            ..LmOptions::default()
        };
        let err = minimize(&problem, &[100.0, 5.0], &bounds, &opts).unwrap_err();
        assert_eq!(err, LmFailure::IterationCap);
    }

    #[test]
    fn non_finite_start_is_rejected() {
        let problem = decay_problem();
        let bounds = Bounds::lower_only(vec![f64::NEG_INFINITY, f64::NEG_INFINITY]);
        let err = minimize(&problem, &[1.0, -1e6], &bounds, &LmOptions::default()).unwrap_err();
        assert_eq!(err, LmFailure::NonFinite);
    }
}
