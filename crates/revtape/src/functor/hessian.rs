//! Second-order functionals by central differences of reverse gradients.

use faer::{Mat, MatRef};

use crate::check::{check_finite, check_positive, check_size_match};
use crate::context::with_nested_scope;
use crate::error::AdError;
use crate::functor::value_and_gradient;
use crate::var::Var;

/// A finite-difference step that balances truncation and rounding error
/// for well-scaled problems.
pub const DEFAULT_STEP: f64 = 1e-4;

fn check_step(function: &'static str, step: f64) -> Result<(), AdError> {
    check_positive(function, "step", &step)?;
    check_finite(function, "step", &step)
}

/// Gradients at `x + step * direction` and `x - step * direction`.
fn gradient_pair<F>(
    f: &F,
    x: &[f64],
    direction: &[f64],
    step: f64,
) -> Result<(Vec<f64>, Vec<f64>), AdError>
where
    F: Fn(&[Var]) -> Var,
{
    let shifted = |sign: f64| -> Vec<f64> {
        x.iter()
            .zip(direction)
            .map(|(xi, di)| xi + sign * step * di)
            .collect()
    };
    let (_, up) = value_and_gradient(f, &shifted(1.0))?;
    let (_, down) = value_and_gradient(f, &shifted(-1.0))?;
    Ok((up, down))
}

fn central_difference(up: &[f64], down: &[f64], step: f64) -> Vec<f64> {
    up.iter()
        .zip(down)
        .map(|(u, d)| (u - d) / (2.0 * step))
        .collect()
}

/// Value, gradient and Hessian of `f` at `x`.
///
/// Row `i` of the Hessian is the central difference of the gradient along
/// coordinate `i`; the result is symmetrised.
///
/// # Errors
/// Returns [`AdError::EmptyInput`] if `x` is empty and
/// [`AdError::Domain`] if `step` is not positive and finite.
pub fn hessian<F>(f: F, x: &[f64], step: f64) -> Result<(f64, Vec<f64>, Mat<f64>), AdError>
where
    F: Fn(&[Var]) -> Var,
{
    check_step("hessian", step)?;
    with_nested_scope(|| -> Result<_, AdError> {
        let (fx, grad) = value_and_gradient(&f, x)?;
        let n = x.len();
        let mut unit = vec![0.0; n];
        let mut rows = Vec::with_capacity(n);
        for i in 0..n {
            unit[i] = 1.0;
            let (up, down) = gradient_pair(&f, x, &unit, step)?;
            unit[i] = 0.0;
            rows.push(central_difference(&up, &down, step));
        }
        let h = Mat::from_fn(n, n, |i, j| 0.5 * (rows[i][j] + rows[j][i]));
        Ok((fx, grad, h))
    })
}

/// Value of `f` at `x` and the Hessian-vector product `H(x) v`.
///
/// Needs two gradient evaluations regardless of dimension.
///
/// # Errors
/// Returns [`AdError::SizeMismatch`] if `v` and `x` differ in length, and
/// the errors of [`hessian`].
pub fn hessian_vector_product<F>(
    f: F,
    x: &[f64],
    v: &[f64],
    step: f64,
) -> Result<(f64, Vec<f64>), AdError>
where
    F: Fn(&[Var]) -> Var,
{
    check_size_match(x.len(), v.len())?;
    check_step("hessian_vector_product", step)?;
    with_nested_scope(|| -> Result<_, AdError> {
        let (fx, _) = value_and_gradient(&f, x)?;
        let (up, down) = gradient_pair(&f, x, v, step)?;
        Ok((fx, central_difference(&up, &down, step)))
    })
}

/// Gradient of `trace(M H(x))` with respect to `x`.
///
/// # Errors
/// Returns [`AdError::SizeMismatch`] unless `m` is square with the
/// dimension of `x`, and the errors of [`hessian`].
pub fn grad_tr_mat_times_hessian<F>(
    f: F,
    x: &[f64],
    m: MatRef<'_, f64>,
    step: f64,
) -> Result<Vec<f64>, AdError>
where
    F: Fn(&[Var]) -> Var,
{
    let n = x.len();
    check_size_match(n, m.nrows())?;
    check_size_match(n, m.ncols())?;
    check_step("grad_tr_mat_times_hessian", step)?;

    let trace_mh = |point: &[f64]| -> Result<f64, AdError> {
        let (_, _, h) = hessian(&f, point, step)?;
        let mut trace = 0.0;
        for i in 0..n {
            for j in 0..n {
                trace += m[(i, j)] * h[(j, i)];
            }
        }
        Ok(trace)
    };

    let mut point = x.to_vec();
    let mut grad = Vec::with_capacity(n);
    for i in 0..n {
        point[i] = x[i] + step;
        let up = trace_mh(&point)?;
        point[i] = x[i] - step;
        let down = trace_mh(&point)?;
        point[i] = x[i];
        grad.push((up - down) / (2.0 * step));
    }
    Ok(grad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::with_tape;
    use approx::assert_abs_diff_eq;

    // f(x, y) = x^3 y + sin(y)
    fn cubic(v: &[Var]) -> Var {
        v[0].powf(3.0) * v[1] + v[1].sin()
    }

    fn cubic_hessian(x: f64, y: f64) -> [[f64; 2]; 2] {
        [[6.0 * x * y, 3.0 * x * x], [3.0 * x * x, -y.sin()]]
    }

    #[test]
    fn test_hessian_matches_analytic() {
        let (x, y): (f64, f64) = (1.2, 0.7);
        let (fx, grad, h) = hessian(cubic, &[x, y], DEFAULT_STEP).unwrap();
        assert_abs_diff_eq!(fx, x.powi(3) * y + y.sin(), epsilon = 1e-12);
        assert_abs_diff_eq!(grad[0], 3.0 * x * x * y, epsilon = 1e-12);
        let expected = cubic_hessian(x, y);
        for i in 0..2 {
            for j in 0..2 {
                assert_abs_diff_eq!(h[(i, j)], expected[i][j], epsilon = 1e-6);
            }
        }
        assert_eq!(h[(0, 1)], h[(1, 0)]);
    }

    #[test]
    fn test_hessian_vector_product() {
        let (x, y): (f64, f64) = (1.2, 0.7);
        let v = [0.5, -2.0];
        let (fx, hv) = hessian_vector_product(cubic, &[x, y], &v, DEFAULT_STEP).unwrap();
        assert_abs_diff_eq!(fx, x.powi(3) * y + y.sin(), epsilon = 1e-12);
        let h = cubic_hessian(x, y);
        for i in 0..2 {
            assert_abs_diff_eq!(hv[i], h[i][0] * v[0] + h[i][1] * v[1], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_grad_tr_mat_times_hessian() {
        // f = sum(x_i^3) / 6, H = diag(x), trace(M H) = sum(M_ii x_i)
        let f = |v: &[Var]| v.iter().map(|&xi| xi.powf(3.0)).sum::<Var>() / 6.0;
        let m = Mat::from_fn(3, 3, |i, j| (1 + i + 2 * j) as f64);
        let grad = grad_tr_mat_times_hessian(f, &[0.3, -1.0, 2.0], m.as_ref(), 1e-3).unwrap();
        for i in 0..3 {
            assert_abs_diff_eq!(grad[i], m[(i, i)], epsilon = 1e-5);
        }
    }

    #[test]
    fn test_functionals_leave_tape_unchanged() {
        let before = with_tape(|t| t.len());
        hessian(cubic, &[1.0, 1.0], DEFAULT_STEP).unwrap();
        hessian_vector_product(cubic, &[1.0, 1.0], &[1.0, 0.0], DEFAULT_STEP).unwrap();
        assert_eq!(with_tape(|t| t.len()), before);
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(matches!(
            hessian(cubic, &[1.0, 1.0], 0.0),
            Err(AdError::Domain { name: "step", .. })
        ));
        assert!(matches!(
            hessian(cubic, &[1.0, 1.0], f64::INFINITY),
            Err(AdError::Domain { .. })
        ));
        assert!(matches!(
            hessian(cubic, &[], DEFAULT_STEP),
            Err(AdError::EmptyInput { .. })
        ));
        assert_eq!(
            hessian_vector_product(cubic, &[1.0, 1.0], &[1.0], DEFAULT_STEP).unwrap_err(),
            AdError::SizeMismatch {
                expected: 2,
                actual: 1
            }
        );
        let m = Mat::<f64>::zeros(2, 3);
        assert!(
            grad_tr_mat_times_hessian(cubic, &[1.0, 1.0], m.as_ref(), DEFAULT_STEP).is_err()
        );
    }
}
