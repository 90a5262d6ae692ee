//! Integration tests for reverse-mode differentiation.
//!
//! Tests gradients of composite expressions against analytic results and
//! numerical gradient checks.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use revtape::ops::{dot_product, dot_self, log_sum_exp, pow};
use revtape::{Operand, Var, gradient, make_node, reset_tape, with_tape};

/// Compute numerical gradient using central difference.
///
/// grad_i ≈ (f(x + eps*e_i) - f(x - eps*e_i)) / (2*eps)
fn numerical_gradient<F>(f: F, x: &[f64], eps: f64) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut grad = vec![0.0; x.len()];
    let mut x_plus = x.to_vec();
    let mut x_minus = x.to_vec();

    for i in 0..x.len() {
        x_plus[i] = x[i] + eps;
        x_minus[i] = x[i] - eps;

        let f_plus = f(&x_plus);
        let f_minus = f(&x_minus);
        grad[i] = (f_plus - f_minus) / (2.0 * eps);

        x_plus[i] = x[i];
        x_minus[i] = x[i];
    }
    grad
}

/// Evaluate `f` on fresh variables and return its value and gradient.
fn reverse_gradient<F>(f: F, x: &[f64]) -> (f64, Vec<f64>)
where
    F: Fn(&[Var]) -> Var,
{
    let inputs: Vec<Var> = x.iter().map(|&v| Var::new(v)).collect();
    let output = f(&inputs);
    let grad = gradient(output, &inputs);
    let value = output.value();
    reset_tape();
    (value, grad)
}

#[test]
fn test_square_value() {
    let x = Var::new(2.0);
    let f = x * x;
    assert_eq!(f.value(), 4.0);
    assert_eq!(f.gradient(&[x]), vec![4.0]);
}

#[test]
fn test_sin_times_x() {
    let x = Var::new(0.8);
    let f = x.sin() * x;
    let g = gradient(f, &[x]);
    assert_relative_eq!(g[0], 0.8f64.cos() * 0.8 + 0.8f64.sin(), epsilon = 1e-9);
}

#[test]
fn test_two_inputs() {
    let a = Var::new(0.8);
    let b = Var::new(0.2);
    let f = a.sin() + a * b;
    let g = gradient(f, &[a, b]);
    assert_relative_eq!(g[0], 0.8f64.cos() + 0.2, epsilon = 1e-12);
    assert_relative_eq!(g[1], 0.8, epsilon = 1e-12);
}

#[test]
fn test_repeated_gradient_is_exact() {
    let x = Var::new(0.3);
    let y = Var::new(-1.7);
    let f = (x * y).tanh() + x.exp() / y.square();
    let first = gradient(f, &[x, y]);
    let second = gradient(f, &[x, y]);
    assert_eq!(first, second);
}

#[test]
fn test_shared_subexpression() {
    // y = x^2 used twice: f = y * y + y = x^4 + x^2
    let x = Var::new(1.5);
    let y = x * x;
    let f = y * y + y;
    let g = gradient(f, &[x]);
    assert_relative_eq!(g[0], 4.0 * 1.5f64.powi(3) + 2.0 * 1.5);
}

#[test]
fn test_log_of_negative() {
    let x = Var::new(-1.0);
    let f = x.ln();
    assert!(f.value().is_nan());
    let g = gradient(f, &[x]);
    assert!(g[0].is_nan());
}

#[test]
fn test_nan_input_propagates() {
    let x = Var::new(f64::NAN);
    let y = Var::new(2.0);
    let f = x * y + y;
    let g = gradient(f, &[x, y]);
    assert!(f.is_nan());
    assert!(g[0].is_nan());
    assert!(g[1].is_nan());
}

#[test]
fn test_custom_function_through_make_node() {
    // logistic(x) = 1 / (1 + exp(-x)), d/dx = s (1 - s)
    fn logistic(x: Var) -> Var {
        let s = 1.0 / (1.0 + (-x.value()).exp());
        make_node(s, &[(Operand::Var(x), s * (1.0 - s))])
    }

    let x = Var::new(0.4);
    let f = logistic(x) * x;
    let eps = 1e-6;
    let numerical = numerical_gradient(|v| v[0] / (1.0 + (-v[0]).exp()), &[0.4], eps);
    assert_relative_eq!(gradient(f, &[x])[0], numerical[0], epsilon = 1e-8);
}

#[test]
fn test_numerical_gradient_random_points() {
    let mut rng = StdRng::seed_from_u64(42);

    let f_var = |v: &[Var]| {
        let r = v[0].hypot(v[1]);
        (v[0] * v[1]).sin() + pow(v[2], v[0]) - r.ln() + v[1].atan2(v[2])
    };
    let f_f64 = |v: &[f64]| {
        let r = v[0].hypot(v[1]);
        (v[0] * v[1]).sin() + v[2].powf(v[0]) - r.ln() + v[1].atan2(v[2])
    };

    for _ in 0..20 {
        let x: [f64; 3] = [
            rng.sample(StandardNormal),
            rng.random_range(0.3..1.5),
            rng.random_range(0.5..2.0),
        ];
        let (value, analytical) = reverse_gradient(f_var, &x);
        assert_relative_eq!(value, f_f64(&x), epsilon = 1e-12);

        let numerical = numerical_gradient(f_f64, &x, 1e-6);
        for (a, n) in analytical.iter().zip(&numerical) {
            assert_abs_diff_eq!(a, n, epsilon = 1e-5);
        }
    }
}

#[test]
fn test_numerical_gradient_reductions() {
    let mut rng = StdRng::seed_from_u64(7);
    let weights: Vec<f64> = (0..5).map(|_| rng.sample(StandardNormal)).collect();
    let x: Vec<f64> = (0..5).map(|_| rng.sample(StandardNormal)).collect();

    let (_, analytical) = reverse_gradient(
        |v| {
            let d = dot_product(v, &weights).unwrap();
            log_sum_exp(v) * d + dot_self(v).sqrt()
        },
        &x,
    );
    let numerical = numerical_gradient(
        |v| {
            let d: f64 = v.iter().zip(&weights).map(|(a, b)| a * b).sum();
            let lse = v.iter().map(|a| a.exp()).sum::<f64>().ln();
            let norm = v.iter().map(|a| a * a).sum::<f64>().sqrt();
            lse * d + norm
        },
        &x,
        1e-6,
    );
    for (a, n) in analytical.iter().zip(&numerical) {
        assert_abs_diff_eq!(a, n, epsilon = 1e-6);
    }
}

#[test]
fn test_reverse_order_is_required() {
    // f = ((x^2)^2)^2, df/dx = 8 x^7
    let x = Var::new(1.1);
    let f = x.square().square().square();
    let expected = 8.0 * 1.1f64.powi(7);

    let in_creation_order = with_tape(|tape| {
        tape.set_zero_all_adjoints();
        tape.seed(f.id());
        for id in tape.chain_stack().to_vec() {
            tape.backward_step(id);
        }
        tape.adjoint(x.id())
    });
    assert_ne!(in_creation_order, expected);

    assert_relative_eq!(gradient(f, &[x])[0], expected, epsilon = 1e-12);
}

#[test]
fn test_arena_reused_after_reset() {
    let build = || {
        let xs: Vec<Var> = (0..2000).map(|i| Var::new(i as f64 * 1e-3)).collect();
        let total: Var = xs.iter().map(|x| x.sin() * *x).sum();
        gradient(total, &xs[..3]);
    };

    reset_tape();
    build();
    let (slabs, reserved) = with_tape(|t| (t.arena().slab_count(), t.arena().bytes_reserved()));
    assert!(slabs >= 2);

    reset_tape();
    build();
    assert_eq!(
        with_tape(|t| (t.arena().slab_count(), t.arena().bytes_reserved())),
        (slabs, reserved)
    );
}
