//! Fixed-order Gauss rules and adaptive Gauss–Kronrod quadrature.
//!
//! Gauss–Legendre and Gauss–Laguerre nodes are found by Newton iteration on the
//! three-term recurrence of the orthogonal polynomials, which keeps the tiny
//! Laguerre weights accurate in a relative sense (they get multiplied by
//! `exp(node)` when integrating functions that do not carry the `exp(-x)` weight).
//! The rules used by the distance integrals are built once and cached.
//!
//! The adaptive integrator is a global bisection scheme on a 7/15-point
//! Gauss–Kronrod pair: the segment with the largest error estimate is split
//! until the summed estimate meets `max(abs_tol, rel_tol * |I|)`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::f64::consts::PI;
use std::sync::OnceLock;

use super::error::IntegrationError;

/// Order of the Gauss–Legendre rule used for conformal distances
pub const LEGENDRE_ORDER: usize = 9;

/// Order of the Gauss–Laguerre rule used for the sound horizon
pub const LAGUERRE_ORDER: usize = 16;

const NEWTON_MAX_ITER: usize = 100;

/// A quadrature rule: `∫ w(x) f(x) dx ≈ Σ weights[i] * f(nodes[i])`.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussRule {
    pub nodes: Vec<f64>,
    pub weights: Vec<f64>,
}

impl GaussRule {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Affinely maps a rule defined on [-1, 1] onto [lower, upper].
    pub fn mapped(&self, lower: f64, upper: f64) -> GaussRule {
        let half_width = 0.5 * (upper - lower);
        let center = 0.5 * (upper + lower);
        GaussRule {
            nodes: self.nodes.iter().map(|x| half_width * x + center).collect(),
            weights: self.weights.iter().map(|w| half_width * w).collect(),
        }
    }

    /// Weighted dot product of the rule with `f` evaluated at the nodes.
    pub fn integrate<F>(&self, f: F) -> f64
    where
        F: Fn(f64) -> f64,
    {
        self.nodes
            .iter()
            .zip(&self.weights)
            .map(|(&x, &w)| w * f(x))
            .sum()
    }
}

/// n-point Gauss–Legendre rule on [-1, 1], nodes ascending.
pub fn gauss_legendre(n: usize) -> GaussRule {
    let mut nodes = vec![0.0; n];
    let mut weights = vec![0.0; n];
    let nf = n as f64;

    // Roots are symmetric, so only find half of them
    for i in 0..(n + 1) / 2 {
        // Initial guess for the i-th largest root
        let mut z = (PI * (i as f64 + 0.75) / (nf + 0.5)).cos();
        let mut pp = 0.0;

        for _ in 0..NEWTON_MAX_ITER {
            // P_n(z) by recurrence, keeping P_{n-1}(z) for the derivative
            let mut p1 = 1.0;
            let mut p2 = 0.0;
            for j in 0..n {
                let p3 = p2;
                p2 = p1;
                p1 = ((2.0 * j as f64 + 1.0) * z * p2 - j as f64 * p3) / (j as f64 + 1.0);
            }
            pp = nf * (z * p1 - p2) / (z * z - 1.0);

            let z_old = z;
            z = z_old - p1 / pp;
            if (z - z_old).abs() <= 1e-15 {
                break;
            }
        }

        nodes[i] = -z;
        nodes[n - 1 - i] = z;
        let w = 2.0 / ((1.0 - z * z) * pp * pp);
        weights[i] = w;
        weights[n - 1 - i] = w;
    }

    GaussRule { nodes, weights }
}

/// n-point Gauss–Laguerre rule for `∫_0^∞ exp(-x) f(x) dx`, nodes ascending.
pub fn gauss_laguerre(n: usize) -> GaussRule {
    let mut nodes: Vec<f64> = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    let nf = n as f64;

    let mut z = 0.0;
    for i in 0..n {
        // Asymptotic initial guesses for successive roots
        z = match i {
            0 => 3.0 / (1.0 + 2.4 * nf),
            1 => z + 15.0 / (1.0 + 2.5 * nf),
            _ => {
                let ai = (i - 1) as f64;
                z + (1.0 + 2.55 * ai) / (1.9 * ai) * (z - nodes[i - 2])
            }
        };

        let mut pp = 0.0;
        let mut p_prev = 0.0;
        for _ in 0..NEWTON_MAX_ITER {
            // L_n(z) and L_{n-1}(z) by recurrence
            let mut p1 = 1.0;
            let mut p2 = 0.0;
            for j in 0..n {
                let p3 = p2;
                p2 = p1;
                p1 = ((2.0 * j as f64 + 1.0 - z) * p2 - j as f64 * p3) / (j as f64 + 1.0);
            }
            pp = nf * (p1 - p2) / z;
            p_prev = p2;

            let z_old = z;
            z = z_old - p1 / pp;
            if (z - z_old).abs() <= 1e-14 * z.abs().max(1.0) {
                break;
            }
        }

        nodes.push(z);
        weights.push(-1.0 / (pp * nf * p_prev));
    }

    GaussRule { nodes, weights }
}

/// Cached 9-point Gauss–Legendre rule on [-1, 1]
pub fn legendre_rule() -> &'static GaussRule {
    static RULE: OnceLock<GaussRule> = OnceLock::new();
    RULE.get_or_init(|| gauss_legendre(LEGENDRE_ORDER))
}

/// Cached 16-point Gauss–Laguerre rule
pub fn laguerre_rule() -> &'static GaussRule {
    static RULE: OnceLock<GaussRule> = OnceLock::new();
    RULE.get_or_init(|| gauss_laguerre(LAGUERRE_ORDER))
}

// 7/15-point Gauss–Kronrod pair. Kronrod abscissae in decreasing order; the
// odd entries (1, 3, 5, 7) are the Gauss abscissae.
const XGK: [f64; 8] = [
    0.991455371120812639206854697526329,
    0.949107912342758524526189684047851,
    0.864864423359769072789712788640926,
    0.741531185599394439863864773280788,
    0.586087235467691130294144845693013,
    0.405845151377397166906606412076961,
    0.207784955007898467600689403773245,
    0.000000000000000000000000000000000,
];

const WGK: [f64; 8] = [
    0.022935322010529224963732008058970,
    0.063092092629978553290700663189204,
    0.104790010322250183839876322541518,
    0.140653259715525918745189590510238,
    0.169004726639267902826583426598550,
    0.190350578064785409913256402421014,
    0.204432940075298892414161999234649,
    0.209482141084727828012999174891714,
];

const WG: [f64; 4] = [
    0.129484966168869693270611432679082,
    0.279705391489276667901467771423780,
    0.381830050505118944950369775488975,
    0.417959183673469387755102040816327,
];

/// Options of the adaptive integrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadOptions {
    /// Requested relative tolerance
    pub rel_tol: f64,
    /// Requested absolute tolerance
    pub abs_tol: f64,
    /// Maximum number of segments before giving up
    pub max_segments: usize,
    /// A result whose relative error is within `degraded_factor * rel_tol` is
    /// returned as [`QuadStatus::Degraded`] instead of failing.
    pub degraded_factor: f64,
}

impl QuadOptions {
    pub fn new(rel_tol: f64) -> Self {
        QuadOptions {
            rel_tol,
            ..Default::default()
        }
    }
}

impl Default for QuadOptions {
    fn default() -> Self {
        QuadOptions {
            rel_tol: 1e-10,
            abs_tol: 0.0,
            max_segments: 4096,
            degraded_factor: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuadStatus {
    /// The requested tolerance was met
    Converged,
    /// The segment budget ran out (or segments became too narrow) short of the
    /// requested tolerance, but within `degraded_factor` of it
    Degraded { achieved: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadResult {
    pub value: f64,
    /// Summed Gauss–Kronrod error estimate
    pub abs_error: f64,
    pub evaluations: usize,
    pub segments: usize,
    pub status: QuadStatus,
}

impl QuadResult {
    pub fn is_converged(&self) -> bool {
        self.status == QuadStatus::Converged
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    lower: f64,
    upper: f64,
    value: f64,
    error: f64,
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.error.total_cmp(&other.error) == Ordering::Equal
    }
}

impl Eq for Segment {}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.error.total_cmp(&other.error)
    }
}

fn kronrod_segment<F>(f: &F, lower: f64, upper: f64) -> Result<Segment, IntegrationError>
where
    F: Fn(f64) -> f64,
{
    let center = 0.5 * (lower + upper);
    let half_width = 0.5 * (upper - lower);

    let eval = |x: f64| -> Result<f64, IntegrationError> {
        let value = f(x);
        if value.is_finite() {
            Ok(value)
        } else {
            Err(IntegrationError::NonFiniteIntegrand { x, value })
        }
    };

    let f_center = eval(center)?;
    let mut kronrod = WGK[7] * f_center;
    let mut gauss = WG[3] * f_center;
    for (j, (&x, &wk)) in XGK[..7].iter().zip(&WGK[..7]).enumerate() {
        let dx = half_width * x;
        let pair = eval(center - dx)? + eval(center + dx)?;
        kronrod += wk * pair;
        if j % 2 == 1 {
            gauss += WG[j / 2] * pair;
        }
    }

    Ok(Segment {
        lower,
        upper,
        value: kronrod * half_width,
        error: ((kronrod - gauss) * half_width).abs(),
    })
}

/// Adaptive integral of `f` over the finite interval [lower, upper].
pub fn quad<F>(f: F, lower: f64, upper: f64, options: &QuadOptions) -> Result<QuadResult, IntegrationError>
where
    F: Fn(f64) -> f64,
{
    if !(lower.is_finite() && upper.is_finite()) {
        return Err(IntegrationError::InvalidInterval { lower, upper });
    }
    if lower == upper {
        return Ok(QuadResult {
            value: 0.0,
            abs_error: 0.0,
            evaluations: 0,
            segments: 0,
            status: QuadStatus::Converged,
        });
    }
    if upper < lower {
        let reversed = quad(f, upper, lower, options)?;
        return Ok(QuadResult {
            value: -reversed.value,
            ..reversed
        });
    }

    let first = kronrod_segment(&f, lower, upper)?;
    let mut value = first.value;
    let mut error = first.error;
    let mut evaluations = 15;
    let mut heap = BinaryHeap::new();
    heap.push(first);

    let tolerance = |value: f64| options.abs_tol.max(options.rel_tol * value.abs());

    while error > tolerance(value) && heap.len() < options.max_segments {
        let Some(worst) = heap.pop() else { break };

        // Stop refining once the worst segment cannot be split any further
        let mid = 0.5 * (worst.lower + worst.upper);
        let width = worst.upper - worst.lower;
        if !(mid > worst.lower && mid < worst.upper)
            || width <= 16.0 * f64::EPSILON * worst.lower.abs().max(worst.upper.abs())
        {
            heap.push(worst);
            break;
        }

        let left = kronrod_segment(&f, worst.lower, mid)?;
        let right = kronrod_segment(&f, mid, worst.upper)?;
        evaluations += 30;

        value += left.value + right.value - worst.value;
        error += left.error + right.error - worst.error;
        heap.push(left);
        heap.push(right);
    }

    // Re-sum to get rid of the drift of the running totals
    let value: f64 = heap.iter().map(|s| s.value).sum();
    let error: f64 = heap.iter().map(|s| s.error).sum();
    let segments = heap.len();

    let requested = options.rel_tol;
    let achieved = if value != 0.0 { error / value.abs() } else { error };

    if error <= tolerance(value) {
        log::trace!(
            "quad over [{lower}, {upper}] converged: {value:e} ± {error:e} ({segments} segments)"
        );
        return Ok(QuadResult {
            value,
            abs_error: error,
            evaluations,
            segments,
            status: QuadStatus::Converged,
        });
    }

    if achieved <= options.degraded_factor * requested {
        log::warn!(
            "quad over [{lower}, {upper}] reached relative error {achieved:e}, requested {requested:e}"
        );
        return Ok(QuadResult {
            value,
            abs_error: error,
            evaluations,
            segments,
            status: QuadStatus::Degraded { achieved },
        });
    }

    Err(IntegrationError::ToleranceNotReached {
        requested,
        achieved,
        lower,
        upper,
    })
}

/// Adaptive integral of `f` over [lower, ∞), through the map `x = lower + t / (1 - t)`.
pub fn quad_semi_infinite<F>(
    f: F,
    lower: f64,
    options: &QuadOptions,
) -> Result<QuadResult, IntegrationError>
where
    F: Fn(f64) -> f64,
{
    if !lower.is_finite() {
        return Err(IntegrationError::InvalidInterval {
            lower,
            upper: f64::INFINITY,
        });
    }

    let to_x = |t: f64| lower + t / (1.0 - t);
    let mapped = |t: f64| {
        let x = to_x(t);
        if !x.is_finite() {
            return 0.0;
        }
        let jacobian = 1.0 / ((1.0 - t) * (1.0 - t));
        f(x) * jacobian
    };

    quad(mapped, 0.0, 1.0, options).map_err(|err| match err {
        IntegrationError::ToleranceNotReached {
            requested,
            achieved,
            ..
        } => IntegrationError::ToleranceNotReached {
            requested,
            achieved,
            lower,
            upper: f64::INFINITY,
        },
        IntegrationError::NonFiniteIntegrand { x, value } => {
            IntegrationError::NonFiniteIntegrand { x: to_x(x), value }
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn legendre_nodes_and_weights() {
        let rule = legendre_rule();
        assert_eq!(rule.len(), LEGENDRE_ORDER);
        assert_abs_diff_eq!(rule.weights.iter().sum::<f64>(), 2.0, epsilon = 1e-14);
        assert_abs_diff_eq!(rule.nodes[8], 0.968_160_239_507_626_1, epsilon = 1e-14);
        assert_abs_diff_eq!(rule.nodes[4], 0.0, epsilon = 1e-15);
        assert!(rule.nodes.windows(2).all(|w| w[0] < w[1]));

        // Exact for polynomials up to degree 17
        assert_abs_diff_eq!(rule.integrate(|x| x.powi(16)), 2.0 / 17.0, epsilon = 1e-14);
    }

    #[test]
    fn legendre_mapped_interval() {
        let rule = legendre_rule().mapped(0.0, 2.0);
        assert_relative_eq!(rule.integrate(|x| x * x * x), 4.0, max_relative = 1e-14);
        assert_relative_eq!(rule.integrate(f64::exp), 2f64.exp() - 1.0, max_relative = 1e-13);
    }

    #[test]
    fn laguerre_nodes_and_weights() {
        let rule = laguerre_rule();
        assert_eq!(rule.len(), LAGUERRE_ORDER);
        assert_abs_diff_eq!(rule.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-13);
        assert_relative_eq!(rule.nodes[15], 51.701_160_339_543_3, max_relative = 1e-10);
        assert!(rule.nodes.windows(2).all(|w| w[0] < w[1]));

        // ∫ x^5 exp(-x) dx = 5!
        assert_relative_eq!(rule.integrate(|x| x.powi(5)), 120.0, max_relative = 1e-12);
    }

    #[test]
    fn adaptive_finite_interval() {
        let result = quad(|x| x.sin(), 0.0, PI, &QuadOptions::new(1e-12)).unwrap();
        assert!(result.is_converged());
        assert_relative_eq!(result.value, 2.0, max_relative = 1e-12);

        let reversed = quad(|x| x.sin(), PI, 0.0, &QuadOptions::new(1e-12)).unwrap();
        assert_relative_eq!(reversed.value, -2.0, max_relative = 1e-12);

        let empty = quad(|x| x.sin(), 1.0, 1.0, &QuadOptions::default()).unwrap();
        assert_eq!(empty.value, 0.0);
    }

    #[test]
    fn adaptive_peaked_integrand() {
        // ∫_0^1e7 dx / (1 + x)^2 = 1 - 1 / (1 + 1e7)
        let result = quad(|x| (1.0 + x).powi(-2), 0.0, 1e7, &QuadOptions::new(1e-10)).unwrap();
        assert_relative_eq!(result.value, 1.0 - 1.0 / (1.0 + 1e7), max_relative = 1e-10);
        assert!(result.segments > 1);
    }

    #[test]
    fn adaptive_semi_infinite() {
        let result = quad_semi_infinite(|x| (-x).exp(), 0.0, &QuadOptions::new(1e-12)).unwrap();
        assert_relative_eq!(result.value, 1.0, max_relative = 1e-12);

        let result = quad_semi_infinite(|x| x.powi(-2), 1.0, &QuadOptions::new(1e-12)).unwrap();
        assert_relative_eq!(result.value, 1.0, max_relative = 1e-12);
    }

    #[test]
    fn adaptive_reports_failures() {
        let options = QuadOptions {
            rel_tol: 1e-14,
            max_segments: 2,
            degraded_factor: 1.0,
            ..Default::default()
        };
        let err = quad(|x| x.sqrt(), 0.0, 1.0, &options).unwrap_err();
        assert!(matches!(
            err,
            IntegrationError::ToleranceNotReached { lower, upper, .. } if lower == 0.0 && upper == 1.0
        ));

        let err = quad(|x| 1.0 / (x - 0.5), 0.0, 1.0, &QuadOptions::default()).unwrap_err();
        assert!(matches!(err, IntegrationError::NonFiniteIntegrand { .. }));

        let err = quad(|x| x, 0.0, f64::INFINITY, &QuadOptions::default()).unwrap_err();
        assert!(matches!(err, IntegrationError::InvalidInterval { .. }));
    }

    #[test]
    fn adaptive_degraded_success() {
        let options = QuadOptions {
            rel_tol: 1e-14,
            max_segments: 8,
            degraded_factor: 1e12,
            ..Default::default()
        };
        let result = quad(|x| x.sqrt(), 0.0, 1.0, &options).unwrap();
        assert!(matches!(result.status, QuadStatus::Degraded { .. }));
        assert_relative_eq!(result.value, 2.0 / 3.0, max_relative = 1e-3);
    }
}
