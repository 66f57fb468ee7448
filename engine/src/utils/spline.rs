//! Cubic spline through tabulated values on a strictly increasing grid.
//!
//! Outside the knots the spline continues linearly with the boundary value and
//! slope, which is what the neutrino table relies on for large masses.

/// Boundary condition at one end of the spline
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EndCondition {
    /// Zero second derivative
    Natural,
    /// Prescribed first derivative
    Clamped(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivatives at the knots
    m: Vec<f64>,
}

impl CubicSpline {
    /// Builds the spline. Returns `None` if fewer than two knots are given, the
    /// lengths differ, or `x` is not strictly increasing.
    pub fn new(x: Vec<f64>, y: Vec<f64>, start: EndCondition, end: EndCondition) -> Option<Self> {
        let n = x.len();
        if n < 2 || y.len() != n || x.windows(2).any(|w| !(w[1] > w[0])) {
            return None;
        }

        // Tridiagonal system for the second derivatives:
        // sub[i] m[i-1] + diag[i] m[i] + sup[i] m[i+1] = rhs[i]
        let mut sub = vec![0.0; n];
        let mut diag = vec![0.0; n];
        let mut sup = vec![0.0; n];
        let mut rhs = vec![0.0; n];

        for i in 1..n - 1 {
            let h0 = x[i] - x[i - 1];
            let h1 = x[i + 1] - x[i];
            sub[i] = h0 / 6.0;
            diag[i] = (h0 + h1) / 3.0;
            sup[i] = h1 / 6.0;
            rhs[i] = (y[i + 1] - y[i]) / h1 - (y[i] - y[i - 1]) / h0;
        }

        let h_first = x[1] - x[0];
        match start {
            EndCondition::Natural => {
                diag[0] = 1.0;
            }
            EndCondition::Clamped(slope) => {
                diag[0] = h_first / 3.0;
                sup[0] = h_first / 6.0;
                rhs[0] = (y[1] - y[0]) / h_first - slope;
            }
        }

        let h_last = x[n - 1] - x[n - 2];
        match end {
            EndCondition::Natural => {
                diag[n - 1] = 1.0;
            }
            EndCondition::Clamped(slope) => {
                sub[n - 1] = h_last / 6.0;
                diag[n - 1] = h_last / 3.0;
                rhs[n - 1] = slope - (y[n - 1] - y[n - 2]) / h_last;
            }
        }

        let m = solve_tridiagonal(&sub, &diag, &sup, &rhs);
        Some(CubicSpline { x, y, m })
    }

    pub fn knots(&self) -> &[f64] {
        &self.x
    }

    /// Lower and upper knot
    pub fn range(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }

    /// Index of the interval [x[i], x[i+1]] containing `t`, clamped to the grid
    fn interval(&self, t: f64) -> usize {
        let n = self.x.len();
        match self.x.partition_point(|&xi| xi <= t) {
            0 => 0,
            i if i >= n => n - 2,
            i => i - 1,
        }
    }

    pub fn value(&self, t: f64) -> f64 {
        let (lo, hi) = self.range();
        if t < lo {
            return self.y[0] + self.derivative(lo) * (t - lo);
        }
        if t > hi {
            return self.y[self.y.len() - 1] + self.derivative(hi) * (t - hi);
        }

        let i = self.interval(t);
        let h = self.x[i + 1] - self.x[i];
        let a = (self.x[i + 1] - t) / h;
        let b = (t - self.x[i]) / h;
        a * self.y[i]
            + b * self.y[i + 1]
            + ((a * a * a - a) * self.m[i] + (b * b * b - b) * self.m[i + 1]) * h * h / 6.0
    }

    pub fn derivative(&self, t: f64) -> f64 {
        let (lo, hi) = self.range();
        let t = t.clamp(lo, hi);

        let i = self.interval(t);
        let h = self.x[i + 1] - self.x[i];
        let a = (self.x[i + 1] - t) / h;
        let b = (t - self.x[i]) / h;
        (self.y[i + 1] - self.y[i]) / h
            + ((1.0 - 3.0 * a * a) * self.m[i] + (3.0 * b * b - 1.0) * self.m[i + 1]) * h / 6.0
    }
}

/// Thomas algorithm. The systems built above are diagonally dominant.
fn solve_tridiagonal(sub: &[f64], diag: &[f64], sup: &[f64], rhs: &[f64]) -> Vec<f64> {
    let n = diag.len();
    let mut c = vec![0.0; n];
    let mut d = vec![0.0; n];

    c[0] = sup[0] / diag[0];
    d[0] = rhs[0] / diag[0];
    for i in 1..n {
        let denom = diag[i] - sub[i] * c[i - 1];
        c[i] = if i < n - 1 { sup[i] / denom } else { 0.0 };
        d[i] = (rhs[i] - sub[i] * d[i - 1]) / denom;
    }

    let mut out = vec![0.0; n];
    out[n - 1] = d[n - 1];
    for i in (0..n - 1).rev() {
        out[i] = d[i] - c[i] * out[i + 1];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn spline_reproduces_knots() {
        let x: Vec<f64> = (0..10).map(|i| i as f64 * 0.3).collect();
        let y: Vec<f64> = x.iter().map(|x| x.sin()).collect();
        let spline =
            CubicSpline::new(x.clone(), y.clone(), EndCondition::Natural, EndCondition::Natural)
                .unwrap();
        for (xi, yi) in x.iter().zip(&y) {
            assert_abs_diff_eq!(spline.value(*xi), *yi, epsilon = 1e-14);
        }
    }

    #[test]
    fn clamped_spline_is_exact_for_cubics() {
        let f = |x: f64| 1.0 - 2.0 * x + 0.5 * x * x * x;
        let df = |x: f64| -2.0 + 1.5 * x * x;
        let x = vec![0.0, 0.4, 1.1, 1.5, 2.7, 3.0];
        let y = x.iter().map(|&x| f(x)).collect();
        let spline = CubicSpline::new(
            x,
            y,
            EndCondition::Clamped(df(0.0)),
            EndCondition::Clamped(df(3.0)),
        )
        .unwrap();

        for t in [0.05, 0.77, 1.3, 2.2, 2.95] {
            assert_abs_diff_eq!(spline.value(t), f(t), epsilon = 1e-12);
            assert_abs_diff_eq!(spline.derivative(t), df(t), epsilon = 1e-11);
        }
    }

    #[test]
    fn spline_extrapolates_linearly() {
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y = vec![0.0, 1.0, 2.0, 3.0];
        let spline = CubicSpline::new(x, y, EndCondition::Natural, EndCondition::Natural).unwrap();
        assert_abs_diff_eq!(spline.value(5.0), 5.0, epsilon = 1e-14);
        assert_abs_diff_eq!(spline.value(-1.0), -1.0, epsilon = 1e-14);
    }

    #[test]
    fn spline_rejects_bad_grids() {
        let natural = EndCondition::Natural;
        assert!(CubicSpline::new(vec![0.0], vec![1.0], natural, natural).is_none());
        assert!(CubicSpline::new(vec![0.0, 0.0], vec![1.0, 2.0], natural, natural).is_none());
        assert!(CubicSpline::new(vec![0.0, 1.0], vec![1.0], natural, natural).is_none());
    }
}
