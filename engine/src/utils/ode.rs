//! Dormand–Prince 5(4) integrator with dense output.
//!
//! The fifth-order solution is propagated, the embedded fourth-order one is
//! only used for the error estimate. The last stage is evaluated at the new
//! point, so its derivative is reused as the first stage of the next step
//! (FSAL). Between accepted steps the solution is a cubic Hermite interpolant
//! built from the states and derivatives at both ends.

/// System of ordinary differential equations: dy/dt = f(t, y)
pub trait OdeSystem<const N: usize> {
    /// Evaluate the right-hand side of the ODE system
    fn rhs(&self, t: f64, y: &[f64; N]) -> [f64; N];
}

const STAGES: usize = 7;

const C: [f64; STAGES] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];

const A: [[f64; 6]; STAGES] = [
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0],
    [
        19372.0 / 6561.0,
        -25360.0 / 2187.0,
        64448.0 / 6561.0,
        -212.0 / 729.0,
        0.0,
        0.0,
    ],
    [
        9017.0 / 3168.0,
        -355.0 / 33.0,
        46732.0 / 5247.0,
        49.0 / 176.0,
        -5103.0 / 18656.0,
        0.0,
    ],
    [
        35.0 / 384.0,
        0.0,
        500.0 / 1113.0,
        125.0 / 192.0,
        -2187.0 / 6784.0,
        11.0 / 84.0,
    ],
];

/// Difference between the fifth-order weights (the last row of `A`) and the
/// fourth-order ones
const B_ERR: [f64; STAGES] = [
    71.0 / 57600.0,
    0.0,
    -71.0 / 16695.0,
    71.0 / 1920.0,
    -17253.0 / 339200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];

/// Error is computed as: |y5 - y4| / (atol + rtol * max(|y|, |y_new|))
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    pub atol: f64,
    pub rtol: f64,
}

impl Tolerances {
    pub fn new(atol: f64, rtol: f64) -> Self {
        Tolerances { atol, rtol }
    }
}

/// Integration statistics for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    pub fn_evals: u64,
    pub accepted_steps: u64,
    pub rejected_steps: u64,
}

/// Why an integration stopped early
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OdeFailure {
    StepSizeTooSmall { t: f64, h: f64 },
    MaxStepsExceeded { t: f64 },
    NonFiniteState { t: f64 },
}

/// One accepted point of a trajectory
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Knot<const N: usize> {
    pub t: f64,
    pub y: [f64; N],
    pub dydt: [f64; N],
}

/// Continuous solution over the integrated span
#[derive(Debug, Clone, PartialEq)]
pub struct DenseOutput<const N: usize> {
    knots: Vec<Knot<N>>,
    pub stats: Stats,
}

impl<const N: usize> DenseOutput<N> {
    pub fn knots(&self) -> &[Knot<N>] {
        &self.knots
    }

    /// (t0, tf) of the integration
    pub fn span(&self) -> (f64, f64) {
        (self.knots[0].t, self.knots[self.knots.len() - 1].t)
    }

    pub fn contains(&self, t: f64) -> bool {
        let (t0, tf) = self.span();
        t >= t0 && t <= tf
    }

    /// Interpolated state at `t`, or `None` outside the span
    pub fn eval(&self, t: f64) -> Option<[f64; N]> {
        if !self.contains(t) {
            return None;
        }
        if self.knots.len() == 1 {
            return Some(self.knots[0].y);
        }
        let i = self
            .knots
            .partition_point(|k| k.t <= t)
            .clamp(1, self.knots.len() - 1);
        Some(hermite(&self.knots[i - 1], &self.knots[i], t))
    }
}

/// Cubic Hermite interpolation between two knots
fn hermite<const N: usize>(left: &Knot<N>, right: &Knot<N>, t: f64) -> [f64; N] {
    let h = right.t - left.t;
    let s = (t - left.t) / h;
    let s2 = s * s;
    let s3 = s2 * s;
    let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
    let h10 = s3 - 2.0 * s2 + s;
    let h01 = -2.0 * s3 + 3.0 * s2;
    let h11 = s3 - s2;

    let mut y = [0.0; N];
    for n in 0..N {
        y[n] = h00 * left.y[n] + h10 * h * left.dydt[n] + h01 * right.y[n] + h11 * h * right.dydt[n];
    }
    y
}

/// Dormand–Prince 5(4) integrator
#[derive(Clone)]
pub struct DormandPrince<const N: usize> {
    tol: Tolerances,
    /// Safety factor of the step size controller
    pub safety: f64,
    /// Maximum growth factor per step
    pub max_factor: f64,
    /// Minimum reduction factor per step
    pub min_factor: f64,
    /// Minimum step size
    pub h_min: f64,
    /// Maximum number of attempted steps
    pub max_steps: u64,
    /// Stage evaluations (pre-allocated workspace)
    k: [[f64; N]; STAGES],
    pub stats: Stats,
}

impl<const N: usize> DormandPrince<N> {
    pub fn new(tol: Tolerances) -> Self {
        DormandPrince {
            tol,
            safety: 0.9,
            max_factor: 5.0,
            min_factor: 0.2,
            h_min: 1e-12,
            max_steps: 100_000,
            k: [[0.0; N]; STAGES],
            stats: Stats::default(),
        }
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Integrates from `t0` to `tf > t0`, keeping every accepted step for dense output.
    pub fn integrate<S: OdeSystem<N>>(
        &mut self,
        sys: &S,
        t0: f64,
        y0: [f64; N],
        tf: f64,
    ) -> Result<DenseOutput<N>, OdeFailure> {
        let mut knots = Vec::new();
        self.run(sys, t0, y0, tf, |knot| knots.push(*knot))?;
        Ok(DenseOutput {
            knots,
            stats: self.stats,
        })
    }

    /// Integrates from `t0` to `tf > t0` and returns the state at each of the
    /// ascending `times`, without keeping the whole trajectory.
    pub fn integrate_at<S: OdeSystem<N>>(
        &mut self,
        sys: &S,
        t0: f64,
        y0: [f64; N],
        tf: f64,
        times: &[f64],
    ) -> Result<Vec<[f64; N]>, OdeFailure> {
        let mut out = Vec::with_capacity(times.len());
        let mut previous: Option<Knot<N>> = None;
        let mut next = 0;

        self.run(sys, t0, y0, tf, |knot| {
            while next < times.len() && times[next] <= knot.t {
                let y = match &previous {
                    Some(left) if times[next] > left.t => hermite(left, knot, times[next]),
                    Some(left) => left.y,
                    None => knot.y,
                };
                out.push(y);
                next += 1;
            }
            previous = Some(*knot);
        })?;

        Ok(out)
    }

    fn run<S, F>(
        &mut self,
        sys: &S,
        t0: f64,
        y0: [f64; N],
        tf: f64,
        mut on_knot: F,
    ) -> Result<(), OdeFailure>
    where
        S: OdeSystem<N>,
        F: FnMut(&Knot<N>),
    {
        self.stats = Stats::default();

        let mut t = t0;
        let mut y = y0;
        let mut dydt = sys.rhs(t, &y);
        self.stats.fn_evals += 1;
        if !finite(&y) || !finite(&dydt) {
            return Err(OdeFailure::NonFiniteState { t });
        }
        on_knot(&Knot { t, y, dydt });

        let mut h = self.initial_step(sys, t0, &y, &dydt, tf);
        let mut steps = 0u64;

        while t < tf {
            if steps >= self.max_steps {
                return Err(OdeFailure::MaxStepsExceeded { t });
            }
            steps += 1;

            // Don't overshoot the endpoint
            let last = t + h >= tf;
            if last {
                h = tf - t;
            }

            let (y_new, dydt_new, error) = self.step(sys, t, &y, &dydt, h);

            if !(error.is_finite() && finite(&y_new)) {
                // Treat as a rejection; only give up once the step cannot shrink further
                self.stats.rejected_steps += 1;
                if h <= self.h_min {
                    return Err(OdeFailure::NonFiniteState { t: t + h });
                }
                h = (h * self.min_factor).max(self.h_min);
                continue;
            }

            let factor = if error == 0.0 {
                self.max_factor
            } else {
                (self.safety * error.powf(-0.2)).clamp(self.min_factor, self.max_factor)
            };

            if error <= 1.0 {
                t = if last { tf } else { t + h };
                y = y_new;
                dydt = dydt_new;
                self.stats.accepted_steps += 1;
                on_knot(&Knot { t, y, dydt });
                log::trace!("accepted step to t = {t:.6} (h = {h:.3e}, err = {error:.3e})");
                h *= factor;
            } else {
                self.stats.rejected_steps += 1;
                if h <= self.h_min {
                    return Err(OdeFailure::StepSizeTooSmall { t, h });
                }
                h = (h * factor).max(self.h_min);
            }
        }

        Ok(())
    }

    /// Starting step from the size of the state and its derivative (Hairer, Nørsett & Wanner).
    fn initial_step<S: OdeSystem<N>>(
        &mut self,
        sys: &S,
        t0: f64,
        y0: &[f64; N],
        f0: &[f64; N],
        tf: f64,
    ) -> f64 {
        let span = tf - t0;
        let tol = self.tol;
        let scale = |v: f64| tol.atol + tol.rtol * v.abs();

        let d0 = rms((0..N).map(|n| y0[n] / scale(y0[n])));
        let d1 = rms((0..N).map(|n| f0[n] / scale(y0[n])));
        let h0 = if d0 < 1e-5 || d1 < 1e-5 {
            1e-6
        } else {
            0.01 * d0 / d1
        };
        let h0 = h0.min(span);

        let mut y1 = [0.0; N];
        for n in 0..N {
            y1[n] = y0[n] + h0 * f0[n];
        }
        let f1 = sys.rhs(t0 + h0, &y1);
        self.stats.fn_evals += 1;

        let d2 = rms((0..N).map(|n| (f1[n] - f0[n]) / scale(y0[n]))) / h0;
        let h1 = if d1.max(d2) <= 1e-15 {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / d1.max(d2)).powf(0.2)
        };

        (100.0 * h0).min(h1).min(span).max(self.h_min)
    }

    /// Single trial step. Returns the fifth-order state, its derivative and the
    /// normalized error estimate (accept when ≤ 1).
    #[allow(clippy::needless_range_loop)]
    fn step<S: OdeSystem<N>>(
        &mut self,
        sys: &S,
        t: f64,
        y: &[f64; N],
        dydt: &[f64; N],
        h: f64,
    ) -> ([f64; N], [f64; N], f64) {
        self.k[0] = *dydt;

        let mut y_temp = [0.0; N];
        for i in 1..STAGES {
            for n in 0..N {
                let mut sum = 0.0;
                for j in 0..i {
                    sum += A[i][j] * self.k[j][n];
                }
                y_temp[n] = y[n] + h * sum;
            }
            self.k[i] = sys.rhs(t + C[i] * h, &y_temp);
        }
        self.stats.fn_evals += (STAGES - 1) as u64;

        // The last stage is evaluated at the fifth-order solution itself
        let y_new = y_temp;
        let dydt_new = self.k[STAGES - 1];

        let mut sq_sum = 0.0;
        for n in 0..N {
            let mut err_n = 0.0;
            for i in 0..STAGES {
                err_n += B_ERR[i] * self.k[i][n];
            }
            err_n *= h;

            let scale = self.tol.atol + self.tol.rtol * y[n].abs().max(y_new[n].abs());
            sq_sum += (err_n / scale).powi(2);
        }

        (y_new, dydt_new, (sq_sum / N as f64).sqrt())
    }
}

fn finite<const N: usize>(v: &[f64; N]) -> bool {
    v.iter().all(|x| x.is_finite())
}

fn rms<I: Iterator<Item = f64>>(values: I) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v * v, c + 1));
    if count == 0 {
        0.0
    } else {
        (sum / count as f64).sqrt()
    }
}
