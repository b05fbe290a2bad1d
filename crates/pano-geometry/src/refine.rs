use faer::prelude::SpSolverLstsq;
use glam::{DMat3, DVec2, DVec3};
use log::debug;

use crate::{
    homography::{check_weights, MIN_DETERMINANT},
    linalg, HomographyError,
};

/// Number of free parameters, `H[2][2]` is pinned to one.
const NUM_PARAMS: usize = 8;

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e12;

/// Parameters of the geometric refinement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RefineParams {
    /// Maximum number of accepted Levenberg-Marquardt steps.
    pub max_iterations: usize,
    /// Residual length, in pixels, above which the Huber loss turns linear.
    pub huber_delta: f64,
    /// Relative cost decrease under which the refinement stops.
    pub tolerance: f64,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            huber_delta: 1.0,
            tolerance: 1e-10,
        }
    }
}

/// Refine a homography by minimizing the weighted Huber reprojection error.
///
/// Runs Levenberg-Marquardt over the eight entries of `H` with `H[2][2] = 1`,
/// in Hartley normalized coordinates. Each correspondence contributes
/// `weight * huber(|| H * src - dst ||)`; the damped step is solved as an
/// augmented least squares system with a QR decomposition.
///
/// * `h` - The starting homography, mapping `src` onto `dst`.
/// * `src` - The source 2d points, at least four.
/// * `dst` - The destination 2d points, same length as `src`.
/// * `weights` - One non-negative weight per correspondence.
///
/// # Errors
///
/// [`HomographyError::InvalidInput`] and [`HomographyError::InvalidParameter`]
/// for malformed inputs, [`HomographyError::Degenerate`] when the start or the
/// result is singular or maps a point to infinity.
pub fn refine_homography(
    h: &DMat3,
    src: &[DVec2],
    dst: &[DVec2],
    weights: &[f64],
    params: &RefineParams,
) -> Result<DMat3, HomographyError> {
    if src.len() != dst.len() || src.len() < 4 {
        return Err(HomographyError::InvalidInput {
            required: 4,
            src: src.len(),
            dst: dst.len(),
        });
    }
    check_weights(weights, src.len())?;
    if !(params.huber_delta > 0.0) {
        return Err(HomographyError::InvalidParameter(format!(
            "huber_delta must be positive, got {}",
            params.huber_delta
        )));
    }

    let (src_n, t1) = linalg::normalize_points_2d(src).ok_or(HomographyError::Degenerate)?;
    let (dst_n, t2) = linalg::normalize_points_2d(dst).ok_or(HomographyError::Degenerate)?;

    // residuals live in the normalized destination frame
    let delta = params.huber_delta * t2.x_axis.x;

    let hn = t2 * *h * t1.inverse();
    if !(hn.z_axis.z.abs() > 1e-12) {
        return Err(HomographyError::Degenerate);
    }
    let mut x = to_params(&(hn * (1.0 / hn.z_axis.z)));

    let problem = Problem {
        src: &src_n,
        dst: &dst_n,
        weights,
        delta,
    };

    let mut cost = problem.cost(&x).ok_or(HomographyError::Degenerate)?;
    let mut lambda = LAMBDA_INIT;
    let mut iterations = 0;

    'outer: while iterations < params.max_iterations {
        let (jac, res) = problem.linearize(&x).ok_or(HomographyError::Degenerate)?;

        loop {
            let step = damped_step(&jac, &res, lambda);
            let mut candidate = x;
            for (c, s) in candidate.iter_mut().zip(step.iter()) {
                *c += s;
            }

            match problem.cost(&candidate) {
                Some(candidate_cost) if candidate_cost < cost => {
                    let decrease = cost - candidate_cost;
                    x = candidate;
                    cost = candidate_cost;
                    lambda = (lambda * 0.1).max(1e-12);
                    iterations += 1;
                    if decrease <= params.tolerance * cost.max(f64::EPSILON) {
                        break 'outer;
                    }
                    break;
                }
                _ => {
                    lambda *= 10.0;
                    if lambda > LAMBDA_MAX {
                        break 'outer;
                    }
                }
            }
        }
    }

    debug!("refine: {iterations} steps, cost {cost:.3e}, lambda {lambda:.1e}");

    // H = T2^-1 * Hn * T1
    let h = linalg::normalize_homography(t2.inverse() * from_params(&x) * t1);
    if !h.is_finite() || h.determinant().abs() < MIN_DETERMINANT {
        return Err(HomographyError::Degenerate);
    }
    Ok(h)
}

struct Problem<'a> {
    src: &'a [DVec2],
    dst: &'a [DVec2],
    weights: &'a [f64],
    delta: f64,
}

impl Problem<'_> {
    /// Weighted Huber cost, `None` if a point maps to infinity.
    fn cost(&self, x: &[f64; NUM_PARAMS]) -> Option<f64> {
        let h = from_params(x);
        let mut cost = 0.0;
        for ((&p, &q), &w) in self.src.iter().zip(self.dst).zip(self.weights) {
            let r = linalg::project_point(&h, p)?.distance(q);
            cost += w * huber(r, self.delta);
        }
        cost.is_finite().then_some(cost)
    }

    /// Rows of the Jacobian and the residuals, both scaled by the square root
    /// of the robust weight at `x`.
    fn linearize(&self, x: &[f64; NUM_PARAMS]) -> Option<(faer::Mat<f64>, faer::Mat<f64>)> {
        let n = self.src.len();
        let mut jac = faer::Mat::<f64>::zeros(2 * n, NUM_PARAMS);
        let mut res = faer::Mat::<f64>::zeros(2 * n, 1);

        for (i, ((&p, &q), &w)) in self.src.iter().zip(self.dst).zip(self.weights).enumerate() {
            let (projected, rows) = jacobian(x, p)?;
            let r = projected - q;
            let sqrt_w = (w * huber_weight(r.length(), self.delta)).sqrt();

            for k in 0..NUM_PARAMS {
                jac.write(2 * i, k, sqrt_w * rows[0][k]);
                jac.write(2 * i + 1, k, sqrt_w * rows[1][k]);
            }
            res.write(2 * i, 0, sqrt_w * r.x);
            res.write(2 * i + 1, 0, sqrt_w * r.y);
        }

        Some((jac, res))
    }
}

/// Solve `[J; sqrt(lambda * diag(J^T J))] d = [-r; 0]` in the least squares sense.
fn damped_step(jac: &faer::Mat<f64>, res: &faer::Mat<f64>, lambda: f64) -> [f64; NUM_PARAMS] {
    let rows = jac.nrows();
    let mut mat_a = faer::Mat::<f64>::zeros(rows + NUM_PARAMS, NUM_PARAMS);
    let mut mat_b = faer::Mat::<f64>::zeros(rows + NUM_PARAMS, 1);

    for k in 0..NUM_PARAMS {
        let mut diag = 0.0;
        for i in 0..rows {
            let value = jac.read(i, k);
            mat_a.write(i, k, value);
            diag += value * value;
        }
        mat_a.write(rows + k, k, (lambda * diag.max(1e-12)).sqrt());
    }
    for i in 0..rows {
        mat_b.write(i, 0, -res.read(i, 0));
    }

    let solution = mat_a.qr().solve_lstsq(mat_b);
    let step = solution.col(0);

    let mut out = [0.0; NUM_PARAMS];
    for (k, o) in out.iter_mut().enumerate() {
        *o = step[k];
    }
    out
}

/// Projection of `p` and the two Jacobian rows of `(u, v)` with respect to
/// `[h00, h01, h02, h10, h11, h12, h20, h21]`.
fn jacobian(x: &[f64; NUM_PARAMS], p: DVec2) -> Option<(DVec2, [[f64; NUM_PARAMS]; 2])> {
    let w = x[6] * p.x + x[7] * p.y + 1.0;
    if w.abs() < 1e-12 {
        return None;
    }
    let inv_w = 1.0 / w;
    let u = (x[0] * p.x + x[1] * p.y + x[2]) * inv_w;
    let v = (x[3] * p.x + x[4] * p.y + x[5]) * inv_w;

    let (px, py) = (p.x * inv_w, p.y * inv_w);
    let rows = [
        [px, py, inv_w, 0.0, 0.0, 0.0, -u * px, -u * py],
        [0.0, 0.0, 0.0, px, py, inv_w, -v * px, -v * py],
    ];
    Some((DVec2::new(u, v), rows))
}

fn huber(r: f64, delta: f64) -> f64 {
    if r <= delta {
        0.5 * r * r
    } else {
        delta * (r - 0.5 * delta)
    }
}

/// IRLS weight of the Huber loss, `rho'(r) / r`.
fn huber_weight(r: f64, delta: f64) -> f64 {
    if r <= delta {
        1.0
    } else {
        delta / r
    }
}

fn to_params(h: &DMat3) -> [f64; NUM_PARAMS] {
    let m = linalg::to_row_major(h);
    [m[0], m[1], m[2], m[3], m[4], m[5], m[6], m[7]]
}

fn from_params(x: &[f64; NUM_PARAMS]) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(x[0], x[3], x[6]),
        DVec3::new(x[1], x[4], x[7]),
        DVec3::new(x[2], x[5], 1.0),
    )
}
