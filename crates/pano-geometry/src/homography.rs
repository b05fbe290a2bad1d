use glam::{DMat3, DVec2, DVec3};

use crate::{linalg, HomographyError};

/// Sine of the smallest angle under which three sample points still count as a triangle.
const COLLINEAR_TOLERANCE: f64 = 1e-2;

/// Homographies with a smaller determinant are treated as singular.
pub(crate) const MIN_DETERMINANT: f64 = 1e-8;

/// Estimate the homography mapping `src` onto `dst` with the normalized DLT.
///
/// Both point sets are similarity-normalized, the `2N x 9` DLT system is
/// solved in the least-squares sense through the SVD of its normal matrix and
/// the result is denormalized and scaled so that `H[2][2] = 1`.
///
/// * `src` - The source 2d points, at least four.
/// * `dst` - The destination 2d points, same length as `src`.
///
/// # Errors
///
/// Returns [`HomographyError::InvalidInput`] for fewer than four or unequal
/// point sets and [`HomographyError::Degenerate`] when the points do not
/// determine a non-singular homography.
pub fn homography_dlt(src: &[DVec2], dst: &[DVec2]) -> Result<DMat3, HomographyError> {
    homography_dlt_weighted(src, dst, &vec![1.0; src.len()])
}

/// Normalized DLT where every correspondence contributes its two rows scaled by a weight.
///
/// * `weights` - One non-negative weight per correspondence.
pub fn homography_dlt_weighted(
    src: &[DVec2],
    dst: &[DVec2],
    weights: &[f64],
) -> Result<DMat3, HomographyError> {
    if src.len() != dst.len() || src.len() < 4 {
        return Err(HomographyError::InvalidInput {
            required: 4,
            src: src.len(),
            dst: dst.len(),
        });
    }
    check_weights(weights, src.len())?;

    let (src_n, t1) = linalg::normalize_points_2d(src).ok_or(HomographyError::Degenerate)?;
    let (dst_n, t2) = linalg::normalize_points_2d(dst).ok_or(HomographyError::Degenerate)?;

    // accumulate A^T A over the two DLT rows of every correspondence
    let mut ata = faer::Mat::<f64>::zeros(9, 9);
    for ((p, q), &w) in src_n.iter().zip(dst_n.iter()).zip(weights.iter()) {
        let (x, y) = (p.x, p.y);
        let (u, v) = (q.x, q.y);
        let rows = [
            [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, -u],
            [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y, -v],
        ];
        for row in rows.iter() {
            for i in 0..9 {
                if row[i] == 0.0 {
                    continue;
                }
                for j in 0..9 {
                    let value = ata.read(i, j) + w * row[i] * row[j];
                    ata.write(i, j, value);
                }
            }
        }
    }

    // the solution is the right singular vector of the smallest singular value
    let svd = ata.svd();
    let h = svd.v().col(8);

    let h_norm = DMat3::from_cols(
        DVec3::new(h[0], h[3], h[6]),
        DVec3::new(h[1], h[4], h[7]),
        DVec3::new(h[2], h[5], h[8]),
    );

    // H = T2^-1 * Hn * T1
    let h = t2.inverse() * h_norm * t1;
    let h = linalg::normalize_homography(h);

    if !h.is_finite() || h.determinant().abs() < MIN_DETERMINANT {
        return Err(HomographyError::Degenerate);
    }

    Ok(h)
}

pub(crate) fn check_weights(weights: &[f64], expected: usize) -> Result<(), HomographyError> {
    if weights.len() != expected {
        return Err(HomographyError::InvalidParameter(format!(
            "expected {expected} weights, got {}",
            weights.len()
        )));
    }
    if let Some(w) = weights.iter().find(|w| !(**w >= 0.0) || !w.is_finite()) {
        return Err(HomographyError::InvalidParameter(format!(
            "weights must be finite and non-negative, got {w}"
        )));
    }
    Ok(())
}

/// Compute the homography from four 2d point correspondences.
///
/// Rejects samples where any three points are near-collinear on either side.
pub fn homography_4pt2d(src: &[DVec2; 4], dst: &[DVec2; 4]) -> Result<DMat3, HomographyError> {
    if is_degenerate_sample(src) || is_degenerate_sample(dst) {
        return Err(HomographyError::Degenerate);
    }
    homography_dlt(src, dst)
}

/// True when any three of the four points are near-collinear.
pub fn is_degenerate_sample(points: &[DVec2; 4]) -> bool {
    const TRIPLETS: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
    TRIPLETS.iter().any(|&[a, b, c]| {
        linalg::is_collinear(points[a], points[b], points[c], COLLINEAR_TOLERANCE)
    })
}

/// Squared reprojection error `|| H * src - dst ||^2`.
///
/// Points mapped to infinity have an infinite error.
#[inline]
pub fn homography_reproj_error(h: &DMat3, src: DVec2, dst: DVec2) -> f64 {
    match linalg::project_point(h, src) {
        Some(p) => p.distance_squared(dst),
        None => f64::INFINITY,
    }
}
