use glam::{DMat3, DVec2, DVec3};

/// Similarity normalization of a point set.
///
/// Moves the centroid to the origin and scales the mean distance to `sqrt(2)`.
/// Returns the normalized points and the transform that produced them, or
/// `None` when all points coincide.
pub fn normalize_points_2d(points: &[DVec2]) -> Option<(Vec<DVec2>, DMat3)> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as f64;
    let mean = points.iter().copied().sum::<DVec2>() / n;
    let mean_dist = points.iter().map(|p| p.distance(mean)).sum::<f64>() / n;

    if !(mean_dist > f64::EPSILON) || !mean_dist.is_finite() {
        return None;
    }

    let scale = std::f64::consts::SQRT_2 / mean_dist;
    let normalized = points.iter().map(|&p| (p - mean) * scale).collect();

    // T = [[s, 0, -s*mx], [0, s, -s*my], [0, 0, 1]]
    let t = DMat3::from_cols(
        DVec3::new(scale, 0.0, 0.0),
        DVec3::new(0.0, scale, 0.0),
        DVec3::new(-scale * mean.x, -scale * mean.y, 1.0),
    );

    Some((normalized, t))
}

/// Scale a homography so that its bottom-right entry is one.
///
/// Falls back to unit Frobenius norm when that entry vanishes.
pub fn normalize_homography(h: DMat3) -> DMat3 {
    let h22 = h.z_axis.z;
    if h22.abs() > 1e-12 {
        return h * (1.0 / h22);
    }
    let norm = h
        .to_cols_array()
        .iter()
        .map(|v| v * v)
        .sum::<f64>()
        .sqrt();
    if norm > 0.0 {
        h * (1.0 / norm)
    } else {
        h
    }
}

/// Map a point through a homography.
///
/// Returns `None` when the point maps to infinity.
#[inline]
pub fn project_point(h: &DMat3, p: DVec2) -> Option<DVec2> {
    let q = *h * p.extend(1.0);
    if q.z.abs() < 1e-12 {
        return None;
    }
    Some(DVec2::new(q.x / q.z, q.y / q.z))
}

/// Row-major array view of a matrix, the layout used by the image warpers.
pub fn to_row_major(h: &DMat3) -> [f64; 9] {
    h.transpose().to_cols_array()
}

/// True when three points are close to lying on a line.
///
/// Compares the sine of the angle at `a` against `tolerance`; coincident
/// points count as collinear.
pub fn is_collinear(a: DVec2, b: DVec2, c: DVec2, tolerance: f64) -> bool {
    let ab = b - a;
    let ac = c - a;
    let lengths = ab.length() * ac.length();
    if lengths < 1e-12 {
        return true;
    }
    ab.perp_dot(ac).abs() <= tolerance * lengths
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normalize_points_2d() {
        let points = [
            DVec2::new(10.0, 10.0),
            DVec2::new(20.0, 10.0),
            DVec2::new(20.0, 20.0),
            DVec2::new(10.0, 20.0),
        ];
        let (normalized, t) = normalize_points_2d(&points).unwrap();

        let mean = normalized.iter().copied().sum::<DVec2>() / 4.0;
        assert_relative_eq!(mean.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(mean.y, 0.0, epsilon = 1e-12);

        let mean_dist = normalized.iter().map(|p| p.length()).sum::<f64>() / 4.0;
        assert_relative_eq!(mean_dist, std::f64::consts::SQRT_2, epsilon = 1e-12);

        let mapped = project_point(&t, points[2]).unwrap();
        assert_relative_eq!(mapped.x, normalized[2].x, epsilon = 1e-12);
        assert_relative_eq!(mapped.y, normalized[2].y, epsilon = 1e-12);
    }

    #[test]
    fn test_normalize_coincident_points() {
        let points = [DVec2::new(1.0, 1.0); 4];
        assert!(normalize_points_2d(&points).is_none());
    }

    #[test]
    fn test_row_major_layout() {
        let h = DMat3::from_cols(
            DVec3::new(1.0, 4.0, 7.0),
            DVec3::new(2.0, 5.0, 8.0),
            DVec3::new(3.0, 6.0, 9.0),
        );
        assert_eq!(
            to_row_major(&h),
            [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]
        );
        let n = normalize_homography(h);
        assert_relative_eq!(n.z_axis.z, 1.0);
    }

    #[test]
    fn test_collinear() {
        let a = DVec2::new(0.0, 0.0);
        let b = DVec2::new(10.0, 0.0);
        assert!(is_collinear(a, b, DVec2::new(20.0, 1e-6), 1e-3));
        assert!(!is_collinear(a, b, DVec2::new(5.0, 5.0), 1e-3));
        assert!(is_collinear(a, a, b, 1e-3));
    }
}
