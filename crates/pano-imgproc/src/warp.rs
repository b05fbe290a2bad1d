use crate::{
    interpolation::{interpolate_pixel, InterpolationMode},
    parallel,
};

use pano_image::{Image, ImageDtype, ImageError};

#[rustfmt::skip]
fn determinant3x3(m: &[f64; 9]) -> f64 {
    m[0] * (m[4] * m[8] - m[5] * m[7]) -
    m[1] * (m[3] * m[8] - m[5] * m[6]) +
    m[2] * (m[3] * m[7] - m[4] * m[6])
}

#[rustfmt::skip]
fn adjugate3x3(m: &[f64; 9]) -> [f64; 9] {
    [
        m[4] * m[8] - m[5] * m[7],  // [0, 0]
        m[2] * m[7] - m[1] * m[8],  // [0, 1]
        m[1] * m[5] - m[2] * m[4],  // [0, 2]
        m[5] * m[6] - m[3] * m[8],  // [1, 0]
        m[0] * m[8] - m[2] * m[6],  // [1, 1]
        m[2] * m[3] - m[0] * m[5],  // [1, 2]
        m[3] * m[7] - m[4] * m[6],  // [2, 0]
        m[1] * m[6] - m[0] * m[7],  // [2, 1]
        m[0] * m[4] - m[1] * m[3],  // [2, 2]
    ]
}

/// Invert a row-major 3x3 perspective matrix.
///
/// # Errors
///
/// Returns [`ImageError::CannotComputeDeterminant`] for singular or non-finite matrices.
pub fn inverse_perspective_matrix(m: &[f64; 9]) -> Result<[f64; 9], ImageError> {
    let det = determinant3x3(m);

    if det == 0.0 || !det.is_finite() {
        return Err(ImageError::CannotComputeDeterminant);
    }

    let adj = adjugate3x3(m);
    let inv_det = 1.0 / det;

    let mut inv_m = [0.0; 9];
    inv_m
        .iter_mut()
        .zip(adj.iter())
        .for_each(|(out, a)| *out = a * inv_det);

    Ok(inv_m)
}

/// Map a point through a row-major 3x3 perspective matrix.
///
/// Returns the dehomogenized point together with the homogeneous scale `w`.
pub fn transform_point(x: f64, y: f64, m: &[f64; 9]) -> (f64, f64, f64) {
    let w = m[6] * x + m[7] * y + m[8];
    let xt = (m[0] * x + m[1] * y + m[2]) / w;
    let yt = (m[3] * x + m[4] * y + m[5]) / w;
    (xt, yt, w)
}

/// Applies a perspective transformation to an image.
///
/// Every destination pixel is mapped back through the inverse of `m`; pixels
/// whose source location falls outside `src` are left untouched, so the caller
/// decides the background value by initializing `dst`.
///
/// * `src` - The input image with shape (height, width, channels).
/// * `dst` - The output image with shape (height, width, channels).
/// * `m` - The 3x3 perspective transformation matrix src -> dst, row-major.
/// * `interpolation` - The interpolation mode to use.
///
/// # Example
///
/// ```
/// use pano_image::{Image, ImageSize};
/// use pano_imgproc::interpolation::InterpolationMode;
/// use pano_imgproc::warp::warp_perspective;
///
/// let src = Image::<u8, 3>::from_size_val([4, 5].into(), 7).unwrap();
///
/// let m = [1.0, 0.0, 2.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0];
///
/// let mut dst = Image::<u8, 3>::from_size_val([8, 8].into(), 0).unwrap();
///
/// warp_perspective(&src, &mut dst, &m, InterpolationMode::Bilinear).unwrap();
///
/// assert_eq!(dst.pixel(0, 0).unwrap(), &[0, 0, 0]);
/// assert_eq!(dst.pixel(3, 2).unwrap(), &[7, 7, 7]);
/// ```
pub fn warp_perspective<T: ImageDtype, const C: usize>(
    src: &Image<T, C>,
    dst: &mut Image<T, C>,
    m: &[f64; 9],
    interpolation: InterpolationMode,
) -> Result<(), ImageError> {
    if src.size().is_empty() {
        return Err(ImageError::EmptyImage(src.width(), src.height()));
    }

    let inv_m = inverse_perspective_matrix(m)?;
    let (src_cols, src_rows) = (src.cols() as f64, src.rows() as f64);

    parallel::par_iter_rows_resample(dst, |x, y, dst_pixel| {
        let (u, v, w) = transform_point(x as f64, y as f64, &inv_m);
        if w.abs() > f64::EPSILON && u >= 0.0 && u < src_cols && v >= 0.0 && v < src_rows {
            dst_pixel.copy_from_slice(&interpolate_pixel(
                src,
                u as f32,
                v as f32,
                interpolation,
            ));
        }
    });

    Ok(())
}
