use pano_image::{Image, ImageError};
use rayon::prelude::*;

/// Create a gaussian blur kernel.
///
/// A `kernel_size` of zero derives the size from sigma (`2 * ceil(3 * sigma) + 1`).
///
/// # Returns
///
/// A normalized vector of the kernel.
pub fn gaussian_kernel_1d(kernel_size: usize, sigma: f32) -> Vec<f32> {
    let kernel_size = if kernel_size == 0 {
        2 * (3.0 * sigma).ceil().max(1.0) as usize + 1
    } else {
        kernel_size
    };

    let mean = (kernel_size - 1) as f32 / 2.0;
    let sigma_sq = sigma * sigma;

    let mut kernel: Vec<f32> = (0..kernel_size)
        .map(|i| {
            let x = i as f32 - mean;
            (-(x * x) / (2.0 * sigma_sq)).exp()
        })
        .collect();

    let norm = kernel.iter().sum::<f32>();
    kernel.iter_mut().for_each(|k| *k /= norm);
    kernel
}

/// Apply a separable filter to an image with replicated borders.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `dst` - The destination image with shape (H, W, C).
/// * `kernel_x` - The horizontal kernel.
/// * `kernel_y` - The vertical kernel.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn separable_filter<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    kernel_x: &[f32],
    kernel_y: &[f32],
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let (rows, cols) = (src.rows(), src.cols());
    if rows == 0 || cols == 0 {
        return Ok(());
    }

    let half_x = (kernel_x.len() / 2) as isize;
    let half_y = (kernel_y.len() / 2) as isize;
    let src_data = src.as_slice();

    // horizontal pass
    let mut tmp = vec![0.0f32; src_data.len()];
    tmp.par_chunks_exact_mut(cols * C)
        .enumerate()
        .for_each(|(r, row)| {
            let src_row = &src_data[r * cols * C..(r + 1) * cols * C];
            for c in 0..cols {
                for ch in 0..C {
                    let mut acc = 0.0;
                    for (k, &w) in kernel_x.iter().enumerate() {
                        let cc = (c as isize + k as isize - half_x).clamp(0, cols as isize - 1);
                        acc += w * src_row[cc as usize * C + ch];
                    }
                    row[c * C + ch] = acc;
                }
            }
        });

    // vertical pass
    dst.as_slice_mut()
        .par_chunks_exact_mut(cols * C)
        .enumerate()
        .for_each(|(r, row)| {
            for (i, out) in row.iter_mut().enumerate() {
                let mut acc = 0.0;
                for (k, &w) in kernel_y.iter().enumerate() {
                    let rr = (r as isize + k as isize - half_y).clamp(0, rows as isize - 1);
                    acc += w * tmp[rr as usize * cols * C + i];
                }
                *out = acc;
            }
        });

    Ok(())
}

/// Blur an image using a gaussian blur filter
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `dst` - The destination image with shape (H, W, C).
/// * `kernel_size` - The size of the kernel (kernel_x, kernel_y), zero derives it from sigma.
/// * `sigma` - The sigma of the gaussian kernel.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn gaussian_blur<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    kernel_size: (usize, usize),
    sigma: (f32, f32),
) -> Result<(), ImageError> {
    let kernel_x = gaussian_kernel_1d(kernel_size.0, sigma.0);
    let kernel_y = gaussian_kernel_1d(kernel_size.1, sigma.1);
    separable_filter(src, dst, &kernel_x, &kernel_y)
}
