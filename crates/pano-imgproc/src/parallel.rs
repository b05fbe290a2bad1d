use rayon::prelude::*;

use pano_image::Image;

/// Apply a function to each pixel in the image in parallel.
///
/// `src` and `dst` must have the same size; rows are processed in parallel.
pub fn par_iter_rows<T1, const C1: usize, T2, const C2: usize>(
    src: &Image<T1, C1>,
    dst: &mut Image<T2, C2>,
    f: impl Fn(&[T1], &mut [T2]) + Send + Sync,
) where
    T1: Clone + Send + Sync,
    T2: Clone + Send + Sync,
{
    let cols = src.cols();
    if cols == 0 {
        return;
    }
    src.as_slice()
        .par_chunks_exact(C1 * cols)
        .zip(dst.as_slice_mut().par_chunks_exact_mut(C2 * cols))
        .for_each(|(src_chunk, dst_chunk)| {
            src_chunk
                .chunks_exact(C1)
                .zip(dst_chunk.chunks_exact_mut(C2))
                .for_each(|(src_pixel, dst_pixel)| {
                    f(src_pixel, dst_pixel);
                });
        });
}

/// Apply a function to each destination pixel for grid sampling in parallel.
///
/// The closure receives the destination `(x, y)` coordinate and the mutable
/// pixel channels; it is responsible for computing the source location.
pub fn par_iter_rows_resample<T, const C: usize>(
    dst: &mut Image<T, C>,
    f: impl Fn(usize, usize, &mut [T]) + Send + Sync,
) where
    T: Send + Sync,
{
    let cols = dst.cols();
    if cols == 0 {
        return;
    }
    dst.as_slice_mut()
        .par_chunks_exact_mut(C * cols)
        .enumerate()
        .for_each(|(y, dst_chunk)| {
            dst_chunk
                .chunks_exact_mut(C)
                .enumerate()
                .for_each(|(x, dst_pixel)| f(x, y, dst_pixel));
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pano_image::ImageError;

    #[test]
    fn test_par_iter_rows() -> Result<(), ImageError> {
        let src = Image::<u8, 2>::new([2, 2].into(), vec![1, 2, 3, 4, 5, 6, 7, 8])?;
        let mut dst = Image::<u8, 1>::from_size_val(src.size(), 0)?;
        par_iter_rows(&src, &mut dst, |s, d| d[0] = s[0] + s[1]);
        assert_eq!(dst.as_slice(), &[3, 7, 11, 15]);
        Ok(())
    }

    #[test]
    fn test_par_iter_rows_resample_coordinates() -> Result<(), ImageError> {
        let mut dst = Image::<usize, 2>::from_size_val([3, 2].into(), 0)?;
        par_iter_rows_resample(&mut dst, |x, y, px| {
            px[0] = x;
            px[1] = y;
        });
        assert_eq!(dst.pixel(2, 1)?, &[2, 1]);
        assert_eq!(dst.pixel(0, 1)?, &[0, 1]);
        Ok(())
    }
}
