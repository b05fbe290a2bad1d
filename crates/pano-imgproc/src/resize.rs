use crate::interpolation::{interpolate_pixel, InterpolationMode};
use crate::parallel;
use pano_image::{Image, ImageDtype, ImageError};

/// Resize an image to the size of the destination image.
///
/// Destination pixel centers are mapped back onto the source grid
/// (`u = (x + 0.5) * sx - 0.5`), which keeps the image aligned across
/// pyramid levels.
///
/// # Arguments
///
/// * `src` - The input image container.
/// * `dst` - The output image container, its size defines the target size.
/// * `interpolation` - The interpolation mode.
///
/// # Example
///
/// ```
/// use pano_image::{Image, ImageSize};
/// use pano_imgproc::interpolation::InterpolationMode;
/// use pano_imgproc::resize::resize_native;
///
/// let image = Image::<f32, 3>::new(
///     ImageSize {
///         width: 4,
///         height: 5,
///     },
///     vec![0f32; 4 * 5 * 3],
/// )
/// .unwrap();
///
/// let mut resized = Image::<f32, 3>::from_size_val([2, 3].into(), 0.0).unwrap();
///
/// resize_native(&image, &mut resized, InterpolationMode::Bilinear).unwrap();
///
/// assert_eq!(resized.size().width, 2);
/// assert_eq!(resized.size().height, 3);
/// ```
pub fn resize_native<T: ImageDtype, const C: usize>(
    src: &Image<T, C>,
    dst: &mut Image<T, C>,
    interpolation: InterpolationMode,
) -> Result<(), ImageError> {
    if src.size().is_empty() {
        return Err(ImageError::EmptyImage(src.width(), src.height()));
    }

    if src.size() == dst.size() {
        dst.as_slice_mut().copy_from_slice(src.as_slice());
        return Ok(());
    }

    let scale_x = src.width() as f32 / dst.width().max(1) as f32;
    let scale_y = src.height() as f32 / dst.height().max(1) as f32;

    parallel::par_iter_rows_resample(dst, |x, y, dst_pixel| {
        let u = (x as f32 + 0.5) * scale_x - 0.5;
        let v = (y as f32 + 0.5) * scale_y - 0.5;
        dst_pixel.copy_from_slice(&interpolate_pixel(src, u, v, interpolation));
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn resize_constant() -> Result<(), ImageError> {
        let image = Image::<f32, 1>::from_size_val([10, 8].into(), 0.25)?;
        let mut dst = Image::<f32, 1>::from_size_val([7, 5].into(), 0.0)?;
        resize_native(&image, &mut dst, InterpolationMode::Bilinear)?;
        dst.as_slice()
            .iter()
            .for_each(|&v| assert_relative_eq!(v, 0.25, epsilon = 1e-6));
        Ok(())
    }

    #[test]
    fn resize_halves_gradient() -> Result<(), ImageError> {
        let image = Image::<f32, 1>::new([4, 1].into(), vec![0.0, 1.0, 2.0, 3.0])?;
        let mut dst = Image::<f32, 1>::from_size_val([2, 1].into(), 0.0)?;
        resize_native(&image, &mut dst, InterpolationMode::Bilinear)?;
        assert_relative_eq!(dst.as_slice()[0], 0.5, epsilon = 1e-6);
        assert_relative_eq!(dst.as_slice()[1], 2.5, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn resize_empty_source() -> Result<(), ImageError> {
        let image = Image::<u8, 1>::new([0, 0].into(), vec![])?;
        let mut dst = Image::<u8, 1>::from_size_val([2, 2].into(), 0)?;
        assert_eq!(
            resize_native(&image, &mut dst, InterpolationMode::Nearest),
            Err(ImageError::EmptyImage(0, 0))
        );
        Ok(())
    }
}
