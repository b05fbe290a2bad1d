use super::bilinear::bilinear_interpolation;
use super::nearest::nearest_neighbor_interpolation;
use pano_image::{Image, ImageDtype};

/// Interpolation mode for the resampling operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationMode {
    /// Bilinear interpolation
    #[default]
    Bilinear,
    /// Nearest neighbor interpolation
    Nearest,
}

/// Kernel for interpolating a pixel value
///
/// # Arguments
///
/// * `image` - The input image container with shape (height, width, C).
/// * `u` - The x coordinate of the pixel to interpolate.
/// * `v` - The y coordinate of the pixel to interpolate.
/// * `interpolation` - The interpolation mode to use.
///
/// PRECONDITION: the image is not empty. Coordinates outside the image are clamped.
///
/// # Returns
///
/// The interpolated pixel channels.
pub fn interpolate_pixel<T: ImageDtype, const C: usize>(
    image: &Image<T, C>,
    u: f32,
    v: f32,
    interpolation: InterpolationMode,
) -> [T; C] {
    match interpolation {
        InterpolationMode::Bilinear => bilinear_interpolation(image, u, v),
        InterpolationMode::Nearest => nearest_neighbor_interpolation(image, u, v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pano_image::ImageError;

    #[test]
    fn bilinear_midpoint() -> Result<(), ImageError> {
        let image = Image::<f32, 1>::new([2, 2].into(), vec![0.0, 1.0, 2.0, 3.0])?;
        let px = interpolate_pixel(&image, 0.5, 0.5, InterpolationMode::Bilinear);
        assert_relative_eq!(px[0], 1.5);
        let px = interpolate_pixel(&image, 1.0, 0.0, InterpolationMode::Bilinear);
        assert_relative_eq!(px[0], 1.0);
        Ok(())
    }

    #[test]
    fn bilinear_u8_rounds() -> Result<(), ImageError> {
        let image = Image::<u8, 3>::new([2, 1].into(), vec![0, 10, 255, 3, 20, 255])?;
        let px = interpolate_pixel(&image, 0.5, 0.0, InterpolationMode::Bilinear);
        assert_eq!(px, [2, 15, 255]);
        Ok(())
    }

    #[test]
    fn nearest_clamps() -> Result<(), ImageError> {
        let image = Image::<u8, 1>::new([2, 2].into(), vec![1, 2, 3, 4])?;
        assert_eq!(
            interpolate_pixel(&image, 0.6, 0.2, InterpolationMode::Nearest),
            [2]
        );
        assert_eq!(
            interpolate_pixel(&image, 9.0, 9.0, InterpolationMode::Nearest),
            [4]
        );
        Ok(())
    }
}
