use crate::parallel;
use pano_image::{Image, ImageError};

/// Define the RGB weights for the grayscale conversion.
const RW: f64 = 0.299;
const GW: f64 = 0.587;
const BW: f64 = 0.114;

/// Convert an RGB image to grayscale using the formula:
///
/// Y = 0.299 * R + 0.587 * G + 0.114 * B
///
/// # Arguments
///
/// * `src` - The input RGB image.
/// * `dst` - The output grayscale image.
///
/// Precondition: the input and output images must have the same size.
///
/// # Example
///
/// ```
/// use pano_image::{Image, ImageSize};
/// use pano_imgproc::color::gray_from_rgb;
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
/// let mut gray = Image::<f32, 1>::from_size_val(image.size(), 0.0).unwrap();
///
/// gray_from_rgb(&image, &mut gray).unwrap();
/// assert_eq!(gray.size().width, 4);
/// assert_eq!(gray.size().height, 5);
/// ```
pub fn gray_from_rgb<T>(src: &Image<T, 3>, dst: &mut Image<T, 1>) -> Result<(), ImageError>
where
    T: Send + Sync + num_traits::Float,
{
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let cast_err = || ImageError::CastError(std::any::type_name::<T>().to_string());
    let rw = T::from(RW).ok_or_else(cast_err)?;
    let gw = T::from(GW).ok_or_else(cast_err)?;
    let bw = T::from(BW).ok_or_else(cast_err)?;

    parallel::par_iter_rows(src, dst, |src_pixel, dst_pixel| {
        dst_pixel[0] = rw * src_pixel[0] + gw * src_pixel[1] + bw * src_pixel[2];
    });

    Ok(())
}

/// Build the normalized `[0, 1]` luminance image of an RGB8 image.
///
/// The image is scaled to `f32` and converted with [`gray_from_rgb`].
pub fn intensity_from_rgb8(src: &Image<u8, 3>) -> Result<Image<f32, 1>, ImageError> {
    let rgb = src.cast_and_scale::<f32>(1.0 / 255.0)?;
    let mut gray = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
    gray_from_rgb(&rgb, &mut gray)?;
    Ok(gray)
}

/// 8-bit images that can be turned into a `[0, 1]` intensity image.
pub trait ToIntensity {
    /// The normalized intensity image.
    fn to_intensity(&self) -> Result<Image<f32, 1>, ImageError>;
}

impl ToIntensity for Image<u8, 3> {
    fn to_intensity(&self) -> Result<Image<f32, 1>, ImageError> {
        intensity_from_rgb8(self)
    }
}

impl ToIntensity for Image<u8, 1> {
    fn to_intensity(&self) -> Result<Image<f32, 1>, ImageError> {
        self.cast_and_scale(1.0 / 255.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pano_image::ImageSize;

    #[test]
    fn gray_from_rgb_weights() -> Result<(), ImageError> {
        let image = Image::<f32, 3>::new(
            ImageSize {
                width: 2,
                height: 1,
            },
            vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0],
        )?;
        let mut gray = Image::<f32, 1>::from_size_val(image.size(), 0.0)?;
        gray_from_rgb(&image, &mut gray)?;
        assert_relative_eq!(gray.as_slice()[0], 0.299, epsilon = 1e-6);
        assert_relative_eq!(gray.as_slice()[1], 0.114, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn intensity_from_rgb8_range() -> Result<(), ImageError> {
        let white = Image::<u8, 3>::from_size_val([2, 2].into(), 255)?;
        intensity_from_rgb8(&white)?
            .as_slice()
            .iter()
            .for_each(|&v| assert_relative_eq!(v, 1.0, epsilon = 1e-5));

        let image = Image::<u8, 3>::new([2, 1].into(), vec![0, 255, 0, 0, 0, 0])?;
        let out = intensity_from_rgb8(&image)?;
        assert_eq!(out.size(), image.size());
        assert_relative_eq!(out.as_slice()[0], 0.587, epsilon = 1e-5);
        assert_eq!(out.as_slice()[1], 0.0);
        Ok(())
    }

    #[test]
    fn single_channel_intensity() -> Result<(), ImageError> {
        let gray = Image::<u8, 1>::new([2, 1].into(), vec![0, 255])?;
        let out = gray.to_intensity()?;
        assert_eq!(out.as_slice()[0], 0.0);
        assert_relative_eq!(out.as_slice()[1], 1.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn gray_size_mismatch() -> Result<(), ImageError> {
        let image = Image::<f32, 3>::from_size_val([2, 2].into(), 0.0)?;
        let mut gray = Image::<f32, 1>::from_size_val([3, 2].into(), 0.0)?;
        assert!(gray_from_rgb(&image, &mut gray).is_err());
        Ok(())
    }
}
