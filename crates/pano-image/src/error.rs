/// An error type for the image module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ImageError {
    /// Error when the data length does not match the image size and channels.
    #[error("Data length ({0}) does not match the image size ({1})")]
    InvalidChannelShape(usize, usize),

    /// Error when two images that must share a size do not.
    #[error("Image size mismatch: ({0}x{1}) vs ({2}x{3})")]
    InvalidImageSize(usize, usize, usize, usize),

    /// Error when an image has a zero width or height.
    #[error("Image has zero size ({0}x{1})")]
    EmptyImage(usize, usize),

    /// Error when a pixel coordinate is outside the image.
    #[error("Pixel index ({0}, {1}) is out of bounds ({2}x{3})")]
    PixelIndexOutOfBounds(usize, usize, usize, usize),

    /// Error when a region does not fit inside the image.
    #[error("Region at ({0}, {1}) with size {2}x{3} does not fit in the image")]
    InvalidRegion(usize, usize, usize, usize),

    /// Error when a pixel value cannot be cast to the target type.
    #[error("Failed to cast image data to {0}")]
    CastError(String),

    /// Error when a transform matrix cannot be inverted.
    #[error("Cannot compute the determinant of the transform")]
    CannotComputeDeterminant,
}
