use pano_image::{ops::is_background, Image, ImageError};
use pano_imgproc::{
    components::{foreground_mask, largest_component},
    crop::crop_region,
};
use rayon::prelude::*;

use crate::warper::Canvas;

/// Copy the non-background pixels of `anchor` onto `canvas` at `offset`.
///
/// Anchor pixels win over whatever the warped contributor left there. Pure
/// black anchor pixels are treated as background and keep the canvas value.
pub fn overlay_anchor<const C: usize>(
    canvas: &mut Image<u8, C>,
    anchor: &Image<u8, C>,
    offset: [usize; 2],
) -> Result<(), ImageError> {
    let [tx, ty] = offset;
    if tx + anchor.width() > canvas.width() || ty + anchor.height() > canvas.height() {
        return Err(ImageError::InvalidRegion(
            tx,
            ty,
            anchor.width(),
            anchor.height(),
        ));
    }
    if anchor.size().is_empty() {
        return Ok(());
    }

    let canvas_stride = canvas.width() * C;
    let anchor_stride = anchor.width() * C;

    canvas
        .as_slice_mut()
        .par_chunks_exact_mut(canvas_stride)
        .skip(ty)
        .zip(anchor.as_slice().par_chunks_exact(anchor_stride))
        .for_each(|(canvas_row, anchor_row)| {
            canvas_row[tx * C..tx * C + anchor_stride]
                .chunks_exact_mut(C)
                .zip(anchor_row.chunks_exact(C))
                .filter(|(_, src)| !is_background::<u8>(src))
                .for_each(|(dst, src)| dst.copy_from_slice(src));
        });

    Ok(())
}

/// Crop to the bounding box of the largest 8-connected foreground region.
///
/// An image with no foreground at all is returned unchanged.
pub fn trim_borders<const C: usize>(image: &Image<u8, C>) -> Result<Image<u8, C>, ImageError> {
    let mask = foreground_mask(image)?;
    match largest_component(&mask) {
        Some(region) => crop_region(
            image,
            region.min_x,
            region.min_y,
            region.width(),
            region.height(),
        ),
        None => Ok(image.clone()),
    }
}

/// Lay the anchor over a warped canvas and trim the empty borders.
pub fn composite<const C: usize>(
    canvas: Canvas<C>,
    anchor: &Image<u8, C>,
) -> Result<Image<u8, C>, ImageError> {
    let Canvas { mut image, offset } = canvas;
    overlay_anchor(&mut image, anchor, offset)?;
    trim_borders(&image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_keeps_anchor_pixels() -> Result<(), ImageError> {
        let mut canvas = Image::<u8, 3>::from_size_val([6, 4].into(), 7)?;
        let anchor = Image::<u8, 3>::from_size_val([3, 2].into(), 200)?;
        overlay_anchor(&mut canvas, &anchor, [2, 1])?;

        assert_eq!(canvas.pixel(2, 1)?, &[200, 200, 200]);
        assert_eq!(canvas.pixel(4, 2)?, &[200, 200, 200]);
        assert_eq!(canvas.pixel(1, 1)?, &[7, 7, 7]);
        assert_eq!(canvas.pixel(5, 2)?, &[7, 7, 7]);
        assert_eq!(canvas.pixel(2, 3)?, &[7, 7, 7]);
        Ok(())
    }

    #[test]
    fn test_overlay_skips_background() -> Result<(), ImageError> {
        let mut canvas = Image::<u8, 1>::from_size_val([3, 1].into(), 9)?;
        let anchor = Image::<u8, 1>::new([3, 1].into(), vec![1, 0, 3])?;
        overlay_anchor(&mut canvas, &anchor, [0, 0])?;
        assert_eq!(canvas.as_slice(), &[1, 9, 3]);
        Ok(())
    }

    #[test]
    fn test_overlay_out_of_bounds() -> Result<(), ImageError> {
        let mut canvas = Image::<u8, 1>::from_size_val([4, 4].into(), 0)?;
        let anchor = Image::<u8, 1>::from_size_val([3, 3].into(), 1)?;
        assert_eq!(
            overlay_anchor(&mut canvas, &anchor, [2, 0]),
            Err(ImageError::InvalidRegion(2, 0, 3, 3))
        );
        Ok(())
    }

    #[test]
    fn test_trim_borders() -> Result<(), ImageError> {
        let mut image = Image::<u8, 1>::from_size_val([8, 6].into(), 0)?;
        for y in 1..4 {
            for x in 2..6 {
                image.set_pixel(x, y, [255])?;
            }
        }
        // a lone speck is discarded
        image.set_pixel(7, 5, [255])?;

        let trimmed = trim_borders(&image)?;
        assert_eq!(trimmed.size(), [4, 3].into());
        assert!(trimmed.as_slice().iter().all(|&v| v == 255));

        let again = trim_borders(&trimmed)?;
        assert_eq!(again, trimmed);
        Ok(())
    }

    #[test]
    fn test_trim_all_background() -> Result<(), ImageError> {
        let image = Image::<u8, 3>::from_size_val([5, 5].into(), 0)?;
        assert_eq!(trim_borders(&image)?, image);
        Ok(())
    }

    #[test]
    fn test_composite() -> Result<(), ImageError> {
        let mut warped = Image::<u8, 1>::from_size_val([6, 3].into(), 0)?;
        for x in 0..4 {
            warped.set_pixel(x, 1, [50])?;
        }
        let canvas = Canvas {
            image: warped,
            offset: [3, 1],
        };
        let anchor = Image::<u8, 1>::from_size_val([3, 1].into(), 100)?;

        let out = composite(canvas, &anchor)?;
        assert_eq!(out.as_slice(), &[50, 50, 50, 100, 100, 100]);
        Ok(())
    }
}
