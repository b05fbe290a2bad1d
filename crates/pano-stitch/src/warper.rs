use glam::{DMat3, DVec2, DVec3};
use log::debug;
use pano_geometry::linalg::to_row_major;
use pano_image::{Image, ImageError, ImageSize};
use pano_imgproc::{interpolation::InterpolationMode, warp::warp_perspective};

use crate::error::{ProjectionError, StitchFailure};

/// Placement of anchor and contributor on a shared canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasLayout {
    /// Canvas size.
    pub size: ImageSize,
    /// Position of the anchor origin on the canvas, `[tx, ty]`.
    pub offset: [usize; 2],
    /// Contributor corners in anchor coordinates.
    pub corners: [DVec2; 4],
    /// Area shared by the projected contributor and the anchor, in pixels.
    pub overlap_area: f64,
}

impl CanvasLayout {
    /// The translation moving anchor coordinates onto the canvas.
    pub fn translation(&self) -> DMat3 {
        DMat3::from_cols(
            DVec3::X,
            DVec3::Y,
            DVec3::new(self.offset[0] as f64, self.offset[1] as f64, 1.0),
        )
    }
}

/// A canvas holding the warped contributor.
#[derive(Debug, Clone)]
pub struct Canvas<const C: usize> {
    /// Canvas pixels, zero outside the contributor footprint.
    pub image: Image<u8, C>,
    /// Position of the anchor origin on the canvas, `[tx, ty]`.
    pub offset: [usize; 2],
}

/// Project the corners `(0,0) (w,0) (w,h) (0,h)` of an image through `h`.
///
/// # Errors
///
/// Fails when a corner maps to a non-finite point or has a non-positive
/// homogeneous scale.
pub fn project_corners(h: &DMat3, size: ImageSize) -> Result<[DVec2; 4], ProjectionError> {
    let (w, hh) = (size.width as f64, size.height as f64);
    let corners = [
        DVec2::new(0.0, 0.0),
        DVec2::new(w, 0.0),
        DVec2::new(w, hh),
        DVec2::new(0.0, hh),
    ];

    let mut projected = [DVec2::ZERO; 4];
    for (i, (out, corner)) in projected.iter_mut().zip(corners.iter()).enumerate() {
        let q = *h * corner.extend(1.0);
        if !q.is_finite() || q.z <= f64::EPSILON {
            return Err(ProjectionError::InvalidCorner(i));
        }
        *out = DVec2::new(q.x / q.z, q.y / q.z);
        if !out.is_finite() {
            return Err(ProjectionError::InvalidCorner(i));
        }
    }

    Ok(projected)
}

/// The projected outline must be a convex quad with the orientation of the source.
pub(crate) fn check_quad(corners: &[DVec2; 4]) -> Result<(), ProjectionError> {
    let turns: Vec<f64> = (0..4)
        .map(|i| {
            let e1 = corners[(i + 1) % 4] - corners[i];
            let e2 = corners[(i + 2) % 4] - corners[(i + 1) % 4];
            e1.perp_dot(e2)
        })
        .collect();

    // the source outline turns positively in image coordinates
    if turns.iter().all(|&t| t > 0.0) {
        Ok(())
    } else if turns.iter().all(|&t| t < 0.0) {
        Err(ProjectionError::Mirrored)
    } else {
        Err(ProjectionError::NotConvex)
    }
}

/// Area of the intersection of a convex quad with the rectangle `[0, w] x [0, h]`.
pub(crate) fn overlap_area(corners: &[DVec2; 4], size: ImageSize) -> f64 {
    let (w, h) = (size.width as f64, size.height as f64);

    // Sutherland-Hodgman clipping against the four half planes
    let planes: [(DVec2, f64); 4] = [
        (DVec2::new(1.0, 0.0), 0.0),
        (DVec2::new(-1.0, 0.0), -w),
        (DVec2::new(0.0, 1.0), 0.0),
        (DVec2::new(0.0, -1.0), -h),
    ];

    let mut polygon: Vec<DVec2> = corners.to_vec();
    for (normal, offset) in planes {
        if polygon.is_empty() {
            break;
        }
        let inside = |p: DVec2| normal.dot(p) - offset;
        let mut clipped = Vec::with_capacity(polygon.len() + 1);
        for i in 0..polygon.len() {
            let a = polygon[i];
            let b = polygon[(i + 1) % polygon.len()];
            let (da, db) = (inside(a), inside(b));
            if da >= 0.0 {
                clipped.push(a);
            }
            if (da >= 0.0) != (db >= 0.0) {
                let t = da / (da - db);
                clipped.push(a + (b - a) * t);
            }
        }
        polygon = clipped;
    }

    if polygon.len() < 3 {
        return 0.0;
    }

    let twice_area: f64 = (0..polygon.len())
        .map(|i| polygon[i].perp_dot(polygon[(i + 1) % polygon.len()]))
        .sum();
    twice_area.abs() / 2.0
}

/// Plan the canvas for warping a contributor onto an anchor.
///
/// The canvas covers the union of the anchor bounds and the projected
/// contributor corners, with the minimum corner floored and the maximum corner
/// ceiled.
pub fn plan_canvas(
    h: &DMat3,
    contributor_size: ImageSize,
    anchor_size: ImageSize,
    max_canvas_pixels: usize,
) -> Result<CanvasLayout, ProjectionError> {
    let corners = project_corners(h, contributor_size)?;
    check_quad(&corners)?;

    let overlap = overlap_area(&corners, anchor_size);
    if overlap <= 0.0 {
        return Err(ProjectionError::NoOverlap);
    }

    let (min, max) = corners.iter().fold(
        (
            DVec2::ZERO,
            DVec2::new(anchor_size.width as f64, anchor_size.height as f64),
        ),
        |(min, max), &p| (min.min(p), max.max(p)),
    );
    let (min, max) = (min.floor(), max.ceil());

    let span = max - min;
    let (width, height) = (span.x as u64, span.y as u64);
    if width.saturating_mul(height) > max_canvas_pixels as u64 {
        return Err(ProjectionError::CanvasTooLarge {
            width,
            height,
            max_pixels: max_canvas_pixels,
        });
    }

    Ok(CanvasLayout {
        size: ImageSize {
            width: width as usize,
            height: height as usize,
        },
        offset: [(-min.x) as usize, (-min.y) as usize],
        corners,
        overlap_area: overlap,
    })
}

/// Resample the contributor onto the canvas through `T * H`.
pub fn warp_onto_canvas<const C: usize>(
    contributor: &Image<u8, C>,
    h: &DMat3,
    layout: &CanvasLayout,
) -> Result<Canvas<C>, ImageError> {
    let m = layout.translation() * *h;
    let mut image = Image::from_size_val(layout.size, 0u8)?;
    warp_perspective(
        contributor,
        &mut image,
        &to_row_major(&m),
        InterpolationMode::Bilinear,
    )?;

    Ok(Canvas {
        image,
        offset: layout.offset,
    })
}

/// Warps contributors into the frame of an anchor.
#[derive(Debug, Clone, Copy)]
pub struct Warper {
    /// Largest canvas, in pixels, a single warp may allocate.
    pub max_canvas_pixels: usize,
}

impl Warper {
    /// Create a warper with the given canvas limit.
    pub fn new(max_canvas_pixels: usize) -> Self {
        Self { max_canvas_pixels }
    }

    /// Warp `contributor` through the contributor to anchor homography `h`.
    ///
    /// Returns the canvas together with its layout.
    pub fn warp<const C: usize>(
        &self,
        contributor: &Image<u8, C>,
        h: &DMat3,
        anchor_size: ImageSize,
    ) -> Result<(Canvas<C>, CanvasLayout), StitchFailure> {
        let layout = plan_canvas(h, contributor.size(), anchor_size, self.max_canvas_pixels)?;
        debug!(
            "warper: canvas {} with anchor at {:?}, overlap {:.0}px",
            layout.size, layout.offset, layout.overlap_area
        );
        let canvas = warp_onto_canvas(contributor, h, &layout)?;
        Ok((canvas, layout))
    }
}
