use pano_geometry::HomographyError;
use pano_image::ImageError;

use crate::{ConfigError, PairDiagnostics, Panorama};

/// A projected contributor that fails the sanity checks of the warper.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    /// A corner maps to infinity, NaN or behind the camera.
    #[error("corner {0} projects to a non-finite point or behind the camera")]
    InvalidCorner(usize),

    /// The projected outline is not a convex quadrilateral.
    #[error("projected outline is not convex")]
    NotConvex,

    /// The projection mirrors the contributor.
    #[error("projection reverses the orientation of the contributor")]
    Mirrored,

    /// The projected outline does not intersect the anchor.
    #[error("projected contributor does not overlap the anchor")]
    NoOverlap,

    /// The canvas would be larger than allowed.
    #[error("canvas of {width}x{height} exceeds the limit of {max_pixels} pixels")]
    CanvasTooLarge {
        /// Canvas width.
        width: u64,
        /// Canvas height.
        height: u64,
        /// Configured limit.
        max_pixels: usize,
    },
}

/// Why a single stitch, or a whole sequence, could not proceed.
#[derive(thiserror::Error, Debug)]
pub enum StitchFailure {
    /// Too few descriptor matches between anchor and contributor.
    ///
    /// An image without descriptors reports zero matches.
    #[error("insufficient matches: found {found}, required {required}")]
    InsufficientMatches {
        /// Number of accepted matches.
        found: usize,
        /// Configured minimum.
        required: usize,
    },

    /// No homography with enough support was found.
    #[error("homography estimation failed: {0}")]
    Homography(#[from] HomographyError),

    /// The homography was found but maps the contributor implausibly.
    #[error("homography rejected: {0}")]
    Projection(#[from] ProjectionError),

    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    /// A frame cannot be processed.
    #[error("invalid frame {index}: {reason}")]
    InvalidFrame {
        /// Index of the frame in the sequence.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// Fewer than two frames were supplied.
    #[error("at least 2 frames are required, got {0}")]
    TooFewFrames(usize),

    /// An image operation failed.
    #[error(transparent)]
    Image(#[from] ImageError),
}

impl StitchFailure {
    /// True for failures of the homography stage, including rejected projections.
    pub fn is_homography_failure(&self) -> bool {
        matches!(self, Self::Homography(_) | Self::Projection(_))
    }
}

/// A stitch that stopped early.
///
/// Carries the panorama built before the failing frame, when there is one, and
/// the diagnostics of the failed attempt once matching got under way.
#[derive(thiserror::Error, Debug)]
#[error("stitching stopped at frame {failed_index}: {reason}")]
pub struct StitchError {
    /// Index of the frame that could not be stitched.
    pub failed_index: usize,
    /// Cause of the failure.
    #[source]
    pub reason: StitchFailure,
    /// Panorama of the frames before `failed_index`.
    pub partial: Option<Panorama>,
    /// What the failed attempt got through before it stopped.
    pub attempt: Option<PairDiagnostics>,
}

impl StitchError {
    /// A failure with neither a partial panorama nor attempt diagnostics.
    pub fn new(failed_index: usize, reason: StitchFailure) -> Self {
        Self {
            failed_index,
            reason,
            partial: None,
            attempt: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_homography_failures() {
        let ransac = StitchFailure::from(HomographyError::InsufficientInliers {
            found: 6,
            required: 15,
        });
        assert!(ransac.is_homography_failure());
        assert!(StitchFailure::from(ProjectionError::Mirrored).is_homography_failure());
        assert!(!StitchFailure::InsufficientMatches {
            found: 3,
            required: 15
        }
        .is_homography_failure());
        assert!(!StitchFailure::TooFewFrames(1).is_homography_failure());
    }

    #[test]
    fn test_stitch_error_display() {
        let err = StitchError::new(2, StitchFailure::TooFewFrames(1));
        assert_eq!(
            err.to_string(),
            "stitching stopped at frame 2: at least 2 frames are required, got 1"
        );
        assert!(err.partial.is_none() && err.attempt.is_none());
    }
}
