/// Errors returned by the homography estimators.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum HomographyError {
    /// Input correspondences are invalid or insufficient.
    #[error("Need at least {required} correspondences with equal lengths, got {src} and {dst}")]
    InvalidInput {
        /// Minimum required correspondences.
        required: usize,
        /// Number of source points.
        src: usize,
        /// Number of destination points.
        dst: usize,
    },

    /// The point configuration does not determine a homography.
    #[error("Degenerate point configuration")]
    Degenerate,

    /// Every sampled minimal subset was degenerate.
    #[error("All {0} sampled subsets were degenerate")]
    AllSamplesDegenerate(usize),

    /// No candidate model reached the required support.
    #[error("RANSAC found {found} inliers, {required} required")]
    InsufficientInliers {
        /// Inliers of the best candidate.
        found: usize,
        /// Minimum inliers required.
        required: usize,
    },

    /// Estimator parameters or weights are out of their domain.
    #[error("Invalid estimator parameter: {0}")]
    InvalidParameter(String),
}
