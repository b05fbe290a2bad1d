#![deny(missing_docs)]
//! Homography estimation for the panorama stitching pipeline.
//!
//! - [`homography_dlt`]: normalized direct linear transform over any number of points
//! - [`ransac_homography`]: robust estimation with adaptive RANSAC followed by iterative refinement
//! - [`refine_homography`]: Levenberg-Marquardt on the weighted Huber reprojection error

mod error;
pub use error::HomographyError;

mod homography;
pub use homography::*;

/// small linear algebra helpers on `glam` types.
pub mod linalg;

mod ransac;
pub use ransac::*;

mod refine;
pub use refine::*;
