#![deny(missing_docs)]
//! Image processing operations for the panorama stitching pipeline.

/// color space conversions.
pub mod color;

/// connected component labeling.
pub mod components;

/// region cropping.
pub mod crop;

/// feature detection, description and matching.
pub mod features;

/// image filtering.
pub mod filter;

/// pixel interpolation.
pub mod interpolation;

/// utilities for parallel pixel loops.
pub mod parallel;

/// image resizing.
pub mod resize;

/// perspective warping.
pub mod warp;
