#![deny(missing_docs)]
//! Incremental feature based panorama stitching.
//!
//! Frames are stitched one after another onto a running panorama: ORB
//! features are matched with a ratio test, a homography is fit with RANSAC,
//! the new frame is warped into the panorama frame and the panorama is laid
//! over it before the empty borders are trimmed.

/// stitching parameters.
pub mod config;

/// error types of the stitching pipeline.
pub mod error;

/// canvas planning and projective warping of contributors.
pub mod warper;

/// overlay of the anchor and border trimming.
pub mod compositor;

mod builder;
mod session;

pub use builder::{stitch_sequence, PairDiagnostics, Panorama, PanoramaBuilder};
pub use config::{ConfigError, StitchConfig};
pub use error::{ProjectionError, StitchError, StitchFailure};
pub use session::{Command, Event, Session};
