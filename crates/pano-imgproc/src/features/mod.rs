//! Feature detection, description and matching.
//!
//! # Available Components
//!
//! - **FAST**: segment test corner detection with non-maximum suppression
//! - **Harris**: corner response used to rank FAST corners
//! - **ORB**: oriented FAST keypoints with rotated BRIEF descriptors
//! - **Matcher**: brute force k=2 matching with Lowe's ratio test

mod fast;
pub use fast::*;

mod harris;
pub use harris::*;

mod matcher;
pub use matcher::*;

mod orb;
pub use orb::*;

mod pattern;
