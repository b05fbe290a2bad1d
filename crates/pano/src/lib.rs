#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use pano_image as image;

#[doc(inline)]
pub use pano_imgproc as imgproc;

#[doc(inline)]
pub use pano_geometry as geometry;

#[doc(inline)]
pub use pano_stitch as stitch;
