use log::debug;
use pano_image::{Image, ImageError, ImageSize};
use rayon::prelude::*;

use super::pattern::{sampling_pattern, PATTERN_SIZE};
use super::{FastDetector, HarrisResponse};
use crate::{
    color::ToIntensity, filter::gaussian_blur, interpolation::InterpolationMode,
    resize::resize_native,
};

/// Keypoints closer than this to a level border are discarded.
const EDGE_THRESHOLD: usize = 19;

/// Side of the disc used for the intensity centroid, must be odd.
const PATCH_SIZE: usize = 31;

/// Minimum corners on a level before the lower FAST threshold is tried.
const MIN_CORNERS_PER_LEVEL: usize = 10;

/// A packed 256 bit rotated BRIEF descriptor.
pub type OrbDescriptor = [u8; PATTERN_SIZE / 8];

/// A scale and rotation aware keypoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// Column in full resolution pixel coordinates.
    pub x: f32,
    /// Row in full resolution pixel coordinates.
    pub y: f32,
    /// Downscale factor of the pyramid level the keypoint was found on.
    pub scale: f32,
    /// Orientation in radians.
    pub orientation: f32,
    /// Harris response.
    pub response: f32,
    /// Pyramid level index.
    pub octave: usize,
}

/// ORB keypoint detector and descriptor extractor.
#[derive(Debug, Clone)]
pub struct OrbDetector {
    /// Upper bound on the number of keypoints returned per image.
    pub max_features: usize,
    /// Number of pyramid levels.
    pub n_levels: usize,
    /// Downscale factor between consecutive levels.
    pub scale_factor: f32,
    /// FAST threshold tried first on each level.
    pub ini_fast_threshold: f32,
    /// FAST threshold used when the first pass finds too few corners.
    pub min_fast_threshold: f32,
    /// Harris sensitivity parameter.
    pub harris_k: f32,
}

impl Default for OrbDetector {
    fn default() -> Self {
        Self {
            max_features: 3000,
            n_levels: 8,
            scale_factor: 1.2,
            ini_fast_threshold: 20.0 / 255.0,
            min_fast_threshold: 7.0 / 255.0,
            harris_k: 0.04,
        }
    }
}

/// Per level detection result.
struct LevelFeatures {
    octave: usize,
    corners: Vec<[usize; 2]>,
    orientations: Vec<f32>,
    responses: Vec<f32>,
    descriptors: Vec<OrbDescriptor>,
}

impl OrbDetector {
    /// Create a detector with the default pyramid and the given feature budget.
    pub fn new(max_features: usize) -> Self {
        Self {
            max_features,
            ..Default::default()
        }
    }

    /// Split the feature budget across levels with a geometric distribution.
    ///
    /// Finer levels receive the larger share; the shares sum to `max_features`.
    pub fn features_per_level(&self) -> Vec<usize> {
        let n_levels = self.n_levels.max(1);
        let mut features_per_level = vec![0usize; n_levels];

        let factor = 1.0f32 / self.scale_factor;
        let mut n_desired = if (1.0 - factor).abs() < f32::EPSILON {
            self.max_features as f32 / n_levels as f32
        } else {
            self.max_features as f32 * (1.0 - factor) / (1.0 - factor.powi(n_levels as i32))
        };

        let mut sum = 0usize;
        for item in features_per_level.iter_mut().take(n_levels - 1) {
            let n = (n_desired.round().max(0.0) as usize).min(self.max_features - sum);
            *item = n;
            sum += n;
            n_desired *= factor;
        }
        features_per_level[n_levels - 1] = self.max_features.saturating_sub(sum);

        features_per_level
    }

    /// Build the scale pyramid of an intensity image.
    ///
    /// Each level is a Gaussian smoothed and bilinearly downsampled copy of the
    /// previous one. Levels too small to hold a keypoint are not generated.
    pub fn build_pyramid(&self, src: &Image<f32, 1>) -> Result<Vec<Image<f32, 1>>, ImageError> {
        let mut pyramid = Vec::with_capacity(self.n_levels);
        pyramid.push(src.clone());

        let sigma = 2.0 * self.scale_factor / 6.0;
        let min_side = 2 * EDGE_THRESHOLD + 1;

        for level in 1..self.n_levels {
            let scale = self.scale_factor.powi(level as i32);
            let size = ImageSize {
                width: (src.width() as f32 / scale).round() as usize,
                height: (src.height() as f32 / scale).round() as usize,
            };
            if size.width < min_side || size.height < min_side {
                break;
            }

            let prev = &pyramid[level - 1];
            let mut smoothed = Image::from_size_val(prev.size(), 0.0)?;
            gaussian_blur(prev, &mut smoothed, (0, 0), (sigma, sigma))?;

            let mut resized = Image::from_size_val(size, 0.0)?;
            resize_native(&smoothed, &mut resized, InterpolationMode::Bilinear)?;
            pyramid.push(resized);
        }

        Ok(pyramid)
    }

    /// Detect keypoints and compute their descriptors on an 8-bit image.
    ///
    /// RGB images are converted to luminance, gray images are only rescaled.
    /// An untextured image yields an empty result.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::EmptyImage`] for zero sized input.
    pub fn detect_and_compute<I: ToIntensity>(
        &self,
        src: &I,
    ) -> Result<Vec<(Keypoint, OrbDescriptor)>, ImageError> {
        let intensity = src.to_intensity()?;
        self.detect_and_compute_intensity(&intensity)
    }

    /// Detect keypoints and compute their descriptors on a `[0, 1]` intensity image.
    pub fn detect_and_compute_intensity(
        &self,
        src: &Image<f32, 1>,
    ) -> Result<Vec<(Keypoint, OrbDescriptor)>, ImageError> {
        if src.size().is_empty() {
            return Err(ImageError::EmptyImage(src.width(), src.height()));
        }
        if self.max_features == 0 {
            return Ok(Vec::new());
        }

        let pyramid = self.build_pyramid(src)?;
        let budget = self.features_per_level();

        let levels = pyramid
            .par_iter()
            .enumerate()
            .map(|(octave, level)| self.process_level(octave, level, budget[octave]))
            .collect::<Result<Vec<_>, ImageError>>()?;

        let mut features = Vec::new();
        for level in levels {
            let octave_size = pyramid[level.octave].size();
            let sx = src.width() as f32 / octave_size.width as f32;
            let sy = src.height() as f32 / octave_size.height as f32;
            let scale = self.scale_factor.powi(level.octave as i32);

            for (((&[r, c], &orientation), &response), descriptor) in level
                .corners
                .iter()
                .zip(&level.orientations)
                .zip(&level.responses)
                .zip(level.descriptors)
            {
                let keypoint = Keypoint {
                    x: (c as f32 + 0.5) * sx - 0.5,
                    y: (r as f32 + 0.5) * sy - 0.5,
                    scale,
                    orientation,
                    response,
                    octave: level.octave,
                };
                features.push((keypoint, descriptor));
            }
        }

        debug!(
            "orb: {} keypoints over {} levels ({}x{})",
            features.len(),
            pyramid.len(),
            src.width(),
            src.height()
        );

        Ok(features)
    }

    fn process_level(
        &self,
        octave: usize,
        level: &Image<f32, 1>,
        budget: usize,
    ) -> Result<LevelFeatures, ImageError> {
        let mut out = LevelFeatures {
            octave,
            corners: Vec::new(),
            orientations: Vec::new(),
            responses: Vec::new(),
            descriptors: Vec::new(),
        };
        if budget == 0 {
            return Ok(out);
        }

        let mut corners = FastDetector::new(self.ini_fast_threshold).detect(level)?;
        if corners.len() < MIN_CORNERS_PER_LEVEL {
            corners = FastDetector::new(self.min_fast_threshold).detect(level)?;
        }

        let corners = mask_border_keypoints(level.size(), corners, EDGE_THRESHOLD);
        if corners.is_empty() {
            return Ok(out);
        }

        let responses = HarrisResponse::default()
            .with_k(self.harris_k)
            .compute_at(level, &corners);

        let mut ranked: Vec<(usize, f32)> = responses.into_iter().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(budget);

        out.corners = ranked.iter().map(|&(i, _)| corners[i]).collect();
        out.responses = ranked.iter().map(|&(_, r)| r).collect();
        out.orientations = corner_orientations(level, &out.corners);

        let mut blurred = Image::from_size_val(level.size(), 0.0)?;
        gaussian_blur(level, &mut blurred, (7, 7), (2.0, 2.0))?;
        out.descriptors = orb_loop(&blurred, &out.corners, &out.orientations);

        Ok(out)
    }
}

/// Keep the corners at least `distance` pixels away from every border.
fn mask_border_keypoints(
    size: ImageSize,
    keypoints: Vec<[usize; 2]>,
    distance: usize,
) -> Vec<[usize; 2]> {
    keypoints
        .into_iter()
        .filter(|&[r, c]| {
            r >= distance
                && c >= distance
                && r + distance < size.height
                && c + distance < size.width
        })
        .collect()
}

/// Orientation of each corner from the intensity centroid of a disc.
fn corner_orientations(src: &Image<f32, 1>, corners: &[[usize; 2]]) -> Vec<f32> {
    let half = (PATCH_SIZE as isize - 1) / 2;
    let radius2 = half * half;
    let (rows, cols) = (src.rows() as isize, src.cols() as isize);
    let data = src.as_slice();

    corners
        .iter()
        .map(|&[r0, c0]| {
            let mut m01 = 0f32;
            let mut m10 = 0f32;

            for dr in -half..=half {
                let rr = r0 as isize + dr;
                if rr < 0 || rr >= rows {
                    continue;
                }
                let mut m01_tmp = 0f32;
                for dc in -half..=half {
                    let cc = c0 as isize + dc;
                    if dr * dr + dc * dc > radius2 || cc < 0 || cc >= cols {
                        continue;
                    }
                    let value = data[(rr * cols + cc) as usize];
                    m10 += value * dc as f32;
                    m01_tmp += value;
                }
                m01 += m01_tmp * dr as f32;
            }

            m01.atan2(m10)
        })
        .collect()
}

/// Rotated BRIEF descriptors packed into 32 bytes per keypoint.
fn orb_loop(
    src: &Image<f32, 1>,
    keypoints: &[[usize; 2]],
    orientations: &[f32],
) -> Vec<OrbDescriptor> {
    let pattern = sampling_pattern();
    let (rows, cols) = (src.rows() as isize, src.cols() as isize);
    let data = src.as_slice();

    let sample = |r: isize, c: isize| -> f32 {
        let r = r.clamp(0, rows - 1);
        let c = c.clamp(0, cols - 1);
        data[(r * cols + c) as usize]
    };

    keypoints
        .iter()
        .zip(orientations)
        .map(|(&[kr, kc], &angle)| {
            let (sin_a, cos_a) = angle.sin_cos();
            let (kr, kc) = (kr as isize, kc as isize);
            let mut descriptor = [0u8; PATTERN_SIZE / 8];

            for (j, [p0, p1]) in pattern.iter().enumerate() {
                let rotate = |p: &[f32; 2]| {
                    let dx = (cos_a * p[0] - sin_a * p[1]).round() as isize;
                    let dy = (sin_a * p[0] + cos_a * p[1]).round() as isize;
                    (kr + dy, kc + dx)
                };
                let (r0, c0) = rotate(p0);
                let (r1, c1) = rotate(p1);
                if sample(r0, c0) < sample(r1, c1) {
                    descriptor[j / 8] |= 1 << (j % 8);
                }
            }

            descriptor
        })
        .collect()
}
