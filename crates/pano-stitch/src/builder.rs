use glam::{DMat3, DVec2};
use log::{debug, info, warn};
use pano_geometry::{ransac_homography_weighted, HomographyError};
use pano_image::{Image, ImageError, ImageSize};
use pano_imgproc::features::{match_ratio_test, Keypoint, OrbDescriptor, OrbDetector};
use rayon::prelude::*;

use crate::{
    compositor::composite,
    config::{ConfigError, StitchConfig},
    error::{StitchError, StitchFailure},
    warper::Warper,
};

type Features = Vec<(Keypoint, OrbDescriptor)>;

/// Numbers collected while stitching one contributor onto the panorama.
///
/// A failed attempt keeps the stages it got through; later stages stay `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct PairDiagnostics {
    /// Index of the contributor in the sequence.
    pub index: usize,
    /// Keypoints found on the anchor.
    pub anchor_keypoints: usize,
    /// Keypoints found on the contributor.
    pub contributor_keypoints: usize,
    /// Correspondences accepted by the ratio test.
    pub matches: usize,
    /// Correspondences consistent with the homography, or with the best
    /// rejected candidate when RANSAC found too few.
    pub inliers: Option<usize>,
    /// Mean reprojection error of the inliers, in pixels.
    pub mean_reprojection_error: Option<f64>,
    /// Homography mapping contributor to anchor coordinates.
    pub homography: Option<DMat3>,
    /// Size of the canvas before trimming.
    pub canvas_size: Option<ImageSize>,
    /// Size of the stitched result.
    pub result_size: Option<ImageSize>,
}

impl PairDiagnostics {
    fn attempt(index: usize, anchor_keypoints: usize, contributor_keypoints: usize) -> Self {
        Self {
            index,
            anchor_keypoints,
            contributor_keypoints,
            matches: 0,
            inliers: None,
            mean_reprojection_error: None,
            homography: None,
            canvas_size: None,
            result_size: None,
        }
    }

    /// Fraction of the accepted matches that are inliers.
    pub fn inlier_ratio(&self) -> f64 {
        match self.inliers {
            Some(inliers) if self.matches > 0 => inliers as f64 / self.matches as f64,
            _ => 0.0,
        }
    }
}

fn or_dash<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

impl std::fmt::Display for PairDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "frame {}: keypoints {}/{}, matches {}, inliers {} ({:.1}%), error {}, canvas {}, result {}",
            self.index,
            self.anchor_keypoints,
            self.contributor_keypoints,
            self.matches,
            or_dash(self.inliers),
            100.0 * self.inlier_ratio(),
            or_dash(self.mean_reprojection_error.map(|e| format!("{e:.3}px"))),
            or_dash(self.canvas_size),
            or_dash(self.result_size)
        )
    }
}

/// The accumulated composite and the diagnostics of every stitch it went through.
#[derive(Debug, Clone)]
pub struct Panorama {
    image: Image<u8, 3>,
    diagnostics: Vec<PairDiagnostics>,
}

impl Panorama {
    /// A panorama made of a single frame.
    pub fn new(image: Image<u8, 3>) -> Self {
        Self {
            image,
            diagnostics: Vec::new(),
        }
    }

    /// The composite image.
    pub fn image(&self) -> &Image<u8, 3> {
        &self.image
    }

    /// Consume the panorama and return its image.
    pub fn into_image(self) -> Image<u8, 3> {
        self.image
    }

    /// Diagnostics of each stitch, in sequence order.
    pub fn diagnostics(&self) -> &[PairDiagnostics] {
        &self.diagnostics
    }

    /// Size of the composite image.
    pub fn size(&self) -> ImageSize {
        self.image.size()
    }
}

/// Stitches frames one at a time onto a running panorama.
///
/// A failed stitch leaves the panorama as it was.
///
/// # Example
///
/// ```no_run
/// use pano_image::Image;
/// use pano_stitch::{PanoramaBuilder, StitchConfig};
///
/// let left = Image::<u8, 3>::from_size_val([320, 240].into(), 10).unwrap();
/// let right = Image::<u8, 3>::from_size_val([320, 240].into(), 10).unwrap();
///
/// let mut builder = PanoramaBuilder::new(StitchConfig::default()).unwrap();
/// builder.add_frame(&left).unwrap();
/// if let Err(e) = builder.add_frame(&right) {
///     println!("could not stitch: {e}");
/// }
/// let panorama = builder.finish();
/// ```
pub struct PanoramaBuilder {
    config: StitchConfig,
    detector: OrbDetector,
    warper: Warper,
    panorama: Option<Panorama>,
    frames_seen: usize,
}

impl PanoramaBuilder {
    /// Create a builder after validating the configuration.
    pub fn new(config: StitchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            detector: config.orb_detector(),
            warper: Warper::new(config.max_canvas_pixels),
            config,
            panorama: None,
            frames_seen: 0,
        })
    }

    /// The configuration in use.
    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    /// The panorama built so far.
    pub fn panorama(&self) -> Option<&Panorama> {
        self.panorama.as_ref()
    }

    /// Consume the builder and return the panorama, if any frame was added.
    pub fn finish(self) -> Option<Panorama> {
        self.panorama
    }

    /// Add the next frame of the sequence.
    ///
    /// The first frame becomes the panorama. Every following frame is stitched
    /// with the panorama as anchor; on failure the panorama is left unchanged,
    /// the frame is not counted and the error carries the diagnostics of the
    /// attempt.
    pub fn add_frame(&mut self, frame: &Image<u8, 3>) -> Result<(), StitchError> {
        let index = self.frames_seen;
        check_frame(index, frame).map_err(|reason| StitchError::new(index, reason))?;

        let next = match self.panorama.take() {
            None => Panorama::new(frame.clone()),
            Some(panorama) => match self.stitch_images(index, panorama.image(), frame) {
                Ok((image, diagnostics)) => push(panorama, image, diagnostics),
                Err(e) => {
                    self.panorama = Some(panorama);
                    return Err(e);
                }
            },
        };

        self.panorama = Some(next);
        self.frames_seen += 1;
        Ok(())
    }

    /// Stitch a single contributor onto an anchor.
    ///
    /// Returns the trimmed composite and the diagnostics of the stitch. The
    /// contributor is reported as frame 1.
    pub fn stitch_pair(
        &self,
        anchor: &Image<u8, 3>,
        contributor: &Image<u8, 3>,
    ) -> Result<(Image<u8, 3>, PairDiagnostics), StitchError> {
        check_frame(0, anchor).map_err(|reason| StitchError::new(0, reason))?;
        check_frame(1, contributor).map_err(|reason| StitchError::new(1, reason))?;
        self.stitch_images(1, anchor, contributor)
    }

    fn stitch_images(
        &self,
        index: usize,
        anchor: &Image<u8, 3>,
        contributor: &Image<u8, 3>,
    ) -> Result<(Image<u8, 3>, PairDiagnostics), StitchError> {
        let extract = |image: &Image<u8, 3>| {
            self.detector
                .detect_and_compute(image)
                .map_err(|e| StitchError::new(index, e.into()))
        };
        let anchor_features = extract(anchor)?;
        let contributor_features = extract(contributor)?;
        self.stitch_features(
            index,
            anchor,
            &anchor_features,
            contributor,
            &contributor_features,
        )
    }

    fn stitch_features(
        &self,
        index: usize,
        anchor: &Image<u8, 3>,
        anchor_features: &Features,
        contributor: &Image<u8, 3>,
        contributor_features: &Features,
    ) -> Result<(Image<u8, 3>, PairDiagnostics), StitchError> {
        let mut diagnostics =
            PairDiagnostics::attempt(index, anchor_features.len(), contributor_features.len());

        match self.run_stages(
            anchor,
            anchor_features,
            contributor,
            contributor_features,
            &mut diagnostics,
        ) {
            Ok(image) => {
                info!("stitched {diagnostics}");
                Ok((image, diagnostics))
            }
            Err(reason) => {
                debug!("failed attempt {diagnostics}");
                Err(StitchError {
                    failed_index: index,
                    reason,
                    partial: None,
                    attempt: Some(diagnostics),
                })
            }
        }
    }

    /// Match, estimate, warp and composite, filling `diagnostics` stage by stage.
    fn run_stages(
        &self,
        anchor: &Image<u8, 3>,
        anchor_features: &Features,
        contributor: &Image<u8, 3>,
        contributor_features: &Features,
        diagnostics: &mut PairDiagnostics,
    ) -> Result<Image<u8, 3>, StitchFailure> {
        let index = diagnostics.index;
        let required = self.config.min_match_count;

        if anchor_features.is_empty() || contributor_features.is_empty() {
            warn!(
                "frame {index}: no descriptors (anchor {}, contributor {})",
                anchor_features.len(),
                contributor_features.len()
            );
            return Err(StitchFailure::InsufficientMatches { found: 0, required });
        }

        let query = descriptors(contributor_features);
        let reference = descriptors(anchor_features);
        let matches = match_ratio_test(&query, &reference, self.config.ratio_threshold);
        diagnostics.matches = matches.len();
        debug!(
            "frame {index}: {} matches out of {} contributor keypoints",
            matches.len(),
            query.len()
        );

        if matches.len() < required {
            return Err(StitchFailure::InsufficientMatches {
                found: matches.len(),
                required,
            });
        }

        let mut src = Vec::with_capacity(matches.len());
        let mut dst = Vec::with_capacity(matches.len());
        let mut weights = Vec::with_capacity(matches.len());
        for m in matches.iter() {
            let (from, _) = &contributor_features[m.query_idx];
            let (to, _) = &anchor_features[m.reference_idx];
            src.push(location(from));
            dst.push(location(to));
            weights.push(match_weight(from, to));
        }

        let estimate =
            match ransac_homography_weighted(&src, &dst, &weights, &self.config.ransac_params()) {
                Ok(estimate) => estimate,
                Err(e) => {
                    if let HomographyError::InsufficientInliers { found, .. } = e {
                        diagnostics.inliers = Some(found);
                    }
                    return Err(e.into());
                }
            };
        debug!(
            "frame {index}: {} inliers after {} iterations, mean error {:.3}px",
            estimate.inlier_count, estimate.iterations, estimate.mean_error
        );
        diagnostics.inliers = Some(estimate.inlier_count);
        diagnostics.mean_reprojection_error = Some(estimate.mean_error);
        diagnostics.homography = Some(estimate.model);

        let (canvas, layout) = self.warper.warp(contributor, &estimate.model, anchor.size())?;
        diagnostics.canvas_size = Some(layout.size);

        let image = composite(canvas, anchor)?;
        diagnostics.result_size = Some(image.size());

        Ok(image)
    }
}

fn push(panorama: Panorama, image: Image<u8, 3>, diagnostics: PairDiagnostics) -> Panorama {
    let mut history = panorama.diagnostics;
    history.push(diagnostics);
    Panorama {
        image,
        diagnostics: history,
    }
}

fn descriptors(features: &Features) -> Vec<OrbDescriptor> {
    features.iter().map(|(_, d)| *d).collect()
}

fn location(kp: &Keypoint) -> DVec2 {
    DVec2::new(kp.x as f64, kp.y as f64)
}

/// Keypoints of coarse pyramid levels are localized less precisely.
fn match_weight(a: &Keypoint, b: &Keypoint) -> f64 {
    let (sa, sb) = (a.scale as f64, b.scale as f64);
    2.0 / (sa * sa + sb * sb)
}

fn check_frame(index: usize, frame: &Image<u8, 3>) -> Result<(), StitchFailure> {
    if frame.size().is_empty() {
        return Err(StitchFailure::InvalidFrame {
            index,
            reason: format!("zero sized frame {}", frame.size()),
        });
    }
    Ok(())
}

/// Stitch an ordered sequence of frames into a panorama.
///
/// Frame 0 seeds the panorama and every following frame is stitched onto the
/// running result. The first failing frame stops the sequence; the error
/// carries its index and the panorama built before it.
///
/// # Errors
///
/// Invalid configurations, fewer than two frames and zero sized frames are
/// rejected before any work is done.
pub fn stitch_sequence(
    frames: &[Image<u8, 3>],
    config: &StitchConfig,
) -> Result<Panorama, StitchError> {
    let builder = PanoramaBuilder::new(config.clone())
        .map_err(|e| StitchError::new(0, StitchFailure::Configuration(e)))?;

    if frames.len() < 2 {
        return Err(StitchError::new(
            0,
            StitchFailure::TooFewFrames(frames.len()),
        ));
    }
    for (index, frame) in frames.iter().enumerate() {
        check_frame(index, frame).map_err(|e| StitchError::new(index, e))?;
    }

    info!("stitching {} frames", frames.len());

    let extract = |frame: &Image<u8, 3>| builder.detector.detect_and_compute(frame);
    let mut precomputed: Vec<Option<Result<Features, ImageError>>> = if config.parallel_extraction
    {
        frames.par_iter().map(|f| Some(extract(f))).collect()
    } else {
        frames.iter().map(|_| None).collect()
    };
    let mut features_of = |index: usize| -> Result<Features, ImageError> {
        match precomputed[index].take() {
            Some(features) => features,
            None => extract(&frames[index]),
        }
    };

    let mut panorama = Panorama::new(frames[0].clone());
    let mut anchor_features = Some(features_of(0));

    for (index, frame) in frames.iter().enumerate().skip(1) {
        let stitched = anchor_features
            .take()
            .unwrap_or_else(|| builder.detector.detect_and_compute(panorama.image()))
            .and_then(|anchor| Ok((anchor, features_of(index)?)))
            .map_err(|e| StitchError::new(index, e.into()))
            .and_then(|(anchor, contributor)| {
                builder.stitch_features(index, panorama.image(), &anchor, frame, &contributor)
            });

        match stitched {
            Ok((image, diagnostics)) => panorama = push(panorama, image, diagnostics),
            Err(mut err) => {
                warn!("stitching aborted at frame {index}: {}", err.reason);
                err.partial = Some(panorama);
                return Err(err);
            }
        }
    }

    info!("panorama of size {} from {} frames", panorama.size(), frames.len());
    Ok(panorama)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: usize, height: usize, value: u8) -> Image<u8, 3> {
        Image::from_size_val([width, height].into(), value).unwrap()
    }

    fn small_config() -> StitchConfig {
        StitchConfig::default()
            .with_max_features(200)
            .with_random_seed(Some(0))
    }

    #[test]
    fn test_too_few_frames() {
        let err = stitch_sequence(&[frame(8, 8, 1)], &small_config()).unwrap_err();
        assert_eq!(err.failed_index, 0);
        assert!(matches!(err.reason, StitchFailure::TooFewFrames(1)));
        assert!(err.partial.is_none());
    }

    #[test]
    fn test_zero_sized_frame_is_rejected_up_front() {
        let frames = [frame(8, 8, 1), frame(8, 8, 1), frame(0, 8, 1)];
        let err = stitch_sequence(&frames, &small_config()).unwrap_err();
        assert_eq!(err.failed_index, 2);
        assert!(matches!(
            err.reason,
            StitchFailure::InvalidFrame { index: 2, .. }
        ));
        assert!(err.partial.is_none());
    }

    #[test]
    fn test_invalid_config() {
        let config = small_config().with_ratio_threshold(2.0);
        let err = stitch_sequence(&[frame(8, 8, 1), frame(8, 8, 1)], &config).unwrap_err();
        assert_eq!(err.failed_index, 0);
        assert!(matches!(err.reason, StitchFailure::Configuration(_)));
    }

    #[test]
    fn test_untextured_pair_has_no_matches() {
        let frames = [frame(64, 64, 90), frame(64, 64, 90)];
        let err = stitch_sequence(&frames, &small_config()).unwrap_err();
        assert_eq!(err.failed_index, 1);
        assert!(matches!(
            err.reason,
            StitchFailure::InsufficientMatches { found: 0, required: 15 }
        ));
        let attempt = err.attempt.unwrap();
        assert_eq!(attempt.index, 1);
        assert_eq!(attempt.matches, 0);
        assert_eq!(attempt.inliers, None);
        assert_eq!(attempt.canvas_size, None);
        let partial = err.partial.unwrap();
        assert_eq!(partial.image(), &frames[0]);
        assert!(partial.diagnostics().is_empty());
    }

    #[test]
    fn test_builder_keeps_state_on_failure() -> Result<(), Box<dyn std::error::Error>> {
        let mut builder = PanoramaBuilder::new(small_config())?;
        assert!(builder.panorama().is_none());

        let first = frame(64, 48, 30);
        builder.add_frame(&first)?;
        let err = builder.add_frame(&frame(64, 48, 30)).unwrap_err();
        assert_eq!(err.failed_index, 1);
        assert!(err.partial.is_none());
        assert!(err.attempt.is_some());
        assert!(matches!(
            builder.add_frame(&frame(0, 0, 0)),
            Err(StitchError {
                failed_index: 1,
                reason: StitchFailure::InvalidFrame { index: 1, .. },
                attempt: None,
                ..
            })
        ));

        let panorama = builder.finish().unwrap();
        assert_eq!(panorama.image(), &first);
        Ok(())
    }

    #[test]
    fn test_diagnostics_display() {
        let diagnostics = PairDiagnostics {
            matches: 8,
            inliers: Some(6),
            mean_reprojection_error: Some(0.5),
            homography: Some(DMat3::IDENTITY),
            canvas_size: Some([20, 10].into()),
            result_size: Some([18, 10].into()),
            ..PairDiagnostics::attempt(1, 10, 12)
        };
        assert_eq!(diagnostics.inlier_ratio(), 0.75);
        let text = diagnostics.to_string();
        assert!(text.contains("inliers 6 (75.0%)"));
        assert!(text.contains("error 0.500px"));
        assert!(text.contains("canvas 20x10"));
    }

    #[test]
    fn test_failed_attempt_display() {
        let attempt = PairDiagnostics {
            matches: 40,
            inliers: Some(9),
            ..PairDiagnostics::attempt(3, 100, 90)
        };
        assert_eq!(
            attempt.to_string(),
            "frame 3: keypoints 100/90, matches 40, inliers 9 (22.5%), error -, canvas -, result -"
        );
        assert_eq!(PairDiagnostics::attempt(3, 0, 0).inlier_ratio(), 0.0);
    }

    #[test]
    fn test_match_weight_favors_fine_levels() {
        let keypoint = |scale: f32| Keypoint {
            x: 0.0,
            y: 0.0,
            scale,
            orientation: 0.0,
            response: 0.0,
            octave: 0,
        };
        assert_eq!(match_weight(&keypoint(1.0), &keypoint(1.0)), 1.0);
        assert!(match_weight(&keypoint(1.0), &keypoint(2.0)) < 0.5);
    }
}
