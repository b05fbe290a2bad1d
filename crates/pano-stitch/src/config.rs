use std::path::Path;

use pano_geometry::RansacParams;
use pano_imgproc::features::OrbDetector;
use serde::{Deserialize, Serialize};

/// Lower bound of the ratio threshold reachable through [`StitchConfig::adjust_ratio`].
pub const MIN_ADJUSTED_RATIO: f32 = 0.1;

/// Upper bound of the ratio threshold reachable through [`StitchConfig::adjust_ratio`].
pub const MAX_ADJUSTED_RATIO: f32 = 0.95;

/// Errors raised by an invalid or unreadable configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A parameter lies outside of its domain.
    #[error("invalid {field}: {value} (expected {expected})")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// Offending value.
        value: String,
        /// Human readable domain of the field.
        expected: &'static str,
    },

    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Parameters of the stitching pipeline.
///
/// Missing fields take their default value when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    /// Lowe's ratio test threshold.
    pub ratio_threshold: f32,
    /// Minimum number of matches, also the minimum RANSAC support.
    pub min_match_count: usize,
    /// RANSAC inlier threshold in pixels.
    pub ransac_tolerance: f64,
    /// Maximum number of keypoints per image.
    pub max_features: usize,
    /// Upper bound on RANSAC iterations.
    pub ransac_max_iterations: usize,
    /// RANSAC confidence driving the adaptive iteration count.
    pub ransac_confidence: f64,
    /// Seed for RANSAC sampling, OS entropy when unset.
    pub random_seed: Option<u64>,
    /// Largest canvas, in pixels, a single stitch may allocate.
    pub max_canvas_pixels: usize,
    /// Extract the features of every frame in parallel before stitching.
    pub parallel_extraction: bool,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            ratio_threshold: 0.75,
            min_match_count: 15,
            ransac_tolerance: 5.0,
            max_features: 3000,
            ransac_max_iterations: 2000,
            ransac_confidence: 0.995,
            random_seed: None,
            max_canvas_pixels: 64_000_000,
            parallel_extraction: true,
        }
    }
}

fn out_of_range(field: &'static str, value: impl ToString, expected: &'static str) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        value: value.to_string(),
        expected,
    }
}

impl StitchConfig {
    /// Set the ratio test threshold.
    pub fn with_ratio_threshold(mut self, ratio_threshold: f32) -> Self {
        self.ratio_threshold = ratio_threshold;
        self
    }

    /// Set the minimum number of matches.
    pub fn with_min_match_count(mut self, min_match_count: usize) -> Self {
        self.min_match_count = min_match_count;
        self
    }

    /// Set the RANSAC inlier threshold in pixels.
    pub fn with_ransac_tolerance(mut self, ransac_tolerance: f64) -> Self {
        self.ransac_tolerance = ransac_tolerance;
        self
    }

    /// Set the keypoint budget per image.
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the RANSAC iteration bound.
    pub fn with_ransac_max_iterations(mut self, ransac_max_iterations: usize) -> Self {
        self.ransac_max_iterations = ransac_max_iterations;
        self
    }

    /// Set the RANSAC confidence.
    pub fn with_ransac_confidence(mut self, ransac_confidence: f64) -> Self {
        self.ransac_confidence = ransac_confidence;
        self
    }

    /// Set the RANSAC seed.
    pub fn with_random_seed(mut self, random_seed: Option<u64>) -> Self {
        self.random_seed = random_seed;
        self
    }

    /// Set the canvas size limit.
    pub fn with_max_canvas_pixels(mut self, max_canvas_pixels: usize) -> Self {
        self.max_canvas_pixels = max_canvas_pixels;
        self
    }

    /// Enable or disable parallel feature extraction.
    pub fn with_parallel_extraction(mut self, parallel_extraction: bool) -> Self {
        self.parallel_extraction = parallel_extraction;
        self
    }

    /// Shift the ratio threshold by `delta`, clamped to `[0.1, 0.95]`.
    pub fn adjust_ratio(mut self, delta: f32) -> Self {
        self.ratio_threshold =
            (self.ratio_threshold + delta).clamp(MIN_ADJUSTED_RATIO, MAX_ADJUSTED_RATIO);
        self
    }

    /// Check that every parameter lies in its domain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ratio_threshold > 0.0 && self.ratio_threshold <= 1.0) {
            return Err(out_of_range(
                "ratio_threshold",
                self.ratio_threshold,
                "a value in (0, 1]",
            ));
        }
        if self.min_match_count < 4 {
            return Err(out_of_range(
                "min_match_count",
                self.min_match_count,
                "at least 4",
            ));
        }
        if !(self.ransac_tolerance > 0.0) || !self.ransac_tolerance.is_finite() {
            return Err(out_of_range(
                "ransac_tolerance",
                self.ransac_tolerance,
                "a positive finite value",
            ));
        }
        if self.max_features == 0 {
            return Err(out_of_range("max_features", 0, "a positive value"));
        }
        if self.ransac_max_iterations == 0 {
            return Err(out_of_range("ransac_max_iterations", 0, "a positive value"));
        }
        if !(self.ransac_confidence > 0.0 && self.ransac_confidence < 1.0) {
            return Err(out_of_range(
                "ransac_confidence",
                self.ransac_confidence,
                "a value in (0, 1)",
            ));
        }
        if self.max_canvas_pixels == 0 {
            return Err(out_of_range("max_canvas_pixels", 0, "a positive value"));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: StitchConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serialize the configuration to pretty printed JSON.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// RANSAC parameters derived from this configuration.
    pub fn ransac_params(&self) -> RansacParams {
        RansacParams {
            max_iterations: self.ransac_max_iterations,
            threshold: self.ransac_tolerance,
            min_inliers: self.min_match_count,
            confidence: self.ransac_confidence,
            random_seed: self.random_seed,
        }
    }

    /// Feature extractor derived from this configuration.
    pub fn orb_detector(&self) -> OrbDetector {
        OrbDetector::new(self.max_features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_is_valid() -> Result<(), ConfigError> {
        let config = StitchConfig::default();
        config.validate()?;
        assert_eq!(config.min_match_count, 15);
        assert_eq!(config.max_canvas_pixels, 64_000_000);
        Ok(())
    }

    #[test]
    fn test_invalid_fields() {
        let cases = [
            StitchConfig::default().with_ratio_threshold(0.0),
            StitchConfig::default().with_ratio_threshold(1.5),
            StitchConfig::default().with_min_match_count(3),
            StitchConfig::default().with_ransac_tolerance(-1.0),
            StitchConfig::default().with_max_features(0),
            StitchConfig::default().with_ransac_max_iterations(0),
            StitchConfig::default().with_ransac_confidence(1.0),
            StitchConfig::default().with_max_canvas_pixels(0),
        ];
        for config in cases {
            assert!(matches!(
                config.validate(),
                Err(ConfigError::OutOfRange { .. })
            ));
        }
    }

    #[test]
    fn test_adjust_ratio_clamps() {
        let config = StitchConfig::default().adjust_ratio(0.05);
        assert_relative_eq!(config.ratio_threshold, 0.8);
        let config = config.adjust_ratio(1.0);
        assert_relative_eq!(config.ratio_threshold, MAX_ADJUSTED_RATIO);
        let config = config.adjust_ratio(-5.0);
        assert_relative_eq!(config.ratio_threshold, MIN_ADJUSTED_RATIO);
    }

    #[test]
    fn test_json_partial_and_roundtrip() -> Result<(), ConfigError> {
        let config = StitchConfig::from_json_str(r#"{ "ratio_threshold": 0.7, "random_seed": 3 }"#)?;
        assert_relative_eq!(config.ratio_threshold, 0.7);
        assert_eq!(config.random_seed, Some(3));
        assert_eq!(config.max_features, 3000);

        let json = config.to_json_string()?;
        assert_eq!(StitchConfig::from_json_str(&json)?, config);
        Ok(())
    }

    #[test]
    fn test_json_rejects_invalid() {
        assert!(matches!(
            StitchConfig::from_json_str(r#"{ "ransac_confidence": 2.0 }"#),
            Err(ConfigError::OutOfRange { field: "ransac_confidence", .. })
        ));
        assert!(matches!(
            StitchConfig::from_json_str("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_json_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "max_features": 500 }"#)?;
        let config = StitchConfig::from_json_file(&path)?;
        assert_eq!(config.max_features, 500);
        assert!(matches!(
            StitchConfig::from_json_file(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
        Ok(())
    }

    #[test]
    fn test_derived_params() {
        let config = StitchConfig::default().with_random_seed(Some(9));
        let params = config.ransac_params();
        assert_eq!(params.min_inliers, 15);
        assert_eq!(params.random_seed, Some(9));
        assert_eq!(config.orb_detector().max_features, 3000);
    }
}
