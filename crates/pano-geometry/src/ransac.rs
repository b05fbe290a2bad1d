use glam::{DMat3, DVec2};
use log::debug;
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    homography::check_weights, homography_4pt2d, homography_dlt_weighted,
    homography_reproj_error, refine_homography, HomographyError, RefineParams,
};

/// Size of the minimal sample of a homography.
const SAMPLE_SIZE: usize = 4;

/// Maximum rounds of refit, re-score and refine after sampling.
const REFINE_ROUNDS: usize = 10;

/// Parameters for RANSAC homography estimation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RansacParams {
    /// Maximum number of RANSAC iterations.
    pub max_iterations: usize,
    /// Inlier threshold on the reprojection error, in pixels.
    pub threshold: f64,
    /// Minimum number of inliers required for acceptance.
    pub min_inliers: usize,
    /// Desired probability of drawing at least one outlier free sample.
    pub confidence: f64,
    /// Optional RNG seed for deterministic runs, OS entropy otherwise.
    pub random_seed: Option<u64>,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            threshold: 5.0,
            min_inliers: 15,
            confidence: 0.995,
            random_seed: None,
        }
    }
}

impl RansacParams {
    /// Check that every parameter lies in its domain.
    pub fn validate(&self) -> Result<(), HomographyError> {
        if self.max_iterations == 0 {
            return Err(HomographyError::InvalidParameter(
                "max_iterations must be positive".into(),
            ));
        }
        if !(self.threshold > 0.0) || !self.threshold.is_finite() {
            return Err(HomographyError::InvalidParameter(format!(
                "threshold must be positive, got {}",
                self.threshold
            )));
        }
        if self.min_inliers < SAMPLE_SIZE {
            return Err(HomographyError::InvalidParameter(format!(
                "min_inliers must be at least {SAMPLE_SIZE}, got {}",
                self.min_inliers
            )));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(HomographyError::InvalidParameter(format!(
                "confidence must lie in (0, 1), got {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// A homography fitted by RANSAC together with its support.
#[derive(Clone, Debug)]
pub struct HomographyEstimate {
    /// Homography mapping source points onto destination points.
    pub model: DMat3,
    /// Per-correspondence inlier mask.
    pub inliers: Vec<bool>,
    /// Number of inliers.
    pub inlier_count: usize,
    /// Mean reprojection error of the inliers, in pixels.
    pub mean_error: f64,
    /// Number of sampling iterations performed.
    pub iterations: usize,
}

impl HomographyEstimate {
    /// Fraction of correspondences supporting the model.
    pub fn inlier_ratio(&self) -> f64 {
        if self.inliers.is_empty() {
            return 0.0;
        }
        self.inlier_count as f64 / self.inliers.len() as f64
    }
}

struct Support {
    inliers: Vec<bool>,
    count: usize,
    sum_sq: f64,
}

fn score_model(h: &DMat3, src: &[DVec2], dst: &[DVec2], threshold_sq: f64) -> Support {
    let mut inliers = vec![false; src.len()];
    let mut count = 0usize;
    let mut sum_sq = 0.0f64;
    for (i, (&p, &q)) in src.iter().zip(dst.iter()).enumerate() {
        let d = homography_reproj_error(h, p, q);
        if d <= threshold_sq {
            inliers[i] = true;
            count += 1;
            sum_sq += d;
        }
    }
    Support {
        inliers,
        count,
        sum_sq,
    }
}

fn mean_inlier_error(h: &DMat3, src: &[DVec2], dst: &[DVec2], inliers: &[bool]) -> f64 {
    let (sum, count) = src
        .iter()
        .zip(dst.iter())
        .zip(inliers.iter())
        .filter(|(_, &is_inlier)| is_inlier)
        .fold((0.0f64, 0usize), |(sum, count), ((&p, &q), _)| {
            (sum + homography_reproj_error(h, p, q).sqrt(), count + 1)
        });
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Number of iterations needed to draw an all-inlier sample with the given confidence.
fn required_iterations(inlier_ratio: f64, confidence: f64, max_iterations: usize) -> usize {
    let ws = inlier_ratio.powi(SAMPLE_SIZE as i32);
    if ws >= 1.0 - 1e-12 {
        return 1;
    }
    if ws <= 1e-12 {
        return max_iterations;
    }
    let log_conf = (1.0 - confidence).max(1e-12).ln();
    let log_denom = (1.0 - ws).ln();
    let est = (log_conf / log_denom).ceil();
    if est.is_finite() && est > 0.0 {
        (est as usize).clamp(1, max_iterations)
    } else {
        max_iterations
    }
}

fn select<T: Copy>(values: &[T], inliers: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(inliers.iter())
        .filter(|(_, &is_inlier)| is_inlier)
        .map(|(&v, _)| v)
        .collect()
}

/// Refit, refine and re-score the sampled winner until its inlier set settles.
fn polish(
    sampled: DMat3,
    sampled_support: Support,
    src: &[DVec2],
    dst: &[DVec2],
    weights: &[f64],
    params: &RansacParams,
    threshold_sq: f64,
) -> (DMat3, Support) {
    let floor = params.min_inliers.max((sampled_support.count * 9).div_ceil(10));
    let mut model = sampled;
    let mut support = sampled_support;

    for round in 0..REFINE_ROUNDS {
        let s = select(src, &support.inliers);
        let d = select(dst, &support.inliers);
        let w = select(weights, &support.inliers);

        // the algebraic fit only seeds the first round
        let start = if round == 0 {
            homography_dlt_weighted(&s, &d, &w).unwrap_or(model)
        } else {
            model
        };

        let refined = match refine_homography(&start, &s, &d, &w, &RefineParams::default()) {
            Ok(h) => h,
            Err(e) => {
                debug!("ransac: refinement failed in round {round} ({e})");
                break;
            }
        };

        let refined_support = score_model(&refined, src, dst, threshold_sq);
        if refined_support.count < floor {
            debug!(
                "ransac: refinement lost support in round {round} ({} < {floor})",
                refined_support.count
            );
            break;
        }

        let settled = refined_support.inliers == support.inliers;
        model = refined;
        support = refined_support;
        if settled {
            break;
        }
    }

    (model, support)
}

/// Robustly estimate the homography mapping `src` onto `dst`.
///
/// Same as [`ransac_homography_weighted`] with every correspondence weighted one.
pub fn ransac_homography(
    src: &[DVec2],
    dst: &[DVec2],
    params: &RansacParams,
) -> Result<HomographyEstimate, HomographyError> {
    ransac_homography_weighted(src, dst, &vec![1.0; src.len()], params)
}

/// Robustly estimate the homography mapping `src` onto `dst`, with a
/// confidence weight per correspondence.
///
/// Minimal samples of four correspondences are solved with the normalized DLT;
/// samples with three near-collinear points on either side are skipped. The
/// candidate with the most inliers wins, ties going to the lower summed squared
/// error. The iteration count adapts to the best inlier ratio and the requested
/// confidence, bounded by `max_iterations`.
///
/// The winner is then polished in rounds: a weighted DLT over its inliers seeds
/// [`refine_homography`], the refined model is re-scored on every
/// correspondence, and the rounds stop once the inlier set no longer changes.
/// A refined model is kept only while it has at least `min_inliers` inliers and
/// nine tenths of the sampled support. The weights only steer the refinement,
/// inliers are always counted one each.
///
/// # Errors
///
/// * [`HomographyError::InvalidInput`] for fewer than four or unequal point sets.
/// * [`HomographyError::InvalidParameter`] for out of domain parameters or weights.
/// * [`HomographyError::AllSamplesDegenerate`] when no sample produced a model.
/// * [`HomographyError::InsufficientInliers`] when the best model has fewer than
///   `min_inliers` inliers.
pub fn ransac_homography_weighted(
    src: &[DVec2],
    dst: &[DVec2],
    weights: &[f64],
    params: &RansacParams,
) -> Result<HomographyEstimate, HomographyError> {
    params.validate()?;

    let n = src.len();
    if n != dst.len() || n < SAMPLE_SIZE {
        return Err(HomographyError::InvalidInput {
            required: SAMPLE_SIZE,
            src: n,
            dst: dst.len(),
        });
    }
    check_weights(weights, n)?;

    let mut rng = match params.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => {
            let mut tr = rand::rng();
            StdRng::from_rng(&mut tr)
        }
    };

    let threshold_sq = params.threshold * params.threshold;

    let mut best: Option<(DMat3, Support)> = None;
    let mut iter = 0usize;
    let mut degenerate = 0usize;
    let mut required_iters = params.max_iterations;

    while iter < required_iters {
        iter += 1;

        let sample = rand::seq::index::sample(&mut rng, n, SAMPLE_SIZE);
        let mut s1 = [DVec2::ZERO; SAMPLE_SIZE];
        let mut s2 = [DVec2::ZERO; SAMPLE_SIZE];
        for (i, idx) in sample.iter().enumerate() {
            s1[i] = src[idx];
            s2[i] = dst[idx];
        }

        let h = match homography_4pt2d(&s1, &s2) {
            Ok(h) => h,
            Err(_) => {
                degenerate += 1;
                continue;
            }
        };

        let support = score_model(&h, src, dst, threshold_sq);
        let is_better = match &best {
            None => true,
            Some((_, b)) => {
                support.count > b.count || (support.count == b.count && support.sum_sq < b.sum_sq)
            }
        };

        if is_better {
            let ratio = support.count as f64 / n as f64;
            required_iters = required_iters.min(required_iterations(
                ratio,
                params.confidence,
                params.max_iterations,
            ));
            best = Some((h, support));
        }
    }

    let (model, support) = best.ok_or(HomographyError::AllSamplesDegenerate(degenerate))?;

    if support.count < params.min_inliers {
        return Err(HomographyError::InsufficientInliers {
            found: support.count,
            required: params.min_inliers,
        });
    }

    let (model, support) = polish(model, support, src, dst, weights, params, threshold_sq);

    let mean_error = mean_inlier_error(&model, src, dst, &support.inliers);

    debug!(
        "ransac: {}/{} inliers after {} iterations ({} degenerate), mean error {:.3}px",
        support.count, n, iter, degenerate, mean_error
    );

    Ok(HomographyEstimate {
        model,
        inliers: support.inliers,
        inlier_count: support.count,
        mean_error,
        iterations: iter,
    })
}
