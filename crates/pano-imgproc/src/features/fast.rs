use pano_image::{Image, ImageError};
use rayon::prelude::*;

/// Bresenham circle of radius 3 as `(dx, dy)` offsets, clockwise from the top.
const CIRCLE: [(isize, isize); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Contiguous circle pixels a corner needs, FAST-9.
const ARC_LENGTH: usize = 9;

/// Segment test corner detector.
///
/// Operates on normalized `[0, 1]` intensity images.
#[derive(Debug, Clone, Copy)]
pub struct FastDetector {
    /// Intensity difference a circle pixel needs to count as brighter or darker.
    pub threshold: f32,
    /// Apply 3x3 non-maximum suppression on the corner score.
    pub nonmax_suppression: bool,
}

impl Default for FastDetector {
    fn default() -> Self {
        Self {
            threshold: 20.0 / 255.0,
            nonmax_suppression: true,
        }
    }
}

impl FastDetector {
    /// Create a FAST-9 detector with the given threshold.
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    /// Detect corners in the image.
    ///
    /// # Returns
    ///
    /// The `[row, col]` coordinates of the detected corners in scan order.
    pub fn detect(&self, src: &Image<f32, 1>) -> Result<Vec<[usize; 2]>, ImageError> {
        let (cols, rows) = (src.cols(), src.rows());
        if cols < 7 || rows < 7 {
            return Ok(Vec::new());
        }

        let data = src.as_slice();
        let offsets: Vec<isize> = CIRCLE
            .iter()
            .map(|&(dx, dy)| dy * cols as isize + dx)
            .collect();

        let mut scores = vec![0.0f32; data.len()];
        scores
            .par_chunks_exact_mut(cols)
            .enumerate()
            .skip(3)
            .take(rows - 6)
            .for_each(|(r, row_scores)| {
                for (c, score) in row_scores.iter_mut().enumerate().take(cols - 3).skip(3) {
                    *score = self.corner_score(data, (r * cols + c) as isize, &offsets);
                }
            });

        let corners = (3..rows - 3)
            .into_par_iter()
            .flat_map_iter(|r| {
                let scores = &scores;
                (3..cols - 3).filter_map(move |c| {
                    let idx = r * cols + c;
                    let s = scores[idx];
                    if s <= 0.0 {
                        return None;
                    }
                    if self.nonmax_suppression && !is_local_max(scores, idx, cols) {
                        return None;
                    }
                    Some([r, c])
                })
            })
            .collect();

        Ok(corners)
    }

    /// Score of the pixel at `idx`, zero when it is not a corner.
    ///
    /// The score is the summed excess contrast over the circle.
    fn corner_score(&self, data: &[f32], idx: isize, offsets: &[isize]) -> f32 {
        let center = data[idx as usize];
        let upper = center + self.threshold;
        let lower = center - self.threshold;

        let mut pixels = [0.0f32; 16];
        pixels
            .iter_mut()
            .zip(offsets)
            .for_each(|(p, &off)| *p = data[(idx + off) as usize]);

        // an arc of nine covers at least two compass points
        let compass = [pixels[0], pixels[4], pixels[8], pixels[12]];
        let brighter = compass.iter().filter(|&&p| p > upper).count();
        let darker = compass.iter().filter(|&&p| p < lower).count();
        if brighter < 2 && darker < 2 {
            return 0.0;
        }

        let mut brighter_run = 0usize;
        let mut darker_run = 0usize;
        let mut is_corner = false;
        for i in 0..16 + ARC_LENGTH - 1 {
            let p = pixels[i % 16];
            if p > upper {
                brighter_run += 1;
                darker_run = 0;
            } else if p < lower {
                darker_run += 1;
                brighter_run = 0;
            } else {
                brighter_run = 0;
                darker_run = 0;
            }
            if brighter_run >= ARC_LENGTH || darker_run >= ARC_LENGTH {
                is_corner = true;
                break;
            }
        }

        if !is_corner {
            return 0.0;
        }

        pixels
            .iter()
            .map(|&p| ((p - center).abs() - self.threshold).max(0.0))
            .sum()
    }
}

/// Ties are resolved in favour of the pixel met first in scan order.
fn is_local_max(scores: &[f32], idx: usize, cols: usize) -> bool {
    let s = scores[idx];
    let neighbors = [
        idx - cols - 1,
        idx - cols,
        idx - cols + 1,
        idx - 1,
        idx + 1,
        idx + cols - 1,
        idx + cols,
        idx + cols + 1,
    ];
    neighbors.iter().all(|&n| {
        let ns = scores[n];
        if n < idx {
            s > ns
        } else {
            s >= ns
        }
    })
}
