use pano_image::Image;

/// Harris corner response evaluated at sparse locations.
#[derive(Debug, Clone, Copy)]
pub struct HarrisResponse {
    /// Side of the square window the structure tensor is accumulated over.
    pub block_size: usize,
    /// Harris sensitivity parameter.
    pub k: f32,
}

impl Default for HarrisResponse {
    fn default() -> Self {
        Self {
            block_size: 7,
            k: 0.04,
        }
    }
}

impl HarrisResponse {
    /// Set the sensitivity parameter.
    pub fn with_k(mut self, k: f32) -> Self {
        self.k = k;
        self
    }

    /// Compute `det(M) - k * trace(M)^2` at each `[row, col]` location.
    ///
    /// Gradients come from 3x3 Sobel kernels; pixels outside the image are
    /// replicated from the border.
    pub fn compute_at(&self, src: &Image<f32, 1>, points: &[[usize; 2]]) -> Vec<f32> {
        let (cols, rows) = (src.cols() as isize, src.rows() as isize);
        if cols == 0 || rows == 0 {
            return vec![0.0; points.len()];
        }

        let data = src.as_slice();
        let at = |r: isize, c: isize| -> f32 {
            let r = r.clamp(0, rows - 1);
            let c = c.clamp(0, cols - 1);
            data[(r * cols + c) as usize]
        };

        let half = (self.block_size / 2) as isize;

        points
            .iter()
            .map(|&[r0, c0]| {
                let (r0, c0) = (r0 as isize, c0 as isize);
                let (mut sxx, mut syy, mut sxy) = (0.0f32, 0.0f32, 0.0f32);

                for r in r0 - half..=r0 + half {
                    for c in c0 - half..=c0 + half {
                        let dx = (at(r - 1, c + 1) + 2.0 * at(r, c + 1) + at(r + 1, c + 1))
                            - (at(r - 1, c - 1) + 2.0 * at(r, c - 1) + at(r + 1, c - 1));
                        let dy = (at(r + 1, c - 1) + 2.0 * at(r + 1, c) + at(r + 1, c + 1))
                            - (at(r - 1, c - 1) + 2.0 * at(r - 1, c) + at(r - 1, c + 1));
                        sxx += dx * dx;
                        syy += dy * dy;
                        sxy += dx * dy;
                    }
                }

                let det = sxx * syy - sxy * sxy;
                let trace = sxx + syy;
                det - self.k * trace * trace
            })
            .collect()
    }
}
