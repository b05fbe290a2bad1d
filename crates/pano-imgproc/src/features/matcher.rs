use rayon::prelude::*;

/// A fixed length feature descriptor with a distance metric.
pub trait Descriptor: Sync {
    /// Distance to another descriptor of the same kind.
    fn distance(&self, other: &Self) -> f32;
}

/// Hamming distance between two fixed-size byte descriptors.
#[inline]
pub fn hamming_distance(a: &[u8], b: &[u8]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x ^ y).count_ones())
        .sum()
}

impl<const N: usize> Descriptor for [u8; N] {
    #[inline]
    fn distance(&self, other: &Self) -> f32 {
        hamming_distance(self, other) as f32
    }
}

impl<const N: usize> Descriptor for [f32; N] {
    #[inline]
    fn distance(&self, other: &Self) -> f32 {
        self.iter()
            .zip(other.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }
}

/// An accepted match between a query and a reference descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    /// Index into the query descriptors.
    pub query_idx: usize,
    /// Index into the reference descriptors.
    pub reference_idx: usize,
    /// Distance between the two descriptors.
    pub distance: f32,
}

/// Brute force k=2 matching with Lowe's ratio test.
///
/// A query is matched to its nearest reference only when
/// `d(nearest) < ratio * d(second nearest)` holds strictly. Results keep the
/// query order. Fewer than two descriptors on either side yield no matches.
///
/// # Example
///
/// ```
/// use pano_imgproc::features::match_ratio_test;
///
/// let query = [[0b0000_0000u8], [0b1111_0000u8]];
/// let reference = [[0b0000_0001u8], [0b1111_1111u8], [0b1111_0000u8]];
///
/// let matches = match_ratio_test(&query, &reference, 0.75);
/// assert_eq!(matches.len(), 2);
/// assert_eq!(matches[1].reference_idx, 2);
/// ```
pub fn match_ratio_test<D: Descriptor>(
    query: &[D],
    reference: &[D],
    ratio: f32,
) -> Vec<Correspondence> {
    if query.len() < 2 || reference.len() < 2 {
        return Vec::new();
    }

    query
        .par_iter()
        .enumerate()
        .filter_map(|(query_idx, q)| {
            let mut best = f32::INFINITY;
            let mut second = f32::INFINITY;
            let mut best_idx = 0usize;

            for (j, r) in reference.iter().enumerate() {
                let d = q.distance(r);
                if d < best {
                    second = best;
                    best = d;
                    best_idx = j;
                } else if d < second {
                    second = d;
                }
            }

            (best < ratio * second).then_some(Correspondence {
                query_idx,
                reference_idx: best_idx,
                distance: best,
            })
        })
        .collect()
}
