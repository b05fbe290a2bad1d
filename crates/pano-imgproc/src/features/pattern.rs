use std::sync::OnceLock;

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Number of binary tests of the descriptor.
pub(crate) const PATTERN_SIZE: usize = 256;

/// Points are drawn inside this radius so that any rotation stays within the
/// orientation patch.
const PATTERN_RADIUS: i32 = 13;

const PATTERN_SEED: u64 = 0x0b5e_55ed;

/// A pair of `(dx, dy)` sampling offsets compared by one descriptor bit.
pub(crate) type PatternPair = [[f32; 2]; 2];

/// The fixed sampling pattern shared by every extractor.
pub(crate) fn sampling_pattern() -> &'static [PatternPair] {
    static PATTERN: OnceLock<Vec<PatternPair>> = OnceLock::new();
    PATTERN.get_or_init(|| generate_pattern(PATTERN_SIZE, PATTERN_RADIUS, PATTERN_SEED))
}

fn generate_pattern(count: usize, radius: i32, seed: u64) -> Vec<PatternPair> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut sample_point = || loop {
        let dx = rng.random_range(-radius..=radius);
        let dy = rng.random_range(-radius..=radius);
        if dx * dx + dy * dy <= radius * radius {
            return [dx, dy];
        }
    };

    let mut pairs = Vec::with_capacity(count);
    while pairs.len() < count {
        let p0 = sample_point();
        let p1 = sample_point();
        if p0 != p1 {
            pairs.push([
                [p0[0] as f32, p0[1] as f32],
                [p1[0] as f32, p1[1] as f32],
            ]);
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_is_fixed_and_bounded() {
        let pattern = sampling_pattern();
        assert_eq!(pattern.len(), PATTERN_SIZE);
        assert_eq!(pattern, generate_pattern(PATTERN_SIZE, PATTERN_RADIUS, PATTERN_SEED));

        let r2 = (PATTERN_RADIUS * PATTERN_RADIUS) as f32;
        for pair in pattern {
            assert_ne!(pair[0], pair[1]);
            for p in pair {
                assert!(p[0] * p[0] + p[1] * p[1] <= r2);
            }
        }
    }
}
