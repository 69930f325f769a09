//! Per-tile sample position patterns.
//!
//! Each frame, every tile of the target contributes exactly one traced pixel.
//! The pattern decides which pixel of the tile that is for a given frame.

use crate::{
    color::hash32,
    math::{frac_f64, UVec2},
    Error,
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Plastic-number based low discrepancy constants of the R2 sequence.
const R2_G1: f64 = 0.754_877_666_246_692_8;
const R2_G2: f64 = 0.569_840_290_998_053_3;

/// Pattern used to pick the pixel of a tile to trace this frame.
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplingPattern {
    /// Scan the tile row by row; repeats every `tile_size²` frames.
    Linear,
    /// R2 low-discrepancy sequence, offset per tile by a hash of its origin.
    #[default]
    R2,
}

impl SamplingPattern {
    /// All the sampling patterns, in index order.
    pub const ALL: [SamplingPattern; 2] = [SamplingPattern::Linear, SamplingPattern::R2];

    /// Returns the pixel of the tile starting at `tile` to trace at `frame`.
    pub fn next_tile_sample(self, tile: UVec2, tile_size: u32, frame: u32) -> UVec2 {
        match self {
            SamplingPattern::Linear => Linear::next_tile_sample(tile, tile_size, frame),
            SamplingPattern::R2 => R2::next_tile_sample(tile, tile_size, frame),
        }
    }
}

impl TryFrom<u32> for SamplingPattern {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(Error::InvalidSamplingPattern(value))
    }
}

impl Display for SamplingPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SamplingPattern::Linear => write!(f, "Linear"),
            SamplingPattern::R2 => write!(f, "R2"),
        }
    }
}

/// Sampling pattern known at compile time, used to specialise trace kernels.
pub trait SamplingStrategy: Send + Sync + 'static {
    /// The runtime value this strategy corresponds to.
    const PATTERN: SamplingPattern;

    /// Returns the pixel of the tile starting at `tile` to trace at `frame`.
    ///
    /// The returned position always lies in
    /// `[tile, tile + tile_size)` on both axes; it may fall outside of the
    /// image for partial tiles on the right and bottom edges.
    fn next_tile_sample(tile: UVec2, tile_size: u32, frame: u32) -> UVec2;
}

/// Row-major scan of the tile.
#[derive(Debug, Copy, Clone, Default)]
pub struct Linear;

impl SamplingStrategy for Linear {
    const PATTERN: SamplingPattern = SamplingPattern::Linear;

    #[inline]
    fn next_tile_sample(tile: UVec2, tile_size: u32, frame: u32) -> UVec2 {
        debug_assert!(tile_size > 0, "tile size must be positive");
        tile + UVec2::new(frame % tile_size, (frame / tile_size) % tile_size)
    }
}

/// R2 quasi-random sequence.
#[derive(Debug, Copy, Clone, Default)]
pub struct R2;

impl SamplingStrategy for R2 {
    const PATTERN: SamplingPattern = SamplingPattern::R2;

    #[inline]
    fn next_tile_sample(tile: UVec2, tile_size: u32, frame: u32) -> UVec2 {
        debug_assert!(tile_size > 0, "tile size must be positive");
        let seq = frame.wrapping_add(hash32(tile.x, tile.y, 0)) as f64;
        let size = tile_size as f64;
        let x = (frac_f64(R2_G1 * seq) * size) as u32;
        let y = (frac_f64(R2_G2 * seq) * size) as u32;
        tile + UVec2::new(x.min(tile_size - 1), y.min(tile_size - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn linear_visits_every_pixel_of_a_tile_once() {
        let tile = UVec2::new(16, 8);
        let visited: HashSet<UVec2> = (0..64)
            .map(|frame| Linear::next_tile_sample(tile, 8, frame))
            .collect();
        assert_eq!(visited.len(), 64);
        assert!(visited.contains(&UVec2::new(16, 8)));
        assert!(visited.contains(&UVec2::new(23, 15)));
    }

    #[test]
    fn linear_sequence_order() {
        let tile = UVec2::ZERO;
        assert_eq!(Linear::next_tile_sample(tile, 4, 0), UVec2::new(0, 0));
        assert_eq!(Linear::next_tile_sample(tile, 4, 3), UVec2::new(3, 0));
        assert_eq!(Linear::next_tile_sample(tile, 4, 4), UVec2::new(0, 1));
        assert_eq!(Linear::next_tile_sample(tile, 4, 16), UVec2::new(0, 0));
    }

    #[test]
    fn r2_differs_between_tiles() {
        let a: Vec<UVec2> = (0..16).map(|f| R2::next_tile_sample(UVec2::ZERO, 8, f)).collect();
        let b: Vec<UVec2> = (0..16)
            .map(|f| R2::next_tile_sample(UVec2::new(8, 0), 8, f) - UVec2::new(8, 0))
            .collect();
        assert_ne!(a, b);
    }

    #[test]
    fn r2_spreads_a_full_period_over_the_tile() {
        for tx in 0..8 {
            for ty in 0..8 {
                let tile = UVec2::new(tx * 8, ty * 8);
                let offsets: Vec<UVec2> = (0..64).map(|f| R2::next_tile_sample(tile, 8, f) - tile).collect();
                let mut quadrants = [0u32; 4];
                for p in &offsets {
                    quadrants[(p.x / 4 + 2 * (p.y / 4)) as usize] += 1;
                }
                assert!(
                    quadrants.iter().all(|&n| (12..=20).contains(&n)),
                    "tile {:?}: {:?}",
                    tile,
                    quadrants
                );
                let distinct: HashSet<UVec2> = offsets.into_iter().collect();
                assert!(distinct.len() >= 40, "tile {:?}: {} distinct", tile, distinct.len());
            }
        }
    }

    #[test]
    fn pattern_from_index() {
        assert_eq!(SamplingPattern::try_from(0).unwrap(), SamplingPattern::Linear);
        assert_eq!(SamplingPattern::try_from(1).unwrap(), SamplingPattern::R2);
        assert!(SamplingPattern::try_from(2).is_err());
    }

    proptest! {
        #[test]
        fn samples_stay_inside_the_tile(
            tx in 0u32..512,
            ty in 0u32..512,
            ts in 2u32..=128,
            frame in any::<u32>(),
        ) {
            let tile = UVec2::new(tx * ts, ty * ts);
            for pattern in SamplingPattern::ALL {
                let p = pattern.next_tile_sample(tile, ts, frame);
                prop_assert!(p.x >= tile.x && p.x < tile.x + ts);
                prop_assert!(p.y >= tile.y && p.y < tile.y + ts);
            }
        }
    }
}
