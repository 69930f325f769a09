//! Colour policies shared by the visualisation modes.
//!
//! All the helpers are pure and deterministic: the same identifiers always
//! map to the same colour, frame after frame.

use crate::math::Vec3;
use serde::{Deserialize, Serialize};

/// 8-bit RGBA colour, laid out as `r, g, b, a` in memory.
#[repr(C)]
#[derive(
    Debug,
    Copy,
    Clone,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    bytemuck::Pod,
    bytemuck::Zeroable,
)]
pub struct Rgba8 {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl Rgba8 {
    /// Opaque black, used for rays that hit nothing.
    pub const BLACK: Rgba8 = Rgba8::new(0, 0, 0, 255);

    /// Fully transparent black; freshly allocated buffers are filled with it.
    pub const TRANSPARENT: Rgba8 = Rgba8::new(0, 0, 0, 0);

    /// Creates a new colour.
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self { Self { r, g, b, a } }

    /// Creates an opaque colour.
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self { Self::new(r, g, b, 255) }

    /// Returns the channels as an array.
    pub const fn to_array(self) -> [u8; 4] { [self.r, self.g, self.b, self.a] }
}

/// Hashes three 32-bit values into one.
///
/// Only meant to decorrelate neighbouring identifiers, not to be
/// cryptographically strong.
pub const fn hash32(x: u32, y: u32, z: u32) -> u32 {
    let ha = 0xb543_c3a6 ^ x;
    let hb = 0x526f_94e2 ^ y;
    let hab = ha.wrapping_mul(hb);
    let hz0 = 0x53c5_ca59 ^ (hab >> 5);
    let hz1 = 0x7474_3c1b ^ z;
    hz0.wrapping_mul(hz1)
}

/// Maps a 32-bit seed to a float in `[0, 1)` using its low 23 bits as the
/// mantissa of a number in `[1, 2)`.
pub fn random_bounded(seed: u32) -> f32 { f32::from_bits(0x3f80_0000 | (seed & 0x007f_ffff)) - 1.0 }

/// Quantises a channel value in `[0, 1]` to 8 bits, rounding to nearest.
#[inline(always)]
pub fn quantise(value: f32) -> u8 { (value * 255.0 + 0.5) as u8 }

/// Converts a hue in `[0, 1]` to a fully saturated RGB colour.
fn hue_to_rgb(hue: f32) -> Vec3 {
    let r = (hue * 6.0 - 3.0).abs() - 1.0;
    let g = 2.0 - (hue * 6.0 - 2.0).abs();
    let b = 2.0 - (hue * 6.0 - 4.0).abs();
    Vec3::new(r, g, b).clamp(Vec3::ZERO, Vec3::ONE)
}

fn rgb_to_rgba8(rgb: Vec3) -> Rgba8 { Rgba8::opaque(quantise(rgb.x), quantise(rgb.y), quantise(rgb.z)) }

/// Returns a stable pseudo-random colour for the given identifiers.
///
/// # Arguments
///
/// * `seed` - Identifiers hashed into the hue.
/// * `dampening` - Brightness multiplier, usually the facing ratio.
pub fn random_colour(seed: [u32; 3], dampening: f32) -> Rgba8 {
    let hue = random_bounded(hash32(seed[0], seed[1], seed[2]));
    rgb_to_rgba8(hue_to_rgb(hue) * dampening)
}

/// Maps an intensity in `[0, 1]` onto a green (0) to yellow to red (1) ramp.
pub fn heatmap(intensity: f32, dampening: f32) -> Rgba8 {
    let hue = (1.0 - intensity) / 3.0;
    rgb_to_rgba8(hue_to_rgb(hue) * dampening)
}

/// How directly a surface faces the incoming ray, in `[0, 1]`.
pub fn facing_ratio(trace_dir: Vec3, normal: Vec3) -> f32 { (-trace_dir.dot(normal)).clamp(0.0, 1.0) }

/// Grey shade used when no triangle information can be retrieved for a hit.
pub fn greyscale(facing: f32) -> Rgba8 {
    let v = (127.0 * facing) as u8;
    Rgba8::opaque(v, v, v)
}

/// Blue shade marking triangle-mesh geometry whose hit triangle couldn't be
/// resolved.
pub fn unresolved_geometry(facing: f32) -> Rgba8 { Rgba8::opaque(0, 0, quantise(facing)) }

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn heatmap_ramp_end_points() {
        assert_eq!(heatmap(0.0, 1.0), Rgba8::opaque(0, 255, 0));
        assert_eq!(heatmap(0.5, 1.0), Rgba8::opaque(255, 255, 0));
        assert_eq!(heatmap(1.0, 1.0), Rgba8::opaque(255, 0, 0));
        assert_eq!(heatmap(1.0, 0.5), Rgba8::opaque(128, 0, 0));
    }

    #[test]
    fn random_colour_is_deterministic() {
        assert_eq!(random_colour([42, 7, 0], 1.0), random_colour([42, 7, 0], 1.0));
        assert_eq!(random_colour([42, 0, 0], 0.0), Rgba8::BLACK);
    }

    #[test]
    fn hash32_is_order_sensitive() {
        assert_ne!(hash32(1, 2, 0), hash32(2, 1, 0));
        assert_ne!(hash32(0, 0, 1), hash32(0, 0, 2));
    }

    #[test]
    fn facing_ratio_is_clamped() {
        let n = Vec3::Z;
        assert_eq!(facing_ratio(-Vec3::Z, n), 1.0);
        assert_eq!(facing_ratio(Vec3::Z, n), 0.0);
        assert_eq!(facing_ratio(Vec3::X, n), 0.0);
    }

    #[test]
    fn greyscale_and_unresolved_shades() {
        assert_eq!(greyscale(1.0), Rgba8::opaque(127, 127, 127));
        assert_eq!(greyscale(0.0), Rgba8::BLACK);
        assert_eq!(unresolved_geometry(1.0), Rgba8::opaque(0, 0, 255));
    }

    #[test]
    fn rgba8_memory_layout() {
        let pixels = [Rgba8::new(1, 2, 3, 4), Rgba8::new(5, 6, 7, 8)];
        let bytes: &[u8] = bytemuck::cast_slice(&pixels);
        assert_eq!(bytes, &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    proptest! {
        #[test]
        fn random_bounded_is_in_unit_interval(seed in any::<u32>()) {
            let v = random_bounded(seed);
            prop_assert!((0.0..1.0).contains(&v));
        }

        #[test]
        fn random_colour_is_opaque(x in any::<u32>(), y in any::<u32>(), damp in 0.0f32..=1.0) {
            prop_assert_eq!(random_colour([x, y, 0], damp).a, 255);
        }
    }
}
