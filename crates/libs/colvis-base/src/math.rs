//! Math utilities.

pub use glam::*;

/// Returns the fractional part of a double precision number, in `[0, 1)`.
#[inline(always)]
pub fn frac_f64(x: f64) -> f64 { x - x.floor() }

/// Integer division rounding towards positive infinity.
#[inline(always)]
pub const fn div_round_up(numerator: u64, denominator: u64) -> u64 {
    (numerator + denominator - 1) / denominator
}

/// Transforms a normal by the inverse transpose of the linear part of the
/// given affine transformation.
pub fn transform_normal(transform: &Affine3A, normal: Vec3) -> Vec3 {
    transform
        .matrix3
        .inverse()
        .transpose()
        .mul_vec3(normal)
        .normalize_or_zero()
}
