//! # kinetix_math - 2D Math Primitives
//!
//! Small value types used by the rigid-body solver: a 2-vector, a 2x2
//! rotation matrix, and the scalar helpers the solver relies on for
//! deterministic tie-breaking and division guards.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod vector;
pub mod matrix;

pub use vector::*;
pub use matrix::*;

/// Common math constants
pub mod consts {
    pub const PI: f32 = core::f32::consts::PI;
    pub const TAU: f32 = PI * 2.0;
    pub const FRAC_PI_2: f32 = PI / 2.0;
    pub const EPSILON: f32 = 1e-6;
}

/// Clamp value between min and max
///
/// Unlike `f32::clamp` this does not panic when `min > max`.
#[inline]
pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    if value < min { min }
    else if value > max { max }
    else { value }
}

/// Replace an exact zero with one before it is used as a divisor.
#[inline]
pub fn zero_to_one(x: f32) -> f32 {
    if x == 0.0 { 1.0 } else { x }
}

/// Three-valued sign: -1, 0 or 1.
///
/// `f32::signum` maps `0.0` to `1.0`, which would make a zero velocity
/// delta agree with any positive bias.
#[inline]
pub fn sign(x: f32) -> f32 {
    if x > 0.0 { 1.0 }
    else if x < 0.0 { -1.0 }
    else { 0.0 }
}

/// Index of the largest element. Ties resolve to the first index.
///
/// Returns 0 for an empty slice.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Index of the smallest element. Ties resolve to the first index.
///
/// Returns 0 for an empty slice.
pub fn argmin(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v < values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_ties_pick_first() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]), 1);
        assert_eq!(argmin(&[2.0, 0.5, 4.0, 0.5]), 1);
        assert_eq!(argmax(&[]), 0);
    }

    #[test]
    fn test_sign_of_zero() {
        assert_eq!(sign(0.0), 0.0);
        assert_eq!(sign(-0.0), 0.0);
        assert_eq!(sign(-3.0), -1.0);
        assert_eq!(sign(0.25), 1.0);
    }

    #[test]
    fn test_zero_to_one() {
        assert_eq!(zero_to_one(0.0), 1.0);
        assert_eq!(zero_to_one(0.5), 0.5);
    }

    #[test]
    fn test_clamp_inverted_range() {
        assert_eq!(clamp(-5.0, 1.0, -1.0), 1.0);
        assert_eq!(clamp(0.3, -1.0, 1.0), 0.3);
    }
}
