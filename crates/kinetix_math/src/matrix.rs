//! 2x2 rotation matrices

use crate::vector::Vec2;
use core::ops::Mul;

/// 2x2 matrix (column-major)
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct Mat2 {
    pub cols: [Vec2; 2],
}

impl Mat2 {
    pub const IDENTITY: Self = Self {
        cols: [Vec2::X, Vec2::Y],
    };

    pub const ZERO: Self = Self {
        cols: [Vec2::ZERO, Vec2::ZERO],
    };

    #[inline]
    pub const fn from_cols(c0: Vec2, c1: Vec2) -> Self {
        Self { cols: [c0, c1] }
    }

    /// Counter-clockwise rotation by `angle` radians: `[[c, -s], [s, c]]`.
    #[inline]
    pub fn from_angle(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_cols(Vec2::new(c, s), Vec2::new(-s, c))
    }

    #[inline]
    pub fn transpose(&self) -> Self {
        Self::from_cols(
            Vec2::new(self.cols[0].x, self.cols[1].x),
            Vec2::new(self.cols[0].y, self.cols[1].y),
        )
    }

    #[inline]
    pub fn determinant(&self) -> f32 {
        self.cols[0].x * self.cols[1].y - self.cols[1].x * self.cols[0].y
    }

    #[inline]
    pub fn mul_vec2(&self, v: Vec2) -> Vec2 {
        self.cols[0] * v.x + self.cols[1] * v.y
    }

    /// Multiply by the transpose, which for a rotation is its inverse.
    #[inline]
    pub fn transpose_mul_vec2(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.cols[0].dot(v), self.cols[1].dot(v))
    }
}

impl Default for Mat2 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul<Vec2> for Mat2 {
    type Output = Vec2;
    #[inline]
    fn mul(self, rhs: Vec2) -> Vec2 {
        self.mul_vec2(rhs)
    }
}

impl Mul for Mat2 {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self::from_cols(self.mul_vec2(rhs.cols[0]), self.mul_vec2(rhs.cols[1]))
    }
}
