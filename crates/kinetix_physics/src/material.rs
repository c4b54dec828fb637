//! Surface materials and how contact pairs combine them

use serde::{Deserialize, Serialize};

/// Friction, restitution and density of a body surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Scaled by `EnvParams::base_friction` at contact time
    pub friction: f32,
    /// 0 = no bounce, 1 = perfectly elastic
    pub restitution: f32,
    pub density: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            friction: 1.0,
            restitution: 0.0,
            density: 1.0,
        }
    }
}

impl Material {
    pub fn new(friction: f32, restitution: f32) -> Self {
        Self {
            friction,
            restitution,
            ..Default::default()
        }
    }

    /// Nearly frictionless
    pub fn ice() -> Self {
        Self {
            friction: 0.05,
            restitution: 0.0,
            density: 0.9,
        }
    }

    /// Bouncy
    pub fn rubber() -> Self {
        Self {
            friction: 1.0,
            restitution: 0.8,
            density: 1.1,
        }
    }

    pub fn wood() -> Self {
        Self {
            friction: 0.5,
            restitution: 0.3,
            density: 0.6,
        }
    }

    /// Heavy and dead
    pub fn stone() -> Self {
        Self {
            friction: 0.7,
            restitution: 0.1,
            density: 2.5,
        }
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }
}

/// Rule for combining a property of two touching bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CombineRule {
    /// The smaller value
    #[default]
    Min,
    /// `sqrt(a² + b²)`
    RootSumSquare,
}

impl CombineRule {
    #[inline]
    pub fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            CombineRule::Min => a.min(b),
            CombineRule::RootSumSquare => (a * a + b * b).sqrt(),
        }
    }
}

/// Coulomb coefficient of a contact pair
#[inline]
pub fn friction_coefficient(a: f32, b: f32, base_friction: f32) -> f32 {
    CombineRule::RootSumSquare.combine(a * base_friction, b * base_friction)
}

/// Restitution of a contact pair
#[inline]
pub fn combined_restitution(a: f32, b: f32) -> f32 {
    CombineRule::Min.combine(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_friction_combine() {
        assert_relative_eq!(friction_coefficient(1.0, 1.0, 0.4), 0.4 * 2.0_f32.sqrt(), epsilon = 1e-6);
        assert_eq!(friction_coefficient(0.0, 0.0, 0.4), 0.0);
    }

    #[test]
    fn test_restitution_takes_minimum() {
        assert_eq!(combined_restitution(Material::rubber().restitution, Material::stone().restitution), 0.1);
    }
}
