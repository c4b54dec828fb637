//! Rigid body types

use crate::error::{PhysicsError, Result};
use crate::mass;
use crate::material::Material;
use kinetix_math::{zero_to_one, Mat2, Vec2};

/// Vertex capacity of every polygon slot
pub const MAX_POLYGON_VERTICES: usize = 4;

/// Which other bodies a body generates contacts with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionMode {
    /// Only collides with [`CollisionMode::All`] bodies
    Selective,
    /// Collides with `Normal` and `All` bodies
    #[default]
    Normal,
    /// Collides with everything
    All,
}

impl CollisionMode {
    pub fn value(self) -> u8 {
        match self {
            Self::Selective => 0,
            Self::Normal => 1,
            Self::All => 2,
        }
    }

    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Selective),
            1 => Some(Self::Normal),
            2 => Some(Self::All),
            _ => None,
        }
    }
}

/// Gameplay tag read by terminal detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    None,
    Ball,
    Goal,
    Hazard,
}

impl Role {
    pub fn value(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Ball => 1,
            Self::Goal => 2,
            Self::Hazard => 3,
        }
    }

    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Ball),
            2 => Some(Self::Goal),
            3 => Some(Self::Hazard),
            _ => None,
        }
    }
}

/// Convex polygon in body-local coordinates, clockwise winding
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Polygon {
    pub vertices: [Vec2; MAX_POLYGON_VERTICES],
    pub n_vertices: usize,
}

impl Polygon {
    pub fn new(vertices: &[Vec2]) -> Result<Self> {
        if !(3..=MAX_POLYGON_VERTICES).contains(&vertices.len()) {
            return Err(PhysicsError::InvalidVertexCount(vertices.len()));
        }
        let mut padded = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        padded[..vertices.len()].copy_from_slice(vertices);
        Ok(Self {
            vertices: padded,
            n_vertices: vertices.len(),
        })
    }

    /// Axis-aligned rectangle centred on the origin
    pub fn rectangle(width: f32, height: f32) -> Self {
        Self {
            vertices: mass::rectangle_vertices(width, height),
            n_vertices: 4,
        }
    }

    /// The used vertices
    pub fn points(&self) -> &[Vec2] {
        &self.vertices[..self.n_vertices]
    }

    /// Vertex following `i`, wrapping at `n_vertices`
    #[inline]
    pub fn next_vertex(&self, i: usize) -> Vec2 {
        self.vertices[(i + 1) % self.n_vertices]
    }

    /// Outward unit normal of edge `i` (from vertex `i` to `i + 1`)
    pub fn edge_normal(&self, i: usize) -> Vec2 {
        let delta = self.next_vertex(i) - self.vertices[i];
        delta.perpendicular() / zero_to_one(delta.length())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Circle { radius: f32 },
    Polygon(Polygon),
}

/// A rigid body slot
///
/// Inverse mass or inertia of zero means infinite mass or inertia.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    pub position: Vec2,
    /// Radians
    pub rotation: f32,
    pub velocity: Vec2,
    pub angular_velocity: f32,

    pub inverse_mass: f32,
    pub inverse_inertia: f32,

    pub friction: f32,
    pub restitution: f32,

    pub collision_mode: CollisionMode,
    pub active: bool,

    pub density: f32,
    pub role: Role,
    pub shape: Shape,
}

impl RigidBody {
    fn empty(shape: Shape) -> Self {
        Self {
            position: Vec2::ZERO,
            rotation: 0.0,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            inverse_mass: 0.0,
            inverse_inertia: 0.0,
            friction: 0.0,
            restitution: 0.0,
            collision_mode: CollisionMode::Normal,
            active: false,
            density: 1.0,
            role: Role::None,
            shape,
        }
    }

    /// Inactive polygon slot
    pub fn empty_polygon() -> Self {
        Self::empty(Shape::Polygon(Polygon::default()))
    }

    /// Inactive circle slot
    pub fn empty_circle() -> Self {
        Self::empty(Shape::Circle { radius: 0.0 })
    }

    /// Active dynamic circle with unit density
    pub fn circle(position: Vec2, radius: f32) -> Self {
        let mut body = Self::empty(Shape::Circle { radius });
        body.position = position;
        body.active = true;
        body.inverse_mass = 1.0;
        mass::recompute_mass_properties(&mut body);
        body
    }

    /// Active dynamic polygon with unit density
    ///
    /// The body is recentred on the vertex average, so `position` afterwards
    /// is the centre of mass rather than the local origin.
    pub fn polygon(position: Vec2, vertices: &[Vec2]) -> Result<Self> {
        let mut body = Self::empty(Shape::Polygon(Polygon::new(vertices)?));
        body.position = position;
        body.active = true;
        body.inverse_mass = 1.0;
        mass::recompute_mass_properties(&mut body);
        Ok(body)
    }

    /// Active immovable polygon; vertices are used as given, not recentred
    pub fn static_polygon(position: Vec2, vertices: &[Vec2]) -> Result<Self> {
        let mut body = Self::empty(Shape::Polygon(Polygon::new(vertices)?));
        body.position = position;
        body.active = true;
        Ok(body)
    }

    /// Active dynamic box
    pub fn rectangle(position: Vec2, width: f32, height: f32) -> Self {
        let mut body = Self::empty(Shape::Polygon(Polygon::rectangle(width, height)));
        body.position = position;
        body.active = true;
        body.inverse_mass = 1.0;
        mass::recompute_mass_properties(&mut body);
        body
    }

    /// Make the body immovable
    pub fn fixed(mut self) -> Self {
        self.inverse_mass = 0.0;
        self.inverse_inertia = 0.0;
        self
    }

    /// Keep the mass but forbid rotation
    pub fn with_fixed_rotation(mut self) -> Self {
        self.inverse_inertia = 0.0;
        self
    }

    /// Set density and recompute mass properties of dynamic bodies
    ///
    /// A rotation lock set earlier survives the recompute.
    pub fn with_density(mut self, density: f32) -> Self {
        let rotation_locked = self.inverse_inertia == 0.0;
        self.density = density;
        mass::recompute_mass_properties(&mut self);
        if rotation_locked {
            self.inverse_inertia = 0.0;
        }
        self
    }

    /// Take friction, restitution and density from a material
    pub fn with_material(mut self, material: Material) -> Self {
        self.friction = material.friction;
        self.restitution = material.restitution;
        self.with_density(material.density)
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_collision_mode(mut self, mode: CollisionMode) -> Self {
        self.collision_mode = mode;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, angular_velocity: f32) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    /// Infinite mass
    #[inline]
    pub fn is_static(&self) -> bool {
        self.inverse_mass == 0.0
    }

    /// Radius for circles, zero for polygons
    #[inline]
    pub fn radius(&self) -> f32 {
        match self.shape {
            Shape::Circle { radius } => radius,
            Shape::Polygon(_) => 0.0,
        }
    }

    #[inline]
    pub fn as_polygon(&self) -> Option<&Polygon> {
        match &self.shape {
            Shape::Polygon(polygon) => Some(polygon),
            Shape::Circle { .. } => None,
        }
    }

    #[inline]
    pub fn rotation_matrix(&self) -> Mat2 {
        Mat2::from_angle(self.rotation)
    }

    /// Transform a body-local point to world space
    #[inline]
    pub fn world_point(&self, local: Vec2) -> Vec2 {
        self.rotation_matrix() * local + self.position
    }

    /// Velocity of the material point currently at `world_point`
    #[inline]
    pub fn point_velocity(&self, world_point: Vec2) -> Vec2 {
        self.velocity + Vec2::scalar_cross(self.angular_velocity, world_point - self.position)
    }

    #[inline]
    pub fn apply_velocity_delta(&mut self, dv: Vec2, drv: f32) {
        self.velocity += dv;
        self.angular_velocity += drv;
    }
}

/// Velocity change for both bodies of a constraint
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VelocityDelta {
    pub a_dv: Vec2,
    pub a_drv: f32,
    pub b_dv: Vec2,
    pub b_drv: f32,
}

/// A body addressed by shape kind and slot
///
/// The unified index space puts every polygon slot before every circle slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyRef {
    Polygon(usize),
    Circle(usize),
}

impl BodyRef {
    pub fn from_unified(index: usize, num_polygons: usize) -> Self {
        if index < num_polygons {
            Self::Polygon(index)
        } else {
            Self::Circle(index - num_polygons)
        }
    }

    pub fn unified(self, num_polygons: usize) -> usize {
        match self {
            Self::Polygon(i) => i,
            Self::Circle(i) => i + num_polygons,
        }
    }
}
