//! Mass and inertia from shape and density

use crate::body::{Polygon, RigidBody, Shape, MAX_POLYGON_VERTICES};
use kinetix_math::{consts::PI, zero_to_one, Vec2};

/// Clockwise rectangle corners: (+,+), (+,-), (-,-), (-,+)
pub fn rectangle_vertices(width: f32, height: f32) -> [Vec2; MAX_POLYGON_VERTICES] {
    let half = Vec2::new(width / 2.0, height / 2.0);
    [
        Vec2::new(half.x, half.y),
        Vec2::new(half.x, -half.y),
        Vec2::new(-half.x, -half.y),
        Vec2::new(-half.x, half.y),
    ]
}

pub fn circle_inverse_mass(radius: f32, density: f32) -> f32 {
    1.0 / (radius * radius * PI * density)
}

pub fn circle_inverse_inertia(radius: f32, density: f32) -> f32 {
    1.0 / (PI * radius.powi(4) / 4.0 * density)
}

fn triangle_area(p1: Vec2, p2: Vec2, p3: Vec2) -> f32 {
    let width = zero_to_one((p2 - p1).length());
    let along = (p2 - p1) / width;
    let foot = p1 + along * (p3 - p1).dot(along);
    0.5 * width * (p3 - foot).length()
}

/// Fan-triangulated area, and the vertex average used as centre of mass
pub fn polygon_area_and_centroid(polygon: &Polygon) -> (f32, Vec2) {
    let points = polygon.points();
    let area = (1..points.len().saturating_sub(1))
        .map(|i| triangle_area(points[0], points[i], points[i + 1]))
        .sum();
    let sum = points.iter().fold(Vec2::ZERO, |acc, p| acc + *p);
    (area, sum / points.len().max(1) as f32)
}

/// Inverse inertia about the local origin
pub fn polygon_inverse_inertia(polygon: &Polygon, density: f32) -> f32 {
    let points = polygon.points();
    let n = points.len();
    let sum: f32 = (0..n)
        .map(|i| {
            let p1 = points[i];
            let p2 = points[(i + 1) % n];
            let d = p1.cross(p2);
            let int_x2 = p1.x * p1.x + p2.x * p1.x + p2.x * p2.x;
            let int_y2 = p1.y * p1.y + p2.y * p1.y + p2.y * p2.y;
            (0.25 * d / 3.0 * (int_x2 + int_y2)).abs()
        })
        .sum();
    1.0 / (sum * density)
}

/// Recompute inverse mass and inertia from shape and density
///
/// Static bodies are left untouched. Polygons are recentred so that the
/// local origin is the vertex average; `position` shifts to compensate.
pub fn recompute_mass_properties(body: &mut RigidBody) {
    if body.is_static() {
        return;
    }
    let density = body.density;
    match &mut body.shape {
        Shape::Circle { radius } => {
            body.inverse_mass = circle_inverse_mass(*radius, density);
            body.inverse_inertia = circle_inverse_inertia(*radius, density);
        }
        Shape::Polygon(polygon) => {
            let (area, centroid) = polygon_area_and_centroid(polygon);
            body.position += centroid;
            let n = polygon.n_vertices;
            for v in polygon.vertices[..n].iter_mut() {
                *v -= centroid;
            }
            body.inverse_mass = 1.0 / (area * density);
            body.inverse_inertia = polygon_inverse_inertia(polygon, density);
        }
    }
}
