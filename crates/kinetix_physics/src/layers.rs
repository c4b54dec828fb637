//! Collision filtering
//!
//! Two independent filters decide whether a body pair produces contacts:
//! the per-body [`CollisionMode`] and the joint-derived [`CollisionMatrix`].

use crate::body::{CollisionMode, RigidBody};
use crate::joint::Joint;

/// Check whether two bodies' collision modes allow contact
///
/// A pair collides if either side is [`CollisionMode::All`], or both sides
/// have a non-zero mode.
pub fn should_collide(a: &RigidBody, b: &RigidBody) -> bool {
    modes_collide(a.collision_mode, b.collision_mode)
}

pub fn modes_collide(a: CollisionMode, b: CollisionMode) -> bool {
    a == CollisionMode::All || b == CollisionMode::All || a.value() * b.value() > 0
}

/// Symmetric N×N table of body pairs allowed to collide
///
/// Indexed in the unified body space (polygons first, then circles). Bodies
/// connected through a chain of active joints never collide with each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollisionMatrix {
    size: usize,
    cells: Vec<bool>,
}

impl CollisionMatrix {
    /// Every distinct pair may collide; the diagonal is cleared
    pub fn new(size: usize) -> Self {
        let mut cells = vec![true; size * size];
        for i in 0..size {
            cells[i * size + i] = false;
        }
        Self { size, cells }
    }

    /// Build from raw rows, as stored in a level file
    pub fn from_rows(rows: Vec<Vec<bool>>) -> Option<Self> {
        let size = rows.len();
        if rows.iter().any(|row| row.len() != size) {
            return None;
        }
        Some(Self {
            size,
            cells: rows.into_iter().flatten().collect(),
        })
    }

    /// Derive the matrix from the active joints
    ///
    /// Exclusion is propagated transitively: the relaxation pass runs once
    /// per joint slot, which bounds the length of chain it can close.
    pub fn from_joints(size: usize, joints: &[Joint]) -> Self {
        let mut matrix = Self::new(size);
        for _ in 0..joints.len() {
            for joint in joints.iter().filter(|j| j.active) {
                let (a, b) = (joint.a_index, joint.b_index);
                if a >= size || b >= size {
                    log::warn!("Joint references body {}/{} outside {} slots", a, b, size);
                    continue;
                }
                matrix.set(a, b, false);
                matrix.set(b, a, false);
                for c in 0..size {
                    if !matrix.get(a, c) {
                        matrix.set(c, b, false);
                    }
                    if !matrix.get(b, c) {
                        matrix.set(c, a, false);
                    }
                    if !matrix.get(c, a) {
                        matrix.set(b, c, false);
                    }
                    if !matrix.get(c, b) {
                        matrix.set(a, c, false);
                    }
                }
            }
        }
        matrix
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether bodies `a` and `b` may collide; out-of-range pairs never do
    #[inline]
    pub fn can_collide(&self, a: usize, b: usize) -> bool {
        a < self.size && b < self.size && self.get(a, b)
    }

    #[inline]
    fn get(&self, a: usize, b: usize) -> bool {
        self.cells[a * self.size + b]
    }

    #[inline]
    fn set(&mut self, a: usize, b: usize, value: bool) {
        self.cells[a * self.size + b] = value;
    }

    /// Rows as nested vectors, for persistence
    pub fn rows(&self) -> Vec<Vec<bool>> {
        self.cells.chunks(self.size.max(1)).take(self.size).map(|r| r.to_vec()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(a: usize, b: usize) -> Joint {
        Joint {
            a_index: a,
            b_index: b,
            active: true,
            ..Joint::default()
        }
    }

    #[test]
    fn test_collision_modes() {
        use CollisionMode::*;
        assert!(modes_collide(Normal, Normal));
        assert!(modes_collide(Selective, All));
        assert!(!modes_collide(Selective, Normal));
        assert!(!modes_collide(Selective, Selective));
    }

    #[test]
    fn test_baseline_matrix() {
        let matrix = CollisionMatrix::new(3);
        assert!(!matrix.can_collide(1, 1));
        assert!(matrix.can_collide(0, 2));
        assert!(!matrix.can_collide(0, 7));
    }

    #[test]
    fn test_chain_exclusion() {
        let joints = [pin(0, 1), pin(1, 2), Joint::default()];
        let matrix = CollisionMatrix::from_joints(4, &joints);
        assert!(!matrix.can_collide(0, 1));
        assert!(!matrix.can_collide(1, 2));
        assert!(!matrix.can_collide(0, 2));
        assert!(!matrix.can_collide(2, 0));
        assert!(matrix.can_collide(3, 0));
        assert!(matrix.can_collide(2, 3));
    }

    #[test]
    fn test_inactive_joint_ignored() {
        let mut joint = pin(0, 1);
        joint.active = false;
        let matrix = CollisionMatrix::from_joints(2, &[joint]);
        assert!(matrix.can_collide(0, 1));
    }

    #[test]
    fn test_rows_round_trip() {
        let matrix = CollisionMatrix::from_joints(3, &[pin(0, 2)]);
        let rebuilt = CollisionMatrix::from_rows(matrix.rows()).unwrap();
        assert_eq!(rebuilt, matrix);
        assert!(CollisionMatrix::from_rows(vec![vec![true], vec![true, false]]).is_none());
    }
}
