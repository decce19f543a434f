//! Axis-aligned rectangle on the water plane (`x`, `z` stored as `x`, `y`)

use glam::Vec2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    /// Rect from its minimum corner and size
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            min: Vec2::new(x, y),
            max: Vec2::new(x + width, y + height),
        }
    }

    pub const fn from_min_max(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Half-open containment: the maximum edges belong to the neighbour
    #[inline]
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x < self.max.x && point.y >= self.min.y && point.y < self.max.y
    }

    #[inline]
    pub fn overlaps(&self, other: &Rect) -> bool {
        other.max.x > self.min.x && other.min.x < self.max.x && other.max.y > self.min.y && other.min.y < self.max.y
    }

    /// Grown by `margin` on every side
    pub fn expanded(&self, margin: Vec2) -> Rect {
        Rect {
            min: self.min - margin,
            max: self.max + margin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_is_half_open() {
        let rect = Rect::new(0.0, 0.0, 10.0, 5.0);
        assert!(rect.contains(Vec2::ZERO));
        assert!(rect.contains(Vec2::new(9.99, 4.99)));
        assert!(!rect.contains(Vec2::new(10.0, 1.0)));
        assert!(!rect.contains(Vec2::new(1.0, 5.0)));
        assert!(!rect.contains(Vec2::new(-0.01, 1.0)));
    }

    #[test]
    fn test_overlaps() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.overlaps(&Rect::new(5.0, 5.0, 10.0, 10.0)));
        assert!(a.overlaps(&Rect::new(2.0, 2.0, 1.0, 1.0)));
        assert!(!a.overlaps(&Rect::new(10.0, 0.0, 5.0, 5.0)));
        assert!(!a.overlaps(&Rect::new(-5.0, 11.0, 50.0, 5.0)));
    }

    #[test]
    fn test_expanded_keeps_center() {
        let rect = Rect::new(-2.0, 4.0, 8.0, 2.0);
        let grown = rect.expanded(Vec2::new(1.0, 0.5));
        assert_eq!(grown.center(), rect.center());
        assert_eq!(grown.size(), Vec2::new(10.0, 3.0));
    }
}
