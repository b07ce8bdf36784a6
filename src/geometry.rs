use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Screen rectangle in pixels; `xmax`/`ymax` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
}

impl Rect {
    pub const fn new(xmin: i32, ymin: i32, xmax: i32, ymax: i32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    pub fn width(&self) -> i32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> i32 {
        self.ymax - self.ymin
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.xmin as f32 && x < self.xmax as f32 && y >= self.ymin as f32 && y < self.ymax as f32
    }
}

/// Axis aligned box in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Ground plane half-open on `x`/`z`, closed on `y`.
    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x < self.max.x
            && p.z >= self.min.z
            && p.z < self.max.z
            && p.y >= self.min.y
            && p.y <= self.max.y
    }

    /// True when `p` is at least `eps` inside every face of the box.
    pub fn contains_strict(&self, p: Vec3, eps: f32) -> bool {
        p.x > self.min.x + eps
            && p.x < self.max.x - eps
            && p.y > self.min.y + eps
            && p.y < self.max.y - eps
            && p.z > self.min.z + eps
            && p.z < self.max.z - eps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_dimensions() {
        let rect = Rect::new(10, 20, 110, 70);
        assert_eq!(rect.width(), 100);
        assert_eq!(rect.height(), 50);
        assert!(!rect.is_empty());
        assert!(Rect::new(5, 5, 5, 10).is_empty());
    }

    #[test]
    fn strict_containment_rejects_faces() {
        let b = Aabb::new(Vec3::new(0.0, -1.0, 0.0), Vec3::new(4.0, 10.0, 4.0));
        assert!(b.contains(Vec3::new(0.0, 0.0, 0.0)));
        assert!(!b.contains_strict(Vec3::new(0.0, 0.0, 1.0), 1e-4));
        assert!(b.contains_strict(Vec3::new(0.5, 0.0, 3.5), 1e-4));
        assert!(!b.contains(Vec3::new(4.0, 0.0, 1.0)));
    }
}
