use glam::Vec2;

use crate::geometry::Rect;

const ORIGIN_EPSILON: f32 = 1.0e-3;

/// Where a clipped vertex came from, relative to the input polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClipOrigin {
    /// Unchanged input vertex.
    Original(usize),
    /// Point on the input edge `from -> to`, at parameter `t`.
    OnEdge { from: usize, to: usize, t: f32 },
    /// Point strictly inside the input polygon (a clip region corner).
    Inside,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClippedPolygon {
    pub points: Vec<Vec2>,
    pub origins: Vec<ClipOrigin>,
}

impl ClippedPolygon {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Clips screen space polygons.
pub trait Clipper2D {
    /// Returns `None` when nothing of the polygon remains.
    fn clip(&self, polygon: &[Vec2]) -> Option<ClippedPolygon>;
}

/// Clipper against an axis aligned screen rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxClipper {
    min: Vec2,
    max: Vec2,
}

impl BoxClipper {
    pub fn new(rect: Rect) -> Self {
        Self {
            min: Vec2::new(rect.xmin as f32, rect.ymin as f32),
            max: Vec2::new(rect.xmax as f32, rect.ymax as f32),
        }
    }

    fn inside(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

impl Clipper2D for BoxClipper {
    fn clip(&self, polygon: &[Vec2]) -> Option<ClippedPolygon> {
        if polygon.len() < 3 {
            return None;
        }
        if polygon.iter().all(|&p| self.inside(p)) {
            return Some(ClippedPolygon {
                points: polygon.to_vec(),
                origins: (0..polygon.len()).map(ClipOrigin::Original).collect(),
            });
        }

        let mut points = polygon.to_vec();
        let planes = [
            (Vec2::X, self.min.x),
            (Vec2::NEG_X, -self.max.x),
            (Vec2::Y, self.min.y),
            (Vec2::NEG_Y, -self.max.y),
        ];
        for (normal, offset) in planes {
            points = clip_half_plane(&points, normal, offset);
            if points.len() < 3 {
                return None;
            }
        }

        let origins = points.iter().map(|&p| classify(p, polygon)).collect();
        Some(ClippedPolygon { points, origins })
    }
}

/// Keeps the part of `points` where `dot(p, normal) >= offset`.
fn clip_half_plane(points: &[Vec2], normal: Vec2, offset: f32) -> Vec<Vec2> {
    let mut out = Vec::with_capacity(points.len() + 2);
    for (i, &current) in points.iter().enumerate() {
        let next = points[(i + 1) % points.len()];
        let dc = current.dot(normal) - offset;
        let dn = next.dot(normal) - offset;
        if dc >= 0.0 {
            out.push(current);
        }
        if (dc >= 0.0) != (dn >= 0.0) {
            let t = dc / (dc - dn);
            out.push(current + (next - current) * t);
        }
    }
    out.dedup_by(|a, b| a.distance_squared(*b) < ORIGIN_EPSILON * ORIGIN_EPSILON);
    if out.len() > 1 && out[0].distance_squared(out[out.len() - 1]) < ORIGIN_EPSILON * ORIGIN_EPSILON {
        out.pop();
    }
    out
}

fn classify(p: Vec2, polygon: &[Vec2]) -> ClipOrigin {
    if let Some(i) = polygon
        .iter()
        .position(|&v| v.distance_squared(p) < ORIGIN_EPSILON * ORIGIN_EPSILON)
    {
        return ClipOrigin::Original(i);
    }
    for from in 0..polygon.len() {
        let to = (from + 1) % polygon.len();
        let a = polygon[from];
        let edge = polygon[to] - a;
        let len_sq = edge.length_squared();
        if len_sq <= f32::EPSILON {
            continue;
        }
        let t = (p - a).dot(edge) / len_sq;
        if !(0.0..=1.0).contains(&t) {
            continue;
        }
        if (a + edge * t).distance_squared(p) < ORIGIN_EPSILON * ORIGIN_EPSILON {
            return ClipOrigin::OnEdge { from, to, t };
        }
    }
    ClipOrigin::Inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(min: f32, max: f32) -> Vec<Vec2> {
        vec![
            Vec2::new(min, min),
            Vec2::new(max, min),
            Vec2::new(max, max),
            Vec2::new(min, max),
        ]
    }

    #[test]
    fn polygon_inside_is_untouched() {
        let clipper = BoxClipper::new(Rect::new(0, 0, 100, 100));
        let clipped = clipper.clip(&square(10.0, 20.0)).unwrap();
        assert_eq!(clipped.len(), 4);
        assert_eq!(clipped.origins[2], ClipOrigin::Original(2));
    }

    #[test]
    fn polygon_outside_is_rejected() {
        let clipper = BoxClipper::new(Rect::new(0, 0, 100, 100));
        assert!(clipper.clip(&square(200.0, 300.0)).is_none());
    }

    #[test]
    fn overlapping_polygon_reports_edge_and_interior_points() {
        let clipper = BoxClipper::new(Rect::new(0, 0, 100, 100));
        let clipped = clipper.clip(&square(50.0, 150.0)).unwrap();
        assert_eq!(clipped.len(), 4);
        let mut originals = 0;
        let mut on_edge = 0;
        let mut inside = 0;
        for origin in &clipped.origins {
            match origin {
                ClipOrigin::Original(0) => originals += 1,
                ClipOrigin::Original(_) => panic!("unexpected original vertex"),
                ClipOrigin::OnEdge { t, .. } => {
                    assert!((t - 0.5).abs() < 1e-4);
                    on_edge += 1;
                }
                ClipOrigin::Inside => inside += 1,
            }
        }
        assert_eq!((originals, on_edge, inside), (1, 2, 1));
    }
}
