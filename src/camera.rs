use glam::{Mat3, Vec2, Vec3};

use crate::view::Projection;

/// Perspective camera solved to mimic the isometric projection around one
/// anchor point.
///
/// Generic mesh renderers expect a perspective camera. This camera maps the
/// anchor exactly onto its isometric screen position and approximates the
/// affine projection nearby; the further a point is from the anchor, the
/// more perspective foreshortening shows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FakeCamera {
    o2c: Mat3,
    origin: Vec3,
    fov: f32,
    shift: Vec2,
    anchor: Vec3,
}

impl Default for FakeCamera {
    fn default() -> Self {
        Self {
            o2c: Mat3::IDENTITY,
            origin: Vec3::ZERO,
            fov: 1.0,
            shift: Vec2::ZERO,
            anchor: Vec3::ZERO,
        }
    }
}

impl FakeCamera {
    pub fn new(projection: &Projection, anchor: Vec3, view_height: f32, depth: f32) -> Self {
        let mut camera = Self::default();
        camera.solve(projection, anchor, view_height, depth);
        camera
    }

    /// Re-solves the camera in place for a new anchor.
    ///
    /// `view_height` is the screen height in pixels, used as the focal
    /// length; `depth` is the camera distance in view heights.
    pub fn solve(&mut self, projection: &Projection, anchor: Vec3, view_height: f32, depth: f32) {
        let fov = view_height.max(1.0);
        let distance = depth.max(1.0) * fov / projection.y_axis().y;
        let k = distance / fov;
        let (x_axis, y_axis, z_axis) = (projection.x_axis(), projection.y_axis(), projection.z_axis());
        let rows = Mat3::from_cols(
            Vec3::new(x_axis.x, 0.0, z_axis.x) * k,
            Vec3::new(x_axis.y, y_axis.y, z_axis.y) * k,
            Vec3::new(-1.0, 0.0, 1.0),
        );
        let o2c = rows.transpose();
        let inverse = o2c.inverse();

        self.o2c = o2c;
        self.origin = anchor - inverse * Vec3::new(0.0, 0.0, distance);
        self.fov = fov;
        self.shift = projection.w2s(anchor);
        self.anchor = anchor;
    }

    /// World to camera rotation/scale matrix.
    pub fn o2c(&self) -> Mat3 {
        self.o2c
    }

    /// Camera position in world space.
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    /// Perspective center on screen.
    pub fn shift(&self) -> Vec2 {
        self.shift
    }

    pub fn anchor(&self) -> Vec3 {
        self.anchor
    }

    pub fn world_to_camera(&self, world: Vec3) -> Vec3 {
        self.o2c * (world - self.origin)
    }

    /// Perspective projection; `None` for points behind the camera.
    pub fn project(&self, world: Vec3) -> Option<Vec2> {
        let cam = self.world_to_camera(world);
        if cam.z <= f32::EPSILON {
            return None;
        }
        Some(self.shift + Vec2::new(cam.x, cam.y) * (self.fov / cam.z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::view::View;
    use crate::config::ViewConfig;

    #[test]
    fn anchor_projects_exactly() {
        let view = View::new(Rect::new(0, 0, 640, 480), &ViewConfig::default(), 0).unwrap();
        let anchor = Vec3::new(3.5, 0.5, 2.5);
        let camera = view.fake_camera(anchor);
        let iso = view.w2s(anchor);
        let fake = camera.project(anchor).unwrap();
        assert!((iso - fake).length() < 1e-2);
    }

    #[test]
    fn nearby_points_stay_close_to_iso() {
        let view = View::new(Rect::new(0, 0, 640, 480), &ViewConfig::default(), 0).unwrap();
        let anchor = Vec3::new(3.5, 0.0, 2.5);
        let camera = view.fake_camera(anchor);
        let offset = anchor + Vec3::new(0.25, 0.5, -0.25);
        let iso = view.w2s(offset);
        let fake = camera.project(offset).unwrap();
        let span = (view.w2s(anchor) - iso).length();
        assert!((iso - fake).length() < span * 0.05);
    }
}
